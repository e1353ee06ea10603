//! Node-level generation operations: submit, poll, upscale, synchronous generate.
//!
//! Each call performs its remote request once and returns. Nothing here loops
//! or retries; the caller decides when to poll again.
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::artifact::Artifact;
use crate::config::Timeouts;
use crate::credentials::{CredentialResolver, ProviderId};
use crate::error::{AppError, AppResult};
use crate::gemini::{GeminiClient, GeminiRequest, OutputShape};
use crate::job::{Job, PollStatus, Submission, SubmissionStatus};
use crate::pipeline::context::gather_context;
use crate::pipeline::folder::{FolderResolver, ResolvedFolder};
use crate::pipeline::persister::{ArtifactPersister, PersistReport};
use crate::prompt::compiler::free_text;
use crate::prompt::{CompiledPrompt, GenerationParams, PromptCompiler, PromptInput};
use crate::relay::{ChangeAction, JobPoller, JobSubmitter, RelayClient};
use crate::storage::ProjectStorage;
use crate::store::{meta, now_timestamp, GraphStore, Metadata, Node};

#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub submission: Submission,
    /// Absent for follow-up requests that carry no prompt.
    pub prompt: Option<CompiledPrompt>,
    /// Absent when the provider rejected the job.
    pub folder_id: Option<String>,
    pub folder_created: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollOutcome {
    pub job_id: String,
    pub status: PollStatus,
    pub progress: Option<String>,
    pub error: Option<String>,
    pub folder_id: Option<String>,
    pub report: Option<PersistReport>,
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub system_instruction: Option<String>,
    pub shape: OutputShape,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub job_id: String,
    pub text: Option<String>,
    pub folder_id: Option<String>,
    pub report: Option<PersistReport>,
}

pub struct GenerationService {
    store: Arc<dyn GraphStore>,
    credentials: Arc<dyn CredentialResolver>,
    compiler: PromptCompiler,
    submitter: JobSubmitter,
    poller: JobPoller,
    gemini: GeminiClient,
    folders: FolderResolver,
    persister: ArtifactPersister,
    timeouts: Timeouts,
}

impl GenerationService {
    pub fn new(
        store: Arc<dyn GraphStore>,
        storage: Arc<dyn ProjectStorage>,
        credentials: Arc<dyn CredentialResolver>,
        timeouts: Timeouts,
    ) -> Self {
        let relay = RelayClient::new();
        GenerationService {
            compiler: PromptCompiler::new(),
            submitter: JobSubmitter::new(relay.clone(), timeouts.submit),
            poller: JobPoller::new(relay, timeouts.poll),
            gemini: GeminiClient::new(),
            folders: FolderResolver::new(store.clone()),
            persister: ArtifactPersister::new(store.clone(), storage),
            store,
            credentials,
            timeouts,
        }
    }

    /// Compile the prompt `node` would submit, without contacting the relay.
    pub fn compile_for_node(
        &self,
        project_id: &str,
        node_id: &str,
        overrides: GenerationParams,
        mode: &str,
    ) -> AppResult<CompiledPrompt> {
        let node = self.node(project_id, node_id)?;
        self.compile(project_id, &node, overrides, mode)
    }

    pub async fn submit(
        &self,
        project_id: &str,
        node_id: &str,
        overrides: GenerationParams,
    ) -> AppResult<SubmitOutcome> {
        let node = self.node(project_id, node_id)?;
        let credential = self.credentials.resolve(ProviderId::Midjourney)?;
        let prompt = self.compile(project_id, &node, overrides, &credential.mode)?;
        let submission = self.submitter.submit(&prompt, &credential).await?;

        let folder = self.settle_submission(project_id, &node, &submission, Some(&prompt.prompt_text))?;
        Ok(SubmitOutcome {
            submission,
            prompt: Some(prompt),
            folder_id: folder.as_ref().map(|f| f.folder.id.clone()),
            folder_created: folder.map(|f| f.created).unwrap_or(false),
        })
    }

    /// Check the node's job once. `job_id` defaults to the node's current job.
    pub async fn poll(&self, project_id: &str, node_id: &str, job_id: Option<&str>) -> AppResult<PollOutcome> {
        let node = self.node(project_id, node_id)?;
        let job_id = self.job_id(&node, job_id)?;
        let mut job = recorded_job(&node, &job_id);
        if job.is_final() {
            tracing::info!(job_id = %job_id, status = job.status.as_str(), "job was rejected, not polling");
            return Ok(PollOutcome {
                status: PollStatus(job.status.as_str().to_string()),
                job_id,
                progress: None,
                error: node.meta_str(meta::JOB_ERROR).map(str::to_string),
                folder_id: None,
                report: None,
            });
        }

        let credential = self.credentials.resolve(ProviderId::Midjourney)?;
        let result = self.poller.poll(&job_id, &credential).await?;
        job.observe(result.status.clone(), result.progress.clone());

        let (folder_id, report) = if result.artifacts.is_empty() {
            (node.meta_str(meta::OUTPUT_FOLDER_ID).map(str::to_string), None)
        } else {
            let folder = self.folder_for_poll(project_id, &node, &job_id)?;
            let report = self
                .persister
                .persist(project_id, &folder, &node.id, &job_id, &result.artifacts)
                .await?;
            (Some(folder), Some(report))
        };

        self.stamp_poll(project_id, &node.id, &job, result.error.clone())?;
        Ok(PollOutcome {
            job_id,
            status: result.status,
            progress: job.progress,
            error: result.error,
            folder_id,
            report,
        })
    }

    /// Ask the relay to upscale image `index` (1-4) of a finished grid.
    pub async fn upscale(
        &self,
        project_id: &str,
        node_id: &str,
        task_id: Option<&str>,
        index: u8,
    ) -> AppResult<SubmitOutcome> {
        let node = self.node(project_id, node_id)?;
        let task_id = self.job_id(&node, task_id)?;
        let credential = self.credentials.resolve(ProviderId::Midjourney)?;
        let submission = self
            .submitter
            .change(&task_id, ChangeAction::Upscale, index, &credential)
            .await?;

        let folder = self.settle_submission(project_id, &node, &submission, None)?;
        Ok(SubmitOutcome {
            submission,
            prompt: None,
            folder_id: folder.as_ref().map(|f| f.folder.id.clone()),
            folder_created: folder.map(|f| f.created).unwrap_or(false),
        })
    }

    /// One synchronous multimodal generation. Inline images are persisted like
    /// relay artifacts under a locally minted job id.
    pub async fn generate_sync(
        &self,
        project_id: &str,
        node_id: &str,
        options: SyncOptions,
    ) -> AppResult<SyncOutcome> {
        let node = self.node(project_id, node_id)?;
        let context = gather_context(self.store.as_ref(), project_id, &node)?;
        let prompt = free_text(&context.texts, &node.content);
        if prompt.is_empty() {
            return Err(AppError::EmptyPrompt);
        }
        let credential = self.credentials.resolve(ProviderId::Gemini)?;
        let images = self
            .gemini
            .fetch_reference_images(&context.reference_urls(), self.timeouts.download)
            .await;

        let request = GeminiRequest {
            system_instruction: options.system_instruction,
            prompt: prompt.clone(),
            images,
            shape: options.shape,
            model: options.model,
        };
        let output = self.gemini.generate(&credential, &request, self.timeouts.generate).await?;

        let job_id = format!("gemini-{}", Uuid::new_v4().simple());
        let artifacts: Vec<Artifact> = output
            .images
            .into_iter()
            .enumerate()
            .map(|(i, image)| Artifact::inline(&job_id, i, image.mime_type, image.data))
            .collect();

        let (folder_id, report) = if artifacts.is_empty() {
            (None, None)
        } else {
            let folder = self.folders.resolve(project_id, &node, &job_id)?;
            let report = self
                .persister
                .persist(project_id, &folder.folder.id, &node.id, &job_id, &artifacts)
                .await?;
            (Some(folder.folder.id), Some(report))
        };

        let text = output.text;
        self.store.modify_node_metadata(project_id, &node.id, &mut |m| {
            m.insert(meta::JOB_ID.into(), Value::String(job_id.clone()));
            m.insert(meta::JOB_STATUS.into(), Value::String("completed".into()));
            m.insert(meta::LAST_PROMPT.into(), Value::String(prompt.clone()));
            m.insert(meta::LAST_GENERATED_AT.into(), Value::String(now_timestamp()));
            if let Some(text) = &text {
                m.insert(meta::TEXT_OUTPUT.into(), Value::String(text.clone()));
            }
        })?;

        Ok(SyncOutcome {
            job_id,
            text,
            folder_id,
            report,
        })
    }

    fn node(&self, project_id: &str, node_id: &str) -> AppResult<Node> {
        self.store
            .get_node(project_id, node_id)?
            .ok_or_else(|| AppError::node_not_found(project_id, node_id))
    }

    fn job_id(&self, node: &Node, explicit: Option<&str>) -> AppResult<String> {
        explicit
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| node.meta_str(meta::JOB_ID))
            .map(str::to_string)
            .ok_or_else(|| AppError::NoActiveJob {
                node_id: node.id.clone(),
            })
    }

    fn compile(
        &self,
        project_id: &str,
        node: &Node,
        overrides: GenerationParams,
        mode: &str,
    ) -> AppResult<CompiledPrompt> {
        let context = gather_context(self.store.as_ref(), project_id, node)?;
        let stored = node.metadata.get(meta::GENERATION).cloned().unwrap_or(Value::Null);
        let params = GenerationParams::from_value(&stored)?.merged(overrides);
        self.compiler.compile(&PromptInput {
            content: node.content.clone(),
            context: context.texts,
            references: context.references,
            params,
            mode: mode.to_string(),
        })
    }

    /// Record a submission on the source node and resolve its folder unless
    /// the provider rejected the job.
    fn settle_submission(
        &self,
        project_id: &str,
        node: &Node,
        submission: &Submission,
        prompt_text: Option<&str>,
    ) -> AppResult<Option<ResolvedFolder>> {
        let folder = if submission.status.is_rejection() {
            tracing::warn!(
                node_id = %node.id,
                status = %submission.status,
                description = submission.description.as_deref().unwrap_or("-"),
                "provider rejected job"
            );
            None
        } else {
            Some(self.folders.resolve(project_id, node, &submission.job_id)?)
        };

        let rejection = submission
            .status
            .is_rejection()
            .then(|| submission.description.clone().unwrap_or_else(|| submission.status.to_string()));
        self.store.modify_node_metadata(project_id, &node.id, &mut |m| {
            m.insert(meta::JOB_ID.into(), Value::String(submission.job_id.clone()));
            set_or_remove(m, meta::JOB_STATUS, Some(submission.status.as_str().to_string()));
            set_or_remove(m, meta::JOB_ERROR, rejection.clone());
            m.remove(meta::JOB_PROGRESS);
            if let Some(text) = prompt_text {
                m.insert(meta::LAST_PROMPT.into(), Value::String(text.to_string()));
            }
        })?;
        Ok(folder)
    }

    /// The folder artifacts of `job_id` go to, creating it if the node has none.
    fn folder_for_poll(&self, project_id: &str, node: &Node, job_id: &str) -> AppResult<String> {
        if let Some(folder_id) = node.meta_str(meta::OUTPUT_FOLDER_ID) {
            if self.store.get_node(project_id, folder_id)?.is_some() {
                return Ok(folder_id.to_string());
            }
        }
        Ok(self.folders.resolve(project_id, node, job_id)?.folder.id)
    }

    fn stamp_poll(&self, project_id: &str, node_id: &str, job: &Job, error: Option<String>) -> AppResult<()> {
        self.store.modify_node_metadata(project_id, node_id, &mut |m| {
            set_or_remove(m, meta::JOB_STATUS, Some(job.status.as_str().to_string()));
            set_or_remove(m, meta::JOB_PROGRESS, job.progress.clone());
            set_or_remove(m, meta::JOB_ERROR, error.clone());
        })?;
        Ok(())
    }
}

/// The job as last recorded on `node`. A node that recorded a different job
/// yields a fresh, queued one.
fn recorded_job(node: &Node, job_id: &str) -> Job {
    let status = node
        .meta_str(meta::JOB_STATUS)
        .filter(|_| node.meta_str(meta::JOB_ID) == Some(job_id))
        .unwrap_or(SubmissionStatus::Queued.as_str());
    let progress = node
        .meta_str(meta::JOB_PROGRESS)
        .filter(|_| node.meta_str(meta::JOB_ID) == Some(job_id))
        .map(str::to_string);
    Job::restore(job_id, ProviderId::Midjourney, status, progress)
}

fn set_or_remove(metadata: &mut Metadata, key: &str, value: Option<String>) {
    match value {
        Some(v) => {
            metadata.insert(key.to_string(), Value::String(v));
        }
        None => {
            metadata.remove(key);
        }
    }
}
