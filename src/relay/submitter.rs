//! Job submission against the relay's `/mj/submit/*` endpoints.
use std::time::Duration;

use serde_json::json;

use crate::credentials::IntegrationConfig;
use crate::error::{AppError, AppResult};
use crate::job::Submission;
use crate::prompt::CompiledPrompt;
use crate::relay::client::{excerpt, RelayClient, RelayResponse};
use crate::relay::decode::decode_submission;

pub const IMAGINE_PATH: &str = "/mj/submit/imagine";
pub const CHANGE_PATH: &str = "/mj/submit/change";

/// Follow-up actions accepted by the change endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Upscale,
    Variation,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Upscale => "UPSCALE",
            ChangeAction::Variation => "VARIATION",
        }
    }
}

#[derive(Clone)]
pub struct JobSubmitter {
    client: RelayClient,
    timeout: Duration,
}

impl JobSubmitter {
    pub fn new(client: RelayClient, timeout: Duration) -> Self {
        JobSubmitter { client, timeout }
    }

    /// Submit a compiled prompt. One POST, no retries.
    pub async fn submit(
        &self,
        prompt: &CompiledPrompt,
        credential: &IntegrationConfig,
    ) -> AppResult<Submission> {
        let body = json!({ "prompt": prompt.prompt_text });
        let response = self
            .client
            .post_json(credential, IMAGINE_PATH, &body, self.timeout)
            .await?;
        let submission = Self::decode(response, credential)?;
        tracing::info!(
            job_id = %submission.job_id,
            status = %submission.status,
            code = submission.code,
            mode = %prompt.mode,
            "imagine job submitted"
        );
        Ok(submission)
    }

    /// Request a follow-up on a grid, e.g. upscaling image `index` (1-4) of `task_id`.
    pub async fn change(
        &self,
        task_id: &str,
        action: ChangeAction,
        index: u8,
        credential: &IntegrationConfig,
    ) -> AppResult<Submission> {
        if !(1..=4).contains(&index) {
            return Err(AppError::InvalidParameter {
                name: "index".into(),
                reason: format!("expected 1-4, got {}", index),
            });
        }
        if task_id.trim().is_empty() {
            return Err(AppError::InvalidParameter {
                name: "task_id".into(),
                reason: "must not be empty".into(),
            });
        }
        let body = json!({ "taskId": task_id, "action": action.as_str(), "index": index });
        let response = self
            .client
            .post_json(credential, CHANGE_PATH, &body, self.timeout)
            .await?;
        let submission = Self::decode(response, credential)?;
        tracing::info!(
            task_id,
            action = action.as_str(),
            index,
            job_id = %submission.job_id,
            status = %submission.status,
            "change job submitted"
        );
        Ok(submission)
    }

    fn decode(response: RelayResponse, credential: &IntegrationConfig) -> AppResult<Submission> {
        if !response.status.is_success() {
            let body = excerpt(&response.body);
            tracing::error!(
                url = %response.url,
                status = response.status.as_u16(),
                token = %credential.masked_token(),
                body = %body,
                "relay rejected submission"
            );
            return Err(AppError::Submission {
                url: response.url,
                status: response.status.as_u16(),
                masked_token: credential.masked_token(),
                body,
            });
        }
        decode_submission(&response.body).map_err(|e| {
            tracing::error!(url = %response.url, "undecodable submission response: {}", e);
            e
        })
    }
}
