//! Remote job handle and its status.
//!
//! Submission answers carry a numeric code that maps onto
//! [`SubmissionStatus`]. Poll answers carry provider-defined free text which is
//! kept verbatim in [`PollStatus`]; deciding whether such a status is terminal
//! is left to the caller, by convention with the provider.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::credentials::ProviderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Submitted,
    /// Duplicate of an in-flight job; poll the returned id instead.
    Exists,
    Queued,
    QueueFull,
    BannedPrompt,
}

impl SubmissionStatus {
    /// Map the relay's result code. Unknown or absent codes read as queued.
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(1) => SubmissionStatus::Submitted,
            Some(21) => SubmissionStatus::Exists,
            Some(22) => SubmissionStatus::Queued,
            Some(23) => SubmissionStatus::QueueFull,
            Some(24) => SubmissionStatus::BannedPrompt,
            _ => SubmissionStatus::Queued,
        }
    }

    /// The provider refused the job. A status, not an error.
    pub fn is_rejection(&self) -> bool {
        matches!(self, SubmissionStatus::QueueFull | SubmissionStatus::BannedPrompt)
    }

    /// Inverse of [`SubmissionStatus::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "submitted" => Some(SubmissionStatus::Submitted),
            "exists" => Some(SubmissionStatus::Exists),
            "queued" => Some(SubmissionStatus::Queued),
            "queue_full" => Some(SubmissionStatus::QueueFull),
            "banned_prompt" => Some(SubmissionStatus::BannedPrompt),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::Exists => "exists",
            SubmissionStatus::Queued => "queued",
            SubmissionStatus::QueueFull => "queue_full",
            SubmissionStatus::BannedPrompt => "banned_prompt",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status text reported by a poll, kept exactly as the provider sent it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PollStatus(pub String);

impl PollStatus {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decoded answer of a submission or change request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub job_id: String,
    pub status: SubmissionStatus,
    pub code: Option<i64>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum JobStatus {
    Submission(SubmissionStatus),
    Reported(PollStatus),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Submission(s) => s.as_str(),
            JobStatus::Reported(s) => s.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub provider: ProviderId,
    pub status: JobStatus,
    pub progress: Option<String>,
}

impl Job {
    pub fn from_submission(provider: ProviderId, submission: &Submission) -> Self {
        Job {
            job_id: submission.job_id.clone(),
            provider,
            status: JobStatus::Submission(submission.status),
            progress: None,
        }
    }

    /// Rebuild a job from the status text recorded on a node. Submission
    /// statuses are recognised; anything else is a reported poll status.
    pub fn restore(job_id: &str, provider: ProviderId, status: &str, progress: Option<String>) -> Self {
        let status = match SubmissionStatus::parse(status) {
            Some(s) => JobStatus::Submission(s),
            None => JobStatus::Reported(PollStatus(status.to_string())),
        };
        Job {
            job_id: job_id.to_string(),
            provider,
            status,
            progress,
        }
    }

    /// Rejections are final; nothing a later poll reports can revive the job.
    pub fn is_final(&self) -> bool {
        matches!(&self.status, JobStatus::Submission(s) if s.is_rejection())
    }

    /// Record a poll observation. Returns false when the job is already final.
    pub fn observe(&mut self, status: PollStatus, progress: Option<String>) -> bool {
        if self.is_final() {
            return false;
        }
        self.status = JobStatus::Reported(status);
        if progress.is_some() {
            self.progress = progress;
        }
        true
    }
}
