//! Single status check against `/mj/task/{id}/fetch`.
//!
//! The poller is not a scheduler: each call performs exactly one GET. How often
//! to call it, and when to stop, is the caller's policy.
use std::time::Duration;

use crate::credentials::IntegrationConfig;
use crate::error::{AppError, AppResult};
use crate::relay::client::{excerpt, RelayClient};
use crate::relay::decode::{decode_poll, PollResult};

#[derive(Clone)]
pub struct JobPoller {
    client: RelayClient,
    timeout: Duration,
}

impl JobPoller {
    pub fn new(client: RelayClient, timeout: Duration) -> Self {
        JobPoller { client, timeout }
    }

    pub async fn poll(&self, job_id: &str, credential: &IntegrationConfig) -> AppResult<PollResult> {
        validate_job_id(job_id)?;
        let path = format!("/mj/task/{}/fetch", job_id);
        let response = self.client.get(credential, &path, self.timeout).await?;
        if !response.status.is_success() {
            let body = excerpt(&response.body);
            tracing::warn!(
                url = %response.url,
                status = response.status.as_u16(),
                token = %credential.masked_token(),
                "task fetch failed"
            );
            return Err(AppError::Status {
                url: response.url,
                status: response.status.as_u16(),
                masked_token: credential.masked_token(),
                body,
            });
        }
        let result = decode_poll(job_id, &response.body)?;
        tracing::info!(
            job_id,
            status = %result.status,
            progress = result.progress.as_deref().unwrap_or("-"),
            artifacts = result.artifacts.len(),
            "task polled"
        );
        Ok(result)
    }
}

/// Job ids become a path segment; allow only the characters relays hand out.
fn validate_job_id(job_id: &str) -> AppResult<()> {
    let ok = !job_id.is_empty()
        && job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if ok {
        Ok(())
    } else {
        Err(AppError::InvalidParameter {
            name: "job_id".into(),
            reason: format!("'{}' is not a valid job id", job_id),
        })
    }
}
