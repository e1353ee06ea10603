//! Thin HTTP layer shared by the relay submitter and poller.
//!
//! The client holds no base URL or token: every call takes the credential
//! snapshot it should use, so a rotated token is picked up on the next call.
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;

use crate::credentials::IntegrationConfig;
use crate::error::{AppError, AppResult};

/// Longest provider body echoed into errors and logs.
const BODY_EXCERPT_LEN: usize = 512;

#[derive(Clone, Default)]
pub struct RelayClient {
    client: Client,
}

/// Status and raw body of a relay response.
pub struct RelayResponse {
    pub url: String,
    pub status: StatusCode,
    pub body: String,
}

impl RelayClient {
    pub fn new() -> Self {
        RelayClient { client: Client::new() }
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(client: Client) -> Self {
        RelayClient { client }
    }

    pub async fn post_json(
        &self,
        credential: &IntegrationConfig,
        path: &str,
        body: &Value,
        timeout: Duration,
    ) -> AppResult<RelayResponse> {
        let url = credential.endpoint(path);
        tracing::info!(
            url = %url,
            token = %credential.masked_token(),
            integration = %credential.integration_id,
            "POST to relay"
        );
        let request = self.client.post(&url).json(body);
        self.send(credential, url, request, timeout).await
    }

    pub async fn get(
        &self,
        credential: &IntegrationConfig,
        path: &str,
        timeout: Duration,
    ) -> AppResult<RelayResponse> {
        let url = credential.endpoint(path);
        tracing::debug!(
            url = %url,
            token = %credential.masked_token(),
            integration = %credential.integration_id,
            "GET from relay"
        );
        let request = self.client.get(&url);
        self.send(credential, url, request, timeout).await
    }

    async fn send(
        &self,
        credential: &IntegrationConfig,
        url: String,
        request: RequestBuilder,
        timeout: Duration,
    ) -> AppResult<RelayResponse> {
        let mut request = request.timeout(timeout).bearer_auth(&credential.auth_token);
        if !credential.secret_header.is_empty() {
            request = request.header(credential.secret_header.as_str(), credential.auth_token.as_str());
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(source) => {
                tracing::error!(
                    url = %url,
                    token = %credential.masked_token(),
                    timeout = source.is_timeout(),
                    "relay request failed: {}",
                    source
                );
                return Err(AppError::Transport {
                    url,
                    masked_token: credential.masked_token(),
                    source,
                });
            }
        };

        let status = response.status();
        let body = response.text().await.map_err(|source| AppError::Transport {
            url: url.clone(),
            masked_token: credential.masked_token(),
            source,
        })?;
        Ok(RelayResponse { url, status, body })
    }
}

/// Leading slice of a provider body, cut on a char boundary.
pub fn excerpt(body: &str) -> String {
    if body.len() <= BODY_EXCERPT_LEN {
        return body.to_string();
    }
    let mut end = BODY_EXCERPT_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}
