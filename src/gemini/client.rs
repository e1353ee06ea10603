//! Client for the synchronous multimodal `generateContent` API.
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use crate::credentials::IntegrationConfig;
use crate::error::{AppError, AppResult};
use crate::gemini::types::{
    Content, GenerateContentRequest, GenerateContentResponse, OutputShape, Part,
    TEXT_RESPONSE_FIELD,
};
use crate::relay::client::excerpt;
use crate::storage::mime_from_extension;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// An image carried inline in a request or response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct GeminiRequest {
    pub system_instruction: Option<String>,
    pub prompt: String,
    pub images: Vec<InlineImage>,
    pub shape: OutputShape,
    /// Overrides the integration's default model.
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeminiOutput {
    pub text: Option<String>,
    pub images: Vec<InlineImage>,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Default)]
pub struct GeminiClient {
    client: Client,
}

impl GeminiClient {
    pub fn new() -> Self {
        GeminiClient { client: Client::new() }
    }

    pub fn with_client(client: Client) -> Self {
        GeminiClient { client }
    }

    pub async fn generate(
        &self,
        credential: &IntegrationConfig,
        request: &GeminiRequest,
        timeout: Duration,
    ) -> AppResult<GeminiOutput> {
        let model = request
            .model
            .as_deref()
            .or(credential.model.as_deref())
            .ok_or_else(|| AppError::Configuration("no gemini model configured".into()))?;
        let url = credential.endpoint(&format!("v1beta/models/{}:generateContent", model));
        let header = if credential.secret_header.is_empty() {
            API_KEY_HEADER
        } else {
            credential.secret_header.as_str()
        };

        tracing::info!(
            url = %url,
            token = %credential.masked_token(),
            prompt_len = request.prompt.len(),
            images = request.images.len(),
            shape = ?request.shape,
            "POST generateContent"
        );

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .header(header, credential.auth_token.as_str())
            .json(&build_request(request))
            .send()
            .await
            .map_err(|source| {
                tracing::error!(
                    url = %url,
                    token = %credential.masked_token(),
                    timeout = source.is_timeout(),
                    "generateContent request failed: {}",
                    source
                );
                AppError::Transport {
                    url: url.clone(),
                    masked_token: credential.masked_token(),
                    source,
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| AppError::Transport {
            url: url.clone(),
            masked_token: credential.masked_token(),
            source,
        })?;
        if !status.is_success() {
            return Err(AppError::Status {
                url,
                status: status.as_u16(),
                masked_token: credential.masked_token(),
                body: excerpt(&body),
            });
        }

        let output = decode_response(&body, request.shape)?;
        tracing::info!(
            images = output.images.len(),
            text_len = output.text.as_ref().map(String::len).unwrap_or(0),
            finish_reason = ?output.finish_reason,
            "generateContent answered"
        );
        Ok(output)
    }

    /// Download reference images for inlining. Failures are skipped.
    pub async fn fetch_reference_images(&self, urls: &[String], timeout: Duration) -> Vec<InlineImage> {
        let mut images = Vec::with_capacity(urls.len());
        for url in urls {
            match self.fetch_image(url, timeout).await {
                Ok(image) => images.push(image),
                Err(e) => tracing::warn!(url = %url, "skipping reference image: {}", e),
            }
        }
        images
    }

    async fn fetch_image(&self, url: &str, timeout: Duration) -> AppResult<InlineImage> {
        let response = self.client.get(url).timeout(timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Download {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| v.starts_with("image/"))
            .or_else(|| mime_from_extension(url).map(str::to_string))
            .unwrap_or_else(|| "image/png".to_string());
        let data = response.bytes().await?.to_vec();
        Ok(InlineImage { mime_type, data })
    }
}

pub fn build_request(request: &GeminiRequest) -> GenerateContentRequest {
    let mut parts = vec![Part::text(request.prompt.clone())];
    parts.extend(
        request
            .images
            .iter()
            .map(|image| Part::inline(image.mime_type.clone(), STANDARD.encode(&image.data))),
    );

    GenerateContentRequest {
        system_instruction: request
            .system_instruction
            .as_ref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| Content {
                role: None,
                parts: vec![Part::text(s.clone())],
            }),
        contents: vec![Content {
            role: Some("user".into()),
            parts,
        }],
        generation_config: Some(request.shape.generation_config()),
    }
}

/// Scan candidates for inline images and text.
pub fn decode_response(body: &str, shape: OutputShape) -> AppResult<GeminiOutput> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| AppError::Protocol(format!("generateContent body is not valid: {}", e)))?;

    if response.candidates.is_empty() {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "unspecified".into());
        return Err(AppError::Protocol(format!(
            "generateContent returned no candidates (block reason: {})",
            reason
        )));
    }

    let mut output = GeminiOutput::default();
    let mut texts = Vec::new();
    for candidate in response.candidates {
        if output.finish_reason.is_none() {
            output.finish_reason = candidate.finish_reason;
        }
        let Some(content) = candidate.content else { continue };
        for part in content.parts {
            if let Some(inline) = part.inline_data {
                let data = STANDARD
                    .decode(inline.data.as_bytes())
                    .map_err(|e| AppError::Protocol(format!("inline data is not base64: {}", e)))?;
                output.images.push(InlineImage {
                    mime_type: inline.mime_type,
                    data,
                });
            } else if let Some(text) = part.text.filter(|t| !t.trim().is_empty()) {
                texts.push(text);
            }
        }
    }

    if !texts.is_empty() {
        let joined = texts.join("\n");
        output.text = Some(match shape {
            OutputShape::TextResponse => unwrap_text_response(&joined).unwrap_or(joined),
            _ => joined,
        });
    }

    if output.text.is_none() && output.images.is_empty() {
        return Err(AppError::Protocol(format!(
            "generateContent candidate carried no content (finish reason: {})",
            output.finish_reason.as_deref().unwrap_or("unspecified")
        )));
    }
    Ok(output)
}

fn unwrap_text_response(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    value.get(TEXT_RESPONSE_FIELD)?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn request_puts_text_before_inline_images() {
        let request = GeminiRequest {
            system_instruction: Some("be brief".into()),
            prompt: "a lighthouse".into(),
            images: vec![InlineImage {
                mime_type: "image/png".into(),
                data: vec![1, 2, 3],
            }],
            ..Default::default()
        };
        let value = serde_json::to_value(build_request(&request)).unwrap();
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(value["contents"][0]["parts"][0]["text"], "a lighthouse");
        assert_eq!(value["contents"][0]["parts"][1]["inlineData"]["data"], "AQID");
    }

    #[test]
    fn decodes_inline_images_and_text() {
        let body = json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "here you go"},
                    {"inlineData": {"mimeType": "image/png", "data": "AQID"}}
                ]},
                "finishReason": "STOP"
            }]
        })
        .to_string();
        let out = decode_response(&body, OutputShape::Free).unwrap();
        assert_eq!(out.text.as_deref(), Some("here you go"));
        assert_eq!(out.images[0].data, vec![1, 2, 3]);
        assert_eq!(out.finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn text_response_shape_is_unwrapped() {
        let body = json!({
            "candidates": [{"content": {"parts": [{"text": "{\"TEXT_RESPONSE\": \"hello\"}"}]}}]
        })
        .to_string();
        let out = decode_response(&body, OutputShape::TextResponse).unwrap();
        assert_eq!(out.text.as_deref(), Some("hello"));
    }

    #[test]
    fn blocked_prompt_is_a_protocol_error_with_reason() {
        let body = json!({"promptFeedback": {"blockReason": "SAFETY"}}).to_string();
        let err = decode_response(&body, OutputShape::Free).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn empty_candidate_is_a_protocol_error() {
        let body = json!({"candidates": [{"finishReason": "RECITATION"}]}).to_string();
        let err = decode_response(&body, OutputShape::Free).unwrap_err();
        assert!(err.to_string().contains("RECITATION"));
    }
}
