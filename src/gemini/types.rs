//! Wire types for the `generateContent` endpoint.
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// One part of a content block. Exactly one field is set in practice.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    pub fn inline(mime_type: impl Into<String>, data: String) -> Self {
        Part {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.into(),
                data,
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    /// Standard base64.
    pub data: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

/// Shape the caller wants the text output in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputShape {
    /// Unconstrained; images and text may both come back.
    #[default]
    Free,
    /// JSON object with a single `TEXT_RESPONSE` string.
    TextResponse,
    /// JSON object with a `title` and ordered `steps`.
    Plan,
}

/// Key of the single field in a [`OutputShape::TextResponse`] answer.
pub const TEXT_RESPONSE_FIELD: &str = "TEXT_RESPONSE";

impl OutputShape {
    pub fn generation_config(&self) -> GenerationConfig {
        match self {
            OutputShape::Free => GenerationConfig {
                response_modalities: Some(vec!["TEXT".into(), "IMAGE".into()]),
                ..Default::default()
            },
            OutputShape::TextResponse => GenerationConfig {
                response_mime_type: Some("application/json".into()),
                response_schema: Some(json!({
                    "type": "OBJECT",
                    "properties": { TEXT_RESPONSE_FIELD: { "type": "STRING" } },
                    "required": [TEXT_RESPONSE_FIELD]
                })),
                ..Default::default()
            },
            OutputShape::Plan => GenerationConfig {
                response_mime_type: Some("application/json".into()),
                response_schema: Some(json!({
                    "type": "OBJECT",
                    "properties": {
                        "title": { "type": "STRING" },
                        "steps": { "type": "ARRAY", "items": { "type": "STRING" } }
                    },
                    "required": ["steps"]
                })),
                ..Default::default()
            },
        }
    }
}

impl std::str::FromStr for OutputShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" | "" => Ok(OutputShape::Free),
            "text" | "text_response" => Ok(OutputShape::TextResponse),
            "plan" => Ok(OutputShape::Plan),
            other => Err(format!("unknown output shape '{}'", other)),
        }
    }
}
