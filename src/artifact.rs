//! Generated outputs, as observed from a provider and as stored locally.
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One output reported by a provider, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Identity of the artifact within a folder.
    pub source_url: String,
    pub mime_type: Option<String>,
    pub job_id: String,
    /// Payload returned inline by synchronous providers.
    pub inline_data: Option<Vec<u8>>,
}

impl Artifact {
    pub fn remote(url: impl Into<String>, mime_type: Option<String>, job_id: &str) -> Self {
        Artifact {
            source_url: url.into(),
            mime_type,
            job_id: job_id.to_string(),
            inline_data: None,
        }
    }

    /// Inline artifacts get a synthetic `inline://{job}/{index}` identity.
    pub fn inline(job_id: &str, index: usize, mime_type: String, data: Vec<u8>) -> Self {
        Artifact {
            source_url: format!("inline://{}/{}", job_id, index),
            mime_type: Some(mime_type),
            job_id: job_id.to_string(),
            inline_data: Some(data),
        }
    }

    pub fn is_remote(&self) -> bool {
        let lower = self.source_url.trim_start().to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }
}

/// An artifact that has been written to project storage and registered as an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub source_url: String,
    pub mime_type: String,
    pub local_path: String,
    pub asset_id: String,
    pub job_id: String,
    #[serde(default)]
    pub size: Option<u64>,
    pub stored_at: String,
}

/// Source URL of an entry in a node's `artifacts` metadata list.
///
/// Entries written by older code may carry `url` instead of `source_url`.
pub fn entry_source_url(entry: &Value) -> Option<&str> {
    entry
        .get("source_url")
        .or_else(|| entry.get("url"))
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remote_detection_is_scheme_based() {
        assert!(Artifact::remote("https://x/1.png", None, "j").is_remote());
        assert!(Artifact::remote("HTTP://x/1.png", None, "j").is_remote());
        assert!(!Artifact::remote("jobs/j/1.png", None, "j").is_remote());
        assert!(!Artifact::inline("j", 0, "image/png".into(), vec![1]).is_remote());
    }

    #[test]
    fn entry_url_accepts_legacy_key() {
        assert_eq!(entry_source_url(&json!({"source_url": "a"})), Some("a"));
        assert_eq!(entry_source_url(&json!({"url": "b"})), Some("b"));
        assert_eq!(entry_source_url(&json!({"url": 3})), None);
    }
}
