//! Reference images attached to a generation and their purpose buckets.
use serde::{Deserialize, Serialize};

/// What a reference image is used for by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePurpose {
    /// Visual anchor placed in front of the prompt text.
    #[default]
    ImagePrompt,
    StyleReference,
    CharacterReference,
}

impl ReferencePurpose {
    /// Map a free-form purpose tag onto a bucket.
    ///
    /// Unset, `reference`, `image` and anything unrecognised land in
    /// [`ReferencePurpose::ImagePrompt`].
    pub fn classify(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return ReferencePurpose::ImagePrompt;
        };
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "style_reference" | "style" | "sref" => ReferencePurpose::StyleReference,
            "character_reference" | "character" | "cref" => ReferencePurpose::CharacterReference,
            "" | "image_prompt" | "reference" | "image" => ReferencePurpose::ImagePrompt,
            other => {
                tracing::debug!(purpose = other, "unknown reference purpose, treating as image prompt");
                ReferencePurpose::ImagePrompt
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferencePurpose::ImagePrompt => "image_prompt",
            ReferencePurpose::StyleReference => "style_reference",
            ReferencePurpose::CharacterReference => "character_reference",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceImage {
    pub url: String,
    pub purpose: ReferencePurpose,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_node_id: Option<String>,
}

impl ReferenceImage {
    pub fn new(url: impl Into<String>, purpose: ReferencePurpose) -> Self {
        ReferenceImage {
            url: url.into(),
            purpose,
            source_node_id: None,
        }
    }

    pub fn from_node(url: impl Into<String>, purpose: ReferencePurpose, node_id: &str) -> Self {
        ReferenceImage {
            url: url.into(),
            purpose,
            source_node_id: Some(node_id.to_string()),
        }
    }
}

/// References split by purpose, each bucket keeping input order.
#[derive(Debug, Default)]
pub struct ReferenceBuckets<'a> {
    pub image_prompts: Vec<&'a ReferenceImage>,
    pub style: Vec<&'a ReferenceImage>,
    pub character: Vec<&'a ReferenceImage>,
}

impl<'a> ReferenceBuckets<'a> {
    pub fn split(refs: &'a [ReferenceImage]) -> Self {
        let mut buckets = ReferenceBuckets::default();
        for r in refs.iter().filter(|r| !r.url.trim().is_empty()) {
            match r.purpose {
                ReferencePurpose::ImagePrompt => buckets.image_prompts.push(r),
                ReferencePurpose::StyleReference => buckets.style.push(r),
                ReferencePurpose::CharacterReference => buckets.character.push(r),
            }
        }
        buckets
    }
}
