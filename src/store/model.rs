//! Graph records persisted by the store.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Metadata = Map<String, Value>;

/// Metadata keys shared between the pipeline and the surrounding graph UI.
pub mod meta {
    /// On a source node: id of the folder holding its generated artifacts.
    pub const OUTPUT_FOLDER_ID: &str = "output_folder_id";
    /// On a folder node: id of the node that generated into it.
    pub const SOURCE_NODE_ID: &str = "source_node_id";
    pub const JOB_ID: &str = "job_id";
    pub const JOB_STATUS: &str = "job_status";
    pub const JOB_PROGRESS: &str = "job_progress";
    pub const JOB_ERROR: &str = "job_error";
    pub const ARTIFACTS: &str = "artifacts";
    pub const UPDATED_AT: &str = "updated_at";
    pub const LAST_GENERATED_AT: &str = "last_generated_at";
    pub const LAST_PROMPT: &str = "last_prompt";
    pub const TEXT_OUTPUT: &str = "text_output";
    /// Parameter bag read by the prompt compiler.
    pub const GENERATION: &str = "generation";
    /// Files attached to a node: `[{ "url": .., "purpose": .. }]`.
    pub const ATTACHMENTS: &str = "attachments";
    /// On an image node: how it should be used as a reference.
    pub const REFERENCE_PURPOSE: &str = "reference_purpose";
    pub const URL: &str = "url";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Text,
    /// A node that triggers generation; its content is the prompt.
    Generator,
    Image,
    Video,
    File,
    Folder,
}

impl NodeKind {
    /// Whether the node's content is descriptive text usable as prompt context.
    /// Image and video nodes hold URLs, not prose.
    pub fn contributes_text(&self) -> bool {
        matches!(self, NodeKind::Text | NodeKind::Generator)
    }
}

impl std::str::FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(NodeKind::Text),
            "generator" => Ok(NodeKind::Generator),
            "image" => Ok(NodeKind::Image),
            "video" => Ok(NodeKind::Video),
            "file" => Ok(NodeKind::File),
            "folder" => Ok(NodeKind::Folder),
            other => Err(format!("unknown node kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const DEFAULT_NODE: Size = Size { width: 320.0, height: 240.0 };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub project_id: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub content: String,
    pub position: Position,
    pub size: Size,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: String,
}

impl Node {
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Fields supplied by a caller creating a node; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NodeDraft {
    pub kind: NodeKind,
    pub content: String,
    pub position: Position,
    pub size: Size,
    pub metadata: Metadata,
}

impl NodeDraft {
    pub fn new(kind: NodeKind, content: impl Into<String>) -> Self {
        NodeDraft {
            kind,
            content: content.into(),
            position: Position { x: 0.0, y: 0.0 },
            size: Size::DEFAULT_NODE,
            metadata: Metadata::new(),
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// An asset registered for a file in project storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub project_id: String,
    pub node_id: String,
    pub relative_path: String,
    pub mime_type: String,
    pub size: Option<u64>,
    pub job_id: String,
    pub source_url: String,
}
