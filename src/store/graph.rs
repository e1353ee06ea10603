//! The graph interface the pipeline writes through.
use serde_json::Value;

use crate::error::AppResult;
use crate::store::model::{meta, AssetRecord, Metadata, Node, NodeDraft, NodeKind, Position};

/// Nodes, edges, per-node metadata and the asset registry of a project graph.
///
/// [`GraphStore::modify_node_metadata`] is the pipeline's critical section:
/// implementations must run the read, the update and the write inside one
/// transaction so concurrent writers cannot lose each other's changes.
pub trait GraphStore: Send + Sync {
    fn get_node(&self, project_id: &str, node_id: &str) -> AppResult<Option<Node>>;

    fn create_node(&self, project_id: &str, draft: NodeDraft) -> AppResult<Node>;

    /// Create an empty folder node that will collect artifacts generated by
    /// `source_node_id`.
    fn create_folder_node(
        &self,
        project_id: &str,
        source_node_id: &str,
        position: Position,
    ) -> AppResult<Node> {
        let mut metadata = Metadata::new();
        metadata.insert(meta::SOURCE_NODE_ID.into(), Value::String(source_node_id.to_string()));
        metadata.insert(meta::ARTIFACTS.into(), Value::Array(Vec::new()));
        let draft = NodeDraft::new(NodeKind::Folder, "")
            .at(position)
            .with_metadata(metadata);
        self.create_node(project_id, draft)
    }

    /// Delete a node and every edge touching it. Returns false if it did not exist.
    fn remove_node(&self, project_id: &str, node_id: &str) -> AppResult<bool>;

    /// Add a directed edge. Linking the same pair twice is a no-op.
    fn link_nodes(&self, project_id: &str, from_id: &str, to_id: &str) -> AppResult<()>;

    /// Nodes with an edge into `node_id`, oldest first.
    fn upstream_nodes(&self, project_id: &str, node_id: &str) -> AppResult<Vec<Node>>;

    /// Replace a node's metadata wholesale.
    fn update_node_metadata(&self, project_id: &str, node_id: &str, metadata: Metadata) -> AppResult<()>;

    /// Read-modify-write a node's metadata in one transaction and return the result.
    fn modify_node_metadata(
        &self,
        project_id: &str,
        node_id: &str,
        update: &mut dyn FnMut(&mut Metadata),
    ) -> AppResult<Metadata>;

    /// Upsert an asset and return its id. The id is derived from project,
    /// node and source URL, so registering the same artifact twice is idempotent.
    fn register_asset(&self, record: &AssetRecord) -> AppResult<String>;

    fn get_asset(&self, asset_id: &str) -> AppResult<Option<AssetRecord>>;
}
