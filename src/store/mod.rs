//! Project graph persistence.
//!
//! - `graph`: the [`GraphStore`] trait the pipeline writes through.
//! - `model`: node, edge and asset records.
//! - `redb_store`: embedded single-writer implementation.
pub mod graph;
pub mod model;
pub mod redb_store;

use thiserror::Error;
use uuid::Uuid;

pub use graph::GraphStore;
pub use model::{meta, AssetRecord, Metadata, Node, NodeDraft, NodeKind, Position, Size};
pub use redb_store::RedbGraphStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database: {0}")]
    Database(#[from] redb::DatabaseError),
    #[error("transaction: {0}")]
    Transaction(#[from] redb::TransactionError),
    #[error("table: {0}")]
    Table(#[from] redb::TableError),
    #[error("storage: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("commit: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("corrupt record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Stable id of the asset stored for `source_url` in `node_id`.
pub fn asset_id_for(project_id: &str, node_id: &str, source_url: &str) -> String {
    let name = format!("{}/{}/{}", project_id, node_id, source_url);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

/// RFC 3339 UTC timestamp with millisecond precision.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_ids_are_deterministic_per_folder() {
        let a = asset_id_for("p", "f", "https://x/1.png");
        assert_eq!(a, asset_id_for("p", "f", "https://x/1.png"));
        assert_ne!(a, asset_id_for("p", "g", "https://x/1.png"));
        assert_ne!(a, asset_id_for("p", "f", "https://x/2.png"));
    }
}
