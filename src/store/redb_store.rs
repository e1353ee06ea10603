//! `redb`-backed [`GraphStore`].
//!
//! Records are JSON-encoded byte slices. redb admits a single write
//! transaction at a time, which makes every metadata read-modify-write below
//! atomic with respect to other writers.
use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::graph::GraphStore;
use crate::store::model::{AssetRecord, Metadata, Node, NodeDraft};
use crate::store::{asset_id_for, now_timestamp, StoreError};

// (project_id, node_id) -> Node
const NODES: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("nodes");
// (project_id, from, to) -> ()
const EDGES: TableDefinition<(&str, &str, &str), ()> = TableDefinition::new("edges");
// (project_id, to, from) -> ()
const EDGES_IN: TableDefinition<(&str, &str, &str), ()> = TableDefinition::new("edges_in");
// asset_id -> AssetRecord
const ASSETS: TableDefinition<&str, &[u8]> = TableDefinition::new("assets");

pub struct RedbGraphStore {
    db: Database,
}

impl RedbGraphStore {
    /// Open or create the database file and make sure every table exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref())?;
        let txn = db.begin_write()?;
        {
            txn.open_table(NODES)?;
            txn.open_table(EDGES)?;
            txn.open_table(EDGES_IN)?;
            txn.open_table(ASSETS)?;
        }
        txn.commit()?;
        tracing::debug!(path = %path.as_ref().display(), "graph store opened");
        Ok(RedbGraphStore { db })
    }

    /// All nodes of a project, oldest first.
    pub fn project_nodes(&self, project_id: &str) -> AppResult<Vec<Node>> {
        Ok(self.read_project_nodes(project_id)?)
    }

    fn read_node(&self, project_id: &str, node_id: &str) -> Result<Option<Node>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(NODES)?;
        let node = match table.get((project_id, node_id))? {
            Some(bytes) => Some(serde_json::from_slice(bytes.value())?),
            None => None,
        };
        Ok(node)
    }

    fn read_project_nodes(&self, project_id: &str) -> Result<Vec<Node>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(NODES)?;
        let mut nodes = Vec::new();
        for entry in table.range((project_id, "")..)? {
            let (key, bytes) = entry?;
            let (key_project, _) = key.value();
            if key_project != project_id {
                break;
            }
            nodes.push(serde_json::from_slice::<Node>(bytes.value())?);
        }
        sort_oldest_first(&mut nodes);
        Ok(nodes)
    }

    fn write_node(&self, node: &Node) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec(node)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(NODES)?;
            table.insert((node.project_id.as_str(), node.id.as_str()), encoded.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn delete_node(&self, project_id: &str, node_id: &str) -> Result<bool, StoreError> {
        let txn = self.db.begin_write()?;
        let existed = {
            let mut nodes = txn.open_table(NODES)?;
            let removed = nodes.remove((project_id, node_id))?.is_some();
            removed
        };
        {
            let mut edges = txn.open_table(EDGES)?;
            let mut edges_in = txn.open_table(EDGES_IN)?;
            let outgoing = collect_neighbours(&edges, project_id, node_id)?;
            let incoming = collect_neighbours(&edges_in, project_id, node_id)?;
            for to in &outgoing {
                edges.remove((project_id, node_id, to.as_str()))?;
                edges_in.remove((project_id, to.as_str(), node_id))?;
            }
            for from in &incoming {
                edges.remove((project_id, from.as_str(), node_id))?;
                edges_in.remove((project_id, node_id, from.as_str()))?;
            }
        }
        txn.commit()?;
        Ok(existed)
    }

    fn insert_edge(&self, project_id: &str, from_id: &str, to_id: &str) -> Result<bool, StoreError> {
        let txn = self.db.begin_write()?;
        let linked = {
            let nodes = txn.open_table(NODES)?;
            let both_exist =
                nodes.get((project_id, from_id))?.is_some() && nodes.get((project_id, to_id))?.is_some();
            both_exist
        };
        if linked {
            let mut edges = txn.open_table(EDGES)?;
            edges.insert((project_id, from_id, to_id), ())?;
            let mut edges_in = txn.open_table(EDGES_IN)?;
            edges_in.insert((project_id, to_id, from_id), ())?;
        }
        txn.commit()?;
        Ok(linked)
    }

    fn read_upstream(&self, project_id: &str, node_id: &str) -> Result<Vec<Node>, StoreError> {
        let txn = self.db.begin_read()?;
        let edges_in = txn.open_table(EDGES_IN)?;
        let nodes = txn.open_table(NODES)?;
        let mut upstream = Vec::new();
        for from in collect_neighbours(&edges_in, project_id, node_id)? {
            if let Some(bytes) = nodes.get((project_id, from.as_str()))? {
                upstream.push(serde_json::from_slice::<Node>(bytes.value())?);
            }
        }
        sort_oldest_first(&mut upstream);
        Ok(upstream)
    }

    fn rewrite_metadata(
        &self,
        project_id: &str,
        node_id: &str,
        update: &mut dyn FnMut(&mut Metadata),
    ) -> Result<Option<Metadata>, StoreError> {
        let txn = self.db.begin_write()?;
        let updated = {
            let mut table = txn.open_table(NODES)?;
            let current = match table.get((project_id, node_id))? {
                Some(bytes) => Some(serde_json::from_slice::<Node>(bytes.value())?),
                None => None,
            };
            match current {
                Some(mut node) => {
                    update(&mut node.metadata);
                    let encoded = serde_json::to_vec(&node)?;
                    table.insert((project_id, node_id), encoded.as_slice())?;
                    Some(node.metadata)
                }
                None => None,
            }
        };
        txn.commit()?;
        Ok(updated)
    }

    fn upsert_asset(&self, asset_id: &str, record: &AssetRecord) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec(record)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ASSETS)?;
            table.insert(asset_id, encoded.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn read_asset(&self, asset_id: &str) -> Result<Option<AssetRecord>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ASSETS)?;
        let record = match table.get(asset_id)? {
            Some(bytes) => Some(serde_json::from_slice(bytes.value())?),
            None => None,
        };
        Ok(record)
    }
}

impl GraphStore for RedbGraphStore {
    fn get_node(&self, project_id: &str, node_id: &str) -> AppResult<Option<Node>> {
        Ok(self.read_node(project_id, node_id)?)
    }

    fn create_node(&self, project_id: &str, draft: NodeDraft) -> AppResult<Node> {
        let node = Node {
            id: Uuid::now_v7().to_string(),
            project_id: project_id.to_string(),
            kind: draft.kind,
            content: draft.content,
            position: draft.position,
            size: draft.size,
            metadata: draft.metadata,
            created_at: now_timestamp(),
        };
        self.write_node(&node)?;
        tracing::debug!(project_id, node_id = %node.id, kind = ?node.kind, "node created");
        Ok(node)
    }

    fn remove_node(&self, project_id: &str, node_id: &str) -> AppResult<bool> {
        Ok(self.delete_node(project_id, node_id)?)
    }

    fn link_nodes(&self, project_id: &str, from_id: &str, to_id: &str) -> AppResult<()> {
        if self.insert_edge(project_id, from_id, to_id)? {
            Ok(())
        } else if self.read_node(project_id, from_id)?.is_none() {
            Err(AppError::node_not_found(project_id, from_id))
        } else {
            Err(AppError::node_not_found(project_id, to_id))
        }
    }

    fn upstream_nodes(&self, project_id: &str, node_id: &str) -> AppResult<Vec<Node>> {
        Ok(self.read_upstream(project_id, node_id)?)
    }

    fn update_node_metadata(&self, project_id: &str, node_id: &str, metadata: Metadata) -> AppResult<()> {
        let mut replacement = Some(metadata);
        self.modify_node_metadata(project_id, node_id, &mut |current| {
            if let Some(m) = replacement.take() {
                *current = m;
            }
        })?;
        Ok(())
    }

    fn modify_node_metadata(
        &self,
        project_id: &str,
        node_id: &str,
        update: &mut dyn FnMut(&mut Metadata),
    ) -> AppResult<Metadata> {
        self.rewrite_metadata(project_id, node_id, update)?
            .ok_or_else(|| AppError::node_not_found(project_id, node_id))
    }

    fn register_asset(&self, record: &AssetRecord) -> AppResult<String> {
        let asset_id = asset_id_for(&record.project_id, &record.node_id, &record.source_url);
        self.upsert_asset(&asset_id, record)?;
        tracing::debug!(asset_id = %asset_id, path = %record.relative_path, "asset registered");
        Ok(asset_id)
    }

    fn get_asset(&self, asset_id: &str) -> AppResult<Option<AssetRecord>> {
        Ok(self.read_asset(asset_id)?)
    }
}

fn collect_neighbours<T>(table: &T, project_id: &str, node_id: &str) -> Result<Vec<String>, StoreError>
where
    T: ReadableTable<(&'static str, &'static str, &'static str), ()>,
{
    let mut out = Vec::new();
    for entry in table.range((project_id, node_id, "")..)? {
        let (key, _) = entry?;
        let (key_project, key_node, other) = key.value();
        if key_project != project_id || key_node != node_id {
            break;
        }
        out.push(other.to_string());
    }
    Ok(out)
}

// Node ids are UUIDv7, so id order is creation order.
fn sort_oldest_first(nodes: &mut [Node]) {
    nodes.sort_by(|a, b| a.id.cmp(&b.id));
}
