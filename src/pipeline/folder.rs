//! One output folder per source node, found again through `output_folder_id`.
use std::sync::Arc;

use serde_json::Value;

use crate::error::AppResult;
use crate::store::{meta, GraphStore, Node, Position};

/// Horizontal gap between a source node and its folder.
pub const FOLDER_GAP: f64 = 80.0;

#[derive(Debug, Clone)]
pub struct ResolvedFolder {
    pub folder: Node,
    /// False when an existing folder was reused.
    pub created: bool,
}

#[derive(Clone)]
pub struct FolderResolver {
    store: Arc<dyn GraphStore>,
}

impl FolderResolver {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        FolderResolver { store }
    }

    /// Return the folder collecting `source`'s output, creating it on first use,
    /// and stamp `job_id` onto the source node.
    pub fn resolve(&self, project_id: &str, source: &Node, job_id: &str) -> AppResult<ResolvedFolder> {
        let pointer = source.meta_str(meta::OUTPUT_FOLDER_ID).map(str::to_string);

        if let Some(folder_id) = &pointer {
            if let Some(folder) = self.store.get_node(project_id, folder_id)? {
                self.store.modify_node_metadata(project_id, &source.id, &mut |m| {
                    m.insert(meta::JOB_ID.into(), Value::String(job_id.to_string()));
                })?;
                tracing::debug!(source = %source.id, folder = %folder.id, "reusing output folder");
                return Ok(ResolvedFolder { folder, created: false });
            }
            tracing::warn!(source = %source.id, folder = %folder_id, "output folder pointer is dangling");
        }

        let position = Position {
            x: source.position.x + source.size.width + FOLDER_GAP,
            y: source.position.y,
        };
        let folder = self.store.create_folder_node(project_id, &source.id, position)?;
        self.store.link_nodes(project_id, &source.id, &folder.id)?;

        // Another resolver may have set the pointer since `source` was read.
        let mut winner: Option<String> = None;
        self.store.modify_node_metadata(project_id, &source.id, &mut |m| {
            let current = m
                .get(meta::OUTPUT_FOLDER_ID)
                .and_then(Value::as_str)
                .map(str::to_string);
            match current {
                Some(id) if Some(&id) != pointer.as_ref() && id != folder.id => winner = Some(id),
                _ => {
                    m.insert(meta::OUTPUT_FOLDER_ID.into(), Value::String(folder.id.clone()));
                }
            }
            m.insert(meta::JOB_ID.into(), Value::String(job_id.to_string()));
        })?;

        if let Some(winner_id) = winner {
            if let Some(existing) = self.store.get_node(project_id, &winner_id)? {
                self.store.remove_node(project_id, &folder.id)?;
                tracing::info!(
                    source = %source.id,
                    folder = %existing.id,
                    orphan = %folder.id,
                    "lost folder creation race, adopting existing folder"
                );
                return Ok(ResolvedFolder {
                    folder: existing,
                    created: false,
                });
            }
            self.store.modify_node_metadata(project_id, &source.id, &mut |m| {
                m.insert(meta::OUTPUT_FOLDER_ID.into(), Value::String(folder.id.clone()));
            })?;
        }

        tracing::info!(source = %source.id, folder = %folder.id, "created output folder");
        Ok(ResolvedFolder { folder, created: true })
    }
}
