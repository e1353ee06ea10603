//! Stores artifacts into project storage and merges them into a folder node.
//!
//! Identity is the source URL: an artifact whose URL the folder already lists
//! is skipped, whether it shows up again in the same batch, a later poll, or a
//! concurrent one. Stored files and asset ids are derived from the URL too, so
//! a writer that loses the race leaves nothing behind.
use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::artifact::{entry_source_url, Artifact, StoredArtifact};
use crate::error::{AppError, AppResult, ErrorKind};
use crate::storage::ProjectStorage;
use crate::store::{meta, now_timestamp, AssetRecord, GraphStore, Metadata, StoreError};

const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistFailure {
    pub source_url: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PersistReport {
    /// Artifacts appended to the folder by this call, in input order.
    pub stored: Vec<StoredArtifact>,
    pub skipped_duplicates: usize,
    pub failed: Vec<PersistFailure>,
    /// The folder's full artifact list after the merge.
    pub artifacts: Vec<Value>,
}

#[derive(Clone)]
pub struct ArtifactPersister {
    store: Arc<dyn GraphStore>,
    storage: Arc<dyn ProjectStorage>,
}

impl ArtifactPersister {
    pub fn new(store: Arc<dyn GraphStore>, storage: Arc<dyn ProjectStorage>) -> Self {
        ArtifactPersister { store, storage }
    }

    pub async fn persist(
        &self,
        project_id: &str,
        folder_id: &str,
        source_node_id: &str,
        job_id: &str,
        artifacts: &[Artifact],
    ) -> AppResult<PersistReport> {
        let folder = self
            .store
            .get_node(project_id, folder_id)?
            .ok_or_else(|| AppError::node_not_found(project_id, folder_id))?;
        let mut known = known_urls(&folder.metadata);
        let mut report = PersistReport::default();
        let mut fresh = Vec::new();

        for artifact in artifacts {
            let url = artifact.source_url.trim();
            if url.is_empty() {
                continue;
            }
            if !known.insert(url.to_string()) {
                report.skipped_duplicates += 1;
                continue;
            }
            match self.store_one(project_id, folder_id, job_id, artifact).await {
                Ok(stored) => fresh.push(stored),
                Err(e) => {
                    tracing::warn!(
                        folder = folder_id,
                        job_id,
                        url,
                        "artifact skipped: {}",
                        e
                    );
                    report.failed.push(PersistFailure {
                        source_url: url.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if fresh.is_empty() {
            report.artifacts = artifact_list(&folder.metadata);
            return Ok(report);
        }

        let mut entries = Vec::with_capacity(fresh.len());
        for stored in &fresh {
            let value = serde_json::to_value(stored).map_err(StoreError::from)?;
            entries.push((stored.source_url.clone(), value));
        }

        let stamp = now_timestamp();
        let mut appended: HashSet<String> = HashSet::new();
        let merged = self.store.modify_node_metadata(project_id, folder_id, &mut |m| {
            // Re-check against what is committed now, not what was read above.
            let mut list = artifact_list(m);
            let mut present = urls_of(&list);
            appended.clear();
            for (url, value) in &entries {
                if present.insert(url.clone()) {
                    list.push(value.clone());
                    appended.insert(url.clone());
                }
            }
            m.insert(meta::ARTIFACTS.into(), Value::Array(list));
            m.insert(meta::UPDATED_AT.into(), Value::String(stamp.clone()));
        })?;
        report.artifacts = artifact_list(&merged);

        let raced = fresh.len() - appended.len();
        report.skipped_duplicates += raced;
        report.stored = fresh
            .into_iter()
            .filter(|s| appended.contains(&s.source_url))
            .collect();

        // Entries mirrored by an interleaved writer are kept.
        let merged_entries = &report.artifacts;
        let mirror = self.store.modify_node_metadata(project_id, source_node_id, &mut |m| {
            let mut list = artifact_list(m);
            let mut present = urls_of(&list);
            for entry in merged_entries {
                if let Some(url) = entry_source_url(entry) {
                    if present.insert(url.to_string()) {
                        list.push(entry.clone());
                    }
                }
            }
            m.insert(meta::ARTIFACTS.into(), Value::Array(list));
            m.insert(meta::LAST_GENERATED_AT.into(), Value::String(stamp.clone()));
        });
        match mirror {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(source = source_node_id, "source node vanished, artifacts not mirrored");
            }
            Err(e) => return Err(e),
        }

        tracing::info!(
            folder = folder_id,
            job_id,
            stored = report.stored.len(),
            duplicates = report.skipped_duplicates,
            failed = report.failed.len(),
            total = report.artifacts.len(),
            "artifacts persisted"
        );
        Ok(report)
    }

    async fn store_one(
        &self,
        project_id: &str,
        folder_id: &str,
        job_id: &str,
        artifact: &Artifact,
    ) -> AppResult<StoredArtifact> {
        let job_id = if artifact.job_id.trim().is_empty() {
            job_id
        } else {
            artifact.job_id.as_str()
        };
        let url = artifact.source_url.trim();

        // Provider-supplied paths and data URIs never name a storage location.
        let file = if let Some(data) = &artifact.inline_data {
            let mime = artifact.mime_type.as_deref().unwrap_or(FALLBACK_MIME);
            self.storage
                .write_to_project_storage(project_id, url, job_id, data, mime)
                .await?
        } else if artifact.is_remote() {
            self.storage
                .download_to_project_storage(project_id, url, job_id)
                .await?
        } else {
            return Err(AppError::Protocol(format!(
                "artifact source '{}' is neither an http(s) URL nor inline data",
                url
            )));
        };
        let (local_path, mime_type, size) = (file.relative_path, file.mime_type, Some(file.size));

        let asset_id = self.store.register_asset(&AssetRecord {
            project_id: project_id.to_string(),
            node_id: folder_id.to_string(),
            relative_path: local_path.clone(),
            mime_type: mime_type.clone(),
            size,
            job_id: job_id.to_string(),
            source_url: url.to_string(),
        })?;

        Ok(StoredArtifact {
            source_url: url.to_string(),
            mime_type,
            local_path,
            asset_id,
            job_id: job_id.to_string(),
            size,
            stored_at: now_timestamp(),
        })
    }
}

fn artifact_list(metadata: &Metadata) -> Vec<Value> {
    metadata
        .get(meta::ARTIFACTS)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn urls_of(list: &[Value]) -> HashSet<String> {
    list.iter()
        .filter_map(entry_source_url)
        .map(str::to_string)
        .collect()
}

fn known_urls(metadata: &Metadata) -> HashSet<String> {
    urls_of(&artifact_list(metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoredFile;
    use crate::store::{Node, NodeDraft, NodeKind, Position, RedbGraphStore};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records calls and fails for URLs containing "broken".
    #[derive(Default)]
    struct FakeStorage {
        downloads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ProjectStorage for FakeStorage {
        async fn download_to_project_storage(
            &self,
            _project_id: &str,
            url: &str,
            subdir: &str,
        ) -> AppResult<StoredFile> {
            if url.contains("broken") {
                return Err(AppError::Download {
                    url: url.to_string(),
                    status: 404,
                });
            }
            self.downloads.lock().unwrap().push(url.to_string());
            Ok(StoredFile {
                relative_path: format!("{}/{}", subdir, url.rsplit('/').next().unwrap()),
                mime_type: "image/png".into(),
                size: 3,
            })
        }

        async fn write_to_project_storage(
            &self,
            _project_id: &str,
            _source_key: &str,
            subdir: &str,
            bytes: &[u8],
            mime_type: &str,
        ) -> AppResult<StoredFile> {
            Ok(StoredFile {
                relative_path: format!("{}/inline.bin", subdir),
                mime_type: mime_type.to_string(),
                size: bytes.len() as u64,
            })
        }
    }

    type Hook = Box<dyn FnOnce(&RedbGraphStore) + Send>;

    /// Runs `hook` against the inner store right before the first metadata
    /// write to `target`, standing in for a concurrent writer.
    struct Interleaved {
        inner: Arc<RedbGraphStore>,
        target: String,
        hook: Mutex<Option<Hook>>,
    }

    impl Interleaved {
        fn new(
            inner: Arc<RedbGraphStore>,
            target: &str,
            hook: impl FnOnce(&RedbGraphStore) + Send + 'static,
        ) -> Self {
            Interleaved {
                inner,
                target: target.to_string(),
                hook: Mutex::new(Some(Box::new(hook))),
            }
        }
    }

    impl GraphStore for Interleaved {
        fn get_node(&self, project_id: &str, node_id: &str) -> AppResult<Option<Node>> {
            self.inner.get_node(project_id, node_id)
        }

        fn create_node(&self, project_id: &str, draft: NodeDraft) -> AppResult<Node> {
            self.inner.create_node(project_id, draft)
        }

        fn remove_node(&self, project_id: &str, node_id: &str) -> AppResult<bool> {
            self.inner.remove_node(project_id, node_id)
        }

        fn link_nodes(&self, project_id: &str, from_id: &str, to_id: &str) -> AppResult<()> {
            self.inner.link_nodes(project_id, from_id, to_id)
        }

        fn upstream_nodes(&self, project_id: &str, node_id: &str) -> AppResult<Vec<Node>> {
            self.inner.upstream_nodes(project_id, node_id)
        }

        fn update_node_metadata(&self, project_id: &str, node_id: &str, metadata: Metadata) -> AppResult<()> {
            self.inner.update_node_metadata(project_id, node_id, metadata)
        }

        fn modify_node_metadata(
            &self,
            project_id: &str,
            node_id: &str,
            update: &mut dyn FnMut(&mut Metadata),
        ) -> AppResult<Metadata> {
            if node_id == self.target {
                let hook = self.hook.lock().unwrap().take();
                if let Some(hook) = hook {
                    hook(&self.inner);
                }
            }
            self.inner.modify_node_metadata(project_id, node_id, update)
        }

        fn register_asset(&self, record: &AssetRecord) -> AppResult<String> {
            self.inner.register_asset(record)
        }

        fn get_asset(&self, asset_id: &str) -> AppResult<Option<AssetRecord>> {
            self.inner.get_asset(asset_id)
        }
    }

    fn entry(url: &str) -> Value {
        serde_json::to_value(StoredArtifact {
            source_url: url.to_string(),
            mime_type: "image/png".into(),
            local_path: format!("other/{}", url.rsplit('/').next().unwrap()),
            asset_id: "other".into(),
            job_id: "other".into(),
            size: Some(3),
            stored_at: now_timestamp(),
        })
        .unwrap()
    }

    fn urls_in(metadata: &Metadata) -> Vec<String> {
        artifact_list(metadata)
            .iter()
            .filter_map(entry_source_url)
            .map(str::to_string)
            .collect()
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<RedbGraphStore>,
        storage: Arc<FakeStorage>,
        persister: ArtifactPersister,
        source_id: String,
        folder_id: String,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RedbGraphStore::open(dir.path().join("graph.redb")).unwrap());
        let storage = Arc::new(FakeStorage::default());
        let source = store.create_node("p", NodeDraft::new(NodeKind::Generator, "fox")).unwrap();
        let folder = store
            .create_folder_node("p", &source.id, Position { x: 400.0, y: 0.0 })
            .unwrap();
        let persister = ArtifactPersister::new(store.clone(), storage.clone());
        Fixture {
            _dir: dir,
            store,
            storage,
            persister,
            source_id: source.id,
            folder_id: folder.id,
        }
    }

    #[tokio::test]
    async fn duplicate_urls_are_stored_once_across_calls() {
        let f = fixture();
        let batch = vec![
            Artifact::remote("https://x/1.png", None, "j1"),
            Artifact::remote("https://x/1.png", None, "j1"),
        ];
        let first = f.persister.persist("p", &f.folder_id, &f.source_id, "j1", &batch).await.unwrap();
        assert_eq!(first.stored.len(), 1);
        assert_eq!(first.skipped_duplicates, 1);

        let second = f.persister.persist("p", &f.folder_id, &f.source_id, "j1", &batch).await.unwrap();
        assert!(second.stored.is_empty());
        assert_eq!(second.skipped_duplicates, 2);
        assert_eq!(second.artifacts.len(), 1);
        assert_eq!(f.storage.downloads.lock().unwrap().len(), 1);

        let folder = f.store.get_node("p", &f.folder_id).unwrap().unwrap();
        assert_eq!(folder.metadata[meta::ARTIFACTS].as_array().unwrap().len(), 1);
        assert!(folder.metadata.contains_key(meta::UPDATED_AT));
    }

    #[tokio::test]
    async fn one_failed_download_does_not_block_the_rest() {
        let f = fixture();
        let batch = vec![
            Artifact::remote("https://x/broken.png", None, "j1"),
            Artifact::remote("https://x/2.png", None, "j1"),
        ];
        let report = f.persister.persist("p", &f.folder_id, &f.source_id, "j1", &batch).await.unwrap();
        assert_eq!(report.stored.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].source_url, "https://x/broken.png");
        assert_eq!(report.stored[0].local_path, "j1/2.png");
    }

    #[tokio::test]
    async fn merged_list_is_mirrored_onto_source_in_order() {
        let f = fixture();
        f.persister
            .persist("p", &f.folder_id, &f.source_id, "j1", &[Artifact::remote("https://x/a.png", None, "j1")])
            .await
            .unwrap();
        f.persister
            .persist(
                "p",
                &f.folder_id,
                &f.source_id,
                "j2",
                &[
                    Artifact::inline("j2", 0, "image/webp".into(), vec![1, 2]),
                    Artifact::remote("https://x/c.png", None, "j2"),
                ],
            )
            .await
            .unwrap();

        let source = f.store.get_node("p", &f.source_id).unwrap().unwrap();
        assert_eq!(urls_in(&source.metadata), vec!["https://x/a.png", "inline://j2/0", "https://x/c.png"]);
        assert!(source.metadata.contains_key(meta::LAST_GENERATED_AT));

        let entries = source.metadata[meta::ARTIFACTS].as_array().unwrap();
        let inline: StoredArtifact = serde_json::from_value(entries[1].clone()).unwrap();
        assert_eq!(inline.mime_type, "image/webp");
        assert_eq!(inline.size, Some(2));
        let asset = f.store.get_asset(&inline.asset_id).unwrap().unwrap();
        assert_eq!(asset.node_id, f.folder_id);
        assert_eq!(asset.job_id, "j2");
    }

    #[tokio::test]
    async fn paths_and_data_uris_from_a_poll_are_refused() {
        let f = fixture();
        let poll = crate::relay::decode::decode_poll(
            "j1",
            r#"{"status": "completed", "artifacts": [
                {"url": "../../../../etc/passwd"},
                {"url": "data:image/png;base64,AAAA"},
                {"url": "https://x/ok.png"}
            ]}"#,
        )
        .unwrap();
        let report = f
            .persister
            .persist("p", &f.folder_id, &f.source_id, "j1", &poll.artifacts)
            .await
            .unwrap();

        let refused: Vec<&str> = report.failed.iter().map(|e| e.source_url.as_str()).collect();
        assert_eq!(refused, vec!["../../../../etc/passwd", "data:image/png;base64,AAAA"]);
        assert_eq!(report.stored.len(), 1);
        assert_eq!(report.stored[0].local_path, "j1/ok.png");
        let folder = f.store.get_node("p", &f.folder_id).unwrap().unwrap();
        assert_eq!(urls_in(&folder.metadata), vec!["https://x/ok.png"]);
    }

    #[tokio::test]
    async fn mirror_keeps_entries_of_an_interleaved_writer() {
        let f = fixture();
        let (folder_id, source_id) = (f.folder_id.clone(), f.source_id.clone());
        let a = entry("https://x/a.png");
        let b = entry("https://x/b.png");
        // Writer B merges b and mirrors [a, b] just before A's mirror lands.
        let store = Interleaved::new(f.store.clone(), &f.source_id, move |inner| {
            inner
                .modify_node_metadata("p", &folder_id, &mut |m| {
                    m.get_mut(meta::ARTIFACTS).and_then(Value::as_array_mut).unwrap().push(b.clone());
                })
                .unwrap();
            inner
                .modify_node_metadata("p", &source_id, &mut |m| {
                    m.insert(meta::ARTIFACTS.into(), Value::Array(vec![a.clone(), b.clone()]));
                })
                .unwrap();
        });
        let persister = ArtifactPersister::new(Arc::new(store), f.storage.clone());

        persister
            .persist("p", &f.folder_id, &f.source_id, "j1", &[Artifact::remote("https://x/a.png", None, "j1")])
            .await
            .unwrap();

        let folder = f.store.get_node("p", &f.folder_id).unwrap().unwrap();
        let source = f.store.get_node("p", &f.source_id).unwrap().unwrap();
        assert_eq!(urls_in(&folder.metadata), vec!["https://x/a.png", "https://x/b.png"]);
        assert_eq!(urls_in(&source.metadata), urls_in(&folder.metadata));
    }

    #[tokio::test]
    async fn url_committed_during_download_is_not_appended_twice() {
        let f = fixture();
        let folder_id = f.folder_id.clone();
        let committed = entry("https://x/a.png");
        // A concurrent poll commits the same URL between the first read and the merge.
        let store = Interleaved::new(f.store.clone(), &f.folder_id, move |inner| {
            inner
                .modify_node_metadata("p", &folder_id, &mut |m| {
                    m.get_mut(meta::ARTIFACTS)
                        .and_then(Value::as_array_mut)
                        .unwrap()
                        .push(committed.clone());
                })
                .unwrap();
        });
        let persister = ArtifactPersister::new(Arc::new(store), f.storage.clone());

        let report = persister
            .persist("p", &f.folder_id, &f.source_id, "j1", &[Artifact::remote("https://x/a.png", None, "j1")])
            .await
            .unwrap();
        assert!(report.stored.is_empty());
        assert_eq!(report.skipped_duplicates, 1);
        assert_eq!(report.artifacts.len(), 1);

        let folder = f.store.get_node("p", &f.folder_id).unwrap().unwrap();
        assert_eq!(urls_in(&folder.metadata), vec!["https://x/a.png"]);
    }

    #[tokio::test]
    async fn missing_folder_is_not_found() {
        let f = fixture();
        let err = f
            .persister
            .persist("p", "ghost", &f.source_id, "j1", &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
