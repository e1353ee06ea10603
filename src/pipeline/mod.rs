//! Orchestration from graph node to stored artifacts.
//!
//! - `context`: upstream text and reference images for a node.
//! - `folder`: the per-source output folder.
//! - `persister`: download, dedup and merge of artifacts.
//! - `service`: the operations a caller drives.
pub mod context;
pub mod folder;
pub mod persister;
pub mod service;

pub use context::{gather_context, GatheredContext};
pub use folder::{FolderResolver, ResolvedFolder};
pub use persister::{ArtifactPersister, PersistFailure, PersistReport};
pub use service::{GenerationService, PollOutcome, SubmitOutcome, SyncOptions, SyncOutcome};
