//! Generative job orchestration library
//!
//! Modules:
//! - `prompt`: Compiles node content, context and parameters into relay prompts.
//! - `relay`: Submits and polls jobs on the asynchronous image relay.
//! - `gemini`: Synchronous multimodal generation.
//! - `pipeline`: Folder resolution, artifact persistence and the node-level service.
//! - `store`: Project graph persisted in `redb`.
//! - `storage`: Project-scoped artifact files.
//! - `credentials`: Provider credentials and the resolver seam.
//! - `utils`: CLI parameter helpers.
//! - `config`: Env-driven configuration loader.
//! - `error`: Common error type and alias.
//!
//! Re-exports are provided for common types: `Config`, `GenerationService`,
//! `PromptCompiler`, `RedbGraphStore` and `LocalProjectStorage`.
pub mod artifact;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gemini;
pub mod job;
pub mod pipeline;
pub mod prompt;
pub mod relay;
pub mod storage;
pub mod store;
pub mod utils;

pub use config::Config;
pub use pipeline::GenerationService;
pub use prompt::PromptCompiler;
pub use storage::LocalProjectStorage;
pub use store::RedbGraphStore;
