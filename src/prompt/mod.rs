//! Prompt compilation for the image relay.
pub mod compat;
pub mod compiler;
pub mod params;
pub mod reference;

pub use compiler::{CompiledPrompt, PromptCompiler, PromptInput};
pub use params::{GenerationParams, ModelVersion, Speed};
pub use reference::{ReferenceImage, ReferencePurpose};
