//! Synchronous multimodal generation.
pub mod client;
pub mod types;

pub use client::{GeminiClient, GeminiOutput, GeminiRequest, InlineImage};
pub use types::OutputShape;
