//! Compiles node content, upstream context and parameters into the relay's
//! native prompt syntax: leading image URLs, free text, then `--flag` options.
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::prompt::compat::{self, GatedFlag};
use crate::prompt::params::{
    aspect_ratio_value, GenerationParams, DEFAULT_CHARACTER_WEIGHT, DEFAULT_STYLIZATION,
};
use crate::prompt::reference::{ReferenceBuckets, ReferenceImage};

/// Everything the compiler looks at for one submission.
#[derive(Debug, Clone, Default)]
pub struct PromptInput {
    pub content: String,
    /// Text of upstream nodes, oldest first. Image and video nodes never appear here.
    pub context: Vec<String>,
    pub references: Vec<ReferenceImage>,
    pub params: GenerationParams,
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledPrompt {
    /// The full string sent as `prompt` to the relay.
    pub prompt_text: String,
    pub flags: Vec<String>,
    pub reference_images: Vec<ReferenceImage>,
    /// Flags dropped because the target model rejects them.
    pub omitted_flags: Vec<String>,
    pub mode: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PromptCompiler;

impl PromptCompiler {
    pub fn new() -> Self {
        PromptCompiler
    }

    pub fn compile(&self, input: &PromptInput) -> AppResult<CompiledPrompt> {
        let buckets = ReferenceBuckets::split(&input.references);
        let free_text = free_text(&input.context, &input.content);

        let mut body: Vec<&str> = Vec::new();
        body.extend(buckets.image_prompts.iter().map(|r| r.url.trim()));
        body.extend(buckets.style.iter().map(|r| r.url.trim()));
        if !free_text.is_empty() {
            body.push(&free_text);
        }

        let params = &input.params;
        let version = params.model_version();
        let mut flags = Vec::new();
        let mut omitted_flags = Vec::new();

        if let Some(v) = &version {
            flags.push(v.flag());
        }
        if let Some(ar) = params.aspect_ratio.as_deref() {
            if let Some(ratio) = aspect_ratio_value(ar)? {
                flags.push(format!("--ar {}", ratio));
            }
        }
        if let Some(s) = params.stylization.filter(|s| *s != DEFAULT_STYLIZATION) {
            flags.push(format!("--s {}", s));
        }
        if let Some(w) = params.weirdness.filter(|w| *w > 0) {
            flags.push(format!("--weird {}", w));
        }
        if let Some(c) = params.variety.filter(|c| *c > 0) {
            flags.push(format!("--c {}", c));
        }
        if let Some(speed) = params.speed {
            flags.push(speed.flag().to_string());
        }

        if !buckets.character.is_empty() {
            let urls: Vec<&str> = buckets.character.iter().map(|r| r.url.trim()).collect();
            let cref = format!("{} {}", GatedFlag::CharacterReference.as_str(), urls.join(" "));
            if compat::is_supported(GatedFlag::CharacterReference, version.as_ref()) {
                flags.push(cref);
                if let Some(cw) = params.character_weight.filter(|w| *w != DEFAULT_CHARACTER_WEIGHT) {
                    flags.push(format!("--cw {}", cw));
                }
            } else {
                tracing::warn!(
                    model = params.model.as_deref().unwrap_or_default(),
                    character_refs = urls.len(),
                    "character reference not supported by model version, omitting --cref"
                );
                omitted_flags.push(cref);
            }
        }

        let prompt_text = body
            .into_iter()
            .map(str::to_string)
            .chain(flags.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        if prompt_text.trim().is_empty() {
            return Err(AppError::EmptyPrompt);
        }

        tracing::info!(
            prompt_len = prompt_text.len(),
            image_prompts = buckets.image_prompts.len(),
            style_refs = buckets.style.len(),
            character_refs = buckets.character.len(),
            flags = flags.len(),
            mode = %input.mode,
            "compiled prompt"
        );

        Ok(CompiledPrompt {
            prompt_text,
            flags,
            reference_images: input.references.clone(),
            omitted_flags,
            mode: input.mode.clone(),
        })
    }
}

/// Context paragraphs followed by the node's own content, on one line.
pub fn free_text(context: &[String], content: &str) -> String {
    context
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(content))
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
