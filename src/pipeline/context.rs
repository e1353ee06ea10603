//! Collects prompt context for a node from its upstream neighbours.
use serde_json::Value;

use crate::error::AppResult;
use crate::prompt::{ReferenceImage, ReferencePurpose};
use crate::store::{meta, GraphStore, Node, NodeKind};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatheredContext {
    /// Upstream text, oldest node first.
    pub texts: Vec<String>,
    pub references: Vec<ReferenceImage>,
}

impl GatheredContext {
    pub fn reference_urls(&self) -> Vec<String> {
        self.references.iter().map(|r| r.url.clone()).collect()
    }
}

/// Walk the incoming edges of `node`.
///
/// Text and generator nodes add their content. Image nodes add a reference
/// image; their content is a URL and never reaches the text context. The
/// node's own `attachments` come last.
pub fn gather_context(store: &dyn GraphStore, project_id: &str, node: &Node) -> AppResult<GatheredContext> {
    let mut context = GatheredContext::default();

    for upstream in store.upstream_nodes(project_id, &node.id)? {
        match upstream.kind {
            kind if kind.contributes_text() => {
                let text = upstream.content.trim();
                if !text.is_empty() {
                    context.texts.push(text.to_string());
                }
            }
            NodeKind::Image => {
                let url = upstream
                    .meta_str(meta::URL)
                    .map(str::to_string)
                    .unwrap_or_else(|| upstream.content.trim().to_string());
                if url.is_empty() {
                    continue;
                }
                let purpose = ReferencePurpose::classify(upstream.meta_str(meta::REFERENCE_PURPOSE));
                context
                    .references
                    .push(ReferenceImage::from_node(url, purpose, &upstream.id));
            }
            _ => {}
        }
    }

    if let Some(Value::Array(entries)) = node.metadata.get(meta::ATTACHMENTS) {
        context.references.extend(entries.iter().filter_map(attachment_reference));
    }

    tracing::debug!(
        node_id = %node.id,
        texts = context.texts.len(),
        references = context.references.len(),
        "context gathered"
    );
    Ok(context)
}

fn attachment_reference(entry: &Value) -> Option<ReferenceImage> {
    let (url, purpose) = match entry {
        Value::String(url) => (url.as_str(), None),
        Value::Object(map) => (
            map.get(meta::URL).and_then(Value::as_str)?,
            map.get("purpose").and_then(Value::as_str),
        ),
        _ => return None,
    };
    let url = url.trim();
    (!url.is_empty()).then(|| ReferenceImage::new(url, ReferencePurpose::classify(purpose)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Metadata, NodeDraft, RedbGraphStore};
    use serde_json::json;

    fn store() -> (tempfile::TempDir, RedbGraphStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbGraphStore::open(dir.path().join("graph.redb")).unwrap();
        (dir, store)
    }

    #[test]
    fn image_content_never_reaches_text_context() {
        let (_dir, store) = store();
        let text = store.create_node("p", NodeDraft::new(NodeKind::Text, "misty forest")).unwrap();
        let mut image_meta = Metadata::new();
        image_meta.insert(meta::REFERENCE_PURPOSE.into(), json!("style_reference"));
        let image = store
            .create_node(
                "p",
                NodeDraft::new(NodeKind::Image, "https://x/style.png").with_metadata(image_meta),
            )
            .unwrap();
        let video = store.create_node("p", NodeDraft::new(NodeKind::Video, "https://x/v.mp4")).unwrap();
        let gen = store.create_node("p", NodeDraft::new(NodeKind::Generator, "a deer")).unwrap();
        for from in [&text, &image, &video] {
            store.link_nodes("p", &from.id, &gen.id).unwrap();
        }

        let ctx = gather_context(&store, "p", &gen).unwrap();
        assert_eq!(ctx.texts, vec!["misty forest".to_string()]);
        assert_eq!(ctx.references.len(), 1);
        assert_eq!(ctx.references[0].purpose, ReferencePurpose::StyleReference);
        assert_eq!(ctx.references[0].source_node_id.as_deref(), Some(image.id.as_str()));
    }

    #[test]
    fn attachments_follow_upstream_references() {
        let (_dir, store) = store();
        let mut metadata = Metadata::new();
        metadata.insert(
            meta::ATTACHMENTS.into(),
            json!([
                {"url": "https://x/hero.png", "purpose": "character_reference"},
                "https://x/plain.png",
                {"purpose": "style"},
                42
            ]),
        );
        let gen = store
            .create_node("p", NodeDraft::new(NodeKind::Generator, "hero").with_metadata(metadata))
            .unwrap();
        let ctx = gather_context(&store, "p", &gen).unwrap();
        assert_eq!(
            ctx.reference_urls(),
            vec!["https://x/hero.png".to_string(), "https://x/plain.png".to_string()]
        );
        assert_eq!(ctx.references[0].purpose, ReferencePurpose::CharacterReference);
        assert_eq!(ctx.references[1].purpose, ReferencePurpose::ImagePrompt);
    }
}
