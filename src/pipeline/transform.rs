//! Response transformers and the artifact store seam.
//!
//! A transformer turns one tool's raw output into a
//! `NormalizedToolResponse`-shaped value — typically summarizing it and,
//! for tools configured with `save_output`, persisting artifacts through
//! the store and reporting their locations in `paths`. The pipeline only
//! consumes the returned value (after coercion); storage is entirely the
//! transformer's business.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::mcp_client::RawContent;

// ─── Collaborator Traits ─────────────────────────────────────────────────────

/// Per-tool response transformer, selected by name via `ToolPolicy`.
#[async_trait]
pub trait ResponseTransformer: Send + Sync {
    /// Produce a `NormalizedToolResponse`-shaped value from raw tool output.
    /// The result is coerced by the dispatcher; a malformed shape costs the
    /// transformer its fields, not the pipeline its call.
    async fn transform(&self, raw: &RawContent) -> serde_json::Value;
}

/// Persistent tagged artifact store consumed by transformers.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist content under a path with tags and metadata; returns the
    /// absolute storage location.
    async fn save(
        &self,
        path: &str,
        content: &[u8],
        tags: &[String],
        metadata: serde_json::Value,
    ) -> std::io::Result<String>;

    /// Locations of every artifact carrying all of the given tags.
    async fn find_by_tags(&self, tags: &[String]) -> std::io::Result<Vec<String>>;
}

// ─── TransformerRegistry ─────────────────────────────────────────────────────

/// Name → transformer mapping, populated once at initialization.
#[derive(Default)]
pub struct TransformerRegistry {
    transformers: HashMap<String, Arc<dyn ResponseTransformer>>,
}

impl TransformerRegistry {
    /// Create an empty registry (every tool passes raw output through).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transformer under the name tool policies refer to.
    pub fn register(&mut self, name: &str, transformer: Arc<dyn ResponseTransformer>) {
        self.transformers.insert(name.to_string(), transformer);
    }

    /// Look up a transformer by policy name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ResponseTransformer>> {
        self.transformers.get(name).cloned()
    }

    /// Number of registered transformers.
    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    /// Whether any transformers are registered.
    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    /// Transformer that saves text artifacts through a store and reports
    /// their locations — the shape real transformers take.
    struct SavingTransformer {
        store: Arc<dyn ArtifactStore>,
    }

    #[async_trait]
    impl ResponseTransformer for SavingTransformer {
        async fn transform(&self, raw: &RawContent) -> serde_json::Value {
            let text = raw.display();
            match self
                .store
                .save(
                    "output.txt",
                    text.as_bytes(),
                    &["tool-output".to_string()],
                    serde_json::json!({}),
                )
                .await
            {
                Ok(location) => serde_json::json!({
                    "message": format!("saved {} bytes", text.len()),
                    "paths": {"output": location},
                    "raw_content": text,
                }),
                Err(e) => serde_json::json!({
                    "message": format!("save failed: {e}"),
                }),
            }
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        saved: Mutex<Vec<(String, Vec<String>)>>,
    }

    #[async_trait]
    impl ArtifactStore for MemoryStore {
        async fn save(
            &self,
            path: &str,
            _content: &[u8],
            tags: &[String],
            _metadata: serde_json::Value,
        ) -> std::io::Result<String> {
            let location = format!("/store/{path}");
            self.saved
                .lock()
                .await
                .push((location.clone(), tags.to_vec()));
            Ok(location)
        }

        async fn find_by_tags(&self, tags: &[String]) -> std::io::Result<Vec<String>> {
            Ok(self
                .saved
                .lock()
                .await
                .iter()
                .filter(|(_, saved_tags)| tags.iter().all(|t| saved_tags.contains(t)))
                .map(|(location, _)| location.clone())
                .collect())
        }
    }

    #[test]
    fn test_registry_lookup() {
        let store: Arc<dyn ArtifactStore> = Arc::new(MemoryStore::default());
        let mut registry = TransformerRegistry::new();
        assert!(registry.is_empty());

        registry.register("text_file", Arc::new(SavingTransformer { store }));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("text_file").is_some());
        assert!(registry.get("unknown").is_none());
    }

    #[tokio::test]
    async fn test_transformer_reports_store_locations() {
        let store = Arc::new(MemoryStore::default());
        let transformer = SavingTransformer {
            store: store.clone(),
        };

        let out = transformer
            .transform(&RawContent::Text {
                text: "hello".into(),
            })
            .await;

        assert_eq!(out["paths"]["output"], "/store/output.txt");
        assert_eq!(out["raw_content"], "hello");

        let found = store
            .find_by_tags(&["tool-output".to_string()])
            .await
            .unwrap();
        assert_eq!(found, vec!["/store/output.txt"]);
    }

    #[tokio::test]
    async fn test_find_by_tags_requires_all_tags() {
        let store = MemoryStore::default();
        store
            .save("a.txt", b"a", &["x".to_string()], serde_json::json!({}))
            .await
            .unwrap();
        store
            .save(
                "b.txt",
                b"b",
                &["x".to_string(), "y".to_string()],
                serde_json::json!({}),
            )
            .await
            .unwrap();

        let found = store
            .find_by_tags(&["x".to_string(), "y".to_string()])
            .await
            .unwrap();
        assert_eq!(found, vec!["/store/b.txt"]);
    }
}
