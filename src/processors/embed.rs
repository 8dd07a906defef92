//! Per-chunk embedding via the injected embedder capability.

use crate::pipeline::{Embedding, Item, ItemPatch, ProcessorError, RunContext};
use crate::processors::Processor;
use crate::providers::Embedder;
use async_trait::async_trait;
use std::sync::Arc;

/// Embeds every chunk, aligned 1:1 with `chunks`.
///
/// Without an embedder the processor stays registered and yields an empty embedding
/// list, so downstream assembly still sees a consistent shape.
pub struct EmbedProcessor {
    embedder: Option<Arc<dyn Embedder>>,
}

impl EmbedProcessor {
    /// Build the processor with an optional embedding capability.
    pub fn new(embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl Processor for EmbedProcessor {
    fn name(&self) -> &'static str {
        "embed"
    }

    fn order(&self) -> i32 {
        40
    }

    async fn process(&self, item: &Item, _ctx: &RunContext) -> Result<ItemPatch, ProcessorError> {
        let Some(embedder) = self.embedder.as_ref() else {
            return Ok(ItemPatch {
                embeddings: Some(Vec::new()),
                ..ItemPatch::default()
            });
        };

        let chunks = item.chunks.as_deref().unwrap_or_default();
        if chunks.is_empty() {
            tracing::warn!(file_name = %item.file_name, "No chunks to embed");
            return Ok(ItemPatch {
                embeddings: Some(Vec::new()),
                ..ItemPatch::default()
            });
        }

        let mut embeddings = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            let vector = embedder.embed(chunk, None).await.map_err(|err| {
                ProcessorError::Upstream {
                    processor: "embed",
                    message: format!("chunk {}/{}: {err}", index + 1, chunks.len()),
                }
            })?;
            tracing::debug!(
                model = embedder.default_model(),
                chunk = index + 1,
                total = chunks.len(),
                "Chunk embedded"
            );
            embeddings.push(Embedding {
                text: chunk.clone(),
                vector,
            });
        }

        Ok(ItemPatch {
            embeddings: Some(embeddings),
            ..ItemPatch::default()
        })
    }
}
