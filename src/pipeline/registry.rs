//! Processor registry: instantiates the known processor kinds, wires optional
//! capabilities into the ones that need them, and returns the set sorted by order.

use crate::config::get_config;
use crate::processors::{
    AnalyzeProcessor, AssembleProcessor, ChunkProcessor, CleanProcessor, EmbedProcessor,
    ExtractProcessor, IdentityProcessor, Processor,
};
use crate::providers::{Analyzer, Embedder};
use std::sync::Arc;

/// External capabilities injected into processors that require them.
///
/// The embed processor degrades to an empty result without an embedder; the analyze
/// processor is omitted entirely without an analyzer.
#[derive(Clone, Default)]
pub struct Capabilities {
    /// Embedding capability for the embed processor.
    pub embedder: Option<Arc<dyn Embedder>>,
    /// Analysis capability for the analyze processor.
    pub analyzer: Option<Arc<dyn Analyzer>>,
}

/// Instantiate every registered processor kind, sorted ascending by declared order.
///
/// Construction is static: the set of processor kinds is fixed at compile time, so the
/// reflective discovery step of a dynamic runtime reduces to building the list below.
/// Ties in `order` preserve registration order.
pub fn build_processors(capabilities: &Capabilities) -> Vec<Arc<dyn Processor>> {
    let config = get_config();

    let mut processors: Vec<Arc<dyn Processor>> = vec![
        Arc::new(IdentityProcessor::new(config.source_system.clone())),
        Arc::new(ExtractProcessor::new(
            config.tika_url.clone(),
            config.tika_timeout_secs,
        )),
        Arc::new(CleanProcessor::new(config.clean_semantic_dedup)),
        Arc::new(ChunkProcessor::new(config.chunk_size, config.chunk_overlap)),
        Arc::new(EmbedProcessor::new(capabilities.embedder.clone())),
    ];

    if let Some(analyzer) = capabilities.analyzer.clone() {
        processors.push(Arc::new(AnalyzeProcessor::new(analyzer)));
    } else {
        tracing::debug!("No analyzer configured; analyze processor omitted");
    }

    processors.push(Arc::new(AssembleProcessor::new(
        config.namespace_seed.clone(),
    )));

    processors.sort_by_key(|processor| processor.order());

    let listing: Vec<(&'static str, i32)> = processors
        .iter()
        .map(|processor| (processor.name(), processor.order()))
        .collect();
    tracing::info!(count = processors.len(), order = ?listing, "Processor registry built");

    processors
}
