//! Terminal persistence sinks.
//!
//! A sink receives the fully processed item and persists its assembled records. Sink
//! failures raise and abort the item; there are no cross-sink transactional guarantees.

pub mod solr;
pub mod vector;

use crate::pipeline::{Item, RunContext, SinkError};
use async_trait::async_trait;

pub use solr::SolrSink;
pub use vector::VectorSink;

/// A terminal component persisting an item's assembled outputs.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Name used in logs and failure diagnostics.
    fn name(&self) -> &'static str;

    /// Persist the item's records.
    async fn write(&self, item: &Item, ctx: &RunContext) -> Result<(), SinkError>;
}
