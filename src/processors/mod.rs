//! Ordered processors applied to every pipeline item.
//!
//! Each processor declares an integer order and returns a partial field update
//! ([`crate::pipeline::ItemPatch`]) which the runner merges into the item. Processors are
//! stateless after construction and may be shared across concurrent items.

pub mod analyze;
pub mod assemble;
pub mod chunk;
pub mod clean;
pub mod embed;
pub mod extract;
pub mod identity;

use crate::pipeline::{Item, ItemPatch, ProcessorError, RunContext};
use async_trait::async_trait;

pub use analyze::AnalyzeProcessor;
pub use assemble::AssembleProcessor;
pub use chunk::ChunkProcessor;
pub use clean::CleanProcessor;
pub use embed::EmbedProcessor;
pub use extract::ExtractProcessor;
pub use identity::IdentityProcessor;

/// An ordered transformation over an item producing a partial field update.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Name used in logs and failure diagnostics.
    fn name(&self) -> &'static str;

    /// Execution order; lower runs earlier, ties broken by registration order.
    fn order(&self) -> i32;

    /// Compute the field updates for this item.
    async fn process(&self, item: &Item, ctx: &RunContext) -> Result<ItemPatch, ProcessorError>;
}
