//! Pipeline orchestration: the item envelope, the runner, and the processor registry.

pub mod item;
pub mod registry;
pub mod runner;
pub mod types;

pub use item::{Embedding, Item, ItemPatch, SourceType};
pub use registry::{Capabilities, build_processors};
pub use runner::PipelineRunner;
pub use types::{
    ItemReport, PipelineError, ProcessorError, RunContext, RunReport, SinkError, SourceError,
};
