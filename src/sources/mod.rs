//! Data sources producing pipeline items.
//!
//! A source reads from an external origin and yields either a single item or an ordered
//! batch. List-producing sources (IMAP, web crawler, directory URIs) return
//! [`SourceBatch::Many`]; the runner then fans items out under its worker bound.

pub mod base64;
pub mod email;
pub mod file;
pub mod text;
pub mod uri;
pub mod web;

use crate::pipeline::{Item, RunContext, SourceError};
use async_trait::async_trait;

pub use base64::Base64Source;
pub use email::EmailSource;
pub use file::FileSource;
pub use text::TextSource;
pub use uri::UriSource;
pub use web::WebCrawlerSource;

/// One or many items produced by a single source read.
#[derive(Debug)]
pub enum SourceBatch {
    /// Exactly one item.
    Single(Item),
    /// An ordered batch of independent items.
    Many(Vec<Item>),
}

impl SourceBatch {
    /// Number of items in the batch.
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Many(items) => items.len(),
        }
    }

    /// True when the batch holds no items.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Many(items) if items.is_empty())
    }
}

/// A component producing one or more items from an external origin.
#[async_trait]
pub trait Source: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Read the origin and yield the items to process.
    async fn read(&self, ctx: &RunContext) -> Result<SourceBatch, SourceError>;
}
