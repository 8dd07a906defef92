#![deny(missing_docs)]

//! Core library for the ingestd document ingestion service.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// HTML parsing helpers shared by the cleaner and the list sources.
pub mod html;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion metrics helpers.
pub mod metrics;
/// Pipeline orchestration: items, runner, registry.
pub mod pipeline;
/// Ordered processors applied to every item.
pub mod processors;
/// Embedding and analysis provider capabilities.
pub mod providers;
/// Request-to-pipeline assembly shared by the HTTP surface and the worker.
pub mod service;
/// Terminal persistence sinks.
pub mod sinks;
/// Data sources producing pipeline items.
pub mod sources;
/// In-process asynchronous ingestion queue.
pub mod worker;
