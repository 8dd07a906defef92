//! The pipeline runner: Source → ordered Processors → Sinks.
//!
//! A run reads one or many items from its source, applies the processors to each item
//! strictly in ascending order, and fans the finished item out to every sink. Items from
//! multi-item sources are processed concurrently up to `max_workers`; each item's own
//! pipeline stays sequential. A processor or sink failure aborts only its item, records a
//! failed entry, and leaves sibling items untouched.

use crate::metrics::global_metrics;
use crate::pipeline::types::{ItemReport, PipelineError, RunContext, RunReport};
use crate::pipeline::{Item, ItemPatch};
use crate::processors::Processor;
use crate::sinks::Sink;
use crate::sources::{Source, SourceBatch};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Default bound on concurrently processed items for multi-item sources.
pub const DEFAULT_MAX_WORKERS: usize = 10;

/// Orchestrates one ingestion run over a source, a processor chain, and a set of sinks.
pub struct PipelineRunner {
    source: Arc<dyn Source>,
    processors: Vec<Arc<dyn Processor>>,
    sinks: Vec<Arc<dyn Sink>>,
    max_workers: usize,
}

impl PipelineRunner {
    /// Build a runner. Processors are sorted ascending by declared order (stable, so
    /// ties keep registration order).
    pub fn new(
        source: Arc<dyn Source>,
        mut processors: Vec<Arc<dyn Processor>>,
        sinks: Vec<Arc<dyn Sink>>,
    ) -> Self {
        processors.sort_by_key(|processor| processor.order());
        Self {
            source,
            processors,
            sinks,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }

    /// Override the fan-out bound for multi-item sources.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Execute the run and return one summary entry per item in completion order.
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let ctx = RunContext::new();
        tracing::info!(run_id = %ctx.run_id, source = self.source.name(), "Pipeline run starting");

        let batch = self.source.read(&ctx).await?;
        let report = match batch {
            SourceBatch::Single(item) => RunReport {
                items: vec![self.process_item(item, &ctx).await],
            },
            SourceBatch::Many(items) => self.process_batch(items, &ctx).await,
        };

        tracing::info!(
            run_id = %ctx.run_id,
            ok = report.ok_count(),
            failed = report.failed_count(),
            "Pipeline run finished"
        );
        Ok(report)
    }

    async fn process_batch(&self, items: Vec<Item>, ctx: &RunContext) -> RunReport {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();

        for item in items {
            let semaphore = semaphore.clone();
            let processors = self.processors.clone();
            let sinks = self.sinks.clone();
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("item semaphore closed");
                run_item(item, &processors, &sinks, &ctx).await
            });
        }

        let mut report = RunReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(entry) => report.items.push(entry),
                Err(err) => {
                    tracing::error!(run_id = %ctx.run_id, error = %err, "Item task panicked");
                }
            }
        }
        report
    }

    async fn process_item(&self, item: Item, ctx: &RunContext) -> ItemReport {
        run_item(item, &self.processors, &self.sinks, ctx).await
    }
}

/// Drive a single item through the processor chain and the sinks.
async fn run_item(
    mut item: Item,
    processors: &[Arc<dyn Processor>],
    sinks: &[Arc<dyn Sink>],
    ctx: &RunContext,
) -> ItemReport {
    let started = Instant::now();
    let file_name = item.file_name.clone();
    let source = item.source_label();

    for processor in processors {
        match processor.process(&item, ctx).await {
            Ok(patch) => apply_patch(&mut item, patch),
            Err(err) => {
                tracing::warn!(
                    run_id = %ctx.run_id,
                    file_name = %file_name,
                    processor = processor.name(),
                    error = %err,
                    "Processor failed; aborting item"
                );
                global_metrics().record_failure();
                return failed_report(&item, file_name, source, started, err.to_string());
            }
        }
    }

    for sink in sinks {
        if let Err(err) = sink.write(&item, ctx).await {
            tracing::warn!(
                run_id = %ctx.run_id,
                file_name = %file_name,
                sink = sink.name(),
                error = %err,
                "Sink failed; aborting item"
            );
            global_metrics().record_failure();
            return failed_report(
                &item,
                file_name,
                source,
                started,
                format!("{}: {err}", sink.name()),
            );
        }
    }

    let chunk_count = item.chunks.as_ref().map(Vec::len).unwrap_or(0);
    global_metrics().record_item(chunk_count as u64);
    ok_report(&item, file_name, source, started)
}

fn apply_patch(item: &mut Item, patch: ItemPatch) {
    item.apply(patch);
}

fn ok_report(item: &Item, file_name: String, source: String, started: Instant) -> ItemReport {
    let (embedding_count, embedding_dim) = embedding_stats(item);
    ItemReport {
        file_name,
        doc_id: item.doc_id.clone().unwrap_or_default(),
        status: "ok",
        chunk_count: item.chunks.as_ref().map(Vec::len).unwrap_or(0),
        embedding_count,
        embedding_dim,
        source,
        elapsed_ms: started.elapsed().as_millis() as u64,
        error: None,
    }
}

fn failed_report(
    item: &Item,
    file_name: String,
    source: String,
    started: Instant,
    error: String,
) -> ItemReport {
    let (embedding_count, embedding_dim) = embedding_stats(item);
    ItemReport {
        file_name,
        doc_id: item.doc_id.clone().unwrap_or_default(),
        status: "failed",
        chunk_count: item.chunks.as_ref().map(Vec::len).unwrap_or(0),
        embedding_count,
        embedding_dim,
        source,
        elapsed_ms: started.elapsed().as_millis() as u64,
        error: Some(error),
    }
}

fn embedding_stats(item: &Item) -> (usize, usize) {
    match item.embeddings.as_ref() {
        Some(embeddings) => (
            embeddings.len(),
            embeddings.first().map(|e| e.vector.len()).unwrap_or(0),
        ),
        None => (0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{ProcessorError, SinkError, SourceError};
    use crate::pipeline::{ItemPatch, SourceType};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ManySource(Vec<&'static str>);

    #[async_trait]
    impl Source for ManySource {
        fn name(&self) -> &'static str {
            "many"
        }

        async fn read(&self, _ctx: &RunContext) -> Result<SourceBatch, SourceError> {
            Ok(SourceBatch::Many(
                self.0
                    .iter()
                    .map(|name| Item {
                        file_name: (*name).to_string(),
                        raw_text: Some("body".into()),
                        source_type: Some(SourceType::Text),
                        ..Item::default()
                    })
                    .collect(),
            ))
        }
    }

    struct RecordingProcessor {
        name: &'static str,
        order: i32,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl Processor for RecordingProcessor {
        fn name(&self) -> &'static str {
            self.name
        }

        fn order(&self) -> i32 {
            self.order
        }

        async fn process(
            &self,
            item: &Item,
            _ctx: &RunContext,
        ) -> Result<ItemPatch, ProcessorError> {
            self.log.lock().unwrap().push(self.name);
            if self.fail_on == Some(item.file_name.as_str()) {
                return Err(ProcessorError::Contract {
                    processor: self.name,
                    message: "boom".into(),
                });
            }
            Ok(ItemPatch::default())
        }
    }

    struct CountingSink(Arc<AtomicUsize>);

    #[async_trait]
    impl Sink for CountingSink {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn write(&self, _item: &Item, _ctx: &RunContext) -> Result<(), SinkError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn processors_run_in_ascending_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let runner = PipelineRunner::new(
            Arc::new(ManySource(vec!["a"])),
            vec![
                Arc::new(RecordingProcessor {
                    name: "late",
                    order: 100,
                    log: log.clone(),
                    fail_on: None,
                }),
                Arc::new(RecordingProcessor {
                    name: "early",
                    order: 5,
                    log: log.clone(),
                    fail_on: None,
                }),
            ],
            vec![],
        );

        let report = runner.run().await.expect("run");
        assert_eq!(report.items.len(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["early", "late"]);
    }

    #[tokio::test]
    async fn failing_item_does_not_affect_siblings() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let written = Arc::new(AtomicUsize::new(0));
        let runner = PipelineRunner::new(
            Arc::new(ManySource(vec!["good", "bad", "also-good"])),
            vec![Arc::new(RecordingProcessor {
                name: "gate",
                order: 10,
                log,
                fail_on: Some("bad"),
            })],
            vec![Arc::new(CountingSink(written.clone()))],
        );

        let report = runner.run().await.expect("run");
        assert_eq!(report.items.len(), 3);
        assert_eq!(report.ok_count(), 2);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(written.load(Ordering::SeqCst), 2);

        let failed = report
            .items
            .iter()
            .find(|entry| entry.status == "failed")
            .expect("failed entry");
        assert_eq!(failed.file_name, "bad");
        assert!(failed.error.as_deref().unwrap_or("").contains("gate"));
    }

    #[tokio::test]
    async fn sink_failure_marks_item_failed() {
        struct FailingSink;

        #[async_trait]
        impl Sink for FailingSink {
            fn name(&self) -> &'static str {
                "failing"
            }

            async fn write(&self, _item: &Item, _ctx: &RunContext) -> Result<(), SinkError> {
                Err(SinkError::MissingRecords { sink: "failing" })
            }
        }

        let runner = PipelineRunner::new(
            Arc::new(ManySource(vec!["only"])),
            vec![],
            vec![Arc::new(FailingSink)],
        );
        let report = runner.run().await.expect("run");
        assert_eq!(report.failed_count(), 1);
    }
}
