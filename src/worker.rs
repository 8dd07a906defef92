//! In-process asynchronous ingestion queue.
//!
//! The queue is a thin wrapper around the same pipeline invocation the synchronous
//! endpoints use: `enqueue` hands an [`IngestRequest`] to a background drain task and
//! returns a task id immediately. The feature is gated on `REDIS_BROKER_URL`; without
//! it the queue is never constructed and enqueue attempts surface `NotConfigured`.

use crate::config::get_config;
use crate::service::{IngestError, IngestRequest, run_ingest};
use std::sync::OnceLock;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A queued ingestion job.
pub struct IngestJob {
    /// Identifier returned to the caller at enqueue time.
    pub task_id: Uuid,
    /// The pipeline invocation to execute.
    pub request: IngestRequest,
}

/// Handle for enqueueing jobs onto the background drain task.
pub struct JobQueue {
    sender: mpsc::UnboundedSender<IngestJob>,
}

static QUEUE: OnceLock<Option<JobQueue>> = OnceLock::new();

/// Construct the queue and spawn its drain task when a broker URL is configured.
///
/// Must run inside the tokio runtime. Calling it again is a no-op.
pub fn init_job_queue() {
    QUEUE.get_or_init(|| {
        let config = get_config();
        let Some(broker_url) = config.redis_broker_url.as_deref() else {
            tracing::info!("REDIS_BROKER_URL not set; async ingestion disabled");
            return None;
        };

        let (sender, mut receiver) = mpsc::unbounded_channel::<IngestJob>();
        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                let task_id = job.task_id;
                tracing::info!(task_id = %task_id, "Draining queued ingestion job");
                match run_ingest(job.request).await {
                    Ok(report) => tracing::info!(
                        task_id = %task_id,
                        ok = report.ok_count(),
                        failed = report.failed_count(),
                        "Queued ingestion finished"
                    ),
                    Err(err) => {
                        tracing::error!(task_id = %task_id, error = %err, "Queued ingestion failed");
                    }
                }
            }
        });

        tracing::info!(broker = broker_url, "Async ingestion queue ready");
        Some(JobQueue { sender })
    });
}

/// Enqueue a request for background execution and return its task id.
pub fn enqueue(request: IngestRequest) -> Result<Uuid, IngestError> {
    let queue = QUEUE
        .get()
        .and_then(Option::as_ref)
        .ok_or_else(|| {
            IngestError::NotConfigured(
                "async mode not configured (REDIS_BROKER_URL missing)".into(),
            )
        })?;

    let task_id = Uuid::new_v4();
    queue
        .sender
        .send(IngestJob { task_id, request })
        .map_err(|_| IngestError::NotConfigured("async queue is shut down".into()))?;
    Ok(task_id)
}
