//! Batch Dispatcher
//!
//! FIFO of batch jobs drained by a single tokio task. A job's fetch must
//! finish (and its fragments be rendered) before the next job starts, so
//! the host never has more than one batched request in flight, and batches
//! run in submission order.
//!
//! Failures are reported on the job's completion channel, never swallowed.
//! Under `FailurePolicy::RejectRemaining` every job already queued behind a
//! failed one is rejected too; jobs submitted afterwards run normally.

use fragkit_common::config::FailurePolicy;
use fragkit_common::framing::decode_records;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{LoaderError, Result};
use crate::queue::QueuedItem;
use crate::render::{RenderCore, StatsCounters};
use crate::transport::{BatchRequest, FragmentTransport};
use crate::view::RenderCallback;

/// Result of one completed batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub batch_key: String,
    /// Ids rendered from the response, in response order
    pub rendered: Vec<String>,
    /// Requested ids the response did not contain
    pub missing: Vec<String>,
    /// Ids present in the response whose container no longer exists
    pub orphaned: Vec<String>,
}

pub(crate) struct BatchJob {
    pub batch_key: String,
    pub items: Vec<QueuedItem>,
    pub done: oneshot::Sender<Result<BatchOutcome>>,
}

pub(crate) struct BatchDispatcher {
    tx: mpsc::UnboundedSender<BatchJob>,
    worker: JoinHandle<()>,
}

impl BatchDispatcher {
    /// Spawn the worker task; requires a tokio runtime
    pub fn spawn(
        transport: Arc<dyn FragmentTransport>,
        render: Arc<RenderCore>,
        policy: FailurePolicy,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run(rx, transport, render, policy));
        Self { tx, worker }
    }

    /// Queue a job behind any already submitted
    pub fn submit(&self, job: BatchJob) {
        if let Err(mpsc::error::SendError(job)) = self.tx.send(job) {
            // Dropping `job.done` resolves the handle with DispatcherClosed
            warn!(batch_key = %job.batch_key, "Dispatcher closed, batch not sent");
        }
    }

    /// Stop accepting jobs and wait for queued ones to finish
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            warn!("Dispatcher task ended abnormally: {}", e);
        }
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<BatchJob>,
    transport: Arc<dyn FragmentTransport>,
    render: Arc<RenderCore>,
    policy: FailurePolicy,
) {
    while let Some(BatchJob {
        batch_key,
        items,
        done,
    }) = rx.recv().await
    {
        let result = process_batch(transport.as_ref(), &render, &batch_key, items).await;

        match &result {
            Ok(outcome) => info!(
                batch_key = %batch_key,
                rendered = outcome.rendered.len(),
                missing = outcome.missing.len(),
                "Fragment batch complete"
            ),
            Err(e) => {
                StatsCounters::bump(&render.stats.failed_batches);
                warn!(batch_key = %batch_key, "Fragment batch failed: {}", e);
            }
        }

        let failure = result.as_ref().err().map(|e| e.to_string());
        // Receiver may have been dropped; nothing to report to then
        let _ = done.send(result);

        if let (Some(cause), FailurePolicy::RejectRemaining) = (failure, policy) {
            reject_queued(&mut rx, &render, &batch_key, &cause);
        }
    }

    debug!("Batch dispatcher stopped");
}

fn reject_queued(
    rx: &mut mpsc::UnboundedReceiver<BatchJob>,
    render: &RenderCore,
    failed_key: &str,
    cause: &str,
) {
    while let Ok(job) = rx.try_recv() {
        StatsCounters::bump(&render.stats.rejected_batches);
        warn!(
            batch_key = %job.batch_key,
            failed_batch = %failed_key,
            "Rejecting queued batch after earlier failure"
        );
        let _ = job.done.send(Err(LoaderError::Rejected {
            batch_key: job.batch_key,
            cause: format!("batch {} failed: {}", failed_key, cause),
        }));
    }
}

async fn process_batch(
    transport: &dyn FragmentTransport,
    render: &RenderCore,
    batch_key: &str,
    items: Vec<QueuedItem>,
) -> Result<BatchOutcome> {
    let request = BatchRequest {
        batch_key: batch_key.to_string(),
        item_ids: items.iter().map(|item| item.item_id.clone()).collect(),
    };

    StatsCounters::bump(&render.stats.requests_issued);
    let body = transport
        .fetch(&request)
        .await
        .map_err(|source| LoaderError::Transport {
            batch_key: batch_key.to_string(),
            source,
        })?;

    let records = decode_records(&body).map_err(|source| LoaderError::Framing {
        batch_key: batch_key.to_string(),
        source,
    })?;

    let mut waiting: HashMap<String, Vec<RenderCallback>> = items
        .into_iter()
        .map(|item| (item.item_id, item.callbacks))
        .collect();

    let mut outcome = BatchOutcome {
        batch_key: batch_key.to_string(),
        ..Default::default()
    };

    for record in records {
        let callbacks = match waiting.remove(&record.item_id) {
            Some(callbacks) => callbacks,
            None => {
                warn!(
                    batch_key = %batch_key,
                    item_id = %record.item_id,
                    "Ignoring unrequested or duplicate fragment"
                );
                continue;
            }
        };

        match render.finalize(&record.item_id, &record.payload, callbacks) {
            Some(_) => {
                StatsCounters::bump(&render.stats.items_from_network);
                outcome.rendered.push(record.item_id);
            }
            None => outcome.orphaned.push(record.item_id),
        }
    }

    outcome.missing = request
        .item_ids
        .into_iter()
        .filter(|id| waiting.contains_key(id))
        .collect();

    if !outcome.missing.is_empty() {
        warn!(
            batch_key = %batch_key,
            missing = ?outcome.missing,
            "Response omitted requested fragments"
        );
    }

    Ok(outcome)
}
