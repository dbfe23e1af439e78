//! Fragment Loader
//!
//! Public facade over the pending queue, the saved-fragment cache, the view
//! registry and the batch dispatcher.
//!
//! **Flush:**
//! 1. Nothing to do when both the queue and the saved cache are empty
//! 2. The queue is emptied up front; enqueues made while batches are in
//!    flight start a fresh batch
//! 3. Items with a saved fragment are replayed locally and their cache
//!    entries consumed; an item whose container is gone is reported as
//!    orphaned
//! 4. Every other item is requested, one request per batch key, through
//!    the single-flight dispatcher in batch key order

use fragkit_common::config::{normalize_base_url, FailurePolicy, LoaderConfig};
use futures::future::join_all;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::cache::SavedFragmentCache;
use crate::dispatcher::{BatchDispatcher, BatchJob, BatchOutcome};
use crate::error::{LoaderError, Result};
use crate::host::FragmentHost;
use crate::queue::{PendingQueue, QueuedItem};
use crate::render::{RenderCore, StatsCounters};
use crate::transport::{FragmentTransport, HttpTransport};
use crate::view::{FragmentView, RenderCallback};

/// Counters since the loader was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoaderStats {
    /// Batched network requests started
    pub requests_issued: u64,
    /// Items replayed from the saved-fragment cache
    pub items_from_cache: u64,
    /// Items rendered from network responses
    pub items_from_network: u64,
    /// Batches whose request or decoding failed
    pub failed_batches: u64,
    /// Batches rejected because an earlier batch failed
    pub rejected_batches: u64,
}

#[derive(Debug, Default)]
struct LoaderState {
    queue: PendingQueue,
    saved: SavedFragmentCache,
}

struct PendingBatch {
    batch_key: String,
    item_ids: Vec<String>,
    done: oneshot::Receiver<Result<BatchOutcome>>,
}

/// Completion handle returned by [`FragmentLoader::flush`]
pub struct FlushHandle {
    cached: Vec<String>,
    orphaned: Vec<String>,
    batches: Vec<PendingBatch>,
}

impl FlushHandle {
    fn empty() -> Self {
        Self {
            cached: Vec::new(),
            orphaned: Vec::new(),
            batches: Vec::new(),
        }
    }

    /// Ids replayed from the saved-fragment cache during the flush
    pub fn cached(&self) -> &[String] {
        &self.cached
    }

    /// Saved fragments dropped because their container no longer exists
    pub fn orphaned(&self) -> &[String] {
        &self.orphaned
    }

    /// Batch keys sent to the network, in dispatch order
    pub fn batch_keys(&self) -> Vec<&str> {
        self.batches.iter().map(|b| b.batch_key.as_str()).collect()
    }

    /// Ids requested for one batch key
    pub fn requested_ids(&self, batch_key: &str) -> Option<&[String]> {
        self.batches
            .iter()
            .find(|b| b.batch_key == batch_key)
            .map(|b| b.item_ids.as_slice())
    }

    /// True when the flush did nothing at all
    pub fn is_empty(&self) -> bool {
        self.cached.is_empty() && self.orphaned.is_empty() && self.batches.is_empty()
    }

    /// Wait for every network batch, results in dispatch order
    pub async fn wait(self) -> Vec<Result<BatchOutcome>> {
        join_all(self.batches.into_iter().map(|batch| async move {
            batch
                .done
                .await
                .unwrap_or(Err(LoaderError::DispatcherClosed))
        }))
        .await
    }
}

/// Batched fragment loader
pub struct FragmentLoader {
    state: Mutex<LoaderState>,
    render: Arc<RenderCore>,
    dispatcher: BatchDispatcher,
}

impl FragmentLoader {
    /// Create a loader and spawn its dispatcher; requires a tokio runtime
    pub fn new(
        host: Arc<dyn FragmentHost>,
        transport: Arc<dyn FragmentTransport>,
        policy: FailurePolicy,
    ) -> Self {
        let render = Arc::new(RenderCore::new(host));
        let dispatcher = BatchDispatcher::spawn(transport, Arc::clone(&render), policy);

        Self {
            state: Mutex::new(LoaderState::default()),
            render,
            dispatcher,
        }
    }

    /// Loader backed by an [`HttpTransport`] built from configuration.
    ///
    /// The base URL is checked again here since a `LoaderConfig` can be
    /// built by hand.
    pub fn from_config(host: Arc<dyn FragmentHost>, config: &LoaderConfig) -> Result<Self> {
        let mut config = config.clone();
        config.base_url = normalize_base_url(&config.base_url)?;

        let transport = HttpTransport::new(config.clone()).map_err(LoaderError::TransportSetup)?;
        Ok(Self::new(host, Arc::new(transport), config.failure_policy))
    }

    /// Buffer an item for the next flush under `batch_key`.
    ///
    /// Ids must be non-empty and free of `,`, `/` and newlines, since they
    /// are joined into the request path.
    pub fn enqueue(
        &self,
        item_id: &str,
        batch_key: &str,
        on_rendered: Option<RenderCallback>,
    ) -> Result<()> {
        validate_item_id(item_id)?;

        let mut state = self.state.lock().unwrap();
        state.queue.push(item_id, batch_key, on_rendered);

        debug!(item_id = %item_id, batch_key = %batch_key, "Fragment enqueued");
        Ok(())
    }

    /// Capture an item's current markup into the saved-fragment cache.
    ///
    /// Only items with a container and a live view are saved. Returns
    /// whether anything was captured.
    pub fn save_fragment(&self, item_id: &str) -> bool {
        let node = match self.render.host.container(item_id) {
            Some(node) => node,
            None => return false,
        };

        if !self.render.has_view(node) {
            return false;
        }

        let markup = match self.render.host.rendered_markup(node) {
            Some(markup) => markup,
            None => return false,
        };

        self.state.lock().unwrap().saved.insert(item_id, markup);
        debug!(item_id = %item_id, "Fragment saved");
        true
    }

    /// Dispatch everything pending. See module docs for the steps.
    pub fn flush(&self) -> FlushHandle {
        let mut replays: Vec<(QueuedItem, String)> = Vec::new();
        let mut network: Vec<(String, Vec<QueuedItem>)> = Vec::new();

        {
            let mut state = self.state.lock().unwrap();
            if state.queue.is_empty() && state.saved.is_empty() {
                return FlushHandle::empty();
            }

            for (batch_key, items) in state.queue.take_all() {
                let mut uncached = Vec::new();
                for item in items {
                    match state.saved.take(&item.item_id) {
                        Some(markup) => replays.push((item, markup)),
                        None => uncached.push(item),
                    }
                }
                if !uncached.is_empty() {
                    network.push((batch_key, uncached));
                }
            }
        }

        let mut handle = FlushHandle::empty();

        for (item, markup) in replays {
            debug_assert!(
                self.render.host.container(&item.item_id).is_none()
                    || self.render.view_for(&item.item_id).is_some(),
                "saved fragment replayed without a live view"
            );
            match self.render.finalize(&item.item_id, &markup, item.callbacks) {
                Some(_) => {
                    StatsCounters::bump(&self.render.stats.items_from_cache);
                    handle.cached.push(item.item_id);
                }
                None => {
                    warn!(item_id = %item.item_id, "Saved fragment has no container, discarded");
                    handle.orphaned.push(item.item_id);
                }
            }
        }

        for (batch_key, items) in network {
            let (done_tx, done_rx) = oneshot::channel();
            handle.batches.push(PendingBatch {
                batch_key: batch_key.clone(),
                item_ids: items.iter().map(|i| i.item_id.clone()).collect(),
                done: done_rx,
            });
            self.dispatcher.submit(BatchJob {
                batch_key,
                items,
                done: done_tx,
            });
        }

        debug!(
            cached = handle.cached.len(),
            orphaned = handle.orphaned.len(),
            batches = handle.batches.len(),
            "Flush dispatched"
        );
        handle
    }

    /// Number of items waiting for the next flush
    pub fn pending_len(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.state.lock().unwrap().queue.is_empty()
    }

    /// Number of saved fragments not yet replayed
    pub fn saved_len(&self) -> usize {
        self.state.lock().unwrap().saved.len()
    }

    pub fn is_saved(&self, item_id: &str) -> bool {
        self.state.lock().unwrap().saved.contains(item_id)
    }

    /// Drop pending items without touching saved fragments
    pub fn clear_pending(&self) {
        self.state.lock().unwrap().queue.clear();
    }

    /// Drop saved fragments without touching pending items
    pub fn clear_saved(&self) {
        self.state.lock().unwrap().saved.clear();
    }

    /// View currently bound to an item's container
    pub fn view_for(&self, item_id: &str) -> Option<Arc<FragmentView>> {
        self.render.view_for(item_id)
    }

    pub fn stats(&self) -> LoaderStats {
        self.render.stats.snapshot()
    }

    /// Stop the dispatcher after the batches already submitted complete
    pub async fn shutdown(self) {
        self.dispatcher.shutdown().await;
    }
}

fn validate_item_id(item_id: &str) -> Result<()> {
    if item_id.is_empty() || item_id.contains(|c: char| matches!(c, ',' | '/' | '\n')) {
        return Err(LoaderError::InvalidItemId(item_id.to_string()));
    }
    Ok(())
}
