//! Render finalization shared by the loader and the dispatcher task

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::host::FragmentHost;
use crate::loader::LoaderStats;
use crate::view::{FragmentView, NodeHandle, RenderCallback, ViewRegistry};

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub requests_issued: AtomicU64,
    pub items_from_cache: AtomicU64,
    pub items_from_network: AtomicU64,
    pub failed_batches: AtomicU64,
    pub rejected_batches: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> LoaderStats {
        LoaderStats {
            requests_issued: self.requests_issued.load(Ordering::SeqCst),
            items_from_cache: self.items_from_cache.load(Ordering::SeqCst),
            items_from_network: self.items_from_network.load(Ordering::SeqCst),
            failed_batches: self.failed_batches.load(Ordering::SeqCst),
            rejected_batches: self.rejected_batches.load(Ordering::SeqCst),
        }
    }
}

pub(crate) struct RenderCore {
    pub host: Arc<dyn FragmentHost>,
    pub views: Mutex<ViewRegistry>,
    pub stats: StatsCounters,
}

impl RenderCore {
    pub fn new(host: Arc<dyn FragmentHost>) -> Self {
        Self {
            host,
            views: Mutex::new(ViewRegistry::new()),
            stats: StatsCounters::default(),
        }
    }

    pub fn has_view(&self, node: NodeHandle) -> bool {
        self.views.lock().unwrap().contains(node)
    }

    pub fn view_for(&self, item_id: &str) -> Option<Arc<FragmentView>> {
        let node = self.host.container(item_id)?;
        self.views.lock().unwrap().get(node)
    }

    /// Inject markup for an item and notify its callbacks.
    ///
    /// Order per item: scroll mark, inject, view lookup/creation, callbacks,
    /// scroll update. Returns None when the item has no container.
    pub fn finalize(
        &self,
        item_id: &str,
        markup: &str,
        callbacks: Vec<RenderCallback>,
    ) -> Option<Arc<FragmentView>> {
        let node = match self.host.container(item_id) {
            Some(node) => node,
            None => {
                warn!(item_id = %item_id, "No container for fragment, dropping it");
                return None;
            }
        };

        self.host.begin_scroll_update(node);
        self.host.set_markup(node, markup);

        // Lock released before callbacks run
        let view = self.views.lock().unwrap().get_or_create(node, item_id);
        view.mark_rendered();

        for callback in callbacks {
            callback(Arc::clone(&view));
        }

        self.host.end_scroll_update(node);

        debug!(
            item_id = %item_id,
            node = %node,
            renders = view.render_count(),
            "Fragment rendered"
        );
        Some(view)
    }
}
