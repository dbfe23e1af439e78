//! Fragment views
//!
//! A `FragmentView` wraps the container node an item renders into. It is
//! created lazily on first render and reused on every re-render, so callers
//! can hold on to it across refreshes. The registry is keyed by node handle,
//! not item id: identity belongs to the element.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Per-item render callback
pub type RenderCallback = Box<dyn FnOnce(Arc<FragmentView>) + Send>;

/// Stable handle for a container element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(pub Uuid);

impl NodeHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Wrapper view over one rendered fragment
#[derive(Debug)]
pub struct FragmentView {
    item_id: String,
    node: NodeHandle,
    render_count: AtomicU32,
}

impl FragmentView {
    fn new(item_id: &str, node: NodeHandle) -> Self {
        Self {
            item_id: item_id.to_string(),
            node,
            render_count: AtomicU32::new(0),
        }
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn node(&self) -> NodeHandle {
        self.node
    }

    /// Number of times markup has been injected into this view's node
    pub fn render_count(&self) -> u32 {
        self.render_count.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_rendered(&self) {
        self.render_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Node handle -> view
#[derive(Debug, Default)]
pub struct ViewRegistry {
    views: HashMap<NodeHandle, Arc<FragmentView>>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node: NodeHandle) -> Option<Arc<FragmentView>> {
        self.views.get(&node).cloned()
    }

    /// Existing view for the node, or a new one bound to `item_id`
    pub fn get_or_create(&mut self, node: NodeHandle, item_id: &str) -> Arc<FragmentView> {
        Arc::clone(
            self.views
                .entry(node)
                .or_insert_with(|| Arc::new(FragmentView::new(item_id, node))),
        )
    }

    pub fn contains(&self, node: NodeHandle) -> bool {
        self.views.contains_key(&node)
    }

    /// Forget a node, e.g. after its element was removed
    pub fn remove(&mut self, node: NodeHandle) -> Option<Arc<FragmentView>> {
        self.views.remove(&node)
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}
