//! Host document abstraction
//!
//! The loader never touches a document directly. It locates containers,
//! reads their markup and injects new markup through `FragmentHost`, and
//! brackets every injection with scroll-update marks so the host can keep
//! the viewport steady when a fragment changes height.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::view::NodeHandle;

/// Document operations the loader needs
pub trait FragmentHost: Send + Sync {
    /// Container node an item renders into, if present
    fn container(&self, item_id: &str) -> Option<NodeHandle>;

    /// Markup currently rendered in a node
    fn rendered_markup(&self, node: NodeHandle) -> Option<String>;

    /// Called before a node's content (and height) changes
    fn begin_scroll_update(&self, node: NodeHandle);

    /// Replace a node's content
    fn set_markup(&self, node: NodeHandle, markup: &str);

    /// Called once the node has its new content
    fn end_scroll_update(&self, node: NodeHandle);
}

/// Host call, as recorded by `MemoryHost`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    BeginScrollUpdate(NodeHandle),
    SetMarkup(NodeHandle),
    EndScrollUpdate(NodeHandle),
}

#[derive(Debug, Default)]
struct MemoryDocument {
    containers: HashMap<String, NodeHandle>,
    markup: HashMap<NodeHandle, String>,
    events: Vec<HostEvent>,
}

/// In-memory document: one container per registered item
#[derive(Debug, Default)]
pub struct MemoryHost {
    document: Mutex<MemoryDocument>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or look up) the container for an item
    pub fn add_container(&self, item_id: &str) -> NodeHandle {
        let mut doc = self.document.lock().unwrap();
        *doc.containers
            .entry(item_id.to_string())
            .or_insert_with(NodeHandle::new)
    }

    /// Drop an item's container and its content
    pub fn remove_container(&self, item_id: &str) -> Option<NodeHandle> {
        let mut doc = self.document.lock().unwrap();
        let node = doc.containers.remove(item_id)?;
        doc.markup.remove(&node);
        Some(node)
    }

    /// Markup rendered for an item
    pub fn markup_for(&self, item_id: &str) -> Option<String> {
        let doc = self.document.lock().unwrap();
        let node = doc.containers.get(item_id)?;
        doc.markup.get(node).cloned()
    }

    /// Every host call so far, in order
    pub fn events(&self) -> Vec<HostEvent> {
        self.document.lock().unwrap().events.clone()
    }

    /// Host calls that touched one node
    pub fn events_for(&self, node: NodeHandle) -> Vec<HostEvent> {
        self.events()
            .into_iter()
            .filter(|event| match event {
                HostEvent::BeginScrollUpdate(n)
                | HostEvent::SetMarkup(n)
                | HostEvent::EndScrollUpdate(n) => *n == node,
            })
            .collect()
    }
}

impl FragmentHost for MemoryHost {
    fn container(&self, item_id: &str) -> Option<NodeHandle> {
        self.document.lock().unwrap().containers.get(item_id).copied()
    }

    fn rendered_markup(&self, node: NodeHandle) -> Option<String> {
        self.document.lock().unwrap().markup.get(&node).cloned()
    }

    fn begin_scroll_update(&self, node: NodeHandle) {
        let mut doc = self.document.lock().unwrap();
        doc.events.push(HostEvent::BeginScrollUpdate(node));
    }

    fn set_markup(&self, node: NodeHandle, markup: &str) {
        let mut doc = self.document.lock().unwrap();
        doc.markup.insert(node, markup.to_string());
        doc.events.push(HostEvent::SetMarkup(node));
    }

    fn end_scroll_update(&self, node: NodeHandle) {
        let mut doc = self.document.lock().unwrap();
        doc.events.push(HostEvent::EndScrollUpdate(node));
    }
}
