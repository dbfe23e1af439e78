//! # fragkit Loader Library (fragkit-loader)
//!
//! Batched loading of server-rendered fragments.
//!
//! **Purpose:** A page that must render many small fragments (one per inline
//! comment, say) grouped under a coarser batch key (the file they belong to)
//! enqueues them here. A flush issues one request per batch key, replays
//! locally saved fragments without touching the network, and fans the framed
//! response back out to per-item views.
//!
//! **Architecture:** `FragmentLoader` owns the pending queue, the
//! saved-fragment cache and the view registry. Network batches go through a
//! single-flight `BatchDispatcher` task, so at most one batched request is
//! in flight at a time, in flush order.

pub mod cache;
pub mod dispatcher;
pub mod error;
pub mod host;
pub mod loader;
pub mod queue;
mod render;
pub mod transport;
pub mod view;

pub use dispatcher::BatchOutcome;
pub use error::{LoaderError, Result};
pub use host::{FragmentHost, MemoryHost};
pub use loader::{FlushHandle, FragmentLoader, LoaderStats};
pub use transport::{BatchRequest, FragmentTransport, HttpTransport, TransportError};
pub use view::{FragmentView, NodeHandle};
