//! The [`GraphStore`] trait and its subscription types.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreResult;
use crate::path::StorePath;

/// What a live subscription watches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WatchScope {
    /// The node at the path itself.
    Node,
    /// Every direct child of the path (`map().on()`).
    Children,
}

/// A change pushed to a subscription handler.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreEvent {
    /// Key of the node that changed (the child key for `Children` scope).
    pub key: String,
    /// New value, `None` for a tombstone.
    pub value: Option<Value>,
}

/// Callback invoked for every event on a subscription.
///
/// Handlers run synchronously inside the store's write path, so they must
/// not call back into the store. Forward into a channel instead.
pub type Handler = Box<dyn Fn(StoreEvent)>;

/// Owned handle that detaches a subscription handler.
///
/// Detaches when [`cancel`](Unsubscribe::cancel) is called or when dropped.
pub struct Unsubscribe(Option<Box<dyn FnOnce()>>);

impl Unsubscribe {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    /// A handle with nothing to detach.
    pub fn noop() -> Self {
        Self(None)
    }

    pub fn cancel(mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Unsubscribe").field(&self.0.is_some()).finish()
    }
}

/// Consumer view of a distributed graph store.
///
/// Single-threaded: implementations and handlers are `!Send` and are driven
/// from one `LocalSet`.
#[async_trait(?Send)]
pub trait GraphStore {
    /// One-shot read of a node. `Ok(None)` when nothing is stored.
    async fn once(&self, path: &StorePath) -> StoreResult<Option<Value>>;

    /// One-shot read of every live child of a node, as `(key, value)`.
    async fn children(&self, path: &StorePath) -> StoreResult<Vec<(String, Value)>>;

    /// Write a node. `None` writes the tombstone.
    async fn put(&self, path: &StorePath, value: Option<Value>) -> StoreResult<()>;

    /// Open a live subscription. Current data is replayed to `handler`
    /// before this returns; later changes are pushed as they land.
    fn on(&self, path: &StorePath, scope: WatchScope, handler: Handler) -> StoreResult<Unsubscribe>;
}
