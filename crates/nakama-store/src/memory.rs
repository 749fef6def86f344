//! In-memory graph store.
//!
//! Used by tests and the `nakama` CLI. All data is ephemeral. Handlers are
//! invoked synchronously on write, after the internal borrow is released, so
//! a handler that forwards into a channel never observes a locked store.
//!
//! Fault injection lets tests model a flaky peer: [`MemoryStore::fail`] makes
//! every operation on a path error, [`MemoryStore::stall`] makes one-shot
//! reads on it never complete.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::{Rc, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use crate::error::{StoreError, StoreResult};
use crate::ops::{GraphStore, Handler, StoreEvent, Unsubscribe, WatchScope};
use crate::path::StorePath;

struct Watcher {
    id: u64,
    path: StorePath,
    scope: WatchScope,
    handler: Rc<dyn Fn(StoreEvent)>,
}

#[derive(Default)]
struct Inner {
    nodes: BTreeMap<StorePath, Value>,
    watchers: Vec<Watcher>,
    next_watcher_id: u64,
    failing: HashSet<StorePath>,
    stalled: HashSet<StorePath>,
}

impl Inner {
    fn check(&self, path: &StorePath) -> StoreResult<()> {
        if self.failing.contains(path) {
            return Err(StoreError::unavailable(path));
        }
        Ok(())
    }

    /// Handlers interested in a change at `path`.
    fn interested(&self, path: &StorePath) -> Vec<Rc<dyn Fn(StoreEvent)>> {
        self.watchers
            .iter()
            .filter(|w| match w.scope {
                WatchScope::Node => w.path == *path,
                WatchScope::Children => path.is_child_of(&w.path),
            })
            .map(|w| w.handler.clone())
            .collect()
    }

    fn children_of(&self, path: &StorePath) -> Vec<(String, Value)> {
        self.nodes
            .range(path.clone()..)
            .take_while(|(k, _)| k.starts_with(path))
            .filter(|(k, _)| k.is_child_of(path))
            .filter_map(|(k, v)| k.key().map(|key| (key.to_string(), v.clone())))
            .collect()
    }
}

/// Ephemeral, single-threaded graph store.
///
/// Cloning shares the same underlying graph.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous write, notifying subscribers. `None` tombstones the node.
    pub fn write(&self, path: &StorePath, value: Option<Value>) -> StoreResult<()> {
        let handlers = {
            let mut inner = self.inner.borrow_mut();
            inner.check(path)?;
            match &value {
                Some(v) => {
                    inner.nodes.insert(path.clone(), v.clone());
                }
                None => {
                    inner.nodes.remove(path);
                }
            }
            inner.interested(path)
        };

        trace!(path = %path, tombstone = value.is_none(), subscribers = handlers.len(), "store write");

        let key = path.key().unwrap_or_default().to_string();
        for handler in handlers {
            handler(StoreEvent {
                key: key.clone(),
                value: value.clone(),
            });
        }
        Ok(())
    }

    /// Current value of a node, bypassing fault injection.
    pub fn get(&self, path: &StorePath) -> Option<Value> {
        self.inner.borrow().nodes.get(path).cloned()
    }

    /// Number of live subscriptions, across all paths.
    pub fn watcher_count(&self) -> usize {
        self.inner.borrow().watchers.len()
    }

    /// Number of live subscriptions on one path.
    pub fn watchers_on(&self, path: &StorePath) -> usize {
        self.inner.borrow().watchers.iter().filter(|w| w.path == *path).count()
    }

    /// Make reads and writes on `path` fail until [`heal`](Self::heal).
    pub fn fail(&self, path: &StorePath) {
        self.inner.borrow_mut().failing.insert(path.clone());
    }

    /// Make one-shot reads on `path` hang until [`heal`](Self::heal).
    pub fn stall(&self, path: &StorePath) {
        self.inner.borrow_mut().stalled.insert(path.clone());
    }

    pub fn heal(&self, path: &StorePath) {
        let mut inner = self.inner.borrow_mut();
        inner.failing.remove(path);
        inner.stalled.remove(path);
    }

    fn detach(inner: &Weak<RefCell<Inner>>, id: u64) {
        if let Some(inner) = inner.upgrade() {
            inner.borrow_mut().watchers.retain(|w| w.id != id);
        }
    }
}

#[async_trait(?Send)]
impl GraphStore for MemoryStore {
    async fn once(&self, path: &StorePath) -> StoreResult<Option<Value>> {
        let stalled = {
            let inner = self.inner.borrow();
            inner.check(path)?;
            inner.stalled.contains(path)
        };
        if stalled {
            std::future::pending::<()>().await;
        }
        Ok(self.inner.borrow().nodes.get(path).cloned())
    }

    async fn children(&self, path: &StorePath) -> StoreResult<Vec<(String, Value)>> {
        let inner = self.inner.borrow();
        inner.check(path)?;
        Ok(inner.children_of(path))
    }

    async fn put(&self, path: &StorePath, value: Option<Value>) -> StoreResult<()> {
        self.write(path, value)
    }

    fn on(&self, path: &StorePath, scope: WatchScope, handler: Handler) -> StoreResult<Unsubscribe> {
        let handler: Rc<dyn Fn(StoreEvent)> = Rc::from(handler);
        let (id, replay) = {
            let mut inner = self.inner.borrow_mut();
            inner.check(path)?;
            let id = inner.next_watcher_id;
            inner.next_watcher_id += 1;
            inner.watchers.push(Watcher {
                id,
                path: path.clone(),
                scope,
                handler: handler.clone(),
            });
            let replay: Vec<(String, Value)> = match scope {
                WatchScope::Node => inner
                    .nodes
                    .get(path)
                    .map(|v| (path.key().unwrap_or_default().to_string(), v.clone()))
                    .into_iter()
                    .collect(),
                WatchScope::Children => inner.children_of(path),
            };
            (id, replay)
        };

        for (key, value) in replay {
            handler(StoreEvent { key, value: Some(value) });
        }

        let weak = Rc::downgrade(&self.inner);
        Ok(Unsubscribe::new(move || Self::detach(&weak, id)))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> StorePath {
        let mut segments = s.split('/');
        let mut p = StorePath::root(segments.next().unwrap());
        for seg in segments {
            p = p.child(seg);
        }
        p
    }

    fn recorder() -> (Rc<RefCell<Vec<StoreEvent>>>, Handler) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        (seen, Box::new(move |ev| sink.borrow_mut().push(ev)))
    }

    #[tokio::test]
    async fn test_once_and_tombstone() {
        let store = MemoryStore::new();
        let p = path("app/userList/nicknames/pk1");
        assert_eq!(store.once(&p).await.unwrap(), None);
        store.put(&p, Some(json!("amy"))).await.unwrap();
        assert_eq!(store.once(&p).await.unwrap(), Some(json!("amy")));
        store.put(&p, None).await.unwrap();
        assert_eq!(store.once(&p).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_children_only_direct() {
        let store = MemoryStore::new();
        store.write(&path("app/reqs/a"), Some(json!({ "from": "x" }))).unwrap();
        store.write(&path("app/reqs/b"), Some(json!({ "from": "y" }))).unwrap();
        store.write(&path("app/reqs/b/deep"), Some(json!(1))).unwrap();
        store.write(&path("app/reqs0"), Some(json!(2))).unwrap();

        let kids = store.children(&path("app/reqs")).await.unwrap();
        let keys: Vec<_> = kids.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_children_watch_replays_then_streams() {
        let store = MemoryStore::new();
        store.write(&path("app/friendships/e1"), Some(json!({ "user1": "a", "user2": "b" }))).unwrap();

        let (seen, handler) = recorder();
        let unsub = store.on(&path("app/friendships"), WatchScope::Children, handler).unwrap();
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0].key, "e1");

        store.write(&path("app/friendships/e2"), Some(json!({ "user1": "a", "user2": "c" }))).unwrap();
        store.write(&path("app/friendships/e1"), None).unwrap();
        assert_eq!(seen.borrow().len(), 3);
        assert_eq!(seen.borrow()[2], StoreEvent { key: "e1".into(), value: None });

        unsub.cancel();
        store.write(&path("app/friendships/e3"), Some(json!({}))).unwrap();
        assert_eq!(seen.borrow().len(), 3, "no delivery after cancel");
        assert_eq!(store.watcher_count(), 0);
    }

    #[test]
    fn test_node_watch_ignores_siblings() {
        let store = MemoryStore::new();
        let (seen, handler) = recorder();
        let _unsub = store.on(&path("app/nick/pk1"), WatchScope::Node, handler).unwrap();
        assert!(seen.borrow().is_empty(), "nothing to replay");

        store.write(&path("app/nick/pk2"), Some(json!("bob"))).unwrap();
        store.write(&path("app/nick/pk1"), Some(json!("amy"))).unwrap();
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0].value, Some(json!("amy")));
    }

    #[test]
    fn test_drop_detaches() {
        let store = MemoryStore::new();
        let (_seen, handler) = recorder();
        {
            let _unsub = store.on(&path("app/x"), WatchScope::Node, handler).unwrap();
            assert_eq!(store.watchers_on(&path("app/x")), 1);
        }
        assert_eq!(store.watcher_count(), 0);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = MemoryStore::new();
        let p = path("app/reqs");
        store.fail(&p);
        assert_eq!(store.children(&p).await, Err(StoreError::unavailable(&p)));
        assert!(store.put(&p, None).await.is_err());
        store.heal(&p);
        assert!(store.children(&p).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_read_never_completes() {
        let store = MemoryStore::new();
        let p = path("~pk1");
        store.stall(&p);
        let res = tokio::time::timeout(std::time::Duration::from_millis(50), store.once(&p)).await;
        assert!(res.is_err(), "stalled read should time out");
    }
}
