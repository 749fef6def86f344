//! Live subscription bookkeeping.
//!
//! Every store subscription the session opens is tracked here under a
//! [`SubscriptionKey`], one per logical entity (the friendship list, the
//! request index, one nickname feed per friend). Store handlers never touch
//! session state: they tag each event with its key and generation and push
//! it into a [`DeliverySink`]. The session's delivery loop drains the
//! matching [`DeliveryQueue`] and applies a delivery only if
//! [`SubscriptionManager::is_current`] still holds, so nothing a cancelled
//! subscription delivers late is ever observable.
//!
//! ```text
//!   store handler ──Delivery{key, generation}──▶ DeliveryQueue ──▶ session loop
//!                                                                  │
//!                         SubscriptionManager::is_current? ◀───────┘
//! ```
//!
//! Subscriptions form a tree: a child (a friend's nickname feed) records the
//! parent that caused it (the friendship list), and cancelling a parent
//! cancels its whole subtree.

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use nakama_store::{GraphStore, StoreEvent, StorePath, StoreResult, Unsubscribe, WatchScope};
use nakama_types::Identity;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Logical identity of a subscription.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionKey {
    /// `friendships/*`
    Friendships,
    /// `all_friend_requests/*`
    Requests,
    /// `userList/nicknames/{id}` for one friend.
    Nickname(Identity),
}

impl fmt::Debug for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionKey::Friendships => f.write_str("friendships"),
            SubscriptionKey::Requests => f.write_str("requests"),
            SubscriptionKey::Nickname(id) => write!(f, "nickname:{}", id.short()),
        }
    }
}

/// A store event tagged with the subscription that produced it.
#[derive(Clone, Debug)]
pub struct Delivery {
    pub key: SubscriptionKey,
    pub generation: u64,
    pub event: StoreEvent,
}

/// Sending half of the delivery channel, handed to store handlers.
#[derive(Clone)]
pub struct DeliverySink {
    tx: mpsc::UnboundedSender<Delivery>,
    queued: Rc<Cell<usize>>,
}

impl DeliverySink {
    fn send(&self, delivery: Delivery) {
        if self.tx.send(delivery).is_ok() {
            self.queued.set(self.queued.get() + 1);
        }
    }
}

/// Receiving half of the delivery channel, drained by the session loop.
pub struct DeliveryQueue {
    rx: mpsc::UnboundedReceiver<Delivery>,
    queued: Rc<Cell<usize>>,
}

impl DeliveryQueue {
    pub async fn recv(&mut self) -> Option<Delivery> {
        let delivery = self.rx.recv().await?;
        self.queued.set(self.queued.get().saturating_sub(1));
        Some(delivery)
    }
}

/// Create a linked sink/queue pair plus a shared count of deliveries sent but
/// not yet received.
pub fn delivery_channel() -> (DeliverySink, DeliveryQueue, Rc<Cell<usize>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let queued = Rc::new(Cell::new(0));
    (
        DeliverySink { tx, queued: queued.clone() },
        DeliveryQueue { rx, queued: queued.clone() },
        queued,
    )
}

/// Result of [`SubscriptionManager::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Subscribed {
    Opened { generation: u64 },
    /// The key already has a live subscription; nothing was opened.
    AlreadyLive,
    /// The requested parent is not live; nothing was opened.
    ParentGone,
}

struct Entry {
    generation: u64,
    parent: Option<SubscriptionKey>,
    path: StorePath,
    unsubscribe: Unsubscribe,
}

/// Owned map from subscription key to its cancellation handle.
pub struct SubscriptionManager {
    store: Rc<dyn GraphStore>,
    sink: DeliverySink,
    entries: HashMap<SubscriptionKey, Entry>,
    next_generation: u64,
}

impl SubscriptionManager {
    pub fn new(store: Rc<dyn GraphStore>, sink: DeliverySink) -> Self {
        Self {
            store,
            sink,
            entries: HashMap::new(),
            next_generation: 1,
        }
    }

    /// Open a subscription for `key` unless one is already live.
    ///
    /// `parent` must be live if given; the new subscription is cancelled
    /// together with it.
    pub fn subscribe(
        &mut self,
        key: SubscriptionKey,
        parent: Option<SubscriptionKey>,
        path: StorePath,
        scope: WatchScope,
    ) -> StoreResult<Subscribed> {
        if self.entries.contains_key(&key) {
            trace!(?key, "subscription already live");
            return Ok(Subscribed::AlreadyLive);
        }
        if let Some(parent) = &parent {
            if !self.entries.contains_key(parent) {
                debug!(?key, ?parent, "parent not live, refusing child subscription");
                return Ok(Subscribed::ParentGone);
            }
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        let sink = self.sink.clone();
        let tag = key.clone();
        let unsubscribe = self.store.on(
            &path,
            scope,
            Box::new(move |event| {
                sink.send(Delivery {
                    key: tag.clone(),
                    generation,
                    event,
                })
            }),
        )?;

        debug!(?key, path = %path, generation, "subscription opened");
        self.entries.insert(
            key,
            Entry {
                generation,
                parent,
                path,
                unsubscribe,
            },
        );
        Ok(Subscribed::Opened { generation })
    }

    /// Cancel `key` and every subscription descending from it.
    ///
    /// Returns how many subscriptions were cancelled.
    pub fn cancel(&mut self, key: &SubscriptionKey) -> usize {
        if !self.entries.contains_key(key) {
            return 0;
        }

        let mut doomed = vec![key.clone()];
        let mut i = 0;
        while i < doomed.len() {
            let current = doomed[i].clone();
            doomed.extend(
                self.entries
                    .iter()
                    .filter(|(_, e)| e.parent.as_ref() == Some(&current))
                    .map(|(k, _)| k.clone()),
            );
            i += 1;
        }

        let mut cancelled = 0;
        for key in doomed {
            if let Some(entry) = self.entries.remove(&key) {
                trace!(?key, path = %entry.path, generation = entry.generation, "subscription cancelled");
                entry.unsubscribe.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Cancel everything. Returns how many subscriptions were cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.entries.len();
        for (key, entry) in self.entries.drain() {
            trace!(?key, path = %entry.path, "subscription cancelled at teardown");
            entry.unsubscribe.cancel();
        }
        count
    }

    /// Whether a delivery comes from a subscription that is still live.
    pub fn is_current(&self, delivery: &Delivery) -> bool {
        self.entries
            .get(&delivery.key)
            .is_some_and(|e| e.generation == delivery.generation)
    }

    pub fn is_live(&self, key: &SubscriptionKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn children_of(&self, parent: &SubscriptionKey) -> Vec<SubscriptionKey> {
        self.entries
            .iter()
            .filter(|(_, e)| e.parent.as_ref() == Some(parent))
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use nakama_store::{MemoryStore, StoreLayout};
    use serde_json::json;

    fn id(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    fn setup() -> (MemoryStore, StoreLayout, SubscriptionManager, DeliveryQueue, Rc<Cell<usize>>) {
        let store = MemoryStore::new();
        let (sink, queue, queued) = delivery_channel();
        let manager = SubscriptionManager::new(Rc::new(store.clone()), sink);
        (store, StoreLayout::new("dapp"), manager, queue, queued)
    }

    fn open_tree(manager: &mut SubscriptionManager, layout: &StoreLayout, friends: &[&str]) {
        manager
            .subscribe(SubscriptionKey::Friendships, None, layout.friendships(), WatchScope::Children)
            .unwrap();
        for f in friends {
            let friend = id(f);
            manager
                .subscribe(
                    SubscriptionKey::Nickname(friend.clone()),
                    Some(SubscriptionKey::Friendships),
                    layout.nickname(&friend),
                    WatchScope::Node,
                )
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_duplicate_subscribe_is_noop() {
        let (store, layout, mut manager, _queue, _) = setup();
        let first = manager
            .subscribe(SubscriptionKey::Requests, None, layout.all_requests(), WatchScope::Children)
            .unwrap();
        let second = manager
            .subscribe(SubscriptionKey::Requests, None, layout.all_requests(), WatchScope::Children)
            .unwrap();
        assert!(matches!(first, Subscribed::Opened { .. }));
        assert_eq!(second, Subscribed::AlreadyLive);
        assert_eq!(store.watcher_count(), 1);
    }

    #[tokio::test]
    async fn test_deliveries_are_tagged_and_counted() {
        let (store, layout, mut manager, mut queue, queued) = setup();
        store.write(&layout.friendship("e1"), Some(json!({ "user1": "a", "user2": "b" }))).unwrap();
        open_tree(&mut manager, &layout, &[]);
        store.write(&layout.friendship("e2"), Some(json!({ "user1": "a", "user2": "c" }))).unwrap();

        assert_eq!(queued.get(), 2);
        let first = queue.recv().await.unwrap();
        assert_eq!(first.key, SubscriptionKey::Friendships);
        assert_eq!(first.event.key, "e1");
        assert!(manager.is_current(&first));
        queue.recv().await.unwrap();
        assert_eq!(queued.get(), 0);
    }

    #[tokio::test]
    async fn test_cancel_parent_cancels_children() {
        let (store, layout, mut manager, _queue, _) = setup();
        open_tree(&mut manager, &layout, &["bob", "carol"]);
        manager
            .subscribe(SubscriptionKey::Requests, None, layout.all_requests(), WatchScope::Children)
            .unwrap();
        assert_eq!(store.watcher_count(), 4);
        assert_eq!(manager.children_of(&SubscriptionKey::Friendships).len(), 2);

        assert_eq!(manager.cancel(&SubscriptionKey::Friendships), 3);
        assert!(!manager.is_live(&SubscriptionKey::Nickname(id("bob"))));
        assert!(manager.is_live(&SubscriptionKey::Requests));
        assert_eq!(store.watcher_count(), 1);
        assert_eq!(manager.cancel(&SubscriptionKey::Friendships), 0);
    }

    #[tokio::test]
    async fn test_child_requires_live_parent() {
        let (store, layout, mut manager, _queue, _) = setup();
        let res = manager
            .subscribe(
                SubscriptionKey::Nickname(id("bob")),
                Some(SubscriptionKey::Friendships),
                layout.nickname(&id("bob")),
                WatchScope::Node,
            )
            .unwrap();
        assert_eq!(res, Subscribed::ParentGone);
        assert_eq!(store.watcher_count(), 0);
        assert!(!manager.is_live(&SubscriptionKey::Nickname(id("bob"))));
    }

    #[tokio::test]
    async fn test_late_delivery_after_cancel_is_stale() {
        let (store, layout, mut manager, mut queue, _) = setup();
        open_tree(&mut manager, &layout, &["bob"]);
        let bob = id("bob");
        store.write(&layout.nickname(&bob), Some(json!("Bob"))).unwrap();
        let in_flight = queue.recv().await.unwrap();

        manager.cancel(&SubscriptionKey::Nickname(bob.clone()));
        assert!(!manager.is_current(&in_flight));

        // Re-opening the same key gets a new generation; the old delivery
        // stays stale.
        manager
            .subscribe(
                SubscriptionKey::Nickname(bob.clone()),
                Some(SubscriptionKey::Friendships),
                layout.nickname(&bob),
                WatchScope::Node,
            )
            .unwrap();
        assert!(!manager.is_current(&in_flight));
        let replayed = queue.recv().await.unwrap();
        assert!(manager.is_current(&replayed));
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let (store, layout, mut manager, _queue, _) = setup();
        open_tree(&mut manager, &layout, &["bob", "carol"]);
        assert_eq!(manager.cancel_all(), 3);
        assert!(manager.is_empty());
        assert_eq!(store.watcher_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_error_propagates() {
        let (store, layout, mut manager, _queue, _) = setup();
        store.fail(&layout.friendships());
        let err = manager
            .subscribe(SubscriptionKey::Friendships, None, layout.friendships(), WatchScope::Children)
            .unwrap_err();
        assert_eq!(err, nakama_store::StoreError::unavailable(layout.friendships()));
        assert!(manager.is_empty());
    }
}
