//! Friend-list reconciliation.
//!
//! Folds friendship-edge events and nickname events into one deduplicated,
//! order-stable friend list. The store may hold several edges for the same
//! pair and may deliver any event more than once, so the list is keyed by
//! the counterpart identity, never by edge id.
//!
//! # State Machine (per counterpart)
//!
//! ```text
//!   Unknown ──edge──▶ Provisional ──nickname/resolver──▶ Named ──overlay──▶ Annotated
//!                         │                                  ▲                 │
//!                         └──────────────overlay─────────────┼─────────────────┘
//!                                                  (phase never regresses)
//! ```
//!
//! Insertion order follows first-observed edge order. Display is
//! order-insensitive, so no global timestamp ordering is attempted.

use std::collections::HashMap;

use indexmap::IndexMap;
use nakama_types::{BlockAnnotation, FriendPhase, FriendView, FriendshipEdge, Identity};
use serde_json::Value;
use tracing::{debug, trace, warn};

/// What applying an edge event did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EdgeEffect {
    /// First edge for this counterpart: a provisional entry was inserted.
    Discovered(Identity),
    /// Counterpart already known; the entry was left untouched.
    Known(Identity),
    /// The entry's edge vanished but another still links the counterpart;
    /// the entry now points at the surviving edge.
    Rebound(Identity),
    /// The last live edge for this counterpart vanished; the entry was removed.
    Removed(Identity),
    /// The edge does not involve the local user, or is an unknown tombstone.
    Irrelevant,
    /// The record could not be decoded.
    Malformed,
}

/// Owns the [`FriendView`] entries of one session.
#[derive(Debug, Clone)]
pub struct FriendReconciler {
    local: Identity,
    friends: IndexMap<Identity, FriendView>,
    /// Live edge id → counterpart.
    edges: HashMap<String, Identity>,
}

impl FriendReconciler {
    pub fn new(local: Identity) -> Self {
        Self {
            local,
            friends: IndexMap::new(),
            edges: HashMap::new(),
        }
    }

    pub fn local(&self) -> &Identity {
        &self.local
    }

    /// Apply one `friendships/*` event. `None` is a tombstone.
    ///
    /// Usually yields one effect. A record rewritten with different parties
    /// first releases the old counterpart, so it can yield two.
    pub fn apply_edge(&mut self, edge_id: &str, value: Option<&Value>) -> Vec<EdgeEffect> {
        let Some(value) = value else {
            return vec![self.forget_edge(edge_id)];
        };

        let edge = match FriendshipEdge::from_record(edge_id, value) {
            Ok(edge) => edge,
            Err(e) => {
                warn!(edge_id, error = %e, "skipping malformed friendship record");
                return vec![EdgeEffect::Malformed];
            }
        };

        let counterpart = edge.counterpart(&self.local).cloned();
        let mut effects = Vec::with_capacity(1);
        if self
            .edges
            .get(edge_id)
            .is_some_and(|previous| Some(previous) != counterpart.as_ref())
        {
            debug!(edge_id, "edge record changed parties");
            effects.push(self.forget_edge(edge_id));
        }

        let Some(friend) = counterpart else {
            effects.push(EdgeEffect::Irrelevant);
            return effects;
        };
        self.edges.insert(edge_id.to_string(), friend.clone());

        if self.friends.contains_key(&friend) {
            trace!(edge_id, friend = %friend.short(), "edge for known friend");
            effects.push(EdgeEffect::Known(friend));
            return effects;
        }

        debug!(edge_id, friend = %friend.short(), "friend discovered");
        self.friends.insert(
            friend.clone(),
            FriendView::provisional(friend.clone(), edge_id, edge.created),
        );
        effects.push(EdgeEffect::Discovered(friend));
        effects
    }

    fn forget_edge(&mut self, edge_id: &str) -> EdgeEffect {
        let Some(friend) = self.edges.remove(edge_id) else {
            return EdgeEffect::Irrelevant;
        };
        let survivor = self
            .edges
            .iter()
            .filter(|(_, f)| **f == friend)
            .map(|(id, _)| id.as_str())
            .min();
        if let Some(survivor) = survivor {
            return match self.friends.get_mut(&friend) {
                Some(view) if view.edge_id == edge_id => {
                    trace!(edge_id, survivor, "entry moved to a surviving edge");
                    view.edge_id = survivor.to_string();
                    EdgeEffect::Rebound(friend)
                }
                _ => EdgeEffect::Known(friend),
            };
        }
        self.friends.shift_remove(&friend);
        debug!(edge_id, friend = %friend.short(), "last edge gone, friend removed");
        EdgeEffect::Removed(friend)
    }

    /// Apply a live nickname event. Only `display_name` changes.
    ///
    /// Returns whether anything changed.
    pub fn apply_nickname(&mut self, friend: &Identity, nickname: Option<&str>) -> bool {
        let Some(view) = self.friends.get_mut(friend) else {
            return false;
        };
        match nickname.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => {
                let changed = view.display_name != name || view.phase < FriendPhase::Named;
                view.display_name = name.to_string();
                view.phase = view.phase.max(FriendPhase::Named);
                changed
            }
            None => {
                let fallback = friend.short();
                let changed = view.display_name != fallback;
                view.display_name = fallback;
                changed
            }
        }
    }

    /// Apply a one-shot resolver result. Ignored once a live nickname has
    /// named the entry, so the feed always wins over a slower lookup.
    pub fn apply_resolved_name(&mut self, friend: &Identity, name: &str) -> bool {
        match self.friends.get_mut(friend) {
            Some(view) if view.phase == FriendPhase::Provisional => {
                view.display_name = name.to_string();
                view.phase = FriendPhase::Named;
                true
            }
            _ => false,
        }
    }

    /// Attach block/permission fields. Leaves every other field alone.
    pub fn annotate(&mut self, friend: &Identity, annotation: BlockAnnotation) -> bool {
        let Some(view) = self.friends.get_mut(friend) else {
            return false;
        };
        let changed = view.annotation() != annotation || view.phase != FriendPhase::Annotated;
        view.is_blocked = annotation.is_blocked;
        view.can_chat = annotation.can_chat;
        view.phase = FriendPhase::Annotated;
        changed
    }

    pub fn get(&self, friend: &Identity) -> Option<&FriendView> {
        self.friends.get(friend)
    }

    pub fn contains(&self, friend: &Identity) -> bool {
        self.friends.contains_key(friend)
    }

    pub fn identities(&self) -> Vec<Identity> {
        self.friends.keys().cloned().collect()
    }

    /// All entries, in first-observed order.
    pub fn views(&self) -> Vec<FriendView> {
        self.friends.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.friends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.friends.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
