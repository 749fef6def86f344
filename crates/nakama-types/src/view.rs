//! Derived view types handed to renderers.
//!
//! Nothing here is written back to the store. A [`FriendsSnapshot`] is built
//! by the session after every applied change and is immutable once published.

use serde::{Deserialize, Serialize};

use crate::graph::FriendRequest;
use crate::identity::Identity;

/// Per-friend state machine. Transitions are monotonic: a later event may
/// lift the phase but never lowers it.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FriendPhase {
    /// Edge seen, display name is the synthesized fallback.
    Provisional,
    /// A real display name has been resolved.
    Named,
    /// Block/permission fields have been attached.
    Annotated,
}

/// Block-derived permission fields for one friend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAnnotation {
    pub is_blocked: bool,
    pub can_chat: bool,
}

impl BlockAnnotation {
    pub fn new(user_blocked: bool, chat_blocked: bool) -> Self {
        Self {
            is_blocked: user_blocked,
            can_chat: !user_blocked && !chat_blocked,
        }
    }
}

/// A friend as shown to the local user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendView {
    pub identity: Identity,
    pub display_name: String,
    /// Edge that first introduced this friend.
    pub edge_id: String,
    pub added_at: Option<u64>,
    pub is_blocked: bool,
    pub can_chat: bool,
    pub phase: FriendPhase,
}

impl FriendView {
    /// A freshly discovered friend with the fallback display name.
    pub fn provisional(identity: Identity, edge_id: impl Into<String>, added_at: Option<u64>) -> Self {
        Self {
            display_name: identity.short(),
            identity,
            edge_id: edge_id.into(),
            added_at,
            is_blocked: false,
            can_chat: true,
            phase: FriendPhase::Provisional,
        }
    }

    pub fn annotation(&self) -> BlockAnnotation {
        BlockAnnotation {
            is_blocked: self.is_blocked,
            can_chat: self.can_chat,
        }
    }
}

/// An incoming request awaiting the local user's decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub request: FriendRequest,
    pub display_name: String,
    /// An accept/reject call is in flight.
    pub processing: bool,
    /// Keys of every store record that produced this entry.
    pub record_keys: Vec<String>,
}

impl PendingRequest {
    pub fn new(request: FriendRequest, record_key: impl Into<String>) -> Self {
        Self {
            display_name: request.from.short(),
            request,
            processing: false,
            record_keys: vec![record_key.into()],
        }
    }

    pub fn from(&self) -> &Identity {
        &self.request.from
    }
}

/// Immutable point-in-time view of the local social graph.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendsSnapshot {
    pub local: Option<Identity>,
    pub friends: Vec<FriendView>,
    pub pending: Vec<PendingRequest>,
    pub selected: Option<Identity>,
    /// Bumped on every applied change.
    pub version: u64,
}

impl FriendsSnapshot {
    pub fn friend(&self, identity: &Identity) -> Option<&FriendView> {
        self.friends.iter().find(|f| f.identity == *identity)
    }

    pub fn pending_from(&self, sender: &Identity) -> Option<&PendingRequest> {
        self.pending.iter().find(|p| p.request.from == *sender)
    }

    pub fn is_empty(&self) -> bool {
        self.friends.is_empty() && self.pending.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
