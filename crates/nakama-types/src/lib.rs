//! Shared identity, graph, and view types for nakama.
//!
//! This crate is the relational foundation of the social-graph sync engine.
//! It has **no internal nakama dependencies**: a pure leaf crate that the
//! store and client crates build on.
//!
//! # Entity-Relationship Overview
//!
//! ```text
//! Identity (public key) ← the join key for everything below
//!     └── party to FriendshipEdge (undirected, user1/user2)
//!     └── sends/receives FriendRequest (from → to)
//!     └── blocked via user-level block set
//!     └── pairs into ChatId (sorted + joined) for chat-level blocks
//!
//! FriendView ← derived per counterpart identity, never stored
//!     └── phase: Provisional → Named → Annotated
//!     └── can_chat = !user_blocked && !chat_blocked
//! ```
//!
//! # Key Types
//!
//! |---------------------|------------------------------------------------|
//! | Type                | Purpose                                        |
//! |---------------------|------------------------------------------------|
//! | [`Identity`]        | Opaque public key, primary join key            |
//! | [`ChatId`]          | Canonical, order-independent pair key          |
//! | [`FriendshipEdge`]  | Undirected friendship record from the store    |
//! | [`FriendRequest`]   | Incoming/outgoing request record               |
//! | [`FriendView`]      | Derived per-friend view entry                  |
//! | [`PendingRequest`]  | Pending request as shown to the local user     |
//! | [`FriendsSnapshot`] | Immutable point-in-time view for renderers     |
//! | [`Outcome`]         | Unified protocol result (Ok/Declined/Failed)   |
//! |---------------------|------------------------------------------------|

pub mod graph;
pub mod identity;
pub mod outcome;
pub mod view;

// Re-export primary types at crate root for convenience.
pub use graph::{FriendRequest, FriendshipEdge, RecordError, RequestState};
pub use identity::{ChatId, Identity, IdentityError};
pub use outcome::{Ack, Notice, NoticeLevel, Outcome};
pub use view::{BlockAnnotation, FriendPhase, FriendView, FriendsSnapshot, PendingRequest};

/// Current time as Unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
