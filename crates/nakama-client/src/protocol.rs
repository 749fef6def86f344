//! Collaborator contracts consumed by the session.
//!
//! These are implemented elsewhere (the friendship and blocking protocol
//! modules, the notification UI, the selection state). Calls that can fail
//! return [`anyhow::Result`]; the session folds every answer into an
//! [`Outcome`](nakama_types::Outcome) before acting on it.

use async_trait::async_trait;
use nakama_types::{Ack, ChatId, FriendRequest, Identity, Notice};
use serde::{Deserialize, Serialize};

/// Protocol-level friendship operations.
#[async_trait(?Send)]
pub trait FriendProtocol {
    /// Create the friendship for an incoming request.
    async fn accept_friend_request(&self, request: &FriendRequest) -> anyhow::Result<Ack>;

    async fn reject_friend_request(&self, request: &FriendRequest) -> anyhow::Result<()>;

    /// Remove the friendship. The local view follows once the edge tombstone
    /// is observed.
    async fn remove_friend(&self, friend: &Identity) -> anyhow::Result<()>;
}

/// An entry of the user-level block list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedUser {
    pub identity: Identity,
}

/// User-level blocking.
#[async_trait(?Send)]
pub trait UserBlocking {
    async fn blocked_users(&self) -> anyhow::Result<Vec<BlockedUser>>;
    async fn block_user(&self, who: &Identity) -> anyhow::Result<Ack>;
    async fn unblock_user(&self, who: &Identity) -> anyhow::Result<Ack>;
}

/// Chat-level blocking, keyed by canonical pair key.
#[async_trait(?Send)]
pub trait ChatBlocking {
    async fn blocked_chats(&self) -> anyhow::Result<Vec<ChatId>>;
    async fn block_chat(&self, chat: &ChatId) -> anyhow::Result<Ack>;
    async fn unblock_chat(&self, chat: &ChatId) -> anyhow::Result<()>;
}

/// Fire-and-forget user notifications. Never awaited, never affects control
/// flow.
pub trait Notifier {
    fn notify(&self, notice: Notice);
}

/// Receives "deselect" when the selected friend becomes blocked.
pub trait Selection {
    fn deselect(&self);
}

/// A notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        tracing::info!(level = %notice.level, "{}", notice.message);
    }
}

/// A selection sink with nothing to deselect.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSelection;

impl Selection for NoSelection {
    fn deselect(&self) {}
}
