//! Block-state overlay and the block signal bus.
//!
//! Two independent block lists feed the overlay: user-level blocks keyed by
//! identity, and chat-level blocks keyed by [`ChatId::for_pair`]. A friend's
//! annotation is always derived from both:
//!
//! ```text
//!   is_blocked = user_blocked(I)
//!   can_chat   = !user_blocked(I) && !chat_blocked(for_pair(local, I))
//! ```
//!
//! Blocks made elsewhere in the process arrive as [`BlockSignal`]s on a
//! [`BlockSignals`] bus. Each session subscribes and merges signals exactly
//! like a local block, so a signal and a full refresh always agree.

use std::collections::HashSet;

use nakama_types::{BlockAnnotation, ChatId, Identity};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::protocol::{ChatBlocking, UserBlocking};

/// Result of fetching both block lists. A failed half is empty and carries
/// its error message.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BlockLists {
    pub users: HashSet<Identity>,
    pub chats: HashSet<ChatId>,
    pub user_error: Option<String>,
    pub chat_error: Option<String>,
}

impl BlockLists {
    pub fn is_complete(&self) -> bool {
        self.user_error.is_none() && self.chat_error.is_none()
    }
}

/// Fetch the user and chat block lists concurrently.
///
/// Neither failure affects the other half.
pub async fn fetch_block_lists(users: &dyn UserBlocking, chats: &dyn ChatBlocking) -> BlockLists {
    let (user_result, chat_result) = futures::join!(users.blocked_users(), chats.blocked_chats());
    let mut lists = BlockLists::default();

    match user_result {
        Ok(blocked) => lists.users = blocked.into_iter().map(|b| b.identity).collect(),
        Err(e) => {
            warn!(error = %e, "failed to load blocked users");
            lists.user_error = Some(e.to_string());
        }
    }
    match chat_result {
        Ok(blocked) => lists.chats = blocked.into_iter().collect(),
        Err(e) => {
            warn!(error = %e, "failed to load blocked chats");
            lists.chat_error = Some(e.to_string());
        }
    }

    debug!(users = lists.users.len(), chats = lists.chats.len(), "block lists loaded");
    lists
}

/// A local block change, kept while a fetch is in flight.
#[derive(Debug, Clone)]
enum LocalChange {
    User(Identity, bool),
    Chat(ChatId, bool),
}

/// Marks where a block-list fetch started. Hand it back to
/// [`BlockOverlay::finish_fetch`] with the fetched lists.
#[must_use]
#[derive(Debug)]
pub struct FetchTicket {
    since: usize,
}

/// Locally known block state.
///
/// Fetched lists can be older than changes applied while the fetch was in
/// flight, so those changes are journaled and replayed over the result.
#[derive(Debug, Default, Clone)]
pub struct BlockOverlay {
    users: HashSet<Identity>,
    chats: HashSet<ChatId>,
    loaded: bool,
    fetching: usize,
    journal: Vec<LocalChange>,
}

impl BlockOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a fetch has completed at least once.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Replace both sets with freshly fetched lists.
    pub fn replace(&mut self, lists: BlockLists) {
        self.users = lists.users;
        self.chats = lists.chats;
        self.loaded = true;
    }

    /// Start journaling local changes until the matching `finish_fetch`.
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.fetching += 1;
        FetchTicket { since: self.journal.len() }
    }

    /// Install fetched lists, then replay every local change made since the
    /// fetch began.
    pub fn finish_fetch(&mut self, ticket: FetchTicket, lists: BlockLists) {
        self.replace(lists);
        let replay = self.journal.get(ticket.since..).unwrap_or_default().to_vec();
        if !replay.is_empty() {
            debug!(changes = replay.len(), "replaying local block changes over fetched lists");
        }
        for change in replay {
            match change {
                LocalChange::User(who, blocked) => Self::set(&mut self.users, who, blocked),
                LocalChange::Chat(chat, blocked) => Self::set(&mut self.chats, chat, blocked),
            };
        }
        self.fetching = self.fetching.saturating_sub(1);
        if self.fetching == 0 {
            self.journal.clear();
        }
    }

    /// Returns whether the set changed.
    pub fn set_user_blocked(&mut self, who: &Identity, blocked: bool) -> bool {
        if self.fetching > 0 {
            self.journal.push(LocalChange::User(who.clone(), blocked));
        }
        Self::set(&mut self.users, who.clone(), blocked)
    }

    pub fn set_chat_blocked(&mut self, chat: &ChatId, blocked: bool) -> bool {
        if self.fetching > 0 {
            self.journal.push(LocalChange::Chat(chat.clone(), blocked));
        }
        Self::set(&mut self.chats, chat.clone(), blocked)
    }

    fn set<T: std::hash::Hash + Eq>(set: &mut HashSet<T>, item: T, present: bool) -> bool {
        if present {
            set.insert(item)
        } else {
            set.remove(&item)
        }
    }

    pub fn is_user_blocked(&self, who: &Identity) -> bool {
        self.users.contains(who)
    }

    pub fn is_chat_blocked(&self, chat: &ChatId) -> bool {
        self.chats.contains(chat)
    }

    pub fn annotation_for(&self, local: &Identity, friend: &Identity) -> BlockAnnotation {
        BlockAnnotation::new(
            self.is_user_blocked(friend),
            self.is_chat_blocked(&ChatId::for_pair(local, friend)),
        )
    }
}

// ============================================================================
// Signal bus
// ============================================================================

/// A block state change announced to every session in the process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockSignal {
    Blocked(Identity),
    Unblocked(Identity),
}

impl BlockSignal {
    pub fn new(identity: Identity, blocked: bool) -> Self {
        if blocked {
            BlockSignal::Blocked(identity)
        } else {
            BlockSignal::Unblocked(identity)
        }
    }

    pub fn identity(&self) -> &Identity {
        match self {
            BlockSignal::Blocked(id) | BlockSignal::Unblocked(id) => id,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, BlockSignal::Blocked(_))
    }
}

/// Process-wide broadcast of [`BlockSignal`]s.
///
/// Cloning shares the bus. Receivers that fall behind by more than the
/// capacity observe a lag and must resynchronize from the block lists.
#[derive(Clone, Debug)]
pub struct BlockSignals {
    tx: broadcast::Sender<BlockSignal>,
}

impl BlockSignals {
    /// `capacity` must be positive.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Announce a change. Returns how many listeners received it.
    pub fn emit(&self, signal: BlockSignal) -> usize {
        self.tx.send(signal).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BlockSignal> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

// ============================================================================
// Tests
// ============================================================================
