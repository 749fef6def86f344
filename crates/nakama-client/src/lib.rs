//! Nakama social-graph sync engine
//!
//! Maintains a live, locally consistent view of one user's friends, pending
//! friend requests and block state over an eventually consistent graph
//! store. Everything is single-threaded: mount a [`FriendsSession`] inside a
//! `tokio::task::LocalSet` and read [`FriendsSnapshot`](nakama_types::FriendsSnapshot)s
//! from it.

pub mod blocking;
pub mod config;
pub mod constants;
pub mod protocol;
pub mod reconciler;
pub mod requests;
pub mod resolver;
pub mod session;
pub mod subscriptions;

pub use blocking::{fetch_block_lists, BlockLists, BlockOverlay, BlockSignal, BlockSignals};
pub use config::{ClientConfig, ConfigError};
pub use protocol::{
    BlockedUser, ChatBlocking, FriendProtocol, LogNotifier, NoSelection, Notifier, Selection,
    UserBlocking,
};
pub use reconciler::{EdgeEffect, FriendReconciler};
pub use requests::{purge_request_records, CleanupReport, ObserveEffect, RequestBook, RequestError};
pub use resolver::{IdentityResolver, NameSource, ResolvedName};
pub use session::{CleanupTask, Collaborators, FriendsSession, SessionError};
pub use subscriptions::{Delivery, Subscribed, SubscriptionKey, SubscriptionManager};
