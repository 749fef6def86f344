//! Graph store contract for nakama.
//!
//! The social graph lives in an eventually-consistent, multi-writer graph
//! store. This crate names the small slice of that store the sync engine
//! consumes (one-shot reads, child scans, tombstoning writes and live
//! subscriptions) behind the [`GraphStore`] trait, plus the persisted path
//! layout ([`StoreLayout`]) and an in-process backend ([`MemoryStore`]).
//!
//! # Store Contract
//!
//! ```text
//!   get(path).once()        → GraphStore::once
//!   get(path).map().once()  → GraphStore::children
//!   get(path).put(v | null) → GraphStore::put   (None = tombstone)
//!   get(path).on(h)         → GraphStore::on(.., WatchScope::Node, h)
//!   get(path).map().on(h)   → GraphStore::on(.., WatchScope::Children, h)
//! ```
//!
//! The store guarantees neither delivery order across paths nor exactly-once
//! delivery. Consumers must merge idempotently.

pub mod error;
pub mod memory;
pub mod ops;
pub mod path;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use ops::{GraphStore, Handler, StoreEvent, Unsubscribe, WatchScope};
pub use path::{StoreLayout, StorePath};
