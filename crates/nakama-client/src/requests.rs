//! Incoming friend-request lifecycle.
//!
//! [`RequestBook`] keeps at most one pending entry per sender, however many
//! records the store holds for that sender. Accepting or rejecting moves an
//! entry through `processing` to a terminal state; the store records behind
//! it are then tombstoned by [`purge_request_records`], best effort.
//!
//! ```text
//!   observe ──▶ Pending ──begin──▶ Pending(processing) ──resolve──▶ Accepted | Rejected
//!                  ▲                        │
//!                  └─────────abort──────────┘
//! ```

use std::collections::HashMap;

use indexmap::IndexMap;
use nakama_store::{GraphStore, StoreError, StoreLayout, StorePath};
use nakama_types::{FriendRequest, Identity, PendingRequest, RequestState};
use serde_json::Value;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("no pending request from {}", .0.short())]
    NotPending(Identity),
    #[error("request from {} is already being processed", .0.short())]
    AlreadyProcessing(Identity),
}

/// What [`RequestBook::observe`] did with one store event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObserveEffect {
    /// A new sender became pending.
    Added(Identity),
    /// Another record for an already pending sender.
    Merged(Identity),
    /// The sender's last record vanished; the entry was dropped.
    Withdrawn(Identity),
    /// Nothing visible changed.
    Ignored,
}

#[derive(Debug, Clone, Copy)]
struct Resolution {
    state: RequestState,
    timestamp: Option<u64>,
}

impl Resolution {
    /// Whether a request sent at `timestamp` predates this resolution.
    fn covers(&self, timestamp: Option<u64>) -> bool {
        match (timestamp, self.timestamp) {
            (Some(incoming), Some(resolved)) => incoming <= resolved,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

/// Pending requests addressed to the local user, keyed by sender.
#[derive(Debug, Clone)]
pub struct RequestBook {
    local: Identity,
    pending: IndexMap<Identity, PendingRequest>,
    /// Record key → sender, for every record currently backing an entry.
    records: HashMap<String, Identity>,
    /// Newest timestamp among every record merged into a sender's entry.
    newest: HashMap<Identity, Option<u64>>,
    resolved: HashMap<Identity, Resolution>,
}

impl RequestBook {
    pub fn new(local: Identity) -> Self {
        Self {
            local,
            pending: IndexMap::new(),
            records: HashMap::new(),
            newest: HashMap::new(),
            resolved: HashMap::new(),
        }
    }

    /// Apply one request-index event. `None` is a tombstone.
    pub fn observe(&mut self, record_key: &str, value: Option<&Value>) -> ObserveEffect {
        let Some(value) = value else {
            return self.forget_record(record_key);
        };

        let request = match FriendRequest::from_record(value) {
            Ok(request) => request,
            Err(e) => {
                debug!(record_key, error = %e, "skipping undecodable request record");
                return ObserveEffect::Ignored;
            }
        };
        if request.to != self.local {
            return ObserveEffect::Ignored;
        }

        if let Some(resolution) = self.resolved.get(&request.from) {
            if resolution.covers(request.timestamp) {
                debug!(
                    record_key,
                    from = %request.from.short(),
                    state = %resolution.state,
                    "ignoring replay of a resolved request"
                );
                return ObserveEffect::Ignored;
            }
        }

        let sender = request.from.clone();
        self.records.insert(record_key.to_string(), sender.clone());
        let newest = self.newest.entry(sender.clone()).or_insert(request.timestamp);
        *newest = (*newest).max(request.timestamp);

        if let Some(entry) = self.pending.get_mut(&sender) {
            if !entry.record_keys.iter().any(|k| k == record_key) {
                entry.record_keys.push(record_key.to_string());
            }
            return ObserveEffect::Merged(sender);
        }

        info!(from = %sender.short(), "friend request received");
        self.pending
            .insert(sender.clone(), PendingRequest::new(request, record_key));
        ObserveEffect::Added(sender)
    }

    fn forget_record(&mut self, record_key: &str) -> ObserveEffect {
        let Some(sender) = self.records.remove(record_key) else {
            return ObserveEffect::Ignored;
        };
        let Some(entry) = self.pending.get_mut(&sender) else {
            return ObserveEffect::Ignored;
        };
        entry.record_keys.retain(|k| k != record_key);
        if entry.record_keys.is_empty() && !entry.processing {
            self.pending.shift_remove(&sender);
            self.newest.remove(&sender);
            debug!(from = %sender.short(), "request withdrawn");
            return ObserveEffect::Withdrawn(sender);
        }
        ObserveEffect::Ignored
    }

    /// Mark the sender's entry as in flight and hand back the request.
    pub fn begin(&mut self, from: &Identity) -> Result<FriendRequest, RequestError> {
        let entry = self
            .pending
            .get_mut(from)
            .ok_or_else(|| RequestError::NotPending(from.clone()))?;
        if entry.processing {
            return Err(RequestError::AlreadyProcessing(from.clone()));
        }
        entry.processing = true;
        Ok(entry.request.clone())
    }

    /// Clear the in-flight flag after a failed decision.
    pub fn abort(&mut self, from: &Identity) -> bool {
        match self.pending.get_mut(from) {
            Some(entry) if entry.processing => {
                entry.processing = false;
                true
            }
            _ => false,
        }
    }

    /// Drop the sender's entry with a terminal state.
    pub fn resolve(&mut self, from: &Identity, state: RequestState) -> Option<PendingRequest> {
        debug_assert!(state.is_terminal());
        let entry = self.pending.shift_remove(from)?;
        self.records.retain(|_, sender| sender != from);
        let timestamp = self
            .newest
            .remove(from)
            .unwrap_or(entry.request.timestamp)
            .max(entry.request.timestamp);
        self.resolved.insert(from.clone(), Resolution { state, timestamp });
        Some(entry)
    }

    pub fn set_display_name(&mut self, from: &Identity, name: &str) -> bool {
        match self.pending.get_mut(from) {
            Some(entry) if entry.display_name != name => {
                entry.display_name = name.to_string();
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, from: &Identity) -> Option<&PendingRequest> {
        self.pending.get(from)
    }

    /// Terminal state recorded for a sender this session, if any.
    pub fn resolved_state(&self, from: &Identity) -> Option<RequestState> {
        self.resolved.get(from).map(|r| r.state)
    }

    /// Pending entries in arrival order.
    pub fn pending(&self) -> Vec<PendingRequest> {
        self.pending.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// ============================================================================
// Store cleanup
// ============================================================================

/// Result of a best-effort record purge.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CleanupReport {
    /// Records that were tombstoned.
    pub removed: Vec<StorePath>,
    /// Index scans or deletions that failed. Never retried.
    pub failures: Vec<(StorePath, StoreError)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Tombstone every record from `from` in both the global and the
/// recipient's request index.
///
/// Each scan and each deletion fails on its own; nothing is rolled back.
pub async fn purge_request_records(
    store: &dyn GraphStore,
    layout: &StoreLayout,
    recipient: &Identity,
    from: &Identity,
) -> CleanupReport {
    let mut report = CleanupReport::default();

    for index in [layout.all_requests(), layout.inbox(recipient)] {
        let records = match store.children(&index).await {
            Ok(records) => records,
            Err(e) => {
                warn!(index = %index, error = %e, "request index scan failed");
                report.failures.push((index, e));
                continue;
            }
        };

        for (key, value) in records {
            if !FriendRequest::record_is_from(&value, from) {
                continue;
            }
            let path = index.child(key);
            match store.put(&path, None).await {
                Ok(()) => report.removed.push(path),
                Err(e) => {
                    warn!(path = %path, error = %e, "failed to remove request record");
                    report.failures.push((path, e));
                }
            }
        }
    }

    debug!(
        from = %from.short(),
        removed = report.removed.len(),
        failed = report.failures.len(),
        "request cleanup finished"
    );
    report
}

// ============================================================================
// Tests
// ============================================================================
