//! Friendship edges and friend requests as they appear in the store.
//!
//! Store records are loose JSON objects written by many clients; decoding is
//! lenient about extra fields (store metadata) and about the timestamp shape,
//! strict about the identity fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::{Identity, IdentityError};

/// Errors decoding a store record.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid identity in record: {0}")]
    Identity(#[from] IdentityError),
}

/// Read a millisecond timestamp from either a number or a numeric string.
fn millis(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[derive(Deserialize)]
struct EdgeRecord {
    user1: String,
    user2: String,
    #[serde(default)]
    created: Option<Value>,
}

/// An undirected friendship between two identities.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendshipEdge {
    /// Store key of the edge record. Not a dedup key: the store may hold
    /// several edges for the same pair.
    pub id: String,
    pub user1: Identity,
    pub user2: Identity,
    /// Creation time in Unix milliseconds, when the writer recorded one.
    pub created: Option<u64>,
}

impl FriendshipEdge {
    pub fn from_record(id: &str, value: &Value) -> Result<Self, RecordError> {
        let record = EdgeRecord::deserialize(value)?;
        Ok(Self {
            id: id.to_string(),
            user1: Identity::new(record.user1)?,
            user2: Identity::new(record.user2)?,
            created: millis(record.created.as_ref()),
        })
    }

    /// Store representation of this edge.
    pub fn to_record(&self) -> Value {
        serde_json::json!({
            "user1": self.user1.as_str(),
            "user2": self.user2.as_str(),
            "created": self.created,
        })
    }

    pub fn involves(&self, who: &Identity) -> bool {
        self.user1 == *who || self.user2 == *who
    }

    /// The endpoint that is not `local`. `None` when `local` is not a party,
    /// or for a degenerate self-edge.
    pub fn counterpart(&self, local: &Identity) -> Option<&Identity> {
        if self.user1 == self.user2 {
            return None;
        }
        if self.user1 == *local {
            Some(&self.user2)
        } else if self.user2 == *local {
            Some(&self.user1)
        } else {
            None
        }
    }
}

#[derive(Deserialize)]
struct RequestRecord {
    from: String,
    to: String,
    #[serde(default)]
    timestamp: Option<Value>,
}

/// A friend request from one identity to another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequest {
    pub from: Identity,
    pub to: Identity,
    /// Send time in Unix milliseconds, when the sender recorded one.
    pub timestamp: Option<u64>,
}

impl FriendRequest {
    pub fn new(from: Identity, to: Identity, timestamp: Option<u64>) -> Self {
        Self { from, to, timestamp }
    }

    pub fn from_record(value: &Value) -> Result<Self, RecordError> {
        let record = RequestRecord::deserialize(value)?;
        Ok(Self {
            from: Identity::new(record.from)?,
            to: Identity::new(record.to)?,
            timestamp: millis(record.timestamp.as_ref()),
        })
    }

    /// Store representation of this request.
    pub fn to_record(&self) -> Value {
        serde_json::json!({
            "from": self.from.as_str(),
            "to": self.to.as_str(),
            "timestamp": self.timestamp,
        })
    }

    /// Whether a raw store record names `sender` in its `from` field.
    ///
    /// Used by cleanup scans, which must match records that do not fully
    /// decode (stale duplicates written by older clients).
    pub fn record_is_from(value: &Value, sender: &Identity) -> bool {
        value.get("from").and_then(Value::as_str) == Some(sender.as_str())
    }
}

/// Lifecycle of a single request from the recipient's point of view.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RequestState {
    Pending,
    Accepted,
    Rejected,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestState::Pending)
    }
}

// ============================================================================
// Tests
// ============================================================================
