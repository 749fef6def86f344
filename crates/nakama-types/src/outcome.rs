//! Unified result of a protocol call, and user notifications.
//!
//! Collaborators report failure two ways: an explicit `{success, message}`
//! acknowledgement, or by erroring out. [`Outcome`] folds both into one
//! type so callers branch once.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Explicit acknowledgement returned by some protocol calls.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self { success: true, message: None }
    }

    pub fn declined(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Result of a protocol call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    /// The collaborator answered and said no.
    Declined(String),
    /// The collaborator errored before answering.
    Failed(String),
}

impl Outcome {
    pub fn from_ack(ack: Ack) -> Self {
        if ack.success {
            Outcome::Ok
        } else {
            Outcome::Declined(ack.message.unwrap_or_else(|| "operation declined".to_string()))
        }
    }

    /// For calls that answer with an [`Ack`].
    pub fn from_ack_result<E: Display>(result: Result<Ack, E>) -> Self {
        match result {
            Ok(ack) => Self::from_ack(ack),
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }

    /// For calls that return nothing and signal failure by erroring.
    pub fn from_unit_result<E: Display>(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Outcome::Ok,
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok)
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A fire-and-forget message for the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}
