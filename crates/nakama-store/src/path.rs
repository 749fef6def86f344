//! Store paths and the persisted layout.
//!
//! A [`StorePath`] is a sequence of node keys, displayed joined by `/`.
//! [`StoreLayout`] names every location the engine reads or writes; all of
//! them sit under the application namespace except the per-user alias node,
//! which the store keeps at the root as `~{identity}`.

use std::fmt;
use std::str::FromStr;

use nakama_types::Identity;

use crate::error::StoreError;

/// A path of node keys from the store root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorePath(Vec<String>);

impl StorePath {
    pub fn root(segment: impl Into<String>) -> Self {
        Self(vec![segment.into()])
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    pub fn parent(&self) -> Option<StorePath> {
        if self.0.len() <= 1 {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Key of the final node.
    pub fn key(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn starts_with(&self, prefix: &StorePath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Whether `self` is a direct child of `parent`.
    pub fn is_child_of(&self, parent: &StorePath) -> bool {
        self.0.len() == parent.0.len() + 1 && self.starts_with(parent)
    }
}

impl FromStr for StorePath {
    type Err = StoreError;

    /// Parse `a/b/c`. Empty segments are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<String> = s.split('/').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(StoreError::Rejected {
                path: s.to_string(),
                reason: "empty path segment".to_string(),
            });
        }
        Ok(Self(segments))
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// Named locations of the social graph inside the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreLayout {
    namespace: String,
}

impl StoreLayout {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn base(&self) -> StorePath {
        StorePath::root(self.namespace.clone())
    }

    /// `friendships/*`: one record per edge.
    pub fn friendships(&self) -> StorePath {
        self.base().child("friendships")
    }

    pub fn friendship(&self, edge_id: &str) -> StorePath {
        self.friendships().child(edge_id)
    }

    /// `userList/nicknames/{id}`: bare nickname string.
    pub fn nickname(&self, id: &Identity) -> StorePath {
        self.base().child("userList").child("nicknames").child(id.as_str())
    }

    /// `userList/users/{id}`: registration record with `.nickname`.
    pub fn user_record(&self, id: &Identity) -> StorePath {
        self.base().child("userList").child("users").child(id.as_str())
    }

    /// `all_friend_requests/*`: global request index.
    pub fn all_requests(&self) -> StorePath {
        self.base().child("all_friend_requests")
    }

    /// `friend_requests/{recipient}/*`: per-recipient request index.
    pub fn inbox(&self, recipient: &Identity) -> StorePath {
        self.base().child("friend_requests").child(recipient.as_str())
    }

    /// `~{id}`: the user's self-declared root node (with `.alias`).
    pub fn alias_node(&self, id: &Identity) -> StorePath {
        StorePath::root(format!("~{id}"))
    }
}
