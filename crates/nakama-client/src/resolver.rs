//! Display-name resolution for identities.
//!
//! Resolution walks a strict priority chain and stops at the first hit:
//!
//! 1. `userList/users/{id}.nickname`: registered nickname
//! 2. `userList/nicknames/{id}`: legacy nickname index
//! 3. `~{id}.alias`: self-declared alias, cut at the first `.`
//! 4. [`Identity::short`]: deterministic fallback
//!
//! Steps run one after another, never raced. Each read is one-shot and
//! bounded by the configured timeout; an error, a timeout, or an empty value
//! all mean "not found" and the chain moves on. Nothing here fails.

use std::rc::Rc;
use std::time::Duration;

use nakama_store::{GraphStore, StoreLayout, StorePath};
use nakama_types::Identity;
use serde_json::Value;
use tracing::{debug, trace};

use crate::constants::ALIAS_DELIMITER;

/// Which step of the chain produced a name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameSource {
    UserRecord,
    NicknameIndex,
    Alias,
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedName {
    pub name: String,
    pub source: NameSource,
}

impl ResolvedName {
    /// Whether the name came from the store rather than the fallback.
    pub fn is_resolved(&self) -> bool {
        self.source != NameSource::Fallback
    }
}

/// Cut an alias at its first delimiter. `None` if nothing is left.
pub fn alias_prefix(alias: &str) -> Option<String> {
    alias
        .split(ALIAS_DELIMITER)
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Clone)]
pub struct IdentityResolver {
    store: Rc<dyn GraphStore>,
    layout: StoreLayout,
    read_timeout: Duration,
}

impl IdentityResolver {
    pub fn new(store: Rc<dyn GraphStore>, layout: StoreLayout, read_timeout: Duration) -> Self {
        Self {
            store,
            layout,
            read_timeout,
        }
    }

    /// Best available display name. Never fails.
    pub async fn resolve(&self, id: &Identity) -> String {
        self.lookup(id).await.name
    }

    /// Like [`resolve`](Self::resolve), reporting which step answered.
    pub async fn lookup(&self, id: &Identity) -> ResolvedName {
        let user = self.read(&self.layout.user_record(id)).await;
        if let Some(name) = non_empty(user.as_ref().and_then(|u| u.get("nickname"))) {
            return self.found(id, name, NameSource::UserRecord);
        }

        let nickname = self.read(&self.layout.nickname(id)).await;
        if let Some(name) = non_empty(nickname.as_ref()) {
            return self.found(id, name, NameSource::NicknameIndex);
        }

        let node = self.read(&self.layout.alias_node(id)).await;
        if let Some(name) = non_empty(node.as_ref().and_then(|n| n.get("alias")))
            .as_deref()
            .and_then(alias_prefix)
        {
            return self.found(id, name, NameSource::Alias);
        }

        self.found(id, id.short(), NameSource::Fallback)
    }

    fn found(&self, id: &Identity, name: String, source: NameSource) -> ResolvedName {
        trace!(identity = %id.short(), ?source, "resolved display name");
        ResolvedName { name, source }
    }

    /// One-shot read where every failure collapses to `None`.
    async fn read(&self, path: &StorePath) -> Option<Value> {
        match tokio::time::timeout(self.read_timeout, self.store.once(path)).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                debug!(path = %path, error = %e, "lookup failed, treating as not found");
                None
            }
            Err(_) => {
                debug!(path = %path, timeout_ms = self.read_timeout.as_millis() as u64, "lookup timed out, treating as not found");
                None
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use nakama_store::MemoryStore;
    use serde_json::json;

    const KEY: &str = "abc123def456ghi789X999";

    fn setup() -> (MemoryStore, IdentityResolver, StoreLayout, Identity) {
        let store = MemoryStore::new();
        let layout = StoreLayout::new("dapp");
        let resolver = IdentityResolver::new(Rc::new(store.clone()), layout.clone(), Duration::from_millis(100));
        (store, resolver, layout, Identity::new(KEY).unwrap())
    }

    #[test]
    fn test_alias_prefix() {
        assert_eq!(alias_prefix("alice.eth").as_deref(), Some("alice"));
        assert_eq!(alias_prefix("bob").as_deref(), Some("bob"));
        assert_eq!(alias_prefix(".hidden"), None);
        assert_eq!(alias_prefix(""), None);
    }

    #[tokio::test]
    async fn test_user_record_wins() {
        let (store, resolver, layout, id) = setup();
        store.write(&layout.user_record(&id), Some(json!({ "nickname": "Amy" }))).unwrap();
        store.write(&layout.nickname(&id), Some(json!("legacy"))).unwrap();
        store.write(&layout.alias_node(&id), Some(json!({ "alias": "amy.eth" }))).unwrap();

        let found = resolver.lookup(&id).await;
        assert_eq!(found, ResolvedName { name: "Amy".into(), source: NameSource::UserRecord });
    }

    #[tokio::test]
    async fn test_legacy_nickname_when_user_record_has_none() {
        let (store, resolver, layout, id) = setup();
        store.write(&layout.user_record(&id), Some(json!({ "nickname": "" }))).unwrap();
        store.write(&layout.nickname(&id), Some(json!("legacy"))).unwrap();

        assert_eq!(resolver.resolve(&id).await, "legacy");
    }

    #[tokio::test]
    async fn test_alias_truncated_at_delimiter() {
        let (store, resolver, layout, id) = setup();
        store.write(&layout.alias_node(&id), Some(json!({ "alias": "alice.eth" }))).unwrap();

        let found = resolver.lookup(&id).await;
        assert_eq!(found.name, "alice");
        assert_eq!(found.source, NameSource::Alias);
    }

    #[tokio::test]
    async fn test_fallback_short_form() {
        let (_store, resolver, _layout, id) = setup();
        let found = resolver.lookup(&id).await;
        assert_eq!(found.name, "abc123...X999");
        assert!(!found.is_resolved());
    }

    #[tokio::test]
    async fn test_failed_read_falls_through() {
        let (store, resolver, layout, id) = setup();
        store.write(&layout.user_record(&id), Some(json!({ "nickname": "Amy" }))).unwrap();
        store.fail(&layout.user_record(&id));
        store.write(&layout.alias_node(&id), Some(json!({ "alias": "amy.eth" }))).unwrap();

        assert_eq!(resolver.resolve(&id).await, "amy");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_read_times_out_and_chain_continues() {
        let (store, resolver, layout, id) = setup();
        store.stall(&layout.user_record(&id));
        store.write(&layout.nickname(&id), Some(json!("slowpoke"))).unwrap();

        let started = tokio::time::Instant::now();
        assert_eq!(resolver.resolve(&id).await, "slowpoke");
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_non_string_nickname_ignored() {
        let (store, resolver, layout, id) = setup();
        store.write(&layout.nickname(&id), Some(json!({ "nested": true }))).unwrap();
        assert_eq!(resolver.resolve(&id).await, id.short());
    }
}
