//! Fixture graphs and in-process collaborators.
//!
//! A fixture is a JSON file describing the local identity, the raw store
//! nodes to seed, and the initial block lists:
//!
//! ```json
//! {
//!   "local": "me...",
//!   "nodes": { "dapp/friendships/e1": { "user1": "me...", "user2": "bob..." } },
//!   "blocked_users": ["eve..."],
//!   "blocked_chats": ["bob..._me..."]
//! }
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use nakama_client::{BlockedUser, ChatBlocking, FriendProtocol, UserBlocking};
use nakama_store::{GraphStore, MemoryStore, StoreLayout, StorePath};
use nakama_types::{Ack, ChatId, FriendRequest, FriendshipEdge, Identity, now_millis};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Fixture {
    /// Signed-in identity. Absent means signed out.
    pub local: Option<Identity>,
    /// Raw store contents, keyed by `/`-joined path.
    pub nodes: BTreeMap<String, Value>,
    pub blocked_users: Vec<Identity>,
    pub blocked_chats: Vec<ChatId>,
}

impl Fixture {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing fixture {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Write every node into `store`.
    pub fn seed(&self, store: &MemoryStore) -> Result<()> {
        for (raw, value) in &self.nodes {
            let path: StorePath = raw.parse().with_context(|| format!("bad node path {raw:?}"))?;
            store.write(&path, Some(value.clone()))?;
        }
        debug!(nodes = self.nodes.len(), "fixture seeded");
        Ok(())
    }
}

/// Friendship and blocking protocols backed by the fixture store.
pub struct FixtureWorld {
    store: MemoryStore,
    layout: StoreLayout,
    blocked_users: RefCell<Vec<Identity>>,
    blocked_chats: RefCell<Vec<ChatId>>,
}

impl FixtureWorld {
    pub fn new(store: MemoryStore, layout: StoreLayout, fixture: &Fixture) -> Self {
        Self {
            store,
            layout,
            blocked_users: RefCell::new(fixture.blocked_users.clone()),
            blocked_chats: RefCell::new(fixture.blocked_chats.clone()),
        }
    }
}

#[async_trait(?Send)]
impl FriendProtocol for FixtureWorld {
    async fn accept_friend_request(&self, request: &FriendRequest) -> Result<Ack> {
        let edge = FriendshipEdge {
            id: Uuid::now_v7().to_string(),
            user1: request.from.clone(),
            user2: request.to.clone(),
            created: Some(now_millis()),
        };
        self.store
            .put(&self.layout.friendship(&edge.id), Some(edge.to_record()))
            .await?;
        Ok(Ack::ok())
    }

    async fn reject_friend_request(&self, _request: &FriendRequest) -> Result<()> {
        Ok(())
    }

    async fn remove_friend(&self, friend: &Identity) -> Result<()> {
        let friendships = self.layout.friendships();
        for (edge_id, value) in self.store.children(&friendships).await? {
            let Ok(edge) = FriendshipEdge::from_record(&edge_id, &value) else {
                continue;
            };
            if edge.involves(friend) {
                self.store.put(&friendships.child(edge_id), None).await?;
            }
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl UserBlocking for FixtureWorld {
    async fn blocked_users(&self) -> Result<Vec<BlockedUser>> {
        Ok(self
            .blocked_users
            .borrow()
            .iter()
            .map(|identity| BlockedUser { identity: identity.clone() })
            .collect())
    }

    async fn block_user(&self, who: &Identity) -> Result<Ack> {
        let mut users = self.blocked_users.borrow_mut();
        if !users.contains(who) {
            users.push(who.clone());
        }
        Ok(Ack::ok())
    }

    async fn unblock_user(&self, who: &Identity) -> Result<Ack> {
        self.blocked_users.borrow_mut().retain(|u| u != who);
        Ok(Ack::ok())
    }
}

#[async_trait(?Send)]
impl ChatBlocking for FixtureWorld {
    async fn blocked_chats(&self) -> Result<Vec<ChatId>> {
        Ok(self.blocked_chats.borrow().clone())
    }

    async fn block_chat(&self, chat: &ChatId) -> Result<Ack> {
        let mut chats = self.blocked_chats.borrow_mut();
        if !chats.contains(chat) {
            chats.push(chat.clone());
        }
        Ok(Ack::ok())
    }

    async fn unblock_chat(&self, chat: &ChatId) -> Result<()> {
        self.blocked_chats.borrow_mut().retain(|c| c != chat);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEMO: &str = include_str!("../fixtures/demo.json");

    #[tokio::test]
    async fn test_demo_fixture_parses_and_seeds() {
        let fixture = Fixture::from_json(DEMO).unwrap();
        assert!(fixture.local.is_some());
        let store = MemoryStore::new();
        fixture.seed(&store).unwrap();
        let layout = StoreLayout::new("dapp");
        assert!(!store.children(&layout.friendships()).await.unwrap().is_empty());
        assert!(!store.children(&layout.all_requests()).await.unwrap().is_empty());
    }

    #[test]
    fn test_bad_path_rejected() {
        let fixture = Fixture::from_json(r#"{ "nodes": { "dapp//x": 1 } }"#).unwrap();
        assert!(fixture.seed(&MemoryStore::new()).is_err());
    }

    #[tokio::test]
    async fn test_accept_writes_edge() {
        let store = MemoryStore::new();
        let layout = StoreLayout::new("dapp");
        let world = FixtureWorld::new(store.clone(), layout.clone(), &Fixture::default());
        let me = Identity::new("me").unwrap();
        let bob = Identity::new("bob").unwrap();

        let ack = world
            .accept_friend_request(&FriendRequest::new(bob.clone(), me.clone(), None))
            .await
            .unwrap();
        assert!(ack.success);
        let edges = store.children(&layout.friendships()).await.unwrap();
        assert_eq!(edges.len(), 1);
        let edge = FriendshipEdge::from_record(&edges[0].0, &edges[0].1).unwrap();
        assert_eq!(edge.counterpart(&me), Some(&bob));

        world.remove_friend(&bob).await.unwrap();
        assert!(store.children(&layout.friendships()).await.unwrap().is_empty());
    }
}
