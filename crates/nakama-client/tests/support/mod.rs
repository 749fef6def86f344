//! Shared fixtures for session integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::task::LocalSet;

use nakama_client::{
    BlockSignals, BlockedUser, ChatBlocking, ClientConfig, Collaborators, FriendProtocol,
    FriendsSession, Notifier, Selection, UserBlocking,
};
use nakama_store::{MemoryStore, StoreLayout};
use nakama_types::{Ack, ChatId, FriendRequest, Identity, Notice, NoticeLevel};

pub const ME: &str = "me0000-local-key-0001";
pub const ALICE: &str = "alice1-public-key-aaaa";
pub const BOB: &str = "bob222-public-key-bbbb";
pub const CAROL: &str = "carol3-public-key-cccc";

/// Run async test code inside a LocalSet on a current-thread runtime.
pub fn run_local<F: Future<Output = ()>>(f: F) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let local = LocalSet::new();
    rt.block_on(local.run_until(f));
}

pub fn id(s: &str) -> Identity {
    Identity::new(s).unwrap()
}

/// How a scripted collaborator call answers.
#[derive(Clone, Copy, Debug)]
pub enum Reply {
    Ok,
    Decline(&'static str),
    Fail(&'static str),
}

impl Reply {
    fn ack(self) -> anyhow::Result<Ack> {
        match self {
            Reply::Ok => Ok(Ack::ok()),
            Reply::Decline(msg) => Ok(Ack::declined(msg)),
            Reply::Fail(msg) => Err(anyhow::anyhow!(msg)),
        }
    }

    fn unit(self) -> anyhow::Result<()> {
        match self {
            Reply::Ok | Reply::Decline(_) => Ok(()),
            Reply::Fail(msg) => Err(anyhow::anyhow!(msg)),
        }
    }
}

/// Every collaborator in one scriptable object.
pub struct Fake {
    pub store: MemoryStore,
    pub layout: StoreLayout,
    pub me: Identity,

    pub accept: Cell<Reply>,
    pub reject: Cell<Reply>,
    pub remove: Cell<Reply>,
    pub block_user: Cell<Reply>,
    pub unblock_user: Cell<Reply>,
    pub block_chat: Cell<Reply>,
    pub unblock_chat: Cell<Reply>,
    pub users_fail: Cell<bool>,
    pub chats_fail: Cell<bool>,
    /// Yields to hand back after reading the user block list.
    pub list_latency: Cell<usize>,

    pub blocked_users: RefCell<Vec<Identity>>,
    pub blocked_chats: RefCell<Vec<ChatId>>,
    pub calls: RefCell<Vec<String>>,
    pub notices: RefCell<Vec<Notice>>,
    pub deselects: Cell<usize>,
    edges: Cell<u32>,
}

impl Fake {
    pub fn new(store: MemoryStore) -> Rc<Self> {
        Rc::new(Self {
            store,
            layout: StoreLayout::new("dapp"),
            me: id(ME),
            accept: Cell::new(Reply::Ok),
            reject: Cell::new(Reply::Ok),
            remove: Cell::new(Reply::Ok),
            block_user: Cell::new(Reply::Ok),
            unblock_user: Cell::new(Reply::Ok),
            block_chat: Cell::new(Reply::Ok),
            unblock_chat: Cell::new(Reply::Ok),
            users_fail: Cell::new(false),
            chats_fail: Cell::new(false),
            list_latency: Cell::new(0),
            blocked_users: RefCell::new(Vec::new()),
            blocked_chats: RefCell::new(Vec::new()),
            calls: RefCell::new(Vec::new()),
            notices: RefCell::new(Vec::new()),
            deselects: Cell::new(0),
            edges: Cell::new(0),
        })
    }

    pub fn collaborators(self: &Rc<Self>, signals: &BlockSignals) -> Collaborators {
        Collaborators {
            store: Rc::new(self.store.clone()),
            friends: self.clone(),
            users: self.clone(),
            chats: self.clone(),
            notifier: self.clone(),
            selection: self.clone(),
            signals: signals.clone(),
        }
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    pub fn called(&self, prefix: &str) -> usize {
        self.calls.borrow().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn last_notice(&self) -> Option<Notice> {
        self.notices.borrow().last().cloned()
    }

    pub fn error_notices(&self) -> usize {
        self.notices.borrow().iter().filter(|n| n.level == NoticeLevel::Error).count()
    }

    // ── Store seeding ────────────────────────────────────────────────────

    pub fn put_edge(&self, edge_id: &str, a: &str, b: &str) {
        self.store
            .write(
                &self.layout.friendship(edge_id),
                Some(json!({ "user1": a, "user2": b, "created": 1_700_000_000_000u64 })),
            )
            .unwrap();
    }

    pub fn drop_edge(&self, edge_id: &str) {
        self.store.write(&self.layout.friendship(edge_id), None).unwrap();
    }

    pub fn put_nickname(&self, who: &str, nickname: Option<&str>) {
        self.store
            .write(&self.layout.nickname(&id(who)), nickname.map(Value::from))
            .unwrap();
    }

    pub fn put_request(&self, key: &str, from: &str, ts: u64) {
        self.store
            .write(
                &self.layout.all_requests().child(key),
                Some(json!({ "from": from, "to": ME, "timestamp": ts })),
            )
            .unwrap();
    }

    pub fn put_inbox_request(&self, key: &str, from: &str, ts: u64) {
        self.store
            .write(
                &self.layout.inbox(&self.me).child(key),
                Some(json!({ "from": from, "to": ME, "timestamp": ts })),
            )
            .unwrap();
    }
}

#[async_trait(?Send)]
impl FriendProtocol for Fake {
    async fn accept_friend_request(&self, request: &FriendRequest) -> anyhow::Result<Ack> {
        self.record(format!("accept:{}", request.from));
        tokio::task::yield_now().await;
        let reply = self.accept.get();
        if matches!(reply, Reply::Ok) {
            let n = self.edges.get() + 1;
            self.edges.set(n);
            self.put_edge(&format!("accepted-{n}"), request.from.as_str(), request.to.as_str());
        }
        reply.ack()
    }

    async fn reject_friend_request(&self, request: &FriendRequest) -> anyhow::Result<()> {
        self.record(format!("reject:{}", request.from));
        tokio::task::yield_now().await;
        self.reject.get().unit()
    }

    async fn remove_friend(&self, friend: &Identity) -> anyhow::Result<()> {
        self.record(format!("remove:{friend}"));
        self.remove.get().unit()
    }
}

#[async_trait(?Send)]
impl UserBlocking for Fake {
    async fn blocked_users(&self) -> anyhow::Result<Vec<BlockedUser>> {
        self.record("blocked_users".into());
        if self.users_fail.get() {
            anyhow::bail!("user block list unavailable");
        }
        let users: Vec<_> = self
            .blocked_users
            .borrow()
            .iter()
            .map(|identity| BlockedUser { identity: identity.clone() })
            .collect();
        for _ in 0..self.list_latency.get() {
            tokio::task::yield_now().await;
        }
        Ok(users)
    }

    async fn block_user(&self, who: &Identity) -> anyhow::Result<Ack> {
        self.record(format!("block_user:{who}"));
        let reply = self.block_user.get();
        if matches!(reply, Reply::Ok) {
            self.blocked_users.borrow_mut().push(who.clone());
        }
        reply.ack()
    }

    async fn unblock_user(&self, who: &Identity) -> anyhow::Result<Ack> {
        self.record(format!("unblock_user:{who}"));
        let reply = self.unblock_user.get();
        if matches!(reply, Reply::Ok) {
            self.blocked_users.borrow_mut().retain(|b| b != who);
        }
        reply.ack()
    }
}

#[async_trait(?Send)]
impl ChatBlocking for Fake {
    async fn blocked_chats(&self) -> anyhow::Result<Vec<ChatId>> {
        self.record("blocked_chats".into());
        if self.chats_fail.get() {
            anyhow::bail!("chat block list unavailable");
        }
        Ok(self.blocked_chats.borrow().clone())
    }

    async fn block_chat(&self, chat: &ChatId) -> anyhow::Result<Ack> {
        self.record(format!("block_chat:{chat}"));
        let reply = self.block_chat.get();
        if matches!(reply, Reply::Ok) {
            self.blocked_chats.borrow_mut().push(chat.clone());
        }
        reply.ack()
    }

    async fn unblock_chat(&self, chat: &ChatId) -> anyhow::Result<()> {
        self.record(format!("unblock_chat:{chat}"));
        let reply = self.unblock_chat.get();
        if matches!(reply, Reply::Ok) {
            self.blocked_chats.borrow_mut().retain(|c| c != chat);
        }
        reply.unit()
    }
}

impl Notifier for Fake {
    fn notify(&self, notice: Notice) {
        self.notices.borrow_mut().push(notice);
    }
}

impl Selection for Fake {
    fn deselect(&self) {
        self.deselects.set(self.deselects.get() + 1);
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig {
        read_timeout_ms: 50,
        ..ClientConfig::default()
    }
}

/// Mount a signed-in session over `fake` and wait for it to settle.
pub async fn mount(fake: &Rc<Fake>) -> FriendsSession {
    let signals = BlockSignals::new(16);
    mount_with(fake, &signals).await
}

pub async fn mount_with(fake: &Rc<Fake>, signals: &BlockSignals) -> FriendsSession {
    let session =
        FriendsSession::mount(&test_config(), Some(fake.me.clone()), fake.collaborators(signals))
            .unwrap();
    session.settle().await;
    session
}

pub fn short_timeout() -> Duration {
    Duration::from_millis(test_config().read_timeout_ms)
}
