//! The friends session: one local user's live view of the social graph.
//!
//! A [`FriendsSession`] ties the components together. It opens the
//! friendship and request feeds, drains their deliveries into the
//! reconciler and request book, keeps the block overlay in sync, and
//! publishes an immutable [`FriendsSnapshot`] after every applied change.
//!
//! # Tasks
//!
//! ```text
//!   store feeds ──Delivery──▶ delivery loop ──▶ SessionState ──publish──▶ watch<Arc<FriendsSnapshot>>
//!   BlockSignals ──────────▶ signal listener ──┘      ▲
//!   lookups / refresh / cleanup (background) ─────────┘
//! ```
//!
//! Everything runs on one thread inside a `LocalSet`. State lives in a
//! `RefCell` that is never borrowed across an `.await`; every continuation
//! checks the liveness token before touching it, so nothing mutates state
//! after [`teardown`](FriendsSession::teardown).

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;

use nakama_store::{GraphStore, StoreError, StoreLayout, WatchScope};
use nakama_types::{
    ChatId, FriendRequest, FriendsSnapshot, Identity, Notice, Outcome, RequestState,
};
use serde_json::Value;
use tokio::sync::{broadcast, oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::blocking::{fetch_block_lists, BlockOverlay, BlockSignal, BlockSignals};
use crate::config::ClientConfig;
use crate::protocol::{ChatBlocking, FriendProtocol, Notifier, Selection, UserBlocking};
use crate::reconciler::{EdgeEffect, FriendReconciler};
use crate::requests::{purge_request_records, CleanupReport, ObserveEffect, RequestBook, RequestError};
use crate::resolver::IdentityResolver;
use crate::subscriptions::{
    delivery_channel, Delivery, DeliveryQueue, Subscribed, SubscriptionKey, SubscriptionManager,
};

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not signed in")]
    SignedOut,
    #[error("no pending request from {}", .0.short())]
    NotPending(Identity),
    #[error("request from {} is already being processed", .0.short())]
    AlreadyProcessing(Identity),
    #[error("{} is not a friend", .0.short())]
    UnknownFriend(Identity),
    #[error("declined: {0}")]
    Declined(String),
    #[error("failed: {0}")]
    Failed(String),
    #[error("session was torn down")]
    TornDown,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<RequestError> for SessionError {
    fn from(e: RequestError) -> Self {
        match e {
            RequestError::NotPending(id) => SessionError::NotPending(id),
            RequestError::AlreadyProcessing(id) => SessionError::AlreadyProcessing(id),
        }
    }
}

// ============================================================================
// Collaborators
// ============================================================================

/// Everything a session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Rc<dyn GraphStore>,
    pub friends: Rc<dyn FriendProtocol>,
    pub users: Rc<dyn UserBlocking>,
    pub chats: Rc<dyn ChatBlocking>,
    pub notifier: Rc<dyn Notifier>,
    pub selection: Rc<dyn Selection>,
    pub signals: BlockSignals,
}

/// Background request cleanup started by an accept or reject.
///
/// Dropping it does not cancel the cleanup.
pub struct CleanupTask {
    rx: oneshot::Receiver<CleanupReport>,
}

impl CleanupTask {
    /// Wait for the cleanup. `None` if the session was torn down first.
    pub async fn wait(self) -> Option<CleanupReport> {
        self.rx.await.ok()
    }
}

// ============================================================================
// Internal state
// ============================================================================

struct SessionState {
    local: Identity,
    subscriptions: SubscriptionManager,
    friends: FriendReconciler,
    requests: RequestBook,
    overlay: BlockOverlay,
    selected: Option<Identity>,
    version: u64,
}

impl SessionState {
    fn snapshot(&self) -> FriendsSnapshot {
        FriendsSnapshot {
            local: Some(self.local.clone()),
            friends: self.friends.views(),
            pending: self.requests.pending(),
            selected: self.selected.clone(),
            version: self.version,
        }
    }

    fn annotate_one(&mut self, who: &Identity) -> bool {
        if !self.friends.contains(who) {
            return false;
        }
        let annotation = self.overlay.annotation_for(&self.local, who);
        self.friends.annotate(who, annotation)
    }

    fn annotate_all(&mut self) -> bool {
        let mut changed = false;
        for who in self.friends.identities() {
            changed |= self.annotate_one(&who);
        }
        changed
    }

    /// Clear the selection if it points at `who`. Returns whether it did.
    fn clear_selection_of(&mut self, who: &Identity) -> bool {
        if self.selected.as_ref() == Some(who) {
            self.selected = None;
            true
        } else {
            false
        }
    }

    fn display_name(&self, who: &Identity) -> String {
        self.friends
            .get(who)
            .map(|f| f.display_name.clone())
            .or_else(|| self.requests.get(who).map(|p| p.display_name.clone()))
            .unwrap_or_else(|| who.short())
    }
}

/// Counts outstanding work so [`FriendsSession::settle`] knows when to return.
struct Activity {
    queued: Rc<Cell<usize>>,
    background: Cell<usize>,
    idle: Notify,
}

impl Activity {
    fn is_idle(&self) -> bool {
        self.queued.get() == 0 && self.background.get() == 0
    }

    fn check(&self) {
        if self.is_idle() {
            self.idle.notify_waiters();
        }
    }
}

struct BusyGuard(Rc<Activity>);

impl BusyGuard {
    fn new(activity: &Rc<Activity>) -> Self {
        activity.background.set(activity.background.get() + 1);
        Self(activity.clone())
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.background.set(self.0.background.get().saturating_sub(1));
        self.0.check();
    }
}

/// A fresh lookup to run for a newly seen identity.
enum Lookup {
    Friend(Identity),
    Sender(Identity),
}

/// A signed-in session's shared core, owned by the session and its tasks.
struct Live {
    local: Identity,
    layout: StoreLayout,
    state: RefCell<SessionState>,
    collab: Collaborators,
    resolver: IdentityResolver,
    alive: CancellationToken,
    snapshots: Rc<watch::Sender<Arc<FriendsSnapshot>>>,
    activity: Rc<Activity>,
    tasks: RefCell<Vec<JoinHandle<()>>>,
}

impl Live {
    fn ensure_alive(&self) -> Result<(), SessionError> {
        if self.alive.is_cancelled() {
            Err(SessionError::TornDown)
        } else {
            Ok(())
        }
    }

    fn publish(&self, state: &mut SessionState) {
        state.version += 1;
        trace!(version = state.version, "publishing snapshot");
        self.snapshots.send_replace(Arc::new(state.snapshot()));
    }

    fn notify(&self, notice: Notice) {
        self.collab.notifier.notify(notice);
    }

    fn keep(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.borrow_mut();
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    /// Long-running task, aborted on teardown but not waited for by settle.
    fn spawn_service(&self, fut: impl Future<Output = ()> + 'static) {
        self.keep(tokio::task::spawn_local(fut));
    }

    /// Short-lived task that settle waits for.
    fn spawn_tracked(&self, fut: impl Future<Output = ()> + 'static) {
        if self.alive.is_cancelled() {
            return;
        }
        let guard = BusyGuard::new(&self.activity);
        self.keep(tokio::task::spawn_local(async move {
            let _guard = guard;
            fut.await;
        }));
    }

    // ── Deliveries ───────────────────────────────────────────────────────

    fn apply_delivery(self: &Rc<Self>, delivery: Delivery) {
        if self.alive.is_cancelled() {
            return;
        }

        let mut lookups = Vec::new();
        let mut deselect = false;
        {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;
            if !state.subscriptions.is_current(&delivery) {
                trace!(key = ?delivery.key, generation = delivery.generation, "dropping stale delivery");
                return;
            }

            let event = &delivery.event;
            let changed = match &delivery.key {
                SubscriptionKey::Friendships => {
                    let mut changed = false;
                    for effect in state.friends.apply_edge(&event.key, event.value.as_ref()) {
                        changed |= match effect {
                            EdgeEffect::Discovered(friend) => {
                                let watch = state.subscriptions.subscribe(
                                    SubscriptionKey::Nickname(friend.clone()),
                                    Some(SubscriptionKey::Friendships),
                                    self.layout.nickname(&friend),
                                    WatchScope::Node,
                                );
                                match watch {
                                    Ok(Subscribed::ParentGone) => {
                                        debug!(friend = %friend.short(), "friendships feed closed, no nickname feed");
                                    }
                                    Ok(_) => {}
                                    Err(e) => {
                                        warn!(friend = %friend.short(), error = %e, "nickname feed unavailable");
                                    }
                                }
                                if state.overlay.is_loaded() {
                                    state.annotate_one(&friend);
                                }
                                lookups.push(Lookup::Friend(friend));
                                true
                            }
                            EdgeEffect::Removed(friend) => {
                                state.subscriptions.cancel(&SubscriptionKey::Nickname(friend.clone()));
                                deselect |= state.clear_selection_of(&friend);
                                true
                            }
                            EdgeEffect::Rebound(_) => true,
                            EdgeEffect::Known(_) | EdgeEffect::Irrelevant | EdgeEffect::Malformed => false,
                        };
                    }
                    changed
                }
                SubscriptionKey::Nickname(friend) => state
                    .friends
                    .apply_nickname(friend, event.value.as_ref().and_then(Value::as_str)),
                SubscriptionKey::Requests => {
                    match state.requests.observe(&event.key, event.value.as_ref()) {
                        ObserveEffect::Added(sender) => {
                            lookups.push(Lookup::Sender(sender));
                            true
                        }
                        ObserveEffect::Withdrawn(_) => true,
                        ObserveEffect::Merged(_) | ObserveEffect::Ignored => false,
                    }
                }
            };

            if changed {
                self.publish(state);
            }
        }

        if deselect {
            self.collab.selection.deselect();
        }
        for lookup in lookups {
            self.spawn_lookup(lookup);
        }
    }

    fn spawn_lookup(self: &Rc<Self>, lookup: Lookup) {
        let live = self.clone();
        self.spawn_tracked(async move {
            match lookup {
                Lookup::Friend(friend) => {
                    let found = live.resolver.lookup(&friend).await;
                    if live.alive.is_cancelled() || !found.is_resolved() {
                        return;
                    }
                    let mut state = live.state.borrow_mut();
                    if state.friends.apply_resolved_name(&friend, &found.name) {
                        live.publish(&mut state);
                    }
                }
                Lookup::Sender(sender) => {
                    let name = live.resolver.resolve(&sender).await;
                    if live.alive.is_cancelled() {
                        return;
                    }
                    let mut state = live.state.borrow_mut();
                    if state.requests.set_display_name(&sender, &name) {
                        live.publish(&mut state);
                    }
                }
            }
        });
    }

    // ── Block state ──────────────────────────────────────────────────────

    async fn refresh(&self) {
        let ticket = self.state.borrow_mut().overlay.begin_fetch();
        let lists = fetch_block_lists(&*self.collab.users, &*self.collab.chats).await;
        if self.alive.is_cancelled() {
            debug!("session gone before block lists arrived");
            return;
        }
        let mut state = self.state.borrow_mut();
        let first_load = !state.overlay.is_loaded();
        state.overlay.finish_fetch(ticket, lists);
        if state.annotate_all() || first_load {
            self.publish(&mut state);
        }
    }

    fn apply_block_event(&self, who: &Identity, blocked: bool) {
        if self.alive.is_cancelled() {
            return;
        }
        let deselect = {
            let mut state = self.state.borrow_mut();
            state.overlay.set_user_blocked(who, blocked);
            let changed = state.annotate_one(who);
            let deselect = blocked && state.clear_selection_of(who);
            if changed || deselect {
                self.publish(&mut state);
            }
            deselect
        };
        if deselect {
            self.collab.selection.deselect();
        }
    }

    fn apply_chat_block_event(&self, chat: &ChatId, blocked: bool) {
        if self.alive.is_cancelled() {
            return;
        }
        let mut state = self.state.borrow_mut();
        state.overlay.set_chat_blocked(chat, blocked);
        if state.annotate_all() {
            self.publish(&mut state);
        }
    }

    /// Report a non-`Ok` outcome to the user and turn it into an error.
    fn check(&self, outcome: Outcome, action: &str) -> Result<(), SessionError> {
        match outcome {
            Outcome::Ok => Ok(()),
            Outcome::Declined(reason) => {
                warn!(action, %reason, "operation declined");
                self.notify(Notice::error(format!("Could not {action}: {reason}")));
                Err(SessionError::Declined(reason))
            }
            Outcome::Failed(cause) => {
                error!(action, %cause, "operation failed");
                self.notify(Notice::error(format!("Could not {action}")));
                Err(SessionError::Failed(cause))
            }
        }
    }

    fn spawn_cleanup(self: &Rc<Self>, request: FriendRequest) -> CleanupTask {
        let (tx, rx) = oneshot::channel();
        let live = self.clone();
        self.spawn_tracked(async move {
            let report =
                purge_request_records(&*live.collab.store, &live.layout, &live.local, &request.from)
                    .await;
            let _ = tx.send(report);
        });
        CleanupTask { rx }
    }
}

async fn deliver(live: Rc<Live>, mut queue: DeliveryQueue) {
    loop {
        let delivery = tokio::select! {
            _ = live.alive.cancelled() => break,
            next = queue.recv() => match next {
                Some(delivery) => delivery,
                None => break,
            },
        };
        live.apply_delivery(delivery);
        live.activity.check();
    }
    debug!("delivery loop stopped");
}

async fn listen_for_blocks(live: Rc<Live>, mut rx: broadcast::Receiver<BlockSignal>) {
    loop {
        let received = tokio::select! {
            _ = live.alive.cancelled() => break,
            received = rx.recv() => received,
        };
        match received {
            Ok(signal) => live.apply_block_event(signal.identity(), signal.is_blocked()),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "block signals lagged, refreshing block lists");
                let _busy = BusyGuard::new(&live.activity);
                live.refresh().await;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("block signal listener stopped");
}

// ============================================================================
// FriendsSession
// ============================================================================

#[derive(Clone, Copy)]
enum Decision {
    Accept,
    Reject,
}

impl Decision {
    fn state(self) -> RequestState {
        match self {
            Decision::Accept => RequestState::Accepted,
            Decision::Reject => RequestState::Rejected,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Decision::Accept => "accept",
            Decision::Reject => "reject",
        }
    }
}

/// A mounted friends view.
///
/// Must be created and used inside a `tokio::task::LocalSet`.
pub struct FriendsSession {
    live: Option<Rc<Live>>,
    resolver: IdentityResolver,
    snapshots: Rc<watch::Sender<Arc<FriendsSnapshot>>>,
}

impl FriendsSession {
    /// Mount a session for `local`. With no identity the session is
    /// suspended: it stays empty and every command returns
    /// [`SessionError::SignedOut`].
    pub fn mount(
        config: &ClientConfig,
        local: Option<Identity>,
        collab: Collaborators,
    ) -> Result<Self, SessionError> {
        let layout = config.layout();
        let resolver = IdentityResolver::new(collab.store.clone(), layout.clone(), config.read_timeout());

        let Some(local) = local else {
            info!("no local identity, friends session suspended");
            let (tx, _) = watch::channel(Arc::new(FriendsSnapshot::default()));
            return Ok(Self {
                live: None,
                resolver,
                snapshots: Rc::new(tx),
            });
        };

        let (sink, queue, queued) = delivery_channel();
        let mut subscriptions = SubscriptionManager::new(collab.store.clone(), sink);
        let feeds = [
            (SubscriptionKey::Friendships, layout.friendships()),
            (SubscriptionKey::Requests, layout.all_requests()),
        ];
        for (key, path) in feeds {
            if let Err(e) = subscriptions.subscribe(key, None, path, WatchScope::Children) {
                error!(error = %e, "failed to open friends feeds");
                subscriptions.cancel_all();
                return Err(e.into());
            }
        }

        let state = SessionState {
            local: local.clone(),
            subscriptions,
            friends: FriendReconciler::new(local.clone()),
            requests: RequestBook::new(local.clone()),
            overlay: BlockOverlay::new(),
            selected: None,
            version: 0,
        };
        let (tx, _) = watch::channel(Arc::new(state.snapshot()));
        let snapshots = Rc::new(tx);
        let signals = collab.signals.subscribe();

        let live = Rc::new(Live {
            local: local.clone(),
            layout,
            state: RefCell::new(state),
            collab,
            resolver: resolver.clone(),
            alive: CancellationToken::new(),
            snapshots: snapshots.clone(),
            activity: Rc::new(Activity {
                queued,
                background: Cell::new(0),
                idle: Notify::new(),
            }),
            tasks: RefCell::new(Vec::new()),
        });

        live.spawn_service(deliver(live.clone(), queue));
        live.spawn_service(listen_for_blocks(live.clone(), signals));
        let initial = live.clone();
        live.spawn_tracked(async move { initial.refresh().await });

        info!(local = %local.short(), "friends session mounted");
        Ok(Self {
            live: Some(live),
            resolver,
            snapshots,
        })
    }

    fn live(&self) -> Result<&Rc<Live>, SessionError> {
        let live = self.live.as_ref().ok_or(SessionError::SignedOut)?;
        live.ensure_alive()?;
        Ok(live)
    }

    pub fn local(&self) -> Option<&Identity> {
        self.live.as_ref().map(|l| &l.local)
    }

    pub fn is_signed_in(&self) -> bool {
        self.live.is_some()
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<FriendsSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn watch_snapshots(&self) -> watch::Receiver<Arc<FriendsSnapshot>> {
        self.snapshots.subscribe()
    }

    /// Best display name for any identity, friend or not.
    pub async fn resolve_display_name(&self, id: &Identity) -> String {
        self.resolver.resolve(id).await
    }

    /// Select a friend, or clear the selection with `None`.
    pub fn select(&self, friend: Option<Identity>) -> Result<(), SessionError> {
        let live = self.live()?;
        let mut state = live.state.borrow_mut();
        if let Some(who) = &friend {
            if !state.friends.contains(who) {
                return Err(SessionError::UnknownFriend(who.clone()));
            }
        }
        if state.selected != friend {
            state.selected = friend;
            live.publish(&mut state);
        }
        Ok(())
    }

    // ── Requests ─────────────────────────────────────────────────────────

    /// Accept the pending request from `from`.
    ///
    /// On success the entry is gone from the next snapshot and the store
    /// records behind it are purged in the background.
    pub async fn accept(&self, from: &Identity) -> Result<CleanupTask, SessionError> {
        self.decide(from, Decision::Accept).await
    }

    pub async fn reject(&self, from: &Identity) -> Result<CleanupTask, SessionError> {
        self.decide(from, Decision::Reject).await
    }

    async fn decide(&self, from: &Identity, decision: Decision) -> Result<CleanupTask, SessionError> {
        let live = self.live()?;
        let (request, name) = {
            let mut state = live.state.borrow_mut();
            let request = state.requests.begin(from)?;
            live.publish(&mut state);
            (request, state.display_name(from))
        };

        let outcome = match decision {
            Decision::Accept => {
                Outcome::from_ack_result(live.collab.friends.accept_friend_request(&request).await)
            }
            Decision::Reject => {
                Outcome::from_unit_result(live.collab.friends.reject_friend_request(&request).await)
            }
        };
        live.ensure_alive()?;

        if let Err(e) = live.check(outcome, &format!("{} the friend request", decision.verb())) {
            let mut state = live.state.borrow_mut();
            if state.requests.abort(from) {
                live.publish(&mut state);
            }
            return Err(e);
        }

        {
            let mut state = live.state.borrow_mut();
            state.requests.resolve(from, decision.state());
            live.publish(&mut state);
        }
        info!(from = %from.short(), state = %decision.state(), "friend request resolved");
        live.notify(Notice::success(match decision {
            Decision::Accept => format!("You and {name} are now friends"),
            Decision::Reject => format!("Friend request from {name} rejected"),
        }));

        Ok(live.spawn_cleanup(request))
    }

    // ── Friends ──────────────────────────────────────────────────────────

    /// Ask the protocol to remove a friendship. The entry leaves the view
    /// once the store tombstones the edge.
    pub async fn remove_friend(&self, friend: &Identity) -> Result<(), SessionError> {
        let live = self.live()?;
        let name = {
            let state = live.state.borrow();
            if !state.friends.contains(friend) {
                return Err(SessionError::UnknownFriend(friend.clone()));
            }
            state.display_name(friend)
        };

        let outcome = Outcome::from_unit_result(live.collab.friends.remove_friend(friend).await);
        live.ensure_alive()?;
        live.check(outcome, "remove the friend")?;
        live.notify(Notice::success(format!("{name} removed from friends")));
        Ok(())
    }

    // ── Blocking ─────────────────────────────────────────────────────────

    /// Refetch both block lists and re-annotate every friend.
    pub async fn refresh(&self) -> Result<(), SessionError> {
        let live = self.live()?;
        let _busy = BusyGuard::new(&live.activity);
        live.refresh().await;
        Ok(())
    }

    pub async fn block(&self, who: &Identity) -> Result<(), SessionError> {
        self.set_blocked(who, true).await
    }

    pub async fn unblock(&self, who: &Identity) -> Result<(), SessionError> {
        self.set_blocked(who, false).await
    }

    /// User-level write, then chat-level write, then the local update.
    ///
    /// A chat-level failure leaves the user-level change in place; nothing
    /// is compensated.
    async fn set_blocked(&self, who: &Identity, blocked: bool) -> Result<(), SessionError> {
        let live = self.live()?;
        let verb = if blocked { "block" } else { "unblock" };
        let name = live.state.borrow().display_name(who);

        let user_outcome = if blocked {
            Outcome::from_ack_result(live.collab.users.block_user(who).await)
        } else {
            Outcome::from_ack_result(live.collab.users.unblock_user(who).await)
        };
        live.ensure_alive()?;
        live.check(user_outcome, &format!("{verb} {name}"))?;

        let chat = ChatId::for_pair(&live.local, who);
        let chat_outcome = if blocked {
            Outcome::from_ack_result(live.collab.chats.block_chat(&chat).await)
        } else {
            Outcome::from_unit_result(live.collab.chats.unblock_chat(&chat).await)
        };
        live.ensure_alive()?;
        if !chat_outcome.is_ok() {
            warn!(who = %who.short(), chat = %chat, "user-level {verb} applied but chat-level {verb} did not");
        }
        live.check(chat_outcome, &format!("{verb} the chat with {name}"))?;

        let deselect = {
            let mut state = live.state.borrow_mut();
            state.overlay.set_user_blocked(who, blocked);
            state.overlay.set_chat_blocked(&chat, blocked);
            state.annotate_one(who);
            let deselect = blocked && state.clear_selection_of(who);
            live.publish(&mut state);
            deselect
        };
        if deselect {
            live.collab.selection.deselect();
        }

        live.collab.signals.emit(BlockSignal::new(who.clone(), blocked));
        info!(who = %who.short(), blocked, "block state changed");
        live.notify(Notice::success(format!("{name} {verb}ed")));
        Ok(())
    }

    /// Merge a user-level block change made elsewhere.
    pub fn apply_block_event(&self, who: &Identity, blocked: bool) -> Result<(), SessionError> {
        self.live()?.apply_block_event(who, blocked);
        Ok(())
    }

    /// Merge a chat-level block change made elsewhere.
    pub fn apply_chat_block_event(&self, chat: &ChatId, blocked: bool) -> Result<(), SessionError> {
        self.live()?.apply_chat_block_event(chat, blocked);
        Ok(())
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Wait until no deliveries are queued and no background work is
    /// running.
    pub async fn settle(&self) {
        let Some(live) = &self.live else {
            return;
        };
        loop {
            let notified = live.activity.idle.notified();
            // Let woken tasks run before checking.
            tokio::task::yield_now().await;
            if live.alive.is_cancelled() || live.activity.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Cancel every subscription and background task. Idempotent.
    pub fn teardown(&self) {
        let Some(live) = &self.live else {
            return;
        };
        if live.alive.is_cancelled() {
            return;
        }
        live.alive.cancel();

        let cancelled = match live.state.try_borrow_mut() {
            Ok(mut state) => state.subscriptions.cancel_all(),
            Err(_) => {
                warn!("session state busy during teardown, subscriptions left to drop");
                0
            }
        };
        let tasks: Vec<_> = live.tasks.borrow_mut().drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        live.activity.idle.notify_waiters();
        info!(subscriptions = cancelled, tasks = tasks.len(), "friends session torn down");
    }
}

impl Drop for FriendsSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
