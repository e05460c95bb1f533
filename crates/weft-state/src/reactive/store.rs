#![forbid(unsafe_code)]

//! Immutable-snapshot container with scoped change notification.
//!
//! # Design
//!
//! [`Store<S>`] holds its state as an `Rc<S>` snapshot inside shared,
//! reference-counted storage (`Rc<RefCell<..>>`). Readers receive the
//! snapshot itself; it is never written through. Every mutation produces a
//! new snapshot and a [`ChangeSet`] computed by the store's differ, then
//! notifies each live subscriber whose attribute scope the change touches.
//!
//! Operations fall in three categories:
//!
//! | Category | Entry point | Duplication |
//! |----------|-------------|-------------|
//! | read-only | [`get`](Store::get), [`with`](Store::with) | none |
//! | copy-then-mutate | [`mutate`](Store::mutate), [`mutate_keys`](Store::mutate_keys) | clone, apply, install |
//! | reduce | [`reduce`](Store::reduce), [`replace`](Store::replace) | the operation builds the new value |
//!
//! [`transaction`](Store::transaction) batches any of them: the state is
//! duplicated once, nested transactions collapse, and one notification cycle
//! runs when the outermost transaction commits.
//!
//! # Failure Modes
//!
//! - **Store access inside a mutation closure**: the closure passed to
//!   `mutate`/`mutate_keys`/`reduce` runs while the store is borrowed;
//!   reading the same store from inside it panics (RefCell borrow rules).
//!   Use [`transaction`](Store::transaction) to interleave reads and writes.
//! - **Panicking transaction block**: the open frame is rolled back while
//!   unwinding; nothing is notified.
//! - **Subscriber leak**: subscribers are held weakly. Dead entries are
//!   pruned during `notify()` and swept on `subscribe()` once more than
//!   `prune_threshold` accumulate.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, debug_span, trace};

use super::batch::BatchState;
use crate::change::{ChangeSet, whole_diff};
use crate::context::{StateContext, StoreId, SubscriberId};

/// Computes the [`ChangeSet`] between two snapshots.
pub type Differ<S> = fn(&S, &S) -> ChangeSet;

/// Something a store can notify.
///
/// Stores hold subscribers weakly; the owner of the `Rc` decides their
/// lifetime.
pub trait Subscriber {
    /// Stable id used for idempotent subscribe/unsubscribe.
    fn id(&self) -> SubscriberId;

    /// Called once per flush of `store` whose changes touch this
    /// subscriber's scope.
    fn notify(&self, store: StoreId, changes: &ChangeSet);
}

struct SubscriberSlot {
    id: SubscriberId,
    scopes: Vec<Option<String>>,
    target: Weak<dyn Subscriber>,
}

impl SubscriberSlot {
    fn is_live(&self) -> bool {
        self.target.strong_count() > 0
    }

    fn in_scope(&self, changes: &ChangeSet) -> bool {
        self.scopes.iter().any(|s| changes.touches(s.as_deref()))
    }
}

struct StoreInner<S> {
    id: StoreId,
    state: Rc<S>,
    version: u64,
    differ: Differ<S>,
    subscribers: Vec<SubscriberSlot>,
    batch: BatchState<S>,
    last_changes: ChangeSet,
}

impl<S> StoreInner<S> {
    /// Record a completed flush; returns the changes to notify with.
    fn flushed(&mut self, changes: ChangeSet) -> ChangeSet {
        self.version += 1;
        self.last_changes = changes.clone();
        changes
    }
}

/// A reactive container for one immutable state value.
///
/// Cloning a `Store` creates a new handle to the **same** container.
///
/// # Invariants
///
/// 1. A snapshot returned by [`get`](Store::get) never changes.
/// 2. `version` increments by exactly 1 per flush with a non-empty change.
/// 3. Subscribers are notified in subscription order, at most once per flush.
/// 4. Inside a transaction nothing is notified; the outermost commit
///    notifies once with the union of inner changes.
pub struct Store<S> {
    inner: Rc<RefCell<StoreInner<S>>>,
    ctx: StateContext,
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            ctx: self.ctx.clone(),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Store")
            .field("id", &inner.id)
            .field("state", &inner.state)
            .field("version", &inner.version)
            .field("subscriber_count", &inner.subscribers.len())
            .finish()
    }
}

impl<S: Clone + PartialEq + 'static> Store<S> {
    /// Create a store whose changes are reported as whole-state changes.
    #[must_use]
    pub fn new(ctx: &StateContext, value: S) -> Self {
        Self::with_differ(ctx, value, whole_diff::<S>)
    }
}

impl<S: Clone + 'static> Store<S> {
    /// Create a store with a custom differ.
    #[must_use]
    pub fn with_differ(ctx: &StateContext, value: S, differ: Differ<S>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(StoreInner {
                id: ctx.next_store_id(),
                state: Rc::new(value),
                version: 0,
                differ,
                subscribers: Vec::new(),
                batch: BatchState::default(),
                last_changes: ChangeSet::none(),
            })),
            ctx: ctx.clone(),
        }
    }

    /// This store's id.
    #[must_use]
    pub fn id(&self) -> StoreId {
        self.inner.borrow().id
    }

    /// The context the store was created with.
    #[must_use]
    pub fn context(&self) -> &StateContext {
        &self.ctx
    }

    /// The current snapshot.
    #[must_use]
    pub fn get(&self) -> Rc<S> {
        Rc::clone(&self.inner.borrow().state)
    }

    /// Access the current snapshot by reference.
    pub fn with<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let state = self.get();
        f(&state)
    }

    /// Number of flushes that changed something.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Changes reported by the most recent flush.
    #[must_use]
    pub fn last_changes(&self) -> ChangeSet {
        self.inner.borrow().last_changes.clone()
    }

    /// True while a transaction block is running.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.inner.borrow().batch.is_active()
    }

    /// Registered subscribers, including dead ones not yet pruned.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// Copy-then-mutate: apply `f` to a duplicate of the state, install the
    /// duplicate, and notify with the differ's changes.
    ///
    /// An unchanged result keeps the old snapshot and notifies nobody.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut inner = self.inner.borrow_mut();
        if inner.batch.is_active() {
            let out = f(Rc::make_mut(&mut inner.state));
            // Unknown scope; narrowed by the differ at commit.
            inner.batch.record(&ChangeSet::Whole);
            return out;
        }

        let mut next = S::clone(&inner.state);
        let out = f(&mut next);
        let changes = (inner.differ)(&inner.state, &next);
        if changes.is_empty() {
            return out;
        }
        inner.state = Rc::new(next);
        let changes = inner.flushed(changes);
        drop(inner);
        self.notify(&changes);
        out
    }

    /// Copy-then-mutate with a change set the caller already knows.
    ///
    /// Skips diffing. An empty `changes` makes this a no-op and `f` is not
    /// run.
    pub fn mutate_keys(&self, changes: ChangeSet, f: impl FnOnce(&mut S)) {
        if changes.is_empty() {
            return;
        }
        let mut inner = self.inner.borrow_mut();
        if inner.batch.is_active() {
            f(Rc::make_mut(&mut inner.state));
            inner.batch.record(&changes);
            return;
        }

        let mut next = S::clone(&inner.state);
        f(&mut next);
        inner.state = Rc::new(next);
        let changes = inner.flushed(changes);
        drop(inner);
        self.notify(&changes);
    }

    /// Reduce: build the next state from a reference to the current one,
    /// without duplicating it first.
    pub fn reduce(&self, f: impl FnOnce(&S) -> S) {
        let mut inner = self.inner.borrow_mut();
        let next = f(&inner.state);
        let changes = (inner.differ)(&inner.state, &next);
        if changes.is_empty() {
            return;
        }
        inner.state = Rc::new(next);
        if inner.batch.is_active() {
            inner.batch.record(&changes);
            return;
        }
        let changes = inner.flushed(changes);
        drop(inner);
        self.notify(&changes);
    }

    /// Replace the whole state.
    pub fn replace(&self, value: S) {
        self.reduce(move |_| value);
    }

    /// Run `f` as one transaction.
    ///
    /// Mutations made by `f` (directly or through nested transactions) are
    /// visible to reads inside `f` immediately but notify nobody until the
    /// outermost transaction returns `Ok`. Then one notification cycle runs
    /// with the accumulated changes. On `Err` the state of this frame is
    /// restored and the error is returned unchanged.
    pub fn transaction<R, E>(&self, f: impl FnOnce(&Self) -> Result<R, E>) -> Result<R, E> {
        {
            let mut inner = self.inner.borrow_mut();
            let snapshot = Rc::clone(&inner.state);
            inner.batch.begin(snapshot);
        }
        let mut guard = RollbackGuard {
            store: self,
            armed: true,
        };
        let result = f(self);
        guard.armed = false;

        match result {
            Ok(value) => {
                self.commit();
                Ok(value)
            }
            Err(err) => {
                self.rollback();
                Err(err)
            }
        }
    }

    fn commit(&self) {
        let changes = {
            let mut inner = self.inner.borrow_mut();
            let Some((mut changes, base)) = inner.batch.commit() else {
                return;
            };
            let net = (inner.differ)(&base, &inner.state);
            if changes.is_empty() || net.is_empty() {
                inner.state = base;
                return;
            }
            changes.intersect_with(&net);
            if changes.is_empty() {
                changes = net;
            }
            inner.flushed(changes)
        };
        self.notify(&changes);
    }

    fn rollback(&self) {
        let Ok(mut inner) = self.inner.try_borrow_mut() else {
            return;
        };
        if let Some(snapshot) = inner.batch.rollback() {
            inner.state = snapshot;
            debug!(
                store = %inner.id,
                depth = inner.batch.depth(),
                "transaction rolled back"
            );
        }
    }

    /// Register `subscriber` for changes touching `scope` (`None` = any).
    ///
    /// Idempotent per `(subscriber, scope)`. Subscribing again with another
    /// scope widens the subscription. Returns whether anything was added.
    pub fn subscribe(&self, subscriber: &Rc<dyn Subscriber>, scope: Option<&str>) -> bool {
        let id = subscriber.id();
        let threshold = self.ctx.config().prune_threshold;
        let mut inner = self.inner.borrow_mut();

        let dead = inner.subscribers.iter().filter(|s| !s.is_live()).count();
        if dead > threshold {
            inner.subscribers.retain(SubscriberSlot::is_live);
            trace!(store = %inner.id, pruned = dead, "swept dead subscribers");
        }

        let scope = scope.map(str::to_owned);
        if let Some(slot) = inner.subscribers.iter_mut().find(|s| s.id == id) {
            if slot.scopes.contains(&scope) {
                return false;
            }
            slot.scopes.push(scope);
            return true;
        }

        trace!(store = %inner.id, subscriber = %id, scope = ?scope, "subscribe");
        inner.subscribers.push(SubscriberSlot {
            id,
            scopes: vec![scope],
            target: Rc::downgrade(subscriber),
        });
        true
    }

    /// Remove every scope of `id`. Idempotent; returns whether it was present.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|s| s.id != id);
        let removed = inner.subscribers.len() != before;
        if removed {
            trace!(store = %inner.id, subscriber = %id, "unsubscribe");
        }
        removed
    }

    /// Whether `id` is currently subscribed.
    #[must_use]
    pub fn is_subscribed(&self, id: SubscriberId) -> bool {
        self.inner
            .borrow()
            .subscribers
            .iter()
            .any(|s| s.id == id && s.is_live())
    }

    /// Notify live, in-scope subscribers and prune dead ones.
    fn notify(&self, changes: &ChangeSet) {
        // Collect first so no borrow is held while subscribers run.
        let (id, targets) = {
            let mut inner = self.inner.borrow_mut();
            let before = inner.subscribers.len();
            inner.subscribers.retain(SubscriberSlot::is_live);
            let pruned = before - inner.subscribers.len();
            if pruned > 0 {
                trace!(store = %inner.id, pruned, "pruned dead subscribers");
            }
            let targets: Vec<Rc<dyn Subscriber>> = inner
                .subscribers
                .iter()
                .filter(|s| s.in_scope(changes))
                .filter_map(|s| s.target.upgrade())
                .collect();
            (inner.id, targets)
        };

        let trace_each = self.ctx.config().trace_notifications;
        let _span = debug_span!("notify", store = %id, subscribers = targets.len()).entered();
        debug!(changed = ?changes, "store changed");

        for target in targets {
            let sub = target.id();
            // Unsubscribed by an earlier subscriber in this cycle.
            if !self.is_subscribed(sub) {
                continue;
            }
            if trace_each {
                trace!(store = %id, subscriber = %sub, "notify subscriber");
            }
            target.notify(id, changes);
        }
    }
}

struct RollbackGuard<'a, S: Clone + 'static> {
    store: &'a Store<S>,
    armed: bool,
}

impl<S: Clone + 'static> Drop for RollbackGuard<'_, S> {
    fn drop(&mut self) {
        if self.armed {
            self.store.rollback();
        }
    }
}

/// Type-erased access to a store for subscribers that span several
/// stores of different state types.
pub trait StoreHandle {
    /// Id of the underlying store.
    fn store_id(&self) -> StoreId;
    /// See [`Store::subscribe`].
    fn attach(&self, subscriber: &Rc<dyn Subscriber>, scope: Option<&str>) -> bool;
    /// See [`Store::unsubscribe`].
    fn detach(&self, id: SubscriberId) -> bool;
}

impl<S: Clone + 'static> StoreHandle for Store<S> {
    fn store_id(&self) -> StoreId {
        self.id()
    }

    fn attach(&self, subscriber: &Rc<dyn Subscriber>, scope: Option<&str>) -> bool {
        self.subscribe(subscriber, scope)
    }

    fn detach(&self, id: SubscriberId) -> bool {
        self.unsubscribe(id)
    }
}

/// A store plus optional attribute scope: one dependency of a subscriber.
#[derive(Clone)]
pub struct Target {
    handle: Rc<dyn StoreHandle>,
    scope: Option<String>,
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("store", &self.handle.store_id())
            .field("scope", &self.scope)
            .finish()
    }
}

impl Target {
    /// Depend on `store`, optionally only on attribute `scope`.
    #[must_use]
    pub fn new<S: Clone + 'static>(store: &Store<S>, scope: Option<&str>) -> Self {
        Self {
            handle: Rc::new(store.clone()),
            scope: scope.map(str::to_owned),
        }
    }

    /// Id of the target store.
    #[must_use]
    pub fn store_id(&self) -> StoreId {
        self.handle.store_id()
    }

    /// The attribute scope, if any.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub(crate) fn attach(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        self.handle.attach(subscriber, self.scope.as_deref())
    }

    pub(crate) fn detach(&self, id: SubscriberId) -> bool {
        self.handle.detach(id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
