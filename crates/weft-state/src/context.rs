#![forbid(unsafe_code)]

//! Application-scoped state context.
//!
//! A [`StateContext`] is built once at startup and handed by reference to
//! every store, history and binding constructor. It owns the id counters,
//! the [`StateConfig`], and the [`RenderScheduler`] that bindings use to ask
//! the rendering layer for a re-render. There is no process-wide registry.
//!
//! # Invariants
//!
//! 1. Ids handed out by one context are unique and strictly increasing.
//! 2. Cloning a context shares counters, config and scheduler.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Identifier of a store (any specialization).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(u64);

impl StoreId {
    /// Raw numeric id.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store#{}", self.0)
    }
}

/// Identifier of a subscriber registered with one or more stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Raw numeric id.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Bindings are the subscribers the rendering layer deals with.
pub type BindingId = SubscriberId;

/// Configuration shared by everything created from one context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Undo depth used by [`History::with_context`](crate::undo::History::with_context).
    pub history_max_size: usize,
    /// Emit a `trace!` event for every binding notification.
    pub trace_notifications: bool,
    /// Dead subscriber slots tolerated before `subscribe` sweeps eagerly.
    pub prune_threshold: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            history_max_size: 100,
            trace_notifications: false,
            prune_threshold: 32,
        }
    }
}

impl StateConfig {
    /// Set the default undo depth.
    #[must_use]
    pub fn with_history_max_size(mut self, max_size: usize) -> Self {
        self.history_max_size = max_size;
        self
    }

    /// Toggle per-binding trace events.
    #[must_use]
    pub fn with_trace_notifications(mut self, enabled: bool) -> Self {
        self.trace_notifications = enabled;
        self
    }

    /// Set the dead-slot sweep threshold.
    #[must_use]
    pub fn with_prune_threshold(mut self, threshold: usize) -> Self {
        self.prune_threshold = threshold;
        self
    }
}

/// The rendering layer's "schedule re-render" hook.
///
/// Called by a binding after it recomputed (or suppressed) its content.
/// The renderer reads the new content from the binding when it runs.
pub trait RenderScheduler {
    /// Request a re-render of `binding`.
    fn schedule(&self, binding: BindingId);
}

/// Scheduler for contexts without a renderer attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScheduler;

impl RenderScheduler for NoopScheduler {
    fn schedule(&self, _binding: BindingId) {}
}

/// Collects bindings that need a re-render until the next frame.
///
/// Ids are kept in first-scheduled order and deduplicated, so a binding
/// scheduled twice before a frame is rendered once.
#[derive(Debug, Default)]
pub struct FrameQueue {
    order: RefCell<Vec<BindingId>>,
    queued: RefCell<HashSet<BindingId>>,
}

impl FrameQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every pending binding id, leaving the queue empty.
    pub fn drain(&self) -> Vec<BindingId> {
        self.queued.borrow_mut().clear();
        std::mem::take(&mut *self.order.borrow_mut())
    }

    /// Pending ids without draining.
    #[must_use]
    pub fn pending(&self) -> Vec<BindingId> {
        self.order.borrow().clone()
    }

    /// True when nothing is waiting for a frame.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.borrow().is_empty()
    }
}

impl RenderScheduler for FrameQueue {
    fn schedule(&self, binding: BindingId) {
        if self.queued.borrow_mut().insert(binding) {
            self.order.borrow_mut().push(binding);
        }
    }
}

struct ContextInner {
    config: StateConfig,
    scheduler: Rc<dyn RenderScheduler>,
    next_store: Cell<u64>,
    next_subscriber: Cell<u64>,
}

/// Shared handle to the application's state context.
#[derive(Clone)]
pub struct StateContext {
    inner: Rc<ContextInner>,
}

impl fmt::Debug for StateContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateContext")
            .field("config", &self.inner.config)
            .field("stores", &self.inner.next_store.get())
            .field("subscribers", &self.inner.next_subscriber.get())
            .finish()
    }
}

impl Default for StateContext {
    fn default() -> Self {
        Self::new(StateConfig::default(), Rc::new(NoopScheduler))
    }
}

impl StateContext {
    /// Create a context with the given config and render scheduler.
    #[must_use]
    pub fn new(config: StateConfig, scheduler: Rc<dyn RenderScheduler>) -> Self {
        Self {
            inner: Rc::new(ContextInner {
                config,
                scheduler,
                next_store: Cell::new(0),
                next_subscriber: Cell::new(0),
            }),
        }
    }

    /// Context with default config and no renderer.
    #[must_use]
    pub fn headless() -> Self {
        Self::default()
    }

    /// Context with default config feeding the given scheduler.
    #[must_use]
    pub fn with_scheduler(scheduler: Rc<dyn RenderScheduler>) -> Self {
        Self::new(StateConfig::default(), scheduler)
    }

    /// The shared configuration.
    #[must_use]
    pub fn config(&self) -> &StateConfig {
        &self.inner.config
    }

    /// The render scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Rc<dyn RenderScheduler> {
        &self.inner.scheduler
    }

    pub(crate) fn next_store_id(&self) -> StoreId {
        let id = self.inner.next_store.get() + 1;
        self.inner.next_store.set(id);
        StoreId(id)
    }

    /// Allocate an id for a custom [`Subscriber`](crate::reactive::Subscriber).
    #[must_use]
    pub fn next_subscriber_id(&self) -> SubscriberId {
        let id = self.inner.next_subscriber.get() + 1;
        self.inner.next_subscriber.set(id);
        SubscriberId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let ctx = StateContext::headless();
        let a = ctx.next_store_id();
        let b = ctx.next_store_id();
        assert!(b > a);

        let s1 = ctx.next_subscriber_id();
        let s2 = ctx.clone().next_subscriber_id();
        assert!(s2 > s1);
    }

    #[test]
    fn frame_queue_dedups_in_order() {
        let q = FrameQueue::new();
        let ctx = StateContext::headless();
        let a = ctx.next_subscriber_id();
        let b = ctx.next_subscriber_id();

        q.schedule(b);
        q.schedule(a);
        q.schedule(b);
        assert_eq!(q.pending(), vec![b, a]);

        assert_eq!(q.drain(), vec![b, a]);
        assert!(q.is_empty());

        q.schedule(b);
        assert_eq!(q.drain(), vec![b]);
    }

    #[test]
    fn config_builder_and_serde() {
        let cfg = StateConfig::default()
            .with_history_max_size(5)
            .with_trace_notifications(true)
            .with_prune_threshold(2);
        assert_eq!(cfg.history_max_size, 5);

        let json = serde_json::to_string(&cfg).unwrap();
        let back: StateConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);

        let partial: StateConfig = serde_json::from_str(r#"{"history_max_size": 7}"#).unwrap();
        assert_eq!(partial.history_max_size, 7);
        assert_eq!(partial.prune_threshold, 32);
    }

    #[test]
    fn display_ids() {
        let ctx = StateContext::headless();
        assert_eq!(ctx.next_store_id().to_string(), "store#1");
        assert_eq!(ctx.next_subscriber_id().to_string(), "sub#1");
    }
}
