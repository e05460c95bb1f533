#![forbid(unsafe_code)]

//! Bindings: render-producing callbacks subscribed to store slices.
//!
//! A [`Binding<C>`] ties a producer of renderable content `C` to a primary
//! [`Source`] plus any number of extra dependencies. It evaluates once on
//! construction, then again whenever a flush of one of its targets touches
//! the target's scope. After each re-evaluation it asks the context's
//! [`RenderScheduler`](crate::context::RenderScheduler) to re-render it.
//!
//! # Usage
//!
//! ```ignore
//! let todo = Atom::from_json(&ctx, json!({"text": "t", "completed": false}))?;
//! let row = Binding::build(&ctx, todo.attr("completed"))
//!     .filter(Filter::value_only(|done: &Value| done == &json!(true)))
//!     .produce(Producer::value_only(|_| "item".to_string()));
//!
//! todo.set("completed", json!(true))?;
//! assert_eq!(row.content(), Content::Rendered("item".into()));
//! ```
//!
//! # Invariants
//!
//! 1. The producer runs only for flushes that touch a target's scope.
//! 2. A false filter yields [`Content::Suppressed`] without running the
//!    producer; the binding stays subscribed.
//! 3. After [`detach`](Binding::detach) the producer never runs again, even
//!    for a notification already in flight.
//!
//! # Failure Modes
//!
//! - Producer or filter panic: propagates to whoever triggered the flush.
//! - All handles dropped without `detach`: stores only hold the binding
//!   weakly, so it stops receiving notifications and is pruned.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use tracing::trace;

use super::store::{Store, Subscriber, Target};
use crate::change::ChangeSet;
use crate::context::{BindingId, StateContext, StoreId, SubscriberId};

/// Something a binding can depend on and read from.
pub trait Source: 'static {
    /// What producers and filters receive.
    type Value: ?Sized + 'static;

    /// The store (and scope) to subscribe to.
    fn target(&self) -> Target;

    /// Read the current value.
    fn read<R, F: FnOnce(&Self::Value) -> R>(&self, f: F) -> R;
}

impl<S: Clone + 'static> Source for Store<S> {
    type Value = S;

    fn target(&self) -> Target {
        Target::new(self, None)
    }

    fn read<R, F: FnOnce(&S) -> R>(&self, f: F) -> R {
        self.with(f)
    }
}

/// A store restricted to one attribute scope. Readers still get the whole
/// snapshot.
#[derive(Clone)]
pub struct Scoped<S> {
    store: Store<S>,
    key: String,
}

impl<S: Clone + 'static> Scoped<S> {
    /// Depend on `key` of `store`.
    #[must_use]
    pub fn new(store: &Store<S>, key: impl Into<String>) -> Self {
        Self {
            store: store.clone(),
            key: key.into(),
        }
    }
}

impl<S: Clone + 'static> Store<S> {
    /// This store scoped to `key`, as a binding source.
    #[must_use]
    pub fn scoped(&self, key: impl Into<String>) -> Scoped<S> {
        Scoped::new(self, key)
    }
}

impl<S: Clone + 'static> Source for Scoped<S> {
    type Value = S;

    fn target(&self) -> Target {
        Target::new(&self.store, Some(&self.key))
    }

    fn read<R, F: FnOnce(&S) -> R>(&self, f: F) -> R {
        self.store.with(f)
    }
}

/// Why a binding is being evaluated.
#[derive(Debug)]
pub struct BindContext<'a> {
    /// The binding being evaluated.
    pub binding: BindingId,
    /// Extra arguments supplied at construction.
    pub args: &'a [Value],
    /// The store that triggered this evaluation; `None` on the initial run.
    pub store: Option<StoreId>,
    /// Changes that triggered this evaluation; `Whole` on the initial run.
    pub changes: &'a ChangeSet,
}

/// A producer or filter callback, with its call shape chosen up front.
pub enum Callback<V: ?Sized, R> {
    /// Ignores both context and value.
    NoArgs(Box<dyn Fn() -> R>),
    /// Receives the source value.
    ValueOnly(Box<dyn Fn(&V) -> R>),
    /// Receives the evaluation context and the source value.
    ContextAndValue(Box<dyn Fn(&BindContext<'_>, &V) -> R>),
}

/// Callback producing renderable content.
pub type Producer<V, C> = Callback<V, C>;

/// Callback deciding whether content is produced at all.
pub type Filter<V> = Callback<V, bool>;

impl<V: ?Sized, R> Callback<V, R> {
    /// Shape [`Callback::NoArgs`].
    pub fn no_args(f: impl Fn() -> R + 'static) -> Self {
        Self::NoArgs(Box::new(f))
    }

    /// Shape [`Callback::ValueOnly`].
    pub fn value_only(f: impl Fn(&V) -> R + 'static) -> Self {
        Self::ValueOnly(Box::new(f))
    }

    /// Shape [`Callback::ContextAndValue`].
    pub fn with_context(f: impl Fn(&BindContext<'_>, &V) -> R + 'static) -> Self {
        Self::ContextAndValue(Box::new(f))
    }

    fn call(&self, cx: &BindContext<'_>, value: &V) -> R {
        match self {
            Self::NoArgs(f) => f(),
            Self::ValueOnly(f) => f(value),
            Self::ContextAndValue(f) => f(cx, value),
        }
    }
}

impl<V: ?Sized, R> fmt::Debug for Callback<V, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match self {
            Self::NoArgs(_) => "NoArgs",
            Self::ValueOnly(_) => "ValueOnly",
            Self::ContextAndValue(_) => "ContextAndValue",
        };
        f.debug_tuple("Callback").field(&shape).finish()
    }
}

/// Output of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content<C> {
    /// The producer ran and returned this.
    Rendered(C),
    /// The filter rejected the current state.
    Suppressed,
}

impl<C> Content<C> {
    /// The rendered content, if any.
    #[must_use]
    pub fn rendered(&self) -> Option<&C> {
        match self {
            Self::Rendered(c) => Some(c),
            Self::Suppressed => None,
        }
    }

    /// True for [`Content::Suppressed`].
    #[must_use]
    pub fn is_suppressed(&self) -> bool {
        matches!(self, Self::Suppressed)
    }
}

type Eval<C> = Box<dyn Fn(&BindContext<'_>) -> Content<C>>;

struct BindingInner<C> {
    id: BindingId,
    ctx: StateContext,
    targets: RefCell<Vec<Target>>,
    args: Vec<Value>,
    eval: Eval<C>,
    content: RefCell<Rc<Content<C>>>,
    evaluations: Rc<Cell<u64>>,
    detached: Cell<bool>,
}

impl<C> BindingInner<C> {
    fn in_scope(&self, store: StoreId, changes: &ChangeSet) -> bool {
        self.targets
            .borrow()
            .iter()
            .any(|t| t.store_id() == store && changes.touches(t.scope()))
    }

    fn detach(&self) {
        if self.detached.replace(true) {
            return;
        }
        let targets = std::mem::take(&mut *self.targets.borrow_mut());
        for target in &targets {
            target.detach(self.id);
        }
        trace!(binding = %self.id, targets = targets.len(), "binding detached");
    }
}

impl<C: 'static> Subscriber for BindingInner<C> {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn notify(&self, store: StoreId, changes: &ChangeSet) {
        if self.detached.get() || !self.in_scope(store, changes) {
            return;
        }
        let cx = BindContext {
            binding: self.id,
            args: &self.args,
            store: Some(store),
            changes,
        };
        let content = (self.eval)(&cx);
        // The producer may have detached this binding.
        if self.detached.get() {
            return;
        }
        *self.content.borrow_mut() = Rc::new(content);
        self.ctx.scheduler().schedule(self.id);
    }
}

/// A live subscription producing content for the rendering layer.
///
/// Cloning shares the same subscription. Stores hold bindings weakly: once
/// every handle is dropped the binding stops being notified.
pub struct Binding<C> {
    inner: Rc<BindingInner<C>>,
}

impl<C> Clone for Binding<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<C: fmt::Debug> fmt::Debug for Binding<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("id", &self.inner.id)
            .field("content", &**self.inner.content.borrow())
            .field("targets", &*self.inner.targets.borrow())
            .field("evaluations", &self.inner.evaluations.get())
            .field("detached", &self.inner.detached.get())
            .finish()
    }
}

impl<C: 'static> Binding<C> {
    /// Bind `producer` to `source` with no filter and no extra targets.
    pub fn new<Src: Source>(
        ctx: &StateContext,
        source: Src,
        producer: Producer<Src::Value, C>,
    ) -> Self {
        Self::build(ctx, source).produce(producer)
    }

    /// Start building a binding on `source`.
    pub fn build<Src: Source>(ctx: &StateContext, source: Src) -> BindingBuilder<Src, C> {
        BindingBuilder {
            ctx: ctx.clone(),
            source,
            extra: Vec::new(),
            args: Vec::new(),
            filter: None,
            _content: std::marker::PhantomData,
        }
    }

    /// This binding's id (what the scheduler receives).
    #[must_use]
    pub fn id(&self) -> BindingId {
        self.inner.id
    }

    /// Access the latest content by reference.
    ///
    /// `f` may mutate the binding's own sources; it keeps seeing the content
    /// that was current when it was called.
    pub fn with_content<R>(&self, f: impl FnOnce(&Content<C>) -> R) -> R {
        let content = Rc::clone(&self.inner.content.borrow());
        f(&content)
    }

    /// How many times the producer has run.
    #[must_use]
    pub fn evaluations(&self) -> u64 {
        self.inner.evaluations.get()
    }

    /// The current dependencies. Empty after detach.
    #[must_use]
    pub fn targets(&self) -> Vec<Target> {
        self.inner.targets.borrow().clone()
    }

    /// Whether [`detach`](Self::detach) has been called.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.inner.detached.get()
    }

    /// Unsubscribe from every target. Idempotent and safe to call from
    /// inside a notification.
    pub fn detach(&self) {
        self.inner.detach();
    }
}

impl<C: Clone + 'static> Binding<C> {
    /// A copy of the latest content.
    #[must_use]
    pub fn content(&self) -> Content<C> {
        Content::clone(&self.inner.content.borrow())
    }
}

/// Builder returned by [`Binding::build`].
pub struct BindingBuilder<Src: Source, C> {
    ctx: StateContext,
    source: Src,
    extra: Vec<Target>,
    args: Vec<Value>,
    filter: Option<Filter<Src::Value>>,
    _content: std::marker::PhantomData<fn() -> C>,
}

impl<Src: Source, C: 'static> BindingBuilder<Src, C> {
    /// Extra arguments handed to `ContextAndValue` callbacks.
    #[must_use]
    pub fn args(mut self, args: impl IntoIterator<Item = Value>) -> Self {
        self.args.extend(args);
        self
    }

    /// Suppress content while `filter` returns false.
    #[must_use]
    pub fn filter(mut self, filter: Filter<Src::Value>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Also re-evaluate when `other` changes.
    #[must_use]
    pub fn also<O: Source>(mut self, other: &O) -> Self {
        self.extra.push(other.target());
        self
    }

    /// Finish: evaluate once and subscribe to every target.
    pub fn produce(self, producer: Producer<Src::Value, C>) -> Binding<C> {
        let Self {
            ctx,
            source,
            extra,
            args,
            filter,
            ..
        } = self;

        let mut targets = vec![source.target()];
        targets.extend(extra);

        let evaluations = Rc::new(Cell::new(0));
        let counter = Rc::clone(&evaluations);
        let eval: Eval<C> = Box::new(move |cx: &BindContext<'_>| {
            source.read(|value| {
                if let Some(filter) = &filter
                    && !filter.call(cx, value)
                {
                    return Content::Suppressed;
                }
                counter.set(counter.get() + 1);
                Content::Rendered(producer.call(cx, value))
            })
        });

        let id = ctx.next_subscriber_id();
        let initial = eval(&BindContext {
            binding: id,
            args: &args,
            store: None,
            changes: &ChangeSet::Whole,
        });

        let inner = Rc::new(BindingInner {
            id,
            ctx,
            targets: RefCell::new(targets),
            args,
            eval,
            content: RefCell::new(Rc::new(initial)),
            evaluations,
            detached: Cell::new(false),
        });

        let subscriber: Rc<dyn Subscriber> = inner.clone();
        for target in inner.targets.borrow().iter() {
            target.attach(&subscriber);
        }
        trace!(binding = %id, targets = inner.targets.borrow().len(), "binding attached");

        Binding { inner }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
