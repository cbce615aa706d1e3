#![forbid(unsafe_code)]

//! The view-binding adapter.
//!
//! A [`ViewBinding`] sits between a view whose bound expression may
//! change at any time and the asynchronous sources those expressions
//! evaluate to. The owning view pushes a [`SourceRef`] whenever its
//! expression re-evaluates; the binding keeps exactly one subscription to
//! the most recent source and funnels what it observes into a
//! [`ViewSink`], triggering a render after every mutation.
//!
//! # Contract
//!
//! - Pushing the identical source twice in a row (by handle identity) is
//!   a no-op: one subscription lifecycle, not two.
//! - Pushing [`SourceRef::Unset`] or [`SourceRef::Empty`] delivers that
//!   literal to the sink directly: no subscription, one render. Error
//!   and completion flags are left untouched, exactly as if the view had
//!   been handed a plain non-reactive value.
//! - Pushing a stream or deferred cancels the previous subscription
//!   synchronously, resets the sink (value cleared, flags cleared, one
//!   render), then subscribes. Each accepted emission is one sink update
//!   plus one render; consecutive duplicates (per [`DedupPolicy`]) are
//!   dropped before the sink sees them. The duplicate memory belongs to
//!   the active source and is cleared on every switch.
//! - An upstream error terminates the subscription, marks the sink
//!   errored, renders once, and propagates nothing.
//! - Upstream completion marks the sink completed and renders once.
//! - Disposal (explicit or via the guard from
//!   [`ViewBinding::begin_rendering`]) is terminal: no callback runs
//!   afterwards, ever.
//!
//! A late result from a replaced source must be discarded, not delivered:
//! besides synchronous unsubscription, every observer carries the
//! generation it was created under and is checked against the binding's
//! current generation on arrival.
//!
//! # States
//!
//! `Idle` → (push) → `SourceActive` or `ValueSet`; every switch to a
//! subscribing source passes through `Resetting`; `Disposed` is terminal
//! and reachable from anywhere.
//!
//! # Failure Modes
//!
//! - Sink or render callbacks that panic propagate to whoever triggered
//!   the delivery. The binding guards its own state, not the caller's.
//! - A source that never produces leaves the view in the reset state
//!   indefinitely. Intended degradation; no timeout exists here.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::render::RenderTrigger;
use crate::source::{Deferred, Observer, SourceError, StreamSource, Subscription};

// ---------------------------------------------------------------------------
// BoundValue
// ---------------------------------------------------------------------------

/// What the view currently holds.
///
/// `Unset` and `Empty` are distinct literals: the first means "nothing
/// has been bound (or the binding was reset)", the second means "the view
/// was explicitly bound to nothing".
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BoundValue<T> {
    /// No value bound, or cleared by a reset.
    Unset,
    /// Explicitly bound to nothing.
    Empty,
    /// A value produced by the active source.
    Ready(T),
}

impl<T> BoundValue<T> {
    /// Whether this is the `Unset` literal.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    /// Whether this is the `Empty` literal.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The ready value, if any.
    #[must_use]
    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// Consume into the ready value, if any.
    #[must_use]
    pub fn into_ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// SourceRef
// ---------------------------------------------------------------------------

/// A potential source pushed into the binding: absent, explicitly empty,
/// or a handle to an asynchronous producer.
pub enum SourceRef<T> {
    /// No source.
    Unset,
    /// Explicitly no source.
    Empty,
    /// A multi-emission stream.
    Stream(StreamSource<T>),
    /// A single-settlement deferred.
    Deferred(Deferred<T>),
}

impl<T> SourceRef<T> {
    /// Identity comparison: literals equal themselves, handles compare by
    /// pointer. Payload equality is never consulted.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unset, Self::Unset) | (Self::Empty, Self::Empty) => true,
            (Self::Stream(a), Self::Stream(b)) => a.ptr_eq(b),
            (Self::Deferred(a), Self::Deferred(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl<T> Clone for SourceRef<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Unset => Self::Unset,
            Self::Empty => Self::Empty,
            Self::Stream(stream) => Self::Stream(stream.clone()),
            Self::Deferred(deferred) => Self::Deferred(deferred.clone()),
        }
    }
}

impl<T> fmt::Debug for SourceRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => f.write_str("SourceRef::Unset"),
            Self::Empty => f.write_str("SourceRef::Empty"),
            Self::Stream(_) => f.write_str("SourceRef::Stream(..)"),
            Self::Deferred(_) => f.write_str("SourceRef::Deferred(..)"),
        }
    }
}

impl<T> From<StreamSource<T>> for SourceRef<T> {
    fn from(stream: StreamSource<T>) -> Self {
        Self::Stream(stream)
    }
}

impl<T> From<&StreamSource<T>> for SourceRef<T> {
    fn from(stream: &StreamSource<T>) -> Self {
        Self::Stream(stream.clone())
    }
}

impl<T> From<Deferred<T>> for SourceRef<T> {
    fn from(deferred: Deferred<T>) -> Self {
        Self::Deferred(deferred)
    }
}

impl<T> From<&Deferred<T>> for SourceRef<T> {
    fn from(deferred: &Deferred<T>) -> Self {
        Self::Deferred(deferred.clone())
    }
}

// ---------------------------------------------------------------------------
// DedupPolicy
// ---------------------------------------------------------------------------

/// Equality policy for suppressing consecutive duplicate emissions from
/// the active source.
pub enum DedupPolicy<T> {
    /// Structural equality via `PartialEq`. The default.
    Value,
    /// Caller-supplied predicate; `true` means "equal, suppress".
    Custom(Rc<dyn Fn(&T, &T) -> bool>),
    /// No suppression; every emission reaches the sink.
    Off,
}

impl<T> Clone for DedupPolicy<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Value => Self::Value,
            Self::Custom(eq) => Self::Custom(Rc::clone(eq)),
            Self::Off => Self::Off,
        }
    }
}

impl<T> Default for DedupPolicy<T> {
    fn default() -> Self {
        Self::Value
    }
}

impl<T> fmt::Debug for DedupPolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value => f.write_str("DedupPolicy::Value"),
            Self::Custom(_) => f.write_str("DedupPolicy::Custom(..)"),
            Self::Off => f.write_str("DedupPolicy::Off"),
        }
    }
}

// ---------------------------------------------------------------------------
// ViewSink and ViewContext
// ---------------------------------------------------------------------------

/// Caller-supplied sink the binding writes view state into.
pub trait ViewSink<T> {
    /// Clear the value and both flags ahead of a new subscription.
    fn reset(&self);
    /// Record the latest value.
    fn next(&self, value: BoundValue<T>);
    /// Record that the active source failed.
    fn error(&self, error: SourceError);
    /// Record that the active source completed.
    fn complete(&self);
}

/// The view-facing state a template reads: latest value, error flag,
/// completion flag.
#[derive(Clone, Debug)]
pub struct ViewContext<T> {
    value: BoundValue<T>,
    errored: bool,
    error: Option<SourceError>,
    completed: bool,
}

impl<T> ViewContext<T> {
    /// Fresh context: `Unset`, no flags.
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: BoundValue::Unset,
            errored: false,
            error: None,
            completed: false,
        }
    }

    /// The latest bound value.
    #[must_use]
    pub fn value(&self) -> &BoundValue<T> {
        &self.value
    }

    /// Whether the active source has failed.
    #[must_use]
    pub fn errored(&self) -> bool {
        self.errored
    }

    /// The recorded failure, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&SourceError> {
        self.error.as_ref()
    }

    /// Whether the active source has completed.
    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }
}

impl<T> Default for ViewContext<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared, clonable [`ViewContext`] that doubles as the binding's sink.
pub struct SharedViewContext<T> {
    inner: Rc<RefCell<ViewContext<T>>>,
}

impl<T> Clone for SharedViewContext<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Default for SharedViewContext<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SharedViewContext<T> {
    /// Fresh shared context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ViewContext::new())),
        }
    }

    /// Whether the active source has failed.
    #[must_use]
    pub fn errored(&self) -> bool {
        self.inner.borrow().errored
    }

    /// Whether the active source has completed.
    #[must_use]
    pub fn completed(&self) -> bool {
        self.inner.borrow().completed
    }

    /// The recorded failure, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<SourceError> {
        self.inner.borrow().error.clone()
    }
}

impl<T: Clone> SharedViewContext<T> {
    /// The latest bound value.
    #[must_use]
    pub fn value(&self) -> BoundValue<T> {
        self.inner.borrow().value.clone()
    }

    /// A copy of the whole context.
    #[must_use]
    pub fn snapshot(&self) -> ViewContext<T> {
        self.inner.borrow().clone()
    }
}

impl<T> ViewSink<T> for SharedViewContext<T> {
    fn reset(&self) {
        let mut ctx = self.inner.borrow_mut();
        ctx.value = BoundValue::Unset;
        ctx.errored = false;
        ctx.error = None;
        ctx.completed = false;
    }

    fn next(&self, value: BoundValue<T>) {
        self.inner.borrow_mut().value = value;
    }

    fn error(&self, error: SourceError) {
        let mut ctx = self.inner.borrow_mut();
        ctx.errored = true;
        ctx.error = Some(error);
    }

    fn complete(&self) {
        self.inner.borrow_mut().completed = true;
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedViewContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.borrow().fmt(f)
    }
}

// ---------------------------------------------------------------------------
// ViewBinding
// ---------------------------------------------------------------------------

/// Lifecycle state of a binding. `Resetting` is observable only from
/// within sink callbacks triggered by a source switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingState {
    /// Constructed, nothing pushed yet.
    Idle,
    /// A literal (`Unset`/`Empty`) is bound; no subscription exists.
    ValueSet,
    /// Mid-switch: the previous value was cleared, the new subscription
    /// is not yet stored.
    Resetting,
    /// Subscribed to a stream or deferred.
    SourceActive,
    /// Disposed. Terminal.
    Disposed,
}

/// Construction parameters for [`ViewBinding`].
pub struct BindingConfig<T> {
    /// Where view state goes.
    pub sink: Rc<dyn ViewSink<T>>,
    /// Invoked once after every sink mutation.
    pub render: Rc<dyn RenderTrigger>,
    /// Consecutive-duplicate suppression policy.
    pub dedup: DedupPolicy<T>,
}

struct BindingInner<T> {
    sink: Rc<dyn ViewSink<T>>,
    render: Rc<dyn RenderTrigger>,
    dedup: DedupPolicy<T>,
    state: BindingState,
    generation: u64,
    current: Option<SourceRef<T>>,
    active: Option<Subscription>,
    last_emitted: Option<T>,
}

/// The adapter: one active subscription to the most recently pushed
/// source, funneled into a sink plus render trigger.
pub struct ViewBinding<T: Clone + PartialEq + 'static> {
    inner: Rc<RefCell<BindingInner<T>>>,
}

impl<T: Clone + PartialEq + 'static> ViewBinding<T> {
    /// Construct from explicit parts.
    #[must_use]
    pub fn new(config: BindingConfig<T>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(BindingInner {
                sink: config.sink,
                render: config.render,
                dedup: config.dedup,
                state: BindingState::Idle,
                generation: 0,
                current: None,
                active: None,
                last_emitted: None,
            })),
        }
    }

    /// Convenience constructor: a binding writing into a fresh
    /// [`SharedViewContext`] with the default dedup policy.
    #[must_use]
    pub fn with_context(render: Rc<dyn RenderTrigger>) -> (Self, SharedViewContext<T>) {
        let context = SharedViewContext::new();
        let binding = Self::new(BindingConfig {
            sink: Rc::new(context.clone()),
            render,
            dedup: DedupPolicy::Value,
        });
        (binding, context)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> BindingState {
        self.inner.borrow().state
    }

    /// Push the potential source the view's expression evaluated to.
    ///
    /// Identical consecutive pushes (handle identity) are no-ops. Any
    /// other push cancels the previous subscription synchronously before
    /// proceeding. No-op after disposal.
    pub fn push(&self, source: impl Into<SourceRef<T>>) {
        let source = source.into();
        let generation = {
            let mut inner = self.inner.borrow_mut();
            if inner.state == BindingState::Disposed {
                debug!("push on disposed binding ignored");
                return;
            }
            if inner
                .current
                .as_ref()
                .is_some_and(|current| current.same_as(&source))
            {
                trace!("duplicate source push suppressed");
                return;
            }
            inner.generation += 1;
            inner.current = Some(source.clone());
            inner.last_emitted = None;
            let previous = inner.active.take();
            drop(inner);
            // Cancel-before-switch: the old observer detaches before the
            // new source gets a chance to deliver.
            drop(previous);
            self.inner.borrow().generation
        };

        match source {
            SourceRef::Unset => self.set_literal(BoundValue::Unset),
            SourceRef::Empty => self.set_literal(BoundValue::Empty),
            SourceRef::Stream(stream) => {
                self.reset_view();
                let subscription = stream.subscribe(self.observer(generation));
                self.store_subscription(generation, subscription);
            }
            SourceRef::Deferred(deferred) => {
                self.reset_view();
                let subscription = deferred.subscribe(self.observer(generation));
                self.store_subscription(generation, subscription);
            }
        }
    }

    /// Activate rendering for the owning view's lifetime. Dropping the
    /// returned guard disposes the binding; call exactly once.
    pub fn begin_rendering(&self) -> Subscription {
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                dispose_inner(&inner);
            }
        })
    }

    /// Dispose explicitly. Terminal and idempotent; every later push or
    /// source callback is a no-op.
    pub fn dispose(&self) {
        dispose_inner(&self.inner);
    }

    fn set_literal(&self, literal: BoundValue<T>) {
        let (sink, render) = {
            let mut inner = self.inner.borrow_mut();
            inner.state = BindingState::ValueSet;
            (Rc::clone(&inner.sink), Rc::clone(&inner.render))
        };
        sink.next(literal);
        render.render();
    }

    fn reset_view(&self) {
        let (sink, render) = {
            let mut inner = self.inner.borrow_mut();
            inner.state = BindingState::Resetting;
            (Rc::clone(&inner.sink), Rc::clone(&inner.render))
        };
        sink.reset();
        render.render();
    }

    fn observer(&self, generation: u64) -> Observer<T> {
        let on_next = Rc::downgrade(&self.inner);
        let on_error = Rc::downgrade(&self.inner);
        let on_complete = Rc::downgrade(&self.inner);
        Observer::new(
            move |value| {
                if let Some(inner) = on_next.upgrade() {
                    deliver_value(&inner, generation, value);
                }
            },
            move |error| {
                if let Some(inner) = on_error.upgrade() {
                    deliver_error(&inner, generation, error);
                }
            },
            move || {
                if let Some(inner) = on_complete.upgrade() {
                    deliver_complete(&inner, generation);
                }
            },
        )
    }

    fn store_subscription(&self, generation: u64, subscription: Subscription) {
        let mut inner = self.inner.borrow_mut();
        if inner.state != BindingState::Disposed && inner.generation == generation {
            inner.active = Some(subscription);
            if inner.state == BindingState::Resetting {
                inner.state = BindingState::SourceActive;
            }
        }
        // Otherwise the source was replaced (or the binding disposed)
        // while subscribing; the guard drops here and detaches.
    }
}

impl<T: Clone + PartialEq + 'static> fmt::Debug for ViewBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ViewBinding")
            .field("state", &inner.state)
            .field("generation", &inner.generation)
            .finish()
    }
}

fn dispose_inner<T>(inner: &Rc<RefCell<BindingInner<T>>>) {
    let previous = {
        let mut guard = inner.borrow_mut();
        if guard.state == BindingState::Disposed {
            debug!("dispose on disposed binding ignored");
            return;
        }
        guard.state = BindingState::Disposed;
        guard.current = None;
        guard.last_emitted = None;
        guard.active.take()
    };
    drop(previous);
}

fn deliver_value<T: Clone + PartialEq>(
    inner: &Rc<RefCell<BindingInner<T>>>,
    generation: u64,
    value: T,
) {
    let (sink, render) = {
        let mut guard = inner.borrow_mut();
        if guard.state == BindingState::Disposed || guard.generation != generation {
            trace!("stale value discarded");
            return;
        }
        let duplicate = match &guard.dedup {
            DedupPolicy::Value => guard.last_emitted.as_ref() == Some(&value),
            DedupPolicy::Custom(eq) => guard
                .last_emitted
                .as_ref()
                .is_some_and(|last| eq(last, &value)),
            DedupPolicy::Off => false,
        };
        if duplicate {
            trace!("consecutive duplicate suppressed");
            return;
        }
        guard.last_emitted = Some(value.clone());
        (Rc::clone(&guard.sink), Rc::clone(&guard.render))
    };
    sink.next(BoundValue::Ready(value));
    render.render();
}

fn deliver_error<T>(inner: &Rc<RefCell<BindingInner<T>>>, generation: u64, error: SourceError) {
    let (sink, render) = {
        let mut guard = inner.borrow_mut();
        if guard.state == BindingState::Disposed || guard.generation != generation {
            trace!("stale error discarded");
            return;
        }
        // The failed subscription delivers nothing further.
        guard.active = None;
        (Rc::clone(&guard.sink), Rc::clone(&guard.render))
    };
    sink.error(error);
    render.render();
}

fn deliver_complete<T>(inner: &Rc<RefCell<BindingInner<T>>>, generation: u64) {
    let (sink, render) = {
        let mut guard = inner.borrow_mut();
        if guard.state == BindingState::Disposed || guard.generation != generation {
            trace!("stale completion discarded");
            return;
        }
        guard.active = None;
        (Rc::clone(&guard.sink), Rc::clone(&guard.render))
    };
    sink.complete();
    render.render();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use proptest::prelude::*;

    struct CountRender {
        count: Cell<u32>,
    }

    impl CountRender {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                count: Cell::new(0),
            })
        }

        fn count(&self) -> u32 {
            self.count.get()
        }
    }

    impl RenderTrigger for CountRender {
        fn render(&self) {
            self.count.set(self.count.get() + 1);
        }
    }

    fn setup() -> (ViewBinding<i32>, SharedViewContext<i32>, Rc<CountRender>) {
        let render = CountRender::new();
        let (binding, context) = ViewBinding::with_context(Rc::clone(&render) as Rc<dyn RenderTrigger>);
        (binding, context, render)
    }

    #[test]
    fn unset_and_empty_literals_reach_the_view_directly() {
        let (binding, context, render) = setup();
        assert_eq!(binding.state(), BindingState::Idle);

        binding.push(SourceRef::Unset);
        assert!(context.value().is_unset());
        assert_eq!(render.count(), 1);
        assert_eq!(binding.state(), BindingState::ValueSet);

        binding.push(SourceRef::Empty);
        assert!(context.value().is_empty());
        assert_eq!(render.count(), 2);
    }

    #[test]
    fn repeated_literal_push_is_a_no_op() {
        let (binding, _context, render) = setup();
        binding.push(SourceRef::Unset);
        binding.push(SourceRef::Unset);
        assert_eq!(render.count(), 1, "second identical push must not render");
    }

    #[test]
    fn literal_push_does_not_clear_error_flag() {
        let (binding, context, _render) = setup();
        let stream = StreamSource::new();
        binding.push(&stream);
        stream.fail("boom");
        assert!(context.errored());

        binding.push(SourceRef::Empty);
        assert!(context.value().is_empty());
        assert!(context.errored(), "literals update the value only");
    }

    #[test]
    fn subscribing_source_resets_view_first() {
        let (binding, context, render) = setup();
        binding.push(SourceRef::Empty);
        assert_eq!(render.count(), 1);

        let stream = StreamSource::new();
        binding.push(&stream);
        assert!(context.value().is_unset(), "reset clears to Unset");
        assert_eq!(render.count(), 2, "reset renders before any emission");
        assert_eq!(binding.state(), BindingState::SourceActive);
        assert_eq!(stream.subscriber_count(), 1);
    }

    #[test]
    fn emissions_update_view_and_render_once_each() {
        let (binding, context, render) = setup();
        let stream = StreamSource::new();
        binding.push(&stream);

        stream.emit(10);
        assert_eq!(context.value(), BoundValue::Ready(10));
        assert_eq!(render.count(), 2); // reset + value

        stream.emit(11);
        assert_eq!(context.value(), BoundValue::Ready(11));
        assert_eq!(render.count(), 3);
    }

    #[test]
    fn consecutive_duplicates_are_suppressed() {
        let (binding, context, render) = setup();
        let stream = StreamSource::new();
        binding.push(&stream);

        stream.emit(1);
        stream.emit(1);
        stream.emit(2);
        assert_eq!(context.value(), BoundValue::Ready(2));
        // reset + 1 + 2; the repeated 1 never rendered.
        assert_eq!(render.count(), 3);
    }

    #[test]
    fn duplicate_suppression_allows_resurfacing_values() {
        let (binding, context, render) = setup();
        let stream = StreamSource::new();
        binding.push(&stream);

        stream.emit(1);
        stream.emit(2);
        stream.emit(1);
        assert_eq!(context.value(), BoundValue::Ready(1));
        assert_eq!(render.count(), 4, "only *consecutive* repeats collapse");
    }

    #[test]
    fn dedup_memory_clears_on_source_switch() {
        let (binding, context, render) = setup();
        let first = StreamSource::new();
        binding.push(&first);
        first.emit(7);
        assert_eq!(render.count(), 2);

        let second = StreamSource::new();
        binding.push(&second);
        second.emit(7);
        assert_eq!(
            context.value(),
            BoundValue::Ready(7),
            "same value from a new source must be delivered"
        );
        assert_eq!(render.count(), 4); // + reset + value
    }

    #[test]
    fn dedup_off_delivers_every_emission() {
        let render = CountRender::new();
        let context = SharedViewContext::new();
        let binding = ViewBinding::new(BindingConfig {
            sink: Rc::new(context.clone()),
            render: Rc::clone(&render) as Rc<dyn RenderTrigger>,
            dedup: DedupPolicy::Off,
        });
        let stream = StreamSource::new();
        binding.push(&stream);

        stream.emit(5);
        stream.emit(5);
        assert_eq!(context.value(), BoundValue::Ready(5));
        assert_eq!(render.count(), 3, "reset + both emissions");
    }

    #[test]
    fn custom_dedup_policy_decides_equality() {
        let render = CountRender::new();
        let context: SharedViewContext<String> = SharedViewContext::new();
        let binding = ViewBinding::new(BindingConfig {
            sink: Rc::new(context.clone()),
            render: Rc::clone(&render) as Rc<dyn RenderTrigger>,
            dedup: DedupPolicy::Custom(Rc::new(|a: &String, b: &String| {
                a.eq_ignore_ascii_case(b)
            })),
        });
        let stream = StreamSource::new();
        binding.push(&stream);

        stream.emit("photo".to_string());
        stream.emit("PHOTO".to_string());
        assert_eq!(
            context.value(),
            BoundValue::Ready("photo".to_string()),
            "case-insensitive repeat suppressed"
        );
        assert_eq!(render.count(), 2);
    }

    #[test]
    fn same_source_pushed_twice_is_one_subscription_lifecycle() {
        let (binding, _context, render) = setup();
        let stream: StreamSource<i32> = StreamSource::new();
        binding.push(&stream);
        binding.push(&stream);

        assert_eq!(stream.subscriber_count(), 1, "no resubscription");
        assert_eq!(render.count(), 1, "no second reset render");
    }

    #[test]
    fn stale_result_from_replaced_source_never_reaches_the_view() {
        let (binding, context, render) = setup();
        let slow: Deferred<i32> = Deferred::new();
        binding.push(&slow);

        let fast = StreamSource::new();
        binding.push(&fast);
        fast.emit(2);
        assert_eq!(context.value(), BoundValue::Ready(2));

        // The replaced deferred finally settles; nothing may change.
        slow.resolve(1);
        assert_eq!(context.value(), BoundValue::Ready(2));
        assert!(!context.completed(), "stale completion discarded too");
        assert_eq!(render.count(), 3); // reset, reset, value, and nothing else
    }

    #[test]
    fn switching_to_literal_cancels_active_subscription() {
        let (binding, context, _render) = setup();
        let stream = StreamSource::new();
        binding.push(&stream);
        stream.emit(1);

        binding.push(SourceRef::Empty);
        assert_eq!(stream.subscriber_count(), 0, "subscription detached");

        stream.emit(2);
        assert!(context.value().is_empty(), "old source is mute");
    }

    #[test]
    fn error_keeps_last_value_and_sets_flag() {
        let (binding, context, render) = setup();
        let stream = StreamSource::new();
        binding.push(&stream);

        stream.emit(5);
        stream.fail("boom");
        assert_eq!(context.value(), BoundValue::Ready(5));
        assert!(context.errored());
        assert_eq!(context.last_error().unwrap().message(), "boom");
        assert_eq!(render.count(), 3); // reset + value + error

        // The terminal source can deliver nothing further.
        stream.emit(6);
        assert_eq!(context.value(), BoundValue::Ready(5));
        assert_eq!(render.count(), 3);
    }

    #[test]
    fn completion_sets_flag_and_renders() {
        let (binding, context, render) = setup();
        let stream = StreamSource::new();
        binding.push(&stream);

        stream.emit(1);
        stream.close();
        assert!(context.completed());
        assert_eq!(context.value(), BoundValue::Ready(1));
        assert_eq!(render.count(), 3); // reset + value + completion
    }

    #[test]
    fn deferred_delivers_value_then_completion() {
        let (binding, context, render) = setup();
        let deferred: Deferred<i32> = Deferred::new();
        binding.push(&deferred);
        assert_eq!(render.count(), 1); // reset

        deferred.resolve(9);
        assert_eq!(context.value(), BoundValue::Ready(9));
        assert!(context.completed());
        assert_eq!(render.count(), 3); // + value + completion
    }

    #[test]
    fn already_settled_deferred_delivers_inline() {
        let (binding, context, render) = setup();
        let deferred: Deferred<i32> = Deferred::new();
        deferred.resolve(3);

        binding.push(&deferred);
        assert_eq!(context.value(), BoundValue::Ready(3));
        assert!(context.completed());
        assert_eq!(render.count(), 3); // reset + value + completion
    }

    #[test]
    fn rejected_deferred_marks_errored() {
        let (binding, context, _render) = setup();
        let deferred: Deferred<i32> = Deferred::new();
        binding.push(&deferred);
        deferred.reject("offline");

        assert!(context.value().is_unset(), "no value ever arrived");
        assert!(context.errored());
    }

    #[test]
    fn disposal_stops_all_callbacks_immediately_and_permanently() {
        let (binding, context, render) = setup();
        let stream = StreamSource::new();
        binding.push(&stream);
        stream.emit(1);
        let renders_before = render.count();

        let guard = binding.begin_rendering();
        guard.unsubscribe();
        assert_eq!(binding.state(), BindingState::Disposed);
        assert_eq!(stream.subscriber_count(), 0);

        stream.emit(2);
        stream.fail("late failure");
        binding.push(SourceRef::Empty);
        assert_eq!(context.value(), BoundValue::Ready(1), "view frozen");
        assert!(!context.errored());
        assert_eq!(render.count(), renders_before);
    }

    #[test]
    fn dispose_is_idempotent() {
        let (binding, _context, _render) = setup();
        binding.dispose();
        binding.dispose();
        assert_eq!(binding.state(), BindingState::Disposed);
    }

    #[test]
    fn dropping_the_rendering_guard_disposes() {
        let (binding, _context, _render) = setup();
        let stream: StreamSource<i32> = StreamSource::new();
        binding.push(&stream);
        {
            let _guard = binding.begin_rendering();
        }
        assert_eq!(binding.state(), BindingState::Disposed);
        assert_eq!(stream.subscriber_count(), 0);
    }

    #[test]
    fn reentrant_push_from_sink_callback_is_safe() {
        struct SwitchingSink {
            binding: Rc<RefCell<Option<ViewBinding<i32>>>>,
            log: Rc<RefCell<Vec<String>>>,
        }

        impl ViewSink<i32> for SwitchingSink {
            fn reset(&self) {
                self.log.borrow_mut().push("reset".into());
            }
            fn next(&self, value: BoundValue<i32>) {
                self.log.borrow_mut().push(format!("next:{value:?}"));
                if matches!(value, BoundValue::Ready(_)) {
                    if let Some(binding) = &*self.binding.borrow() {
                        binding.push(SourceRef::Empty);
                    }
                }
            }
            fn error(&self, error: SourceError) {
                self.log.borrow_mut().push(format!("error:{error}"));
            }
            fn complete(&self) {
                self.log.borrow_mut().push("complete".into());
            }
        }

        let slot = Rc::new(RefCell::new(None));
        let log = Rc::new(RefCell::new(Vec::new()));
        let render = CountRender::new();
        let binding = ViewBinding::new(BindingConfig {
            sink: Rc::new(SwitchingSink {
                binding: Rc::clone(&slot),
                log: Rc::clone(&log),
            }),
            render: Rc::clone(&render) as Rc<dyn RenderTrigger>,
            dedup: DedupPolicy::Value,
        });
        let stream = StreamSource::new();
        binding.push(&stream);
        *slot.borrow_mut() = Some(ViewBinding {
            inner: Rc::clone(&binding.inner),
        });

        stream.emit(1);
        assert_eq!(
            *log.borrow(),
            vec!["reset", "next:Ready(1)", "next:Empty"],
            "the nested push completed inside the value callback"
        );
        assert_eq!(stream.subscriber_count(), 0, "nested push detached us");
        assert_eq!(binding.state(), BindingState::ValueSet);

        stream.emit(2);
        assert_eq!(log.borrow().len(), 3, "old source stays mute");
    }

    proptest! {
        #[test]
        fn view_sees_consecutive_duplicates_collapsed(values in proptest::collection::vec(0i32..4, 0..48)) {
            struct Collecting {
                seen: Rc<RefCell<Vec<i32>>>,
            }
            impl ViewSink<i32> for Collecting {
                fn reset(&self) {}
                fn next(&self, value: BoundValue<i32>) {
                    if let BoundValue::Ready(v) = value {
                        self.seen.borrow_mut().push(v);
                    }
                }
                fn error(&self, _error: SourceError) {}
                fn complete(&self) {}
            }

            let seen = Rc::new(RefCell::new(Vec::new()));
            let render = CountRender::new();
            let binding = ViewBinding::new(BindingConfig {
                sink: Rc::new(Collecting { seen: Rc::clone(&seen) }),
                render: Rc::clone(&render) as Rc<dyn RenderTrigger>,
                dedup: DedupPolicy::Value,
            });
            let stream = StreamSource::new();
            binding.push(&stream);

            let mut expected = Vec::new();
            for value in &values {
                stream.emit(*value);
                if expected.last() != Some(value) {
                    expected.push(*value);
                }
            }

            prop_assert_eq!(&*seen.borrow(), &expected);
            // One render per delivered value, plus the reset render.
            prop_assert_eq!(render.count(), expected.len() as u32 + 1);
        }
    }
}
