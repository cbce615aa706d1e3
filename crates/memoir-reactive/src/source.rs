#![forbid(unsafe_code)]

//! Push-based value sources.
//!
//! Two source shapes exist, matching the two kinds of asynchronous values
//! a view binds to:
//!
//! - [`StreamSource`]: zero or more emissions over time, then optionally
//!   a terminal failure or completion.
//! - [`Deferred`]: a single settlement, either one value followed by
//!   completion, or one error.
//!
//! Both deliver through an [`Observer`] registered via `subscribe`, which
//! returns a [`Subscription`] RAII guard.
//!
//! # Invariants
//!
//! 1. Observers are notified in subscription order.
//! 2. A dropped [`Subscription`] receives no further signal, including
//!    signals from a delivery pass already in progress.
//! 3. A terminal source (`fail`ed or `close`d) delivers its terminal
//!    signal immediately to late subscribers; emissions after the
//!    terminal signal are dropped.
//! 4. [`Deferred`] settles at most once; later settlements are ignored.
//!
//! # Failure Modes
//!
//! - Observer callbacks that panic propagate to the caller of
//!   `emit`/`fail`/`close`/`resolve`/`reject`. Sources do not guard
//!   against misbehaving observers.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

// ---------------------------------------------------------------------------
// SourceError
// ---------------------------------------------------------------------------

/// Error payload carried by a failing source.
///
/// Cheap to clone; bindings record it on the view context instead of
/// propagating it.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct SourceError(Rc<str>);

impl SourceError {
    /// Create an error from any message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into().into())
    }

    /// The error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for SourceError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// The callback triple a subscriber registers with a source.
pub struct Observer<T> {
    on_next: Rc<dyn Fn(T)>,
    on_error: Rc<dyn Fn(SourceError)>,
    on_complete: Rc<dyn Fn()>,
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Self {
            on_next: Rc::clone(&self.on_next),
            on_error: Rc::clone(&self.on_error),
            on_complete: Rc::clone(&self.on_complete),
        }
    }
}

impl<T> Observer<T> {
    /// Observer with all three callbacks.
    pub fn new(
        next: impl Fn(T) + 'static,
        error: impl Fn(SourceError) + 'static,
        complete: impl Fn() + 'static,
    ) -> Self {
        Self {
            on_next: Rc::new(next),
            on_error: Rc::new(error),
            on_complete: Rc::new(complete),
        }
    }

    /// Observer that only cares about values; errors and completion are
    /// ignored.
    pub fn values(next: impl Fn(T) + 'static) -> Self {
        Self::new(next, |_| {}, || {})
    }

    pub(crate) fn next(&self, value: T) {
        (self.on_next)(value);
    }

    pub(crate) fn error(&self, error: SourceError) {
        (self.on_error)(error);
    }

    pub(crate) fn complete(&self) {
        (self.on_complete)();
    }
}

impl<T> fmt::Debug for Observer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// RAII guard for an active subscription.
///
/// Dropping the guard detaches the observer before any further delivery.
/// Use [`Subscription::unsubscribe`] for an explicit, consuming teardown.
#[must_use = "dropping a Subscription detaches the observer immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Guard that runs `cancel` once, on drop or explicit unsubscribe.
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Guard that is already detached. Returned when subscribing to a
    /// terminal source, where the terminal signal was delivered inline.
    #[must_use]
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    /// Detach now, consuming the guard.
    pub fn unsubscribe(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.cancel.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// StreamSource
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum Terminal {
    Failed(SourceError),
    Closed,
}

struct StreamInner<T> {
    terminal: Option<Terminal>,
    next_id: u64,
    subscribers: Vec<(u64, Observer<T>)>,
}

/// A multi-subscriber push stream.
///
/// Handles are cheap clones of the same underlying stream; identity
/// comparison via [`StreamSource::ptr_eq`].
pub struct StreamSource<T> {
    inner: Rc<RefCell<StreamInner<T>>>,
}

impl<T> Clone for StreamSource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Default for StreamSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StreamSource<T> {
    /// Create an open stream with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(StreamInner {
                terminal: None,
                next_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Whether the stream has failed or closed.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.inner.borrow().terminal.is_some()
    }

    /// Number of currently attached observers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// Whether two handles refer to the same underlying stream.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone + 'static> StreamSource<T> {
    /// Attach an observer. Terminal streams deliver their terminal signal
    /// inline and return a detached guard.
    pub fn subscribe(&self, observer: Observer<T>) -> Subscription {
        let terminal = self.inner.borrow().terminal.clone();
        match terminal {
            Some(Terminal::Failed(error)) => {
                observer.error(error);
                Subscription::detached()
            }
            Some(Terminal::Closed) => {
                observer.complete();
                Subscription::detached()
            }
            None => {
                let id = {
                    let mut inner = self.inner.borrow_mut();
                    let id = inner.next_id;
                    inner.next_id += 1;
                    inner.subscribers.push((id, observer));
                    id
                };
                let weak = Rc::downgrade(&self.inner);
                Subscription::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.borrow_mut().subscribers.retain(|(sid, _)| *sid != id);
                    }
                })
            }
        }
    }

    /// Push a value to every attached observer. Dropped if the stream is
    /// terminal.
    pub fn emit(&self, value: T) {
        let snapshot: Vec<(u64, Observer<T>)> = {
            let inner = self.inner.borrow();
            if inner.terminal.is_some() {
                debug!("emit on terminated stream dropped");
                return;
            }
            inner.subscribers.clone()
        };
        for (id, observer) in snapshot {
            // An earlier callback in this pass may have detached this
            // observer; it must not see the value.
            let attached = self
                .inner
                .borrow()
                .subscribers
                .iter()
                .any(|(sid, _)| *sid == id);
            if attached {
                observer.next(value.clone());
            }
        }
    }

    /// Terminate the stream with an error. Observers are drained; late
    /// subscribers receive the same error inline.
    pub fn fail(&self, error: impl Into<SourceError>) {
        let error = error.into();
        let drained = {
            let mut inner = self.inner.borrow_mut();
            if inner.terminal.is_some() {
                debug!("fail on terminated stream ignored");
                return;
            }
            inner.terminal = Some(Terminal::Failed(error.clone()));
            std::mem::take(&mut inner.subscribers)
        };
        for (_, observer) in drained {
            observer.error(error.clone());
        }
    }

    /// Complete the stream. Observers are drained; late subscribers
    /// receive completion inline.
    pub fn close(&self) {
        let drained = {
            let mut inner = self.inner.borrow_mut();
            if inner.terminal.is_some() {
                debug!("close on terminated stream ignored");
                return;
            }
            inner.terminal = Some(Terminal::Closed);
            std::mem::take(&mut inner.subscribers)
        };
        for (_, observer) in drained {
            observer.complete();
        }
    }
}

impl<T> fmt::Debug for StreamSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("StreamSource")
            .field("terminated", &inner.terminal.is_some())
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Deferred
// ---------------------------------------------------------------------------

enum DeferredState<T> {
    Pending(Vec<(u64, Observer<T>)>),
    Resolved(T),
    Rejected(SourceError),
}

struct DeferredInner<T> {
    state: DeferredState<T>,
    next_id: u64,
}

/// A single-settlement source: resolves with one value (delivered as
/// value-then-completion) or rejects with one error.
///
/// Subscribers attached after settlement observe the settled outcome
/// inline. Handles are cheap clones; identity via [`Deferred::ptr_eq`].
pub struct Deferred<T> {
    inner: Rc<RefCell<DeferredInner<T>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deferred<T> {
    /// Create a pending deferred.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(DeferredInner {
                state: DeferredState::Pending(Vec::new()),
                next_id: 0,
            })),
        }
    }

    /// Whether the deferred has resolved or rejected.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !matches!(self.inner.borrow().state, DeferredState::Pending(_))
    }

    /// Whether two handles refer to the same underlying deferred.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone + 'static> Deferred<T> {
    /// Attach an observer. Settled deferreds deliver inline and return a
    /// detached guard.
    pub fn subscribe(&self, observer: Observer<T>) -> Subscription {
        enum Attach<T> {
            Waiting(u64),
            Value(T),
            Error(SourceError),
        }

        let attach = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            match &mut inner.state {
                DeferredState::Pending(waiters) => {
                    let id = inner.next_id;
                    inner.next_id += 1;
                    waiters.push((id, observer.clone()));
                    Attach::Waiting(id)
                }
                DeferredState::Resolved(value) => Attach::Value(value.clone()),
                DeferredState::Rejected(error) => Attach::Error(error.clone()),
            }
        };
        match attach {
            Attach::Waiting(id) => {
                let weak = Rc::downgrade(&self.inner);
                Subscription::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        if let DeferredState::Pending(waiters) = &mut inner.borrow_mut().state {
                            waiters.retain(|(sid, _)| *sid != id);
                        }
                    }
                })
            }
            Attach::Value(value) => {
                observer.next(value);
                observer.complete();
                Subscription::detached()
            }
            Attach::Error(error) => {
                observer.error(error);
                Subscription::detached()
            }
        }
    }

    /// Settle with a value. Waiters receive the value then completion.
    /// Ignored if already settled.
    pub fn resolve(&self, value: T) {
        let waiters = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            match &mut inner.state {
                DeferredState::Pending(waiters) => std::mem::take(waiters),
                _ => {
                    debug!("resolve on settled Deferred ignored");
                    return;
                }
            }
        };
        self.inner.borrow_mut().state = DeferredState::Resolved(value.clone());
        for (_, observer) in waiters {
            observer.next(value.clone());
            observer.complete();
        }
    }

    /// Settle with an error. Ignored if already settled.
    pub fn reject(&self, error: impl Into<SourceError>) {
        let error = error.into();
        let waiters = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            match &mut inner.state {
                DeferredState::Pending(waiters) => std::mem::take(waiters),
                _ => {
                    debug!("reject on settled Deferred ignored");
                    return;
                }
            }
        };
        self.inner.borrow_mut().state = DeferredState::Rejected(error.clone());
        for (_, observer) in waiters {
            observer.error(error.clone());
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner.borrow().state {
            DeferredState::Pending(_) => "pending",
            DeferredState::Resolved(_) => "resolved",
            DeferredState::Rejected(_) => "rejected",
        };
        f.debug_struct("Deferred").field("state", &state).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
