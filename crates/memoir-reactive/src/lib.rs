#![forbid(unsafe_code)]

//! Reactive view bindings for Memoir.
//!
//! This crate provides the primitives that connect asynchronous value
//! sources to view state:
//!
//! - [`StreamSource`]: a multi-subscriber push stream with error and
//!   completion signals.
//! - [`Deferred`]: a single-settlement source (resolve or reject exactly
//!   once); late subscribers observe the settled outcome immediately.
//! - [`Subscription`]: RAII guard that detaches an observer on drop.
//! - [`ViewBinding`]: the adapter. It accepts a changing [`SourceRef`]
//!   pushed by the owning view, keeps exactly one subscription to the
//!   most recently pushed source, suppresses consecutive duplicate
//!   emissions, and funnels value/error/completion signals into a
//!   [`ViewSink`] followed by a [`RenderTrigger`] invocation.
//!
//! # Architecture
//!
//! Everything here is single-threaded: `Rc<RefCell<..>>` shared
//! ownership, no locks, no `Send` bounds. Callback turns never overlap;
//! ordering comes from the host's task queue plus the binding's
//! cancel-before-switch rule. Switching sources is synchronous: the old
//! subscription is detached before the new source can deliver, and every
//! observer callback carries a generation stamp that is checked on
//! arrival, so a late result from a replaced source is discarded rather
//! than delivered.
//!
//! # Invariants
//!
//! 1. At most one source subscription is active per binding.
//! 2. A replaced or disposed subscription never reaches the sink again,
//!    even if the underlying source already started producing.
//! 3. Every sink mutation is followed by exactly one render trigger.
//! 4. Consecutive equal emissions from the same source collapse to one
//!    sink update (policy-configurable, per-source memory).
//! 5. Pushing the identical source twice in a row is a no-op.
//! 6. Disposal is terminal and idempotent.

pub mod binding;
pub mod render;
pub mod source;

pub use binding::{
    BindingConfig, BindingState, BoundValue, DedupPolicy, SharedViewContext, SourceRef,
    ViewBinding, ViewContext, ViewSink,
};
pub use render::{CoalescingRender, ImmediateRender, RenderTrigger, SchedulerMode, render_trigger};
pub use source::{Deferred, Observer, SourceError, StreamSource, Subscription};
