#![forbid(unsafe_code)]

//! Render triggering.
//!
//! A binding only knows that "the view must be told to re-render now".
//! How that happens is the host's business, captured once at construction
//! as a [`RenderTrigger`]:
//!
//! - [`ImmediateRender`] invokes the host redraw callback synchronously,
//!   for hosts without their own tick loop.
//! - [`CoalescingRender`] sets a dirty flag and lets the host drain any
//!   number of requests into a single redraw per tick.
//!
//! The choice is made by probing the host once (see [`render_trigger`]);
//! the binding never branches on the host mode itself.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Host capability invoked after every view mutation.
pub trait RenderTrigger {
    /// Request a re-render of the owning view.
    fn render(&self);
}

/// How the host schedules redraws, determined by probing the environment
/// once before constructing a binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerMode {
    /// The host runs its own tick loop and drains coalesced requests.
    Coalescing,
    /// No host tick; every request redraws synchronously.
    Immediate,
}

/// Pick the trigger for a probed host mode.
#[must_use]
pub fn render_trigger(mode: SchedulerMode, redraw: Rc<dyn Fn()>) -> Rc<dyn RenderTrigger> {
    match mode {
        SchedulerMode::Immediate => {
            let redraw = Rc::clone(&redraw);
            Rc::new(ImmediateRender::new(move || redraw()))
        }
        SchedulerMode::Coalescing => {
            let redraw = Rc::clone(&redraw);
            Rc::new(CoalescingRender::new(move || redraw()))
        }
    }
}

// ---------------------------------------------------------------------------
// ImmediateRender
// ---------------------------------------------------------------------------

/// Redraws synchronously on every request.
pub struct ImmediateRender {
    redraw: Rc<dyn Fn()>,
}

impl ImmediateRender {
    /// Trigger that invokes `redraw` once per request.
    pub fn new(redraw: impl Fn() + 'static) -> Self {
        Self {
            redraw: Rc::new(redraw),
        }
    }
}

impl RenderTrigger for ImmediateRender {
    fn render(&self) {
        (self.redraw)();
    }
}

impl fmt::Debug for ImmediateRender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImmediateRender").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// CoalescingRender
// ---------------------------------------------------------------------------

/// Coalesces any number of render requests into one redraw per host tick.
///
/// The host keeps the concrete handle and calls [`CoalescingRender::flush`]
/// from its tick; bindings see only the [`RenderTrigger`] face.
pub struct CoalescingRender {
    dirty: Cell<bool>,
    redraw: Rc<dyn Fn()>,
}

impl CoalescingRender {
    /// Trigger that marks dirty on request and redraws on flush.
    pub fn new(redraw: impl Fn() + 'static) -> Self {
        Self {
            dirty: Cell::new(false),
            redraw: Rc::new(redraw),
        }
    }

    /// Whether a render has been requested since the last flush.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Host tick: redraw once if anything was requested, clearing the
    /// flag. Returns whether a redraw happened.
    pub fn flush(&self) -> bool {
        if self.dirty.replace(false) {
            (self.redraw)();
            true
        } else {
            false
        }
    }
}

impl RenderTrigger for CoalescingRender {
    fn render(&self) {
        self.dirty.set(true);
    }
}

impl fmt::Debug for CoalescingRender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoalescingRender")
            .field("dirty", &self.dirty.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
