#![forbid(unsafe_code)]

//! Memoir public facade.
//!
//! Re-exports the member crates under stable names and provides
//! [`Journal`], the pipeline that turns a photo into a stored, tagged,
//! observable moment:
//!
//! ```text
//! photo bytes ──► hash ─┬─► upsert ─► attach ─► snapshot emit
//!                       ├─► locate ─┘               │
//!                       └─► recognize ─┘            ▼
//!                                        ViewBinding / view context
//! ```
//!
//! The emitted snapshots are a [`reactive::StreamSource`], so a view
//! binds to the journal exactly the way it binds to any other source.

pub use memoir_reactive as reactive;
pub use memoir_recognition as recognition;
pub use memoir_store as store;

mod journal;

pub use journal::{Journal, JournalError, Locate, NoLocation};

pub use memoir_reactive::{BoundValue, SourceRef, ViewBinding};
pub use memoir_recognition::{Prediction, RecognitionClient, RecognitionConfig};
pub use memoir_store::{GeoPoint, Moment, MomentStore, PHOTO_ATTACHMENT_ID};
