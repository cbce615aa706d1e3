#![forbid(unsafe_code)]

//! Moment storage for Memoir.
//!
//! A "moment" is one photo-journal entry: a content-addressed id (the
//! SHA-256 of the photo bytes), a creation timestamp, optional
//! geolocation, the capturing client's user-agent string, and the
//! recognition predictions attached at creation. The photo itself is a
//! binary attachment keyed by [`PHOTO_ATTACHMENT_ID`].
//!
//! Storage is SQLite behind [`MomentStore`], an async facade over a
//! dedicated worker thread that owns the connection. All statements run
//! on that thread; callers get futures resolved via oneshot replies.
//!
//! # Invariants
//!
//! 1. Moment ids are unique; re-adding the same photo upserts in place.
//! 2. `all()` returns moments newest-first.
//! 3. Removing a moment removes its attachments.
//! 4. Removing an absent id is not an error.

mod migrations;
mod worker;

pub mod moment;
pub mod store;

pub use moment::{Attachment, GeoPoint, Moment, PHOTO_ATTACHMENT_ID, content_id};
pub use store::MomentStore;

/// Errors surfaced by the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored predictions are not valid JSON: {0}")]
    Predictions(#[from] serde_json::Error),

    #[error("invalid stored row: {0}")]
    Corrupt(String),

    #[error("database worker is gone")]
    WorkerGone,
}
