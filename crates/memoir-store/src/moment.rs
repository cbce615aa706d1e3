//! The moment record and its attachment model.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use memoir_recognition::Prediction;

/// Fixed attachment id under which a moment's photo is stored.
pub const PHOTO_ATTACHMENT_ID: &str = "photo";

/// A geographic position captured when the moment was added.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// One photo-journal entry.
///
/// The id is content-addressed (see [`content_id`]); everything else is
/// captured once at creation and only ever replaced wholesale by an
/// upsert of the same id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Moment {
    /// Lowercase hex SHA-256 of the attached photo bytes.
    pub id: String,
    /// Creation time, millisecond precision.
    pub timestamp: DateTime<Utc>,
    /// Position at capture time, if the client had one.
    pub geolocation: Option<GeoPoint>,
    /// Free-form client identification string.
    pub user_agent: String,
    /// Recognition output attached at creation.
    pub predictions: Vec<Prediction>,
}

impl Moment {
    /// Build a moment for a photo captured now.
    #[must_use]
    pub fn from_photo(
        photo: &[u8],
        user_agent: impl Into<String>,
        geolocation: Option<GeoPoint>,
        predictions: Vec<Prediction>,
    ) -> Self {
        Self {
            id: content_id(photo),
            timestamp: now_millis(),
            geolocation,
            user_agent: user_agent.into(),
            predictions,
        }
    }
}

/// Binary data attached to a moment.
#[derive(Clone, Debug, PartialEq)]
pub struct Attachment {
    pub moment_id: String,
    pub attachment_id: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Content-addressed moment id: lowercase hex SHA-256 of the photo.
#[must_use]
pub fn content_id(photo: &[u8]) -> String {
    hex::encode(Sha256::digest(photo))
}

// Timestamps persist as integer milliseconds; truncate at creation so a
// stored moment round-trips into an equal value.
fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond((now.nanosecond() / 1_000_000) * 1_000_000)
        .unwrap_or(now)
}
