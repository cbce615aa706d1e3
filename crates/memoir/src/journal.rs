//! The journal facade.
//!
//! [`Journal`] owns the moment store, the recognition capability, and a
//! geolocation capability, and exposes the three operations the
//! application performs: add a photo, remove a moment, observe the
//! newest-first moment list.
//!
//! Recognition is best-effort by design: a failing or offline service
//! degrades to an empty prediction list and the add still succeeds.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use memoir_reactive::StreamSource;
use memoir_recognition::{Prediction, Recognize};
use memoir_store::{GeoPoint, Moment, MomentStore, PHOTO_ATTACHMENT_ID, StoreError};

/// The geolocation capability: where was this photo taken, if known.
#[async_trait]
pub trait Locate: Send + Sync {
    /// The current position, or `None` when unavailable.
    async fn position(&self) -> Option<GeoPoint>;
}

/// Locator for clients without a position service.
pub struct NoLocation;

#[async_trait]
impl Locate for NoLocation {
    async fn position(&self) -> Option<GeoPoint> {
        None
    }
}

/// Errors surfaced by journal operations.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The photo-journal pipeline.
///
/// Not `Send`: the snapshot stream is a single-threaded source meant to
/// live on the view thread, alongside the bindings that consume it.
pub struct Journal {
    store: MomentStore,
    recognizer: Arc<dyn Recognize>,
    locator: Arc<dyn Locate>,
    user_agent: String,
    moments: StreamSource<Vec<Moment>>,
}

impl Journal {
    /// Wire the pipeline. `user_agent` is recorded on every moment the
    /// journal creates.
    #[must_use]
    pub fn new(
        store: MomentStore,
        recognizer: Arc<dyn Recognize>,
        locator: Arc<dyn Locate>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            store,
            recognizer,
            locator,
            user_agent: user_agent.into(),
            moments: StreamSource::new(),
        }
    }

    /// The snapshot stream: a newest-first moment list, emitted after
    /// every mutation and on [`Journal::refresh`]. Bind it to a view via
    /// `ViewBinding`, or subscribe directly.
    #[must_use]
    pub fn moments(&self) -> StreamSource<Vec<Moment>> {
        self.moments.clone()
    }

    /// Re-query and emit the current snapshot. Call once after binding
    /// to deliver the initial list.
    pub async fn refresh(&self) -> Result<Vec<Moment>, JournalError> {
        let all = self.store.all().await?;
        self.moments.emit(all.clone());
        Ok(all)
    }

    /// Add a photo: hash it, gather position and predictions, store the
    /// moment with the photo attached, emit the refreshed snapshot.
    ///
    /// Re-adding an identical photo upserts the existing moment (the id
    /// is the content hash).
    pub async fn add_photo(
        &self,
        photo: Vec<u8>,
        content_type: &str,
    ) -> Result<Moment, JournalError> {
        let (position, predictions) =
            tokio::join!(self.locator.position(), self.predictions_for(&photo));

        let moment = Moment::from_photo(&photo, self.user_agent.clone(), position, predictions);
        self.store.upsert(&moment).await?;
        self.store
            .put_attachment(&moment.id, PHOTO_ATTACHMENT_ID, content_type, photo)
            .await?;
        debug!(id = %moment.id, "moment added");

        self.refresh().await?;
        Ok(moment)
    }

    /// Remove a moment and emit the refreshed snapshot. Removing an
    /// absent id succeeds and still emits.
    pub async fn remove(&self, id: &str) -> Result<(), JournalError> {
        self.store.remove_all(vec![id.to_string()]).await?;
        debug!(id, "moment removed");
        self.refresh().await?;
        Ok(())
    }

    async fn predictions_for(&self, photo: &[u8]) -> Vec<Prediction> {
        match self.recognizer.recognize(photo).await {
            Ok(predictions) => predictions,
            Err(error) => {
                // Best-effort: an unreachable recognition service must
                // not block journaling.
                warn!(%error, "recognition failed; storing without predictions");
                Vec::new()
            }
        }
    }
}
