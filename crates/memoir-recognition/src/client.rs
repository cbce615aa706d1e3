//! The `reqwest`-backed recognition client.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{Prediction, Recognize, select_best};

/// Header carrying the prediction key on every request.
pub const PREDICTION_KEY_HEADER: &str = "Prediction-Key";

const OCTET_STREAM: &str = "application/octet-stream";
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Errors surfaced by the recognition client.
#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("recognition service error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("recognition request failed after {retries} retries")]
    Exhausted { retries: u32 },
}

/// Recognition endpoint configuration.
#[derive(Clone, Debug)]
pub struct RecognitionConfig {
    /// Full URL of the `/recognize` endpoint.
    pub endpoint: String,
    /// Value for the [`PREDICTION_KEY_HEADER`] header.
    pub prediction_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry cap for 429/5xx responses.
    pub max_retries: u32,
    /// Predictions at or below this probability are dropped.
    pub probability_floor: f64,
}

impl RecognitionConfig {
    /// Config with the conventional defaults: 30s timeout, 3 retries,
    /// 0.1 probability floor.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, prediction_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            prediction_key: prediction_key.into(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            probability_floor: 0.1,
        }
    }
}

/// Posts photo bytes to the recognition service and filters the answer.
///
/// Transient failures (429 and 5xx) are retried with exponential backoff
/// up to the configured cap; anything else surfaces immediately.
#[derive(Clone)]
pub struct RecognitionClient {
    http: reqwest::Client,
    config: RecognitionConfig,
}

impl RecognitionClient {
    /// Build a client for the given configuration.
    pub fn new(config: RecognitionConfig) -> Result<Self, RecognitionError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { http, config })
    }

    async fn post_photo(&self, photo: &[u8]) -> Result<Vec<Prediction>, RecognitionError> {
        let response = self
            .http
            .post(&self.config.endpoint)
            .header(PREDICTION_KEY_HEADER, &self.config.prediction_key)
            .header(reqwest::header::CONTENT_TYPE, OCTET_STREAM)
            .body(photo.to_vec())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            Err(RecognitionError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            })
        }
    }
}

fn retryable(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

#[async_trait]
impl Recognize for RecognitionClient {
    async fn recognize(&self, photo: &[u8]) -> Result<Vec<Prediction>, RecognitionError> {
        let mut attempt = 0;
        loop {
            match self.post_photo(photo).await {
                Ok(predictions) => {
                    debug!(
                        raw = predictions.len(),
                        "recognition response received"
                    );
                    return Ok(select_best(predictions, self.config.probability_floor));
                }
                Err(RecognitionError::Api { status, .. }) if retryable(status) => {
                    attempt += 1;
                    if attempt > self.config.max_retries {
                        return Err(RecognitionError::Exhausted {
                            retries: self.config.max_retries,
                        });
                    }
                    let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt - 1);
                    warn!(status, attempt, ?delay, "recognition request failed; retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
