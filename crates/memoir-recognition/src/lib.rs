#![forbid(unsafe_code)]

//! Image-recognition client for Memoir.
//!
//! A photo is posted as a raw octet stream to the recognition endpoint,
//! which answers with a list of classifier predictions enriched with
//! catalog metadata (place, usefulness). This crate provides:
//!
//! - [`Prediction`]: the wire model.
//! - [`Recognize`]: the async seam the journal depends on, so tests and
//!   offline builds can substitute the network client.
//! - [`RecognitionClient`]: the `reqwest`-backed implementation with
//!   transient-failure retries.
//!
//! The endpoint and prediction key are configuration; nothing here is
//! hardcoded to a deployment.

pub mod client;

pub use client::{RecognitionClient, RecognitionConfig, RecognitionError, PREDICTION_KEY_HEADER};

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

/// One classifier prediction as the recognition service reports it.
///
/// The service signals "nothing recognized" with a placeholder entry
/// whose probability is the literal `"-"`; [`lenient_probability`] maps
/// any non-numeric probability to `0.0` so the floor filter drops it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    /// Classifier confidence in `0.0..=1.0`.
    #[serde(deserialize_with = "lenient_probability", default)]
    pub probability: f64,
    /// The recognized tag.
    pub tag_name: String,
    /// Service-side tag identifier.
    #[serde(default)]
    pub tag_id: String,
    /// Catalog metadata: where the tagged object belongs.
    #[serde(default)]
    pub place: String,
    /// Catalog metadata: what the tagged object is for.
    #[serde(default)]
    pub usefulness: String,
}

fn lenient_probability<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Other(serde_json::Value),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(value)) => value,
        Some(Raw::Other(_)) | None => 0.0,
    })
}

/// Keep predictions above the probability floor, then only the first
/// survivor; the service reports them best-first.
#[must_use]
pub fn select_best(predictions: Vec<Prediction>, floor: f64) -> Vec<Prediction> {
    let mut kept: Vec<Prediction> = predictions
        .into_iter()
        .filter(|prediction| prediction.probability > floor)
        .collect();
    kept.truncate(1);
    kept
}

/// The recognition capability the journal depends on.
#[async_trait]
pub trait Recognize: Send + Sync {
    /// Classify a photo, returning at most one filtered prediction.
    async fn recognize(&self, photo: &[u8]) -> Result<Vec<Prediction>, RecognitionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(tag: &str, probability: f64) -> Prediction {
        Prediction {
            probability,
            tag_name: tag.to_string(),
            tag_id: String::new(),
            place: String::new(),
            usefulness: String::new(),
        }
    }

    #[test]
    fn parses_service_response() {
        let body = r#"[{
            "probability": 0.93,
            "tagName": "receipt",
            "tagId": "9cf21362",
            "place": "wallet",
            "usefulness": "expense tracking"
        }]"#;
        let predictions: Vec<Prediction> = serde_json::from_str(body).unwrap();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].tag_name, "receipt");
        assert_eq!(predictions[0].place, "wallet");
        assert!((predictions[0].probability - 0.93).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_not_recognized_placeholder() {
        // The service sends "-" for every field when nothing matched.
        let body = r#"[{
            "probability": "-",
            "tagName": "Image information is not recognized",
            "tagId": "-",
            "place": "-",
            "usefulness": "-"
        }]"#;
        let predictions: Vec<Prediction> = serde_json::from_str(body).unwrap();
        assert_eq!(predictions[0].probability, 0.0);
        assert!(select_best(predictions, 0.1).is_empty());
    }

    #[test]
    fn tolerates_missing_catalog_fields() {
        let body = r#"[{"probability": 0.5, "tagName": "plant"}]"#;
        let predictions: Vec<Prediction> = serde_json::from_str(body).unwrap();
        assert_eq!(predictions[0].tag_id, "");
        assert_eq!(predictions[0].place, "");
    }

    #[test]
    fn serializes_with_wire_names() {
        let value = serde_json::to_value(prediction("cup", 0.7)).unwrap();
        let object = value.as_object().unwrap();
        assert!(object.contains_key("tagName"));
        assert!(object.contains_key("tagId"));
        assert!(!object.contains_key("tag_name"));
    }

    #[test]
    fn select_best_filters_then_truncates() {
        let predictions = vec![
            prediction("noise", 0.05),
            prediction("cup", 0.8),
            prediction("mug", 0.6),
        ];
        let best = select_best(predictions, 0.1);
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].tag_name, "cup");
    }

    #[test]
    fn select_best_on_empty_and_all_below_floor() {
        assert!(select_best(Vec::new(), 0.1).is_empty());
        let low = vec![prediction("a", 0.01), prediction("b", 0.1)];
        assert!(select_best(low, 0.1).is_empty(), "floor is exclusive");
    }
}
