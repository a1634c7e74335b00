//! Person detection on submitted photos.

use std::sync::Arc;

use async_trait::async_trait;
use derive_more::Display;
use tracing::{info, warn};

use crate::config::Config;
use crate::model::overtime::{PersonVerdict, PhotoValidation};

pub mod gemini;

/// Minimum confidence for a photo to count as a person.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.70;

/// The message stored on a record when the classifier could not answer.
pub const CLASSIFIER_FAILED: &str = "Failed to validate photo with AI.";

#[derive(Debug, Display)]
pub enum ClassifierError {
    #[display(fmt = "classifier request failed: {}", _0)]
    Request(String),
    #[display(fmt = "classifier returned an unusable response: {}", _0)]
    Response(String),
}

impl std::error::Error for ClassifierError {}

#[async_trait]
pub trait PhotoClassifier: Send + Sync {
    /// `photo_data_uri` is `data:<mimetype>;base64,<data>`.
    async fn classify(&self, photo_data_uri: &str) -> Result<PersonVerdict, ClassifierError>;
}

/// Why the gate turned a photo away.
#[derive(Debug, Clone, PartialEq)]
pub enum GateRejection {
    NotAPerson(PersonVerdict),
    LowConfidence(PersonVerdict),
    Unavailable(String),
}

/// Check-in/check-out photo gate. With no classifier configured every photo
/// passes unannotated; otherwise a photo must be a person at or above the
/// threshold, and a classifier failure also rejects.
#[derive(Clone)]
pub struct PhotoGate {
    classifier: Option<Arc<dyn PhotoClassifier>>,
    threshold: f64,
}

impl PhotoGate {
    pub fn new(classifier: Option<Arc<dyn PhotoClassifier>>, threshold: f64) -> Self {
        Self {
            classifier,
            threshold,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, DEFAULT_CONFIDENCE_THRESHOLD)
    }

    pub fn is_enabled(&self) -> bool {
        self.classifier.is_some()
    }

    pub async fn screen(&self, photo_data_uri: &str) -> Result<Option<PhotoValidation>, GateRejection> {
        let Some(classifier) = &self.classifier else {
            return Ok(None);
        };

        match classifier.classify(photo_data_uri).await {
            Ok(verdict) if !verdict.is_person => Err(GateRejection::NotAPerson(verdict)),
            Ok(verdict) if verdict.confidence < self.threshold => {
                Err(GateRejection::LowConfidence(verdict))
            }
            Ok(verdict) => Ok(Some(PhotoValidation::Verdict(verdict))),
            Err(e) => {
                warn!(error = %e, "Photo classifier unavailable");
                Err(GateRejection::Unavailable(e.to_string()))
            }
        }
    }

    /// Advisory run for administrator review: failures become an error
    /// marker instead of a rejection. `None` when no classifier is set up.
    pub async fn assess(&self, photo_data_uri: &str) -> Option<PhotoValidation> {
        let classifier = self.classifier.as_ref()?;
        Some(match classifier.classify(photo_data_uri).await {
            Ok(verdict) => PhotoValidation::Verdict(verdict),
            Err(e) => {
                warn!(error = %e, "Photo re-validation failed");
                PhotoValidation::Failed {
                    error: CLASSIFIER_FAILED.to_string(),
                }
            }
        })
    }
}

pub fn build_gate(config: &Config) -> PhotoGate {
    let classifier: Option<Arc<dyn PhotoClassifier>> = match config.photo_classifier.as_str() {
        "gemini" => match &config.gemini_api_key {
            Some(api_key) => Some(Arc::new(gemini::GeminiClassifier::new(
                api_key.clone(),
                config.gemini_model.clone(),
            ))),
            None => {
                warn!("PHOTO_CLASSIFIER=gemini but GEMINI_API_KEY is not set; photo gate disabled");
                None
            }
        },
        _ => None,
    };

    info!(
        enabled = classifier.is_some(),
        threshold = config.photo_confidence_threshold,
        "Photo gate configured"
    );
    PhotoGate::new(classifier, config.photo_confidence_threshold)
}


#[cfg(test)]
mod tests {
    use super::testing::StubClassifier;
    use super::*;

    fn gate(classifier: StubClassifier) -> PhotoGate {
        PhotoGate::new(Some(Arc::new(classifier)), DEFAULT_CONFIDENCE_THRESHOLD)
    }

    #[tokio::test]
    async fn confident_person_passes_with_verdict() {
        let result = gate(StubClassifier::answering(true, 0.93))
            .screen("data:image/jpeg;base64,AAAA")
            .await
            .unwrap();
        assert!(matches!(
            result,
            Some(PhotoValidation::Verdict(PersonVerdict { is_person: true, .. }))
        ));
    }

    #[tokio::test]
    async fn not_a_person_is_rejected_regardless_of_confidence() {
        let rejection = gate(StubClassifier::answering(false, 0.9))
            .screen("data:image/jpeg;base64,AAAA")
            .await
            .unwrap_err();
        assert!(matches!(rejection, GateRejection::NotAPerson(_)));
    }

    #[tokio::test]
    async fn threshold_is_inclusive() {
        assert!(
            gate(StubClassifier::answering(true, 0.70))
                .screen("x")
                .await
                .is_ok()
        );
        let rejection = gate(StubClassifier::answering(true, 0.69))
            .screen("x")
            .await
            .unwrap_err();
        assert!(matches!(rejection, GateRejection::LowConfidence(_)));
    }

    #[tokio::test]
    async fn classifier_failure_blocks_screen_but_marks_assessment() {
        let gate = gate(StubClassifier::failing("timeout"));
        assert!(matches!(
            gate.screen("x").await,
            Err(GateRejection::Unavailable(_))
        ));
        assert_eq!(
            gate.assess("x").await,
            Some(PhotoValidation::Failed {
                error: CLASSIFIER_FAILED.to_string()
            })
        );
    }

    #[tokio::test]
    async fn disabled_gate_lets_everything_through() {
        let gate = PhotoGate::disabled();
        assert_eq!(gate.screen("x").await.unwrap(), None);
        assert_eq!(gate.assess("x").await, None);
    }
}
