//! Backend service frame handler.
//!
//! # Responsibilities
//! - Classify image payloads on the blocking pool and time the work
//! - Answer with a JSON success or error frame; classification errors
//!   never become transport failures
//! - Send sealed transit frames straight back; only bare frames are
//!   classified, so classification time lands in the processing hop

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::net::FrameHandler;
use crate::observability::metrics;
use crate::relay::envelope;
use crate::service::classifier::{Classifier, SignatureClassifier};

/// JSON body of every service response frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ServiceResponse {
    Success {
        class: String,
        confidence: f64,
        /// Classification time in seconds.
        processing_time: f64,
    },
    Error {
        error: String,
    },
}

impl ServiceResponse {
    pub fn to_bytes(&self) -> Vec<u8> {
        match serde_json::to_vec(self) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode service response");
                br#"{"status":"error","error":"response encoding failed"}"#.to_vec()
            }
        }
    }
}

/// Server Shell handler for backend services.
pub struct ServiceHandler<C = SignatureClassifier> {
    classifier: Arc<C>,
}

impl ServiceHandler<SignatureClassifier> {
    pub fn new() -> Self {
        Self::with_classifier(SignatureClassifier::new())
    }
}

impl Default for ServiceHandler<SignatureClassifier> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Classifier> ServiceHandler<C> {
    pub fn with_classifier(classifier: C) -> Self {
        Self {
            classifier: Arc::new(classifier),
        }
    }
}

impl<C: Classifier> FrameHandler for ServiceHandler<C> {
    async fn handle(&self, request: Vec<u8>) -> Vec<u8> {
        if envelope::is_sealed(&request) {
            metrics::record_service_request("forwarded");
            return request;
        }

        let classifier = Arc::clone(&self.classifier);
        let start = Instant::now();
        let result = tokio::task::spawn_blocking(move || classifier.classify(&request)).await;
        let processing_time = start.elapsed();

        let response = match result {
            Ok(Ok(classification)) => {
                tracing::debug!(
                    class = %classification.label,
                    confidence = classification.confidence,
                    processing_ms = processing_time.as_secs_f64() * 1000.0,
                    "Classified"
                );
                metrics::record_service_request("success");
                ServiceResponse::Success {
                    class: classification.label,
                    confidence: classification.confidence,
                    processing_time: processing_time.as_secs_f64(),
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Classification rejected payload");
                metrics::record_service_request("error");
                ServiceResponse::Error { error: e.to_string() }
            }
            Err(e) => {
                tracing::error!(error = %e, "Classification task failed");
                metrics::record_service_request("error");
                ServiceResponse::Error {
                    error: "classification task failed".to_string(),
                }
            }
        };
        response.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ClassifyError;

    const JPEG: &[u8] = &[0xff, 0xd8, 0xff, 0xe0, 0x10, 0x20, 0x30];

    struct Rejecting;

    impl Classifier for Rejecting {
        fn classify(&self, _image: &[u8]) -> Result<crate::service::Classification, ClassifyError> {
            Err(ClassifyError::InvalidInput("rejected".into()))
        }
    }

    fn decode(bytes: &[u8]) -> ServiceResponse {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn image_yields_success_frame() {
        let handler = ServiceHandler::new();
        match decode(&handler.handle(JPEG.to_vec()).await) {
            ServiceResponse::Success { class, confidence, processing_time } => {
                assert!(class == "car" || class == "motorcycle");
                assert!((0.0..=1.0).contains(&confidence));
                assert!(processing_time >= 0.0);
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn invalid_input_yields_error_frame() {
        let handler = ServiceHandler::new();
        let response = decode(&handler.handle(b"definitely not an image".to_vec()).await);
        assert!(matches!(response, ServiceResponse::Error { ref error } if error.starts_with("invalid input")));
    }

    #[tokio::test]
    async fn sealed_frames_are_relayed_not_classified() {
        let handler = ServiceHandler::with_classifier(Rejecting);
        let sealed = envelope::seal(JPEG);
        assert_eq!(handler.handle(sealed.clone()).await, sealed);

        let response = decode(&handler.handle(JPEG.to_vec()).await);
        assert_eq!(response, ServiceResponse::Error { error: "invalid input: rejected".into() });
    }

    #[test]
    fn wire_format() {
        let json = serde_json::to_value(ServiceResponse::Error { error: "boom".into() }).unwrap();
        assert_eq!(json, serde_json::json!({"status": "error", "error": "boom"}));
    }
}
