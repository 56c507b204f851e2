use crate::config::AnalysisConfig;
use crate::detection::{
    AnalysisOutcome, DetectionReport, DEFAULT_NO_DETECTION_MESSAGE, DEFAULT_NO_DETECTION_SUGGESTION,
};
use reqwest::multipart;
use scan_api::{ClassListResponse, DetectResponse, HealthResponse, NO_CONDITION_LABEL};
use std::path::Path;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("{message}")]
    Rejected {
        message: String,
        reasons: Vec<String>,
        suggestions: Vec<String>,
    },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Malformed response from analysis service: {0}")]
    MalformedResponse(String),
    #[error("Analysis failed: {0}")]
    Other(String),
}

#[derive(Debug, Clone)]
pub struct AnalysisService {
    client: reqwest::Client,
    base_url: String,
}

impl AnalysisService {
    pub fn new(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder()
            .timeout(config.get_request_timeout())
            .build()
            .map_err(|e| AnalysisError::Other(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.get_address(),
        })
    }

    #[instrument(skip(self))]
    pub async fn analyze(&self, image_path: &Path) -> Result<AnalysisOutcome, AnalysisError> {
        let mime = mime_for_image(image_path)?;
        let file_name = image_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        let bytes = tokio::fs::read(image_path).await.map_err(|e| {
            AnalysisError::Other(format!("could not read {}: {e}", image_path.display()))
        })?;

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime)
            .map_err(|e| AnalysisError::Other(e.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/detect", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        let http_status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        let parsed: DetectResponse = serde_json::from_str(&body).map_err(|e| {
            if http_status.is_success() {
                AnalysisError::MalformedResponse(e.to_string())
            } else {
                AnalysisError::Other(format!("analysis service returned {http_status}"))
            }
        })?;

        interpret(parsed)
    }

    #[instrument(skip(self))]
    pub async fn health(&self) -> Result<HealthResponse, AnalysisError> {
        self.get_json("/health").await
    }

    #[instrument(skip(self))]
    pub async fn classes(&self) -> Result<ClassListResponse, AnalysisError> {
        self.get_json("/classes").await
    }

    pub async fn ensure_reachable(&self) -> Result<(), AnalysisError> {
        // Only a transport failure blocks the upload; any answer the server
        // manages to give, even a degraded one, lets it proceed.
        match self.health().await {
            Ok(health) => {
                if health.model_loaded == Some(false) {
                    tracing::warn!("analysis service reports its model is not loaded");
                }
                Ok(())
            }
            Err(AnalysisError::Network(message)) => Err(AnalysisError::Network(message)),
            Err(err) => {
                tracing::warn!(error = %err, "health check degraded, continuing anyway");
                Ok(())
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, AnalysisError> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .send()
            .await
            .map_err(transport_error)?;
        let body = response.text().await.map_err(transport_error)?;
        serde_json::from_str(&body).map_err(|e| AnalysisError::MalformedResponse(e.to_string()))
    }
}

pub fn validate_image(image_path: &Path) -> Result<(), AnalysisError> {
    mime_for_image(image_path).map(|_| ())
}

pub fn interpret(response: DetectResponse) -> Result<AnalysisOutcome, AnalysisError> {
    if !response.is_success() {
        return Err(AnalysisError::Rejected {
            message: response
                .message
                .unwrap_or_else(|| "The analysis service rejected this image.".to_string()),
            reasons: response.reasons.unwrap_or_default(),
            suggestions: response.suggestions.unwrap_or_default(),
        });
    }

    let DetectResponse {
        message,
        detection,
        confidence,
        suggestion,
        skin_percentage,
        ..
    } = response;

    match detection {
        Some(detection) if detection.disease != NO_CONDITION_LABEL => Ok(
            AnalysisOutcome::Detected(DetectionReport::from_wire(
                detection,
                confidence,
                skin_percentage,
            )),
        ),
        _ => Ok(AnalysisOutcome::NoDetection {
            message: message.unwrap_or_else(|| DEFAULT_NO_DETECTION_MESSAGE.to_string()),
            suggestion: suggestion.unwrap_or_else(|| DEFAULT_NO_DETECTION_SUGGESTION.to_string()),
        }),
    }
}

fn transport_error(err: reqwest::Error) -> AnalysisError {
    if err.is_timeout() {
        AnalysisError::Network(format!("request timed out: {err}"))
    } else {
        AnalysisError::Network(err.to_string())
    }
}

fn mime_for_image(path: &Path) -> Result<&'static str, AnalysisError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => Ok("image/jpeg"),
        Some("png") => Ok("image/png"),
        other => Err(AnalysisError::Rejected {
            message: format!(
                "Unsupported image type: {}",
                other.unwrap_or("no file extension")
            ),
            reasons: vec!["Only jpg, jpeg and png images can be analyzed".to_string()],
            suggestions: vec!["Choose a different photo and try again".to_string()],
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_api::Detection;
    use std::path::PathBuf;

    fn success_response(disease: &str, confidence: f64) -> DetectResponse {
        DetectResponse {
            status: "success".to_string(),
            message: None,
            detection: Some(Detection {
                disease: disease.to_string(),
                confidence: Some(confidence),
                bbox: None,
                is_low_confidence: Some(false),
                all_predictions: None,
            }),
            confidence: None,
            suggestion: None,
            reasons: None,
            suggestions: None,
            skin_percentage: None,
        }
    }

    #[test]
    fn named_condition_becomes_detected() {
        let outcome = interpret(success_response("Acne", 0.92)).unwrap();

        match outcome {
            AnalysisOutcome::Detected(report) => {
                assert_eq!(report.disease, "Acne");
                assert_eq!(report.confidence, Some(0.92));
            }
            other => panic!("expected Detected, got {other:?}"),
        }
    }

    #[test]
    fn disease_label_case_is_preserved() {
        let outcome = interpret(success_response("Tinea Ringworm Candidiasis", 0.67)).unwrap();

        match outcome {
            AnalysisOutcome::Detected(report) => {
                assert_eq!(report.disease, "Tinea Ringworm Candidiasis");
            }
            other => panic!("expected Detected, got {other:?}"),
        }
    }

    #[test]
    fn no_condition_label_becomes_no_detection() {
        let outcome = interpret(success_response(NO_CONDITION_LABEL, 0.88)).unwrap();

        match outcome {
            AnalysisOutcome::NoDetection { message, suggestion } => {
                assert_eq!(message, DEFAULT_NO_DETECTION_MESSAGE);
                assert_eq!(suggestion, DEFAULT_NO_DETECTION_SUGGESTION);
            }
            other => panic!("expected NoDetection, got {other:?}"),
        }
    }

    #[test]
    fn missing_detection_becomes_no_detection_with_server_text() {
        let response = DetectResponse {
            status: "success".to_string(),
            message: Some("Image does not appear to contain skin".to_string()),
            detection: None,
            confidence: Some(0.0),
            suggestion: Some("Please upload an image of skin.".to_string()),
            reasons: None,
            suggestions: None,
            skin_percentage: Some(2.4),
        };

        let outcome = interpret(response).unwrap();
        match outcome {
            AnalysisOutcome::NoDetection { message, suggestion } => {
                assert_eq!(message, "Image does not appear to contain skin");
                assert_eq!(suggestion, "Please upload an image of skin.");
            }
            other => panic!("expected NoDetection, got {other:?}"),
        }
    }

    #[test]
    fn non_success_status_is_rejected_with_details() {
        let response = DetectResponse {
            status: "error".to_string(),
            message: Some("Invalid image file".to_string()),
            detection: None,
            confidence: None,
            suggestion: None,
            reasons: Some(vec!["Could not decode the upload".to_string()]),
            suggestions: Some(vec!["Upload a jpg or png photograph".to_string()]),
            skin_percentage: None,
        };

        let err = interpret(response).unwrap_err();
        match err {
            AnalysisError::Rejected {
                message,
                reasons,
                suggestions,
            } => {
                assert_eq!(message, "Invalid image file");
                assert_eq!(reasons.len(), 1);
                assert_eq!(suggestions.len(), 1);
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn unsupported_extension_is_rejected_locally() {
        for name in ["scan.gif", "scan.bmp", "scan", "scan.JPG.backup"] {
            let err = mime_for_image(&PathBuf::from(name)).unwrap_err();
            assert!(matches!(err, AnalysisError::Rejected { .. }), "{name}");
        }
    }

    #[test]
    fn validate_image_matches_the_upload_gate() {
        assert!(validate_image(&PathBuf::from("scan.jpg")).is_ok());
        let err = validate_image(&PathBuf::from("scan.gif")).unwrap_err();
        assert!(matches!(err, AnalysisError::Rejected { .. }), "got {err:?}");
    }

    #[test]
    fn extension_check_ignores_case() {
        assert_eq!(mime_for_image(&PathBuf::from("scan.JPG")).unwrap(), "image/jpeg");
        assert_eq!(mime_for_image(&PathBuf::from("scan.PNG")).unwrap(), "image/png");
        assert_eq!(mime_for_image(&PathBuf::from("scan.jpeg")).unwrap(), "image/jpeg");
    }
}
