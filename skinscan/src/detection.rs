use scan_api::{BoundingBox, Detection};
use serde::Serialize;
use std::collections::HashMap;

pub const DEFAULT_NO_DETECTION_MESSAGE: &str =
    "No specific skin condition detected with high confidence";

pub const DEFAULT_NO_DETECTION_SUGGESTION: &str =
    "Please consult a dermatologist for accurate diagnosis";

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Detected(DetectionReport),
    NoDetection { message: String, suggestion: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionReport {
    pub disease: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_predictions: Option<HashMap<String, f64>>,
    pub is_low_confidence: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skin_percentage: Option<f64>,
}

impl DetectionReport {
    // Older service builds put the confidence on the response envelope
    // instead of the detection; the skin percentage only ever lives there.
    pub fn from_wire(
        detection: Detection,
        fallback_confidence: Option<f64>,
        skin_percentage: Option<f64>,
    ) -> Self {
        Self {
            disease: detection.disease,
            confidence: detection.confidence.or(fallback_confidence),
            bbox: detection.bbox,
            all_predictions: detection.all_predictions,
            is_low_confidence: detection.is_low_confidence.unwrap_or(false),
            skin_percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_prefers_detection_confidence_over_envelope() {
        let detection = Detection {
            disease: "Acne".to_string(),
            confidence: Some(0.92),
            bbox: None,
            is_low_confidence: None,
            all_predictions: None,
        };

        let report = DetectionReport::from_wire(detection, Some(0.5), None);
        assert_eq!(report.confidence, Some(0.92));
        assert!(!report.is_low_confidence);
    }

    #[test]
    fn report_falls_back_to_envelope_confidence() {
        let detection = Detection {
            disease: "Eczema".to_string(),
            confidence: None,
            bbox: None,
            is_low_confidence: Some(true),
            all_predictions: None,
        };

        let report = DetectionReport::from_wire(detection, Some(0.41), Some(72.0));
        assert_eq!(report.confidence, Some(0.41));
        assert!(report.is_low_confidence);
        assert_eq!(report.skin_percentage, Some(72.0));
    }
}
