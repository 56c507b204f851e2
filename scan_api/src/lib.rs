use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

pub const STATUS_SUCCESS: &str = "success";

// Reported when nothing was detected with confidence; not an error.
pub const NO_CONDITION_LABEL: &str = "No Condition Detected";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection: Option<Detection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasons: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skin_percentage: Option<f64>,
}

impl DetectResponse {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub disease: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_low_confidence: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_predictions: Option<HashMap<String, f64>>,
}

// The service has emitted both {x1,y1,x2,y2} objects and [x1,y1,x2,y2]
// arrays; deserialization accepts either, serialization writes the object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl<'de> Deserialize<'de> for BoundingBox {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Corners { x1: f64, y1: f64, x2: f64, y2: f64 },
            Array([f64; 4]),
        }

        Ok(match Wire::deserialize(deserializer)? {
            Wire::Corners { x1, y1, x2, y2 } => BoundingBox { x1, y1, x2, y2 },
            Wire::Array([x1, y1, x2, y2]) => BoundingBox { x1, y1, x2, y2 },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_loaded: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassListResponse {
    pub status: String,
    pub classes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_classes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,
}

// id and timestamp are assigned by the store on create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanDocument {
    pub id: String,
    pub disease: String,
    pub image_uri: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewScanDocument {
    pub disease: String,
    pub image_uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedDocument {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_high_confidence_detect_response() {
        let body = r#"{
            "status": "success",
            "message": "Analysis completed with high confidence",
            "detection": {
                "disease": "Acne",
                "confidence": 0.92,
                "is_low_confidence": false,
                "all_predictions": {"Acne": 0.92, "Eczema": 0.05, "Warts Molluscum": 0.02}
            },
            "suggestion": "Consider over-the-counter treatments.",
            "skin_percentage": 64.2
        }"#;

        let parsed: DetectResponse = serde_json::from_str(body).expect("valid response");
        assert!(parsed.is_success());
        let detection = parsed.detection.expect("detection present");
        assert_eq!(detection.disease, "Acne");
        assert_eq!(detection.confidence, Some(0.92));
        assert_eq!(detection.is_low_confidence, Some(false));
        let predictions = detection.all_predictions.expect("predictions present");
        assert_eq!(predictions.len(), 3);
        assert_eq!(predictions["Eczema"], 0.05);
    }

    #[test]
    fn parses_non_skin_response_with_null_detection() {
        let body = r#"{
            "status": "success",
            "message": "Image does not appear to contain skin",
            "detection": null,
            "confidence": 0.0,
            "suggestion": "Please upload an image of skin for disease detection.",
            "skin_percentage": 3.1,
            "reasons": ["Low skin content detected"]
        }"#;

        let parsed: DetectResponse = serde_json::from_str(body).expect("valid response");
        assert!(parsed.is_success());
        assert!(parsed.detection.is_none());
        assert_eq!(parsed.reasons.as_deref(), Some(&["Low skin content detected".to_string()][..]));
    }

    #[test]
    fn parses_validation_failure_shape() {
        let body = r#"{
            "status": "error",
            "message": "Invalid image file",
            "reasons": ["Could not process the uploaded image"],
            "suggestions": ["Upload a jpg or png photograph"]
        }"#;

        let parsed: DetectResponse = serde_json::from_str(body).expect("valid response");
        assert!(!parsed.is_success());
        assert!(parsed.detection.is_none());
        assert_eq!(parsed.reasons.map(|r| r.len()), Some(1));
        assert_eq!(parsed.suggestions.map(|s| s.len()), Some(1));
    }

    #[test]
    fn bounding_box_accepts_object_form() {
        let parsed: BoundingBox =
            serde_json::from_str(r#"{"x1": 0.1, "y1": 0.2, "x2": 0.8, "y2": 0.9}"#).unwrap();
        assert_eq!(
            parsed,
            BoundingBox { x1: 0.1, y1: 0.2, x2: 0.8, y2: 0.9 }
        );
    }

    #[test]
    fn bounding_box_accepts_array_form() {
        let parsed: BoundingBox = serde_json::from_str("[0.1, 0.2, 0.8, 0.9]").unwrap();
        assert_eq!(
            parsed,
            BoundingBox { x1: 0.1, y1: 0.2, x2: 0.8, y2: 0.9 }
        );
    }

    #[test]
    fn scan_document_uses_camel_case_field_names() {
        let doc = ScanDocument {
            id: "a1b2".to_string(),
            disease: "Psoriasis".to_string(),
            image_uri: "file:///scans/psoriasis.jpg".to_string(),
            timestamp: "2025-03-12T10:30:00Z".parse().unwrap(),
        };

        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("\"imageUri\""));
        assert!(!json.contains("image_uri"));

        let back: ScanDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn new_scan_document_serializes_without_id_or_timestamp() {
        let new = NewScanDocument {
            disease: "Eczema".to_string(),
            image_uri: "file:///scans/arm.png".to_string(),
        };

        let json = serde_json::to_string(&new).unwrap();
        assert_eq!(json, r#"{"disease":"Eczema","imageUri":"file:///scans/arm.png"}"#);
    }
}
