//! REST API request/response data transfer objects

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Multipart field carrying the uploaded image
pub const FILE_FIELD: &str = "file";

/// Message reported when no face was located
pub const NO_FACE_MESSAGE: &str = "No face detected";

/// Emotion prediction response
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub emotion: String,
    /// Max probability, 0-1, three decimals
    pub confidence: f32,
}

/// Body of a successful prediction request
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictBody {
    Emotion(PredictResponse),
    NoFace(ErrorResponse),
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
    pub topology: String,
    pub models_loaded: HashMap<String, bool>,
    pub uptime_seconds: u64,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            code: Some(code.to_string()),
        }
    }

    /// Error message without a code
    pub fn message(error: &str) -> Self {
        Self {
            error: error.to_string(),
            code: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_face_body() {
        let body = PredictBody::NoFace(ErrorResponse::message(NO_FACE_MESSAGE));
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"error":"No face detected"}"#
        );
    }

    #[test]
    fn test_emotion_body() {
        let body = PredictBody::Emotion(PredictResponse {
            emotion: "Happy".to_string(),
            confidence: 0.877,
        });
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"emotion":"Happy","confidence":0.877}"#
        );
    }

    #[test]
    fn test_error_with_code() {
        let body = ErrorResponse::new("Invalid image file", "INVALID_IMAGE");
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"error":"Invalid image file","code":"INVALID_IMAGE"}"#
        );
    }
}
