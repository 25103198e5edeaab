//! Service layer types

use std::collections::HashMap;

use crate::engine::classifier::{Emotion, Prediction};
use crate::engine::locator::FaceRegion;

/// An uploaded image as received by a handler
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: Option<String>,
    pub data: Vec<u8>,
}

/// Emotion prediction for the selected face
#[derive(Debug, Clone)]
pub struct EmotionResult {
    pub emotion: Emotion,
    /// Max probability rounded to 3 decimals
    pub confidence: f32,
    pub probabilities: HashMap<String, f32>,
    pub face: FaceRegion,
    pub faces_detected: usize,
    pub upload_id: String,
    pub inference_time_ms: u64,
}

impl EmotionResult {
    /// Confidence as a percentage with one decimal place
    pub fn confidence_percent(&self) -> f32 {
        crate::utils::math::round_to(self.confidence * 100.0, 1)
    }
}

/// The selected face of one image and its classification
#[derive(Debug, Clone)]
pub struct Detection {
    pub face: FaceRegion,
    pub faces_detected: usize,
    pub prediction: Prediction,
}

/// Outcome of a prediction request
#[derive(Debug, Clone)]
pub enum PredictionOutcome {
    Detected(EmotionResult),
    NoFace,
}

/// Health check result
#[derive(Debug, Clone)]
pub struct HealthResult {
    pub healthy: bool,
    pub version: String,
    pub topology: String,
    pub models_loaded: HashMap<String, bool>,
}
