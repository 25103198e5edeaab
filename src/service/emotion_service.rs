//! Emotion Service - Core business logic
//!
//! Orchestrates upload persistence, face location and emotion classification.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::engine::classifier::Emotion;
use crate::engine::pool::ModelPool;
use crate::engine::preprocess::{crop_face, decode_image, to_grayscale, NormalizedTile};
use crate::error::{EmotionError, Result};
use crate::storage::UploadStore;

use super::types::*;

/// Face emotion service
pub struct EmotionService<S: UploadStore> {
    pool: Arc<ModelPool>,
    storage: Arc<S>,
    keep_uploads: bool,
}

impl<S: UploadStore> EmotionService<S> {
    pub fn new(pool: Arc<ModelPool>, storage: Arc<S>, keep_uploads: bool) -> Self {
        Self {
            pool,
            storage,
            keep_uploads,
        }
    }

    /// Persist an upload and classify the emotion of its selected face
    pub async fn predict(&self, upload: Upload) -> Result<PredictionOutcome> {
        let start = Instant::now();

        let stored = self
            .storage
            .save_upload(upload.file_name.as_deref(), &upload.data)
            .await
            .map_err(EmotionError::Storage)?;

        let pool = self.pool.clone();
        let data = upload.data;
        let detection = tokio::task::spawn_blocking(move || detect_and_classify(&pool, &data)).await;

        if !self.keep_uploads {
            if let Err(e) = self.storage.remove_upload(&stored).await {
                warn!("Failed to remove upload {:?}: {}", stored.path, e);
            }
        }

        let Some(detection) = detection?? else {
            info!("No face detected in upload {}", stored.id);
            return Ok(PredictionOutcome::NoFace);
        };

        let inference_time_ms = start.elapsed().as_millis() as u64;
        let prediction = detection.prediction;
        info!(
            "Predicted {} ({:.3}) for upload {} in {}ms",
            prediction.emotion, prediction.confidence, stored.id, inference_time_ms
        );

        let probabilities: HashMap<String, f32> = Emotion::LABELS
            .iter()
            .zip(prediction.probabilities)
            .map(|(emotion, p)| (emotion.as_str().to_string(), p))
            .collect();

        Ok(PredictionOutcome::Detected(EmotionResult {
            emotion: prediction.emotion,
            confidence: prediction.confidence,
            probabilities,
            face: detection.face,
            faces_detected: detection.faces_detected,
            upload_id: stored.id,
            inference_time_ms,
        }))
    }

    /// Health check
    pub fn health(&self) -> HealthResult {
        let models_loaded = self
            .pool
            .get_status()
            .into_iter()
            .map(|(model, loaded)| (model.as_str().to_string(), loaded))
            .collect();

        HealthResult {
            healthy: true,
            version: env!("CARGO_PKG_VERSION").to_string(),
            topology: self.pool.topology().as_str().to_string(),
            models_loaded,
        }
    }
}

/// Classify the selected face of an image file without storing an upload.
///
/// Runs the same decode, locate and classify path as [`EmotionService::predict`].
/// `Ok(None)` means no face was found.
pub fn predict_file(pool: &ModelPool, path: &Path) -> Result<Option<Detection>> {
    let data = std::fs::read(path).map_err(|source| EmotionError::ReadImage {
        path: path.to_path_buf(),
        source,
    })?;
    detect_and_classify(pool, &data)
}

/// Decode, locate, select, normalize and classify. CPU bound.
fn detect_and_classify(pool: &ModelPool, data: &[u8]) -> Result<Option<Detection>> {
    let image = decode_image(data)?;
    let frame = to_grayscale(&image);

    let faces = pool.locator().locate(&frame);
    debug!("Located {} faces in {}x{} frame", faces.len(), frame.width(), frame.height());

    let Some(face) = pool.selection().select(&faces) else {
        return Ok(None);
    };

    let tile = NormalizedTile::from_face(&crop_face(&frame, &face));
    let prediction = pool.classifier().classify(&tile)?;

    Ok(Some(Detection {
        face,
        faces_detected: faces.len(),
        prediction,
    }))
}
