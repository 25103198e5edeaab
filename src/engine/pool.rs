//! Model Pool
//!
//! The inference context shared by every request: the face locator and the
//! emotion classifier. Both are loaded once at startup and never unloaded.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use candle_core::Device;
use tracing::info;

use super::classifier::EmotionClassifier;
use super::locator::{CascadeLocator, FaceLocator, FaceSelection};
use super::topology::TopologyVariant;
use crate::config::{Config, DeviceKind};

/// Models held by the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelType {
    Detector,
    Emotion,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Detector => "detector",
            ModelType::Emotion => "emotion",
        }
    }
}

/// Shared, read-only inference context
pub struct ModelPool {
    locator: Arc<dyn FaceLocator>,
    classifier: Arc<EmotionClassifier>,
    selection: FaceSelection,
}

impl ModelPool {
    /// Load the detector model and the emotion weights.
    /// Either file missing or invalid is fatal.
    pub fn load(config: &Config) -> anyhow::Result<Self> {
        let device = select_device(config.model.device)?;

        info!("Loading model: {} from {:?}", ModelType::Detector.as_str(), config.detector.model);
        let start = Instant::now();
        let locator = CascadeLocator::from_file(&config.detector.model, config.detector.params())?;
        info!("Model {} loaded in {:?}", ModelType::Detector.as_str(), start.elapsed());

        info!("Loading model: {} from {:?}", ModelType::Emotion.as_str(), config.model.weights);
        let start = Instant::now();
        let classifier = EmotionClassifier::load(&config.model.weights, config.model.topology, &device)
            .with_context(|| format!("cannot load emotion weights {:?}", config.model.weights))?;
        info!(
            "Model {} ({}) loaded in {:?}",
            ModelType::Emotion.as_str(),
            classifier.variant(),
            start.elapsed()
        );

        Ok(Self::from_parts(
            Arc::new(locator),
            Arc::new(classifier),
            config.detector.selection,
        ))
    }

    /// Assemble a pool from already constructed models
    pub fn from_parts(
        locator: Arc<dyn FaceLocator>,
        classifier: Arc<EmotionClassifier>,
        selection: FaceSelection,
    ) -> Self {
        Self {
            locator,
            classifier,
            selection,
        }
    }

    pub fn locator(&self) -> Arc<dyn FaceLocator> {
        self.locator.clone()
    }

    pub fn classifier(&self) -> Arc<EmotionClassifier> {
        self.classifier.clone()
    }

    pub fn selection(&self) -> FaceSelection {
        self.selection
    }

    pub fn topology(&self) -> TopologyVariant {
        self.classifier.variant()
    }

    /// Get status of all models
    pub fn get_status(&self) -> Vec<(ModelType, bool)> {
        // models are loaded eagerly, a pool only exists once both are in memory
        vec![(ModelType::Detector, true), (ModelType::Emotion, true)]
    }
}

fn select_device(kind: DeviceKind) -> anyhow::Result<Device> {
    match kind {
        DeviceKind::Cpu => Ok(Device::Cpu),
        DeviceKind::Cuda => Device::new_cuda(0).context("cuda device requested but unavailable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    use crate::engine::locator::FaceRegion;

    struct NoFaces;

    impl FaceLocator for NoFaces {
        fn locate(&self, _frame: &GrayImage) -> Vec<FaceRegion> {
            Vec::new()
        }
    }

    #[test]
    fn test_model_type_as_str() {
        assert_eq!(ModelType::Detector.as_str(), "detector");
        assert_eq!(ModelType::Emotion.as_str(), "emotion");
    }

    #[test]
    fn test_from_parts() {
        let classifier =
            EmotionClassifier::untrained(TopologyVariant::LittleVggCompact, &Device::Cpu).unwrap();
        let pool = ModelPool::from_parts(Arc::new(NoFaces), Arc::new(classifier), FaceSelection::Largest);

        assert_eq!(pool.topology(), TopologyVariant::LittleVggCompact);
        assert_eq!(pool.selection(), FaceSelection::Largest);
        assert!(pool.get_status().iter().all(|(_, loaded)| *loaded));
        assert!(pool.locator().locate(&GrayImage::new(4, 4)).is_empty());
    }

    #[test]
    fn test_load_fails_without_detector_model() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.resolve_paths(dir.path());

        let err = ModelPool::load(&config).err().unwrap();
        assert!(format!("{:#}", err).contains("face detector model not found"));
    }
}
