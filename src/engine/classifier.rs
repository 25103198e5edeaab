//! Emotion Classifier
//!
//! Runs a normalized face tile through the emotion network and maps the
//! probability vector to a label.

use std::path::Path;

use candle_core::{Device, Tensor};
use tracing::debug;

use super::network::EmotionNet;
use super::preprocess::{NormalizedTile, TILE_SHAPE};
use super::topology::{Topology, TopologyVariant, NUM_CLASSES};
use super::weights::WeightSet;
use crate::error::{EmotionError, Result};
use crate::utils::math::{argmax, round_to};

/// Decimal places of a reported confidence
pub const CONFIDENCE_PRECISION: u32 = 3;

/// Emotion classification result
/// Variant order is the network's output unit order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Emotion {
    Angry,
    Happy,
    Neutral,
    Sad,
    Surprise,
}

impl Emotion {
    /// All labels, indexed by output unit
    pub const LABELS: [Emotion; NUM_CLASSES] = [
        Emotion::Angry,
        Emotion::Happy,
        Emotion::Neutral,
        Emotion::Sad,
        Emotion::Surprise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Angry => "Angry",
            Emotion::Happy => "Happy",
            Emotion::Neutral => "Neutral",
            Emotion::Sad => "Sad",
            Emotion::Surprise => "Surprise",
        }
    }

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::LABELS.get(idx).copied()
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network output for one tile
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub emotion: Emotion,
    /// Max probability, rounded to [`CONFIDENCE_PRECISION`] places
    pub confidence: f32,
    pub probabilities: [f32; NUM_CLASSES],
}

impl Prediction {
    /// Argmax + max extraction over a probability vector
    pub fn from_probabilities(probs: &[f32]) -> Result<Self> {
        let probabilities: [f32; NUM_CLASSES] = probs
            .try_into()
            .map_err(|_| EmotionError::OutputSize(probs.len()))?;
        let (idx, max) = argmax(&probabilities).ok_or(EmotionError::OutputSize(0))?;
        let emotion = Emotion::from_index(idx).ok_or(EmotionError::OutputSize(probs.len()))?;

        Ok(Self {
            emotion,
            confidence: round_to(max, CONFIDENCE_PRECISION),
            probabilities,
        })
    }
}

/// Emotion classifier over normalized tiles
pub struct EmotionClassifier {
    net: EmotionNet,
}

impl EmotionClassifier {
    pub fn new(net: EmotionNet) -> Self {
        Self { net }
    }

    /// Build the topology and bind a weight artifact to it
    pub fn load(path: &Path, variant: TopologyVariant, device: &Device) -> Result<Self> {
        let topology = Topology::build(variant);
        let weights = WeightSet::load(path, &topology, device)?;
        Ok(Self::new(EmotionNet::new(&topology, &weights, device)?))
    }

    /// Classifier with untrained weights
    pub fn untrained(variant: TopologyVariant, device: &Device) -> Result<Self> {
        let topology = Topology::build(variant);
        let weights = WeightSet::initialize(&topology, device)?;
        Ok(Self::new(EmotionNet::new(&topology, &weights, device)?))
    }

    pub fn variant(&self) -> TopologyVariant {
        self.net.variant()
    }

    /// Classify one normalized tile
    pub fn classify(&self, tile: &NormalizedTile) -> Result<Prediction> {
        let input = Tensor::from_slice(tile.as_slice(), &TILE_SHAPE, self.net.device())?;
        let output = self.net.forward(&input)?;
        let probs = output.flatten_all()?.to_vec1::<f32>()?;

        debug!("Emotion probabilities: {:?}", probs);

        Prediction::from_probabilities(&probs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_emotion_from_index() {
        assert_eq!(Emotion::from_index(0), Some(Emotion::Angry));
        assert_eq!(Emotion::from_index(1), Some(Emotion::Happy));
        assert_eq!(Emotion::from_index(2), Some(Emotion::Neutral));
        assert_eq!(Emotion::from_index(3), Some(Emotion::Sad));
        assert_eq!(Emotion::from_index(4), Some(Emotion::Surprise));
        assert_eq!(Emotion::from_index(5), None);
    }

    #[test]
    fn test_emotion_as_str() {
        let labels: Vec<&str> = Emotion::LABELS.iter().map(|e| e.as_str()).collect();
        assert_eq!(labels, vec!["Angry", "Happy", "Neutral", "Sad", "Surprise"]);
    }

    #[test]
    fn test_prediction_from_probabilities() {
        let prediction = Prediction::from_probabilities(&[0.05, 0.1, 0.12345, 0.7, 0.02655]).unwrap();
        assert_eq!(prediction.emotion, Emotion::Sad);
        assert_eq!(prediction.confidence, 0.7);

        let prediction = Prediction::from_probabilities(&[0.0, 0.87654, 0.1, 0.02, 0.00346]).unwrap();
        assert_eq!(prediction.emotion, Emotion::Happy);
        assert_eq!(prediction.confidence, 0.877);
    }

    #[test]
    fn test_prediction_rejects_wrong_length() {
        let err = Prediction::from_probabilities(&[0.5, 0.5]).unwrap_err();
        assert!(matches!(err, EmotionError::OutputSize(2)));
    }

    #[test]
    fn test_untrained_classifier_predicts_a_label() {
        let classifier = EmotionClassifier::untrained(TopologyVariant::LittleVgg, &Device::Cpu).unwrap();
        let face = GrayImage::from_fn(90, 90, |x, y| Luma([((x * y) % 256) as u8]));
        let tile = NormalizedTile::from_face(&face);

        let prediction = classifier.classify(&tile).unwrap();
        assert!(Emotion::LABELS.contains(&prediction.emotion));
        let sum: f32 = prediction.probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        assert!((0.2..=1.0).contains(&prediction.confidence));

        let again = classifier.classify(&tile).unwrap();
        assert_eq!(prediction, again);
    }

    #[test]
    fn test_load_missing_weights() {
        let dir = tempfile::tempdir().unwrap();
        let result = EmotionClassifier::load(
            &dir.path().join("missing.safetensors"),
            TopologyVariant::LittleVgg,
            &Device::Cpu,
        );
        assert!(matches!(
            result,
            Err(EmotionError::Weights(crate::error::WeightError::Missing(_)))
        ));
    }
}
