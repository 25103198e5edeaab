//! Inference engine module
//!
//! Provides candle-based emotion inference with:
//! - A fixed little-VGG topology and its safetensors weight binding
//! - Cascade face location
//! - Preprocessing into 48x48 grayscale tiles

pub mod pool;
pub mod topology;
pub mod weights;
pub mod network;
pub mod locator;
pub mod preprocess;
pub mod classifier;

pub use pool::ModelPool;
pub use topology::{Topology, TopologyVariant};
pub use weights::WeightSet;
pub use network::EmotionNet;
pub use locator::{CascadeLocator, FaceLocator, FaceRegion, FaceSelection};
pub use classifier::{Emotion, EmotionClassifier, Prediction};
