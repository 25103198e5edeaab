//! Error types for the emotion pipeline

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while binding a weight artifact to a topology.
#[derive(Debug, Error)]
pub enum WeightError {
    #[error("weight artifact not found at {0}")]
    Missing(PathBuf),

    #[error("weight artifact {path} is not readable: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("weight artifact was built for topology `{found}`, expected `{expected}`")]
    TopologyMismatch { expected: String, found: String },

    #[error("weight artifact has no tensor `{0}`")]
    MissingTensor(String),

    #[error("tensor `{name}` has shape {found:?}, topology expects {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("weight artifact has tensors the topology does not use: {0:?}")]
    UnexpectedTensors(Vec<String>),

    #[error(transparent)]
    Tensor(#[from] candle_core::Error),

    #[error("failed to write weight artifact {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

/// Errors raised by the inference pipeline.
#[derive(Debug, Error)]
pub enum EmotionError {
    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("normalized tile has shape {found:?}, expected {expected:?}")]
    TileShape {
        expected: [usize; 4],
        found: Vec<usize>,
    },

    #[error("model produced {0} outputs, expected one per label")]
    OutputSize(usize),

    #[error(transparent)]
    Weights(#[from] WeightError),

    #[error(transparent)]
    Tensor(#[from] candle_core::Error),

    #[error("upload storage failed: {0}")]
    Storage(#[source] std::io::Error),

    #[error("cannot read image {path:?}: {source}")]
    ReadImage {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("inference task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, EmotionError>;
