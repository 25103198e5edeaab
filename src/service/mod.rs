//! Service layer module

pub mod emotion_service;
pub mod types;

pub use emotion_service::{predict_file, EmotionService};
pub use types::*;
