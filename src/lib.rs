//! Facial Emotion Service Library

pub mod config;
pub mod error;
pub mod engine;
pub mod service;
pub mod storage;
pub mod api;
pub mod utils;
pub mod cli;

pub use config::Config;
pub use error::{EmotionError, WeightError};
