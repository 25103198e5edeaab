//! Storage module for uploaded images

pub mod traits;
pub mod filesystem;

pub use traits::{StoredUpload, UploadStore};
pub use filesystem::FsUploadStore;
