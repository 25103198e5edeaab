//! Storage abstraction traits
//!
//! Defines the interface for persisting uploaded images.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;

/// A persisted upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    /// Generated identifier (UUID), also the file stem
    pub id: String,
    /// Where the bytes were written
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Client-supplied filename, informational only
    pub original_name: Option<String>,
}

/// Upload storage trait
/// Implementations must be thread-safe and async-compatible
#[async_trait]
pub trait UploadStore: Send + Sync + 'static {
    /// Persist uploaded bytes under a generated name.
    /// The client filename never decides the destination.
    async fn save_upload(&self, original_name: Option<&str>, data: &[u8]) -> io::Result<StoredUpload>;

    /// Remove a previously stored upload
    async fn remove_upload(&self, upload: &StoredUpload) -> io::Result<()>;
}
