//! Filesystem upload storage

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use super::traits::{StoredUpload, UploadStore};

/// Longest client extension kept on a stored file
const MAX_EXTENSION_LEN: usize = 5;

/// Stores uploads as `<uuid>[.<ext>]` inside one directory
pub struct FsUploadStore {
    dir: PathBuf,
}

impl FsUploadStore {
    /// Create the store, making the directory if needed
    pub async fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        info!("Upload storage initialized at: {:?}", dir);
        Ok(Self { dir })
    }
}

#[async_trait]
impl UploadStore for FsUploadStore {
    async fn save_upload(&self, original_name: Option<&str>, data: &[u8]) -> io::Result<StoredUpload> {
        let id = Uuid::new_v4().to_string();
        let file_name = match original_name.and_then(safe_extension) {
            Some(ext) => format!("{}.{}", id, ext),
            None => id.clone(),
        };
        let path = self.dir.join(file_name);

        tokio::fs::write(&path, data).await?;
        debug!("Stored upload {:?} ({} bytes) as {:?}", original_name, data.len(), path);

        Ok(StoredUpload {
            id,
            path,
            size: data.len() as u64,
            original_name: original_name.map(str::to_string),
        })
    }

    async fn remove_upload(&self, upload: &StoredUpload) -> io::Result<()> {
        match tokio::fs::remove_file(&upload.path).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// The client's extension, lowercased, if it is short and alphanumeric
fn safe_extension(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?;
    let valid = (1..=MAX_EXTENSION_LEN).contains(&ext.len())
        && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| ext.to_ascii_lowercase())
}
