//! Emotion service configuration

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::engine::locator::{FaceSelection, LocatorParams};
use crate::engine::topology::TopologyVariant;

/// Environment variable overriding the configuration file path
pub const CONFIG_ENV: &str = "EMOFACE_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub detector: DetectorConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Cpu,
    Cuda,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub weights: PathBuf,
    pub topology: TopologyVariant,
    pub device: DeviceKind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model: PathBuf,
    pub scale_factor: f32,
    pub min_face_size: u32,
    pub score_threshold: f64,
    pub window_step: u32,
    pub selection: FaceSelection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub keep_uploads: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    /// Read, resolve and validate a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {:?}", path))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("invalid config file {:?}", path))?;

        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or fall back to defaults with the reason the file was rejected.
    ///
    /// Default relative paths resolve against the config file's directory,
    /// or the executable's directory when the path has none.
    pub fn load_or_default(path: impl AsRef<Path>) -> (Self, Option<anyhow::Error>) {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => (config, None),
            Err(e) => {
                let mut config = Self::default();
                config.resolve_paths(&fallback_base(path));
                (config, Some(e))
            }
        }
    }

    /// `EMOFACE_CONFIG` if set, otherwise `config.toml`
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Make relative file paths relative to `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        for path in [
            &mut self.model.weights,
            &mut self.detector.model,
            &mut self.storage.upload_dir,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.detector.params().validate()?;
        anyhow::ensure!(
            self.server.max_upload_bytes > 0,
            "server max_upload_bytes must be positive"
        );
        self.logging.level()?;
        Ok(())
    }
}

/// Directory that default paths hang off when no config file was loaded
fn fallback_base(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_default(),
    }
}

impl DetectorConfig {
    pub fn params(&self) -> LocatorParams {
        LocatorParams {
            scale_factor: self.scale_factor,
            min_face_size: self.min_face_size,
            score_threshold: self.score_threshold,
            window_step: self.window_step,
        }
    }
}

impl LoggingConfig {
    pub fn level(&self) -> anyhow::Result<tracing::Level> {
        self.level
            .parse()
            .map_err(|_| anyhow::anyhow!("unknown log level {:?}", self.level))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            weights: PathBuf::from("models/emotion_little_vgg.safetensors"),
            topology: TopologyVariant::LittleVgg,
            device: DeviceKind::Cpu,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        let params = LocatorParams::default();
        Self {
            model: PathBuf::from("models/seeta_fd_frontal_v1.0.bin"),
            scale_factor: params.scale_factor,
            min_face_size: params.min_face_size,
            score_threshold: params.score_threshold,
            window_step: params.window_step,
            selection: FaceSelection::First,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            keep_uploads: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
