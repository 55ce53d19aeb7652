use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::audio::transcode::TranscoderConfig;
use crate::audio::AudioConfig;
use crate::voice::biometrics::BiometricsConfig;
use crate::voice::store::StoreConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub transcoder: TranscoderConfig,
    pub biometrics: BiometricsConfig,
    pub store: StoreConfig,
}

impl AppConfig {
    /// Load config from file or create default
    pub fn load_or_create(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: AppConfig = toml::from_str(&content)?;
            log::info!("Config loaded from: {}", path.display());
            Ok(config)
        } else {
            let config = Self::default();
            let toml_str = toml::to_string_pretty(&config)?;
            fs::write(path, toml_str)?;
            log::info!("Default config created at: {}", path.display());
            Ok(config)
        }
    }
}
