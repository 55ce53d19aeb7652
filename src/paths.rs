use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

/// Application paths following OS conventions
#[derive(Clone, Debug)]
pub struct AppPaths {
    /// Configuration directory (config.toml)
    pub config: PathBuf,
    /// Data directory (embeddings snapshot, models)
    pub data: PathBuf,
    /// Cache directory (temp audio for transcoding)
    pub cache: PathBuf,
}

impl AppPaths {
    /// Resolve OS-specific paths for Voxgate
    ///
    /// # Platform Paths
    ///
    /// ## Linux
    /// - Config: `~/.config/voxgate/`
    /// - Data: `~/.local/share/voxgate/` → embeddings.json, models/
    /// - Cache: `~/.cache/voxgate/` → tmp_audio/
    ///
    /// ## macOS
    /// - Config: `~/Library/Preferences/dev.LotusEmberLabs.Voxgate/`
    /// - Data: `~/Library/Application Support/dev.LotusEmberLabs.Voxgate/`
    /// - Cache: `~/Library/Caches/dev.LotusEmberLabs.Voxgate/`
    ///
    /// ## Windows
    /// - Config: `%APPDATA%\LotusEmberLabs\Voxgate\config\`
    /// - Data: `%LOCALAPPDATA%\LotusEmberLabs\Voxgate\data\`
    /// - Cache: `%LOCALAPPDATA%\LotusEmberLabs\Voxgate\cache\`
    pub fn new() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("dev", "LotusEmberLabs", "Voxgate")
            .context("Failed to determine project directories")?;

        Ok(Self {
            config: proj_dirs.config_dir().to_path_buf(),
            data: proj_dirs.data_dir().to_path_buf(),
            cache: proj_dirs.cache_dir().to_path_buf(),
        })
    }

    /// Place config, data and cache under a single root directory
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            config: root.join("config"),
            data: root.join("data"),
            cache: root.join("cache"),
        }
    }

    /// Create all necessary directories with subdirectories
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.config).context("Failed to create config directory")?;

        fs::create_dir_all(&self.data).context("Failed to create data directory")?;
        fs::create_dir_all(self.models_dir()).context("Failed to create models directory")?;

        fs::create_dir_all(&self.cache).context("Failed to create cache directory")?;
        fs::create_dir_all(self.tmp_audio_dir())
            .context("Failed to create tmp_audio directory")?;

        log::info!("Application directories initialized");
        log::debug!("  Config: {}", self.config.display());
        log::debug!("  Data:   {}", self.data.display());
        log::debug!("  Cache:  {}", self.cache.display());

        Ok(())
    }

    /// Get path to config file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Get path to the enrollment snapshot
    pub fn snapshot_file(&self) -> PathBuf {
        self.data.join("embeddings.json")
    }

    /// Get path to models directory
    pub fn models_dir(&self) -> PathBuf {
        self.data.join("models")
    }

    /// Get path to the default speaker embedding model
    pub fn speaker_model_file(&self) -> PathBuf {
        self.models_dir().join("speaker-encoder.onnx")
    }

    /// Get path to scratch directory for transcoder input/output
    pub fn tmp_audio_dir(&self) -> PathBuf {
        self.cache.join("tmp_audio")
    }
}
