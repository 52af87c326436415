use std::path::{Path, PathBuf};

use crate::error::SettingsError;

pub const DEFAULT_PRELOAD_COUNT: usize = 5;
pub const MAX_PRELOAD_COUNT: usize = 20;

// Engine settings with persistence support
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    // How many upcoming positions to resolve ahead of the cursor
    pub preload_count: usize,

    // Stream resolver
    pub ytdlp_path: Option<PathBuf>,
    pub ytdlp_format: String,

    // BASS library and network configuration
    pub bass_library: Option<PathBuf>,
    pub volume: f32,
    pub buffer_size_ms: u32,
    pub net_timeout_ms: u32,
    pub net_buffer_ms: u32,

    // Album art
    pub fetch_artwork: bool,
    pub artwork_timeout_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            preload_count: DEFAULT_PRELOAD_COUNT,
            ytdlp_path: None,
            ytdlp_format: "bestaudio/best".to_string(),
            bass_library: None,
            volume: 0.5,
            buffer_size_ms: 1024,
            net_timeout_ms: 15000,
            net_buffer_ms: 15000,
            fetch_artwork: true,
            artwork_timeout_ms: 10000,
        }
    }
}

impl EngineSettings {
    /// Load settings from the default location, using defaults if the file doesn't exist
    pub fn load() -> Self {
        match Self::settings_path() {
            Ok(path) => Self::load_from(&path),
            Err(e) => {
                crate::log_warn!("[settings] {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Load settings from an explicit file, using defaults when it is missing or unreadable
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            crate::log_info!("[settings] {} not found, using defaults", path.display());
            return Self::default();
        }

        let mut settings = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<EngineSettings>(&content) {
                Ok(settings) => {
                    crate::log_info!("[settings] Loaded settings from: {}", path.display());
                    settings
                }
                Err(e) => {
                    crate::log_warn!("[settings] Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                crate::log_warn!("[settings] Failed to read {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        };

        settings.validate();
        settings
    }

    /// Save settings to the default location
    pub fn save(&self) -> Result<PathBuf, SettingsError> {
        let path = Self::settings_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        crate::log_info!("[settings] Saved settings to: {}", path.display());
        Ok(())
    }

    /// Where settings live when no explicit path is given
    pub fn settings_path() -> Result<PathBuf, SettingsError> {
        let mut path = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
        path.push("swipe-deck");
        path.push("settings.json");
        Ok(path)
    }

    /// Validate and clamp settings to reasonable ranges
    pub fn validate(&mut self) {
        self.preload_count = self.preload_count.min(MAX_PRELOAD_COUNT);

        // Clamp volume to 0.0-1.0; NaN falls back to the default
        self.volume = if self.volume.is_nan() {
            0.5
        } else {
            self.volume.clamp(0.0, 1.0)
        };

        // Clamp buffer sizes to reasonable ranges
        self.buffer_size_ms = self.buffer_size_ms.clamp(10, 10000);
        self.net_timeout_ms = self.net_timeout_ms.clamp(1000, 120000);
        self.net_buffer_ms = self.net_buffer_ms.clamp(1000, 120000);
        self.artwork_timeout_ms = self.artwork_timeout_ms.clamp(1000, 60000);

        if self.ytdlp_format.trim().is_empty() {
            self.ytdlp_format = "bestaudio/best".to_string();
        }
    }
}
