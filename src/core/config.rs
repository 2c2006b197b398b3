//! Application configuration management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};

/// Default persistence key for the canvas document
pub const DEFAULT_PERSISTENCE_KEY: &str = "infinite-canvas-v1";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Identifier the persisted document is stored under
    pub persistence_key: String,
    /// Directory holding persisted storage keys
    pub storage_dir: Option<PathBuf>,
    /// Directory export artifacts are written to
    pub export_dir: Option<PathBuf>,
    /// Timing settings
    pub timing: TimingConfig,
    /// UI settings
    pub ui: UiConfig,
}

/// Delays and timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// How long a notification stays on screen
    pub notification_ms: u64,
    /// Upper bound for the SVG to PNG conversion
    pub raster_timeout_secs: u64,
    /// Quiet period after the last edit before the document is saved
    pub save_debounce_ms: u64,
}

/// UI settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Canvas background color as `#rrggbb`
    pub background: String,
    /// Accent color as `#rrggbb`
    pub accent: String,
    /// Draw a dot grid on the canvas
    pub show_grid: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            persistence_key: DEFAULT_PERSISTENCE_KEY.to_string(),
            storage_dir: None,
            export_dir: None,
            timing: TimingConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            notification_ms: 3000,
            raster_timeout_secs: 10,
            save_debounce_ms: 500,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            background: "#050505".to_string(),
            accent: "#D4AF37".to_string(),
            show_grid: true,
        }
    }
}

impl TimingConfig {
    pub fn notification(&self) -> Duration {
        Duration::from_millis(self.notification_ms)
    }

    pub fn raster_timeout(&self) -> Duration {
        Duration::from_secs(self.raster_timeout_secs)
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }
}

impl UiConfig {
    pub fn background_color(&self) -> egui::Color32 {
        parse_hex_color(&self.background).unwrap_or(egui::Color32::from_rgb(5, 5, 5))
    }

    pub fn accent_color(&self) -> egui::Color32 {
        parse_hex_color(&self.accent).unwrap_or(egui::Color32::from_rgb(212, 175, 55))
    }
}

/// Parse a `#rrggbb` color
pub fn parse_hex_color(hex: &str) -> Option<egui::Color32> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(hex.get(range)?, 16).ok();
    Some(egui::Color32::from_rgb(
        channel(0..2)?,
        channel(2..4)?,
        channel(4..6)?,
    ))
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "inkfinite", "InkFinite")
}

impl AppConfig {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        Ok(config)
    }

    /// Get the storage directory
    pub fn storage_dir(&self) -> PathBuf {
        self.storage_dir.clone().unwrap_or_else(|| {
            project_dirs()
                .map(|dirs| dirs.data_dir().join("storage"))
                .unwrap_or_else(|| PathBuf::from("storage"))
        })
    }

    /// Get the directory exports are written to
    pub fn export_dir(&self) -> PathBuf {
        self.export_dir.clone().unwrap_or_else(|| {
            UserDirs::new()
                .and_then(|dirs| dirs.download_dir().map(PathBuf::from))
                .or_else(|| project_dirs().map(|dirs| dirs.data_dir().join("exports")))
                .unwrap_or_else(|| PathBuf::from("exports"))
        })
    }
}
