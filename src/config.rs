/// Engine configuration
///
/// Operational knobs (thumbnail geometry, fan-out limits, restored row defaults).
/// Loaded from an optional TOML file; every key falls back to its default.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};

/// Encoding used for derived thumbnails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailFormat {
    /// Lossless WebP, the format InvokeAI keeps in its thumbnails folder
    Webp,
    /// Lossy JPEG at `thumbnail_quality`
    Jpeg,
}

impl ThumbnailFormat {
    /// File extension appended to the source stem
    pub fn extension(self) -> &'static str {
        match self {
            ThumbnailFormat::Webp => "webp",
            ThumbnailFormat::Jpeg => "jpg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Name of the side-car directory under the output directory
    pub thumbnail_dir: String,
    /// Longest edge of a derived thumbnail; smaller sources are never upscaled
    pub thumbnail_max_edge: u32,
    pub thumbnail_format: ThumbnailFormat,
    /// JPEG quality, 1-100. The default WebP output is lossless and ignores it.
    pub thumbnail_quality: u8,
    /// Maximum number of files read or derived concurrently
    pub fan_out: usize,
    /// Maximum row ids per DELETE statement
    pub delete_batch_size: usize,
    /// Values written into restored catalog rows
    pub image_origin: String,
    pub image_category: String,
    /// Optional columns, written only when the table has them
    pub workflow_column: String,
    pub metadata_column: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            thumbnail_dir: "thumbnails".to_string(),
            thumbnail_max_edge: 256,
            thumbnail_format: ThumbnailFormat::Webp,
            thumbnail_quality: 85,
            fan_out: 50,
            delete_batch_size: 500,
            image_origin: "internal".to_string(),
            image_category: "general".to_string(),
            workflow_column: "has_workflow".to_string(),
            metadata_column: "metadata".to_string(),
        }
    }
}

impl SyncConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(source: &str) -> SyncResult<Self> {
        let config: SyncConfig =
            toml::from_str(source).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the config file.
    ///
    /// An explicit path must exist. Without one, the default location is tried:
    /// - Linux: ~/.config/invoke-catalog-sync/config.toml
    /// - macOS: ~/Library/Application Support/invoke-catalog-sync/config.toml
    /// - Windows: %APPDATA%\invoke-catalog-sync\config.toml
    ///
    /// and defaults are used when it is absent.
    pub fn load(explicit: Option<&Path>) -> SyncResult<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.is_file() => path,
                _ => {
                    debug!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let source = fs::read_to_string(&path)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&source)?;
        info!("⚙️  Loaded config from {}", path.display());
        Ok(config)
    }

    /// Get the path where the config file is looked up by default
    fn default_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("invoke-catalog-sync");
        path.push("config.toml");
        Some(path)
    }

    fn validate(&self) -> SyncResult<()> {
        if self.thumbnail_dir.trim().is_empty() {
            return Err(SyncError::Config("thumbnail_dir must not be empty".into()));
        }
        if self.thumbnail_max_edge == 0 {
            return Err(SyncError::Config("thumbnail_max_edge must be positive".into()));
        }
        if !(1..=100).contains(&self.thumbnail_quality) {
            return Err(SyncError::Config("thumbnail_quality must be within 1-100".into()));
        }
        if self.fan_out == 0 || self.delete_batch_size == 0 {
            return Err(SyncError::Config(
                "fan_out and delete_batch_size must be positive".into(),
            ));
        }
        Ok(())
    }
}
