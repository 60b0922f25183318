/// Pipeline configuration
///
/// Everything the core needs to know about its environment is carried
/// in a [`PipelineConfig`] passed in at construction time. It is
/// serialized to JSON so a run can be reproduced from a file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::crop::detection::DetectionOptions;
use crate::crop::geometry::{AspectRatio, MAX_TILE_HEIGHT};
use crate::error::ConfigError;

/// Token used in filenames when no muted color could be extracted
pub const DEFAULT_COLOR_FALLBACK: &str = "default";

/// Complete configuration for one orchestrator
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub storage: StorageLayout,
    pub detection: DetectionOptions,
    pub crop: CropConfig,
    /// Substituted for the hex color when extraction fails
    pub color_fallback: String,
}

/// Where originals wait and where derivatives are published
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StorageLayout {
    /// Prefix holding uploaded originals pending processing
    pub queue_prefix: String,
    /// Prefix under which each booth gets its own namespace
    pub booth_prefix: String,
    /// Public root the object keys are served from, without trailing slash
    pub public_base_url: String,
}

/// Crop geometry and encoding settings
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct CropConfig {
    /// Maximum height of one article tile
    pub max_tile_height: u32,
    /// Thumbnail aspect ratio (width:height)
    pub aspect_ratio: AspectRatio,
    /// JPEG quality for published derivatives (1-100)
    pub jpeg_quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage: StorageLayout::default(),
            detection: DetectionOptions::default(),
            crop: CropConfig::default(),
            color_fallback: DEFAULT_COLOR_FALLBACK.to_string(),
        }
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self {
            queue_prefix: "queue".to_string(),
            booth_prefix: "booth".to_string(),
            public_base_url: "http://localhost".to_string(),
        }
    }
}

impl StorageLayout {
    /// Layout for a public S3 bucket in the given region
    pub fn s3(bucket: &str, region: &str) -> Self {
        Self {
            public_base_url: format!("https://{bucket}.s3.{region}.amazonaws.com"),
            ..Self::default()
        }
    }
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            max_tile_height: MAX_TILE_HEIGHT,
            aspect_ratio: AspectRatio::PORTRAIT_3_4,
            jpeg_quality: 90,
        }
    }
}

impl PipelineConfig {
    /// Load and validate a JSON config file
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a JSON string; missing sections take their defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Convert to a pretty JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Reject values the crop geometry cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crop.max_tile_height == 0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "crop.max_tile_height",
                value: "0".to_string(),
            });
        }

        let ratio = self.crop.aspect_ratio;
        if !(ratio.width > 0.0 && ratio.height > 0.0 && ratio.value().is_finite()) {
            return Err(ConfigError::InvalidParameter {
                parameter: "crop.aspect_ratio",
                value: format!("{}:{}", ratio.width, ratio.height),
            });
        }

        if !(1..=100).contains(&self.crop.jpeg_quality) {
            return Err(ConfigError::InvalidParameter {
                parameter: "crop.jpeg_quality",
                value: self.crop.jpeg_quality.to_string(),
            });
        }

        Ok(())
    }
}
