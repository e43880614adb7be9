//! Configuration management for JpegFit

use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::error::{Result, JpegFitError};
use crate::processing::resize::FilterType;

/// 7.5 MiB
pub const DEFAULT_MAX_OUTPUT_BYTES: u64 = 7_864_320;
pub const DEFAULT_MAX_DIMENSION: u32 = 7500;
pub const DEFAULT_MIN_QUALITY: u8 = 50;
pub const DEFAULT_MAX_QUALITY: u8 = 100;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output constraints every converted file must satisfy
    pub limits: Limits,

    /// Worker pool and discovery settings
    pub processing: ProcessingConfig,

    /// Progress line rendering
    pub progress: ProgressConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Size, dimension and quality bounds for one conversion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum size of an output file in bytes
    pub max_output_bytes: u64,

    /// Maximum width and height of an output image in pixels
    pub max_dimension: u32,

    /// Lowest JPEG quality the search may settle on
    pub min_quality: u8,

    /// Quality the search starts from
    pub max_quality: u8,

    /// Resampling filter used when downscaling
    pub resize_filter: FilterType,

    /// Cap on decoder allocations in bytes (None = unlimited)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decode_memory_limit: Option<u64>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            max_dimension: DEFAULT_MAX_DIMENSION,
            min_quality: DEFAULT_MIN_QUALITY,
            max_quality: DEFAULT_MAX_QUALITY,
            resize_filter: FilterType::default(),
            decode_memory_limit: None,
        }
    }
}

impl Limits {
    /// Validate the bounds
    pub fn validate(&self) -> Result<()> {
        if self.max_output_bytes == 0 {
            return Err(JpegFitError::config("Maximum output size must be greater than 0"));
        }
        if self.max_dimension == 0 {
            return Err(JpegFitError::config("Maximum dimension must be greater than 0"));
        }
        if self.decode_memory_limit == Some(0) {
            return Err(JpegFitError::config("Decode memory limit must be greater than 0"));
        }
        if self.min_quality == 0 || self.max_quality > 100 {
            return Err(JpegFitError::config("Quality must be between 1 and 100"));
        }
        if self.min_quality > self.max_quality {
            return Err(JpegFitError::config(format!(
                "Minimum quality {} is above maximum quality {}",
                self.min_quality, self.max_quality
            )));
        }
        Ok(())
    }
}

/// Global processing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Number of worker threads (None = auto-detect)
    pub threads: Option<usize>,

    /// Extensions accepted in addition to the built-in list (without the dot)
    pub extra_extensions: Vec<String>,
}

impl ProcessingConfig {
    /// Effective worker count
    pub fn worker_threads(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// Progress line configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Draw the progress line at all
    pub enabled: bool,

    /// Number of ticks in the bar
    pub bar_width: usize,

    /// Minimum time between animation frames, in milliseconds
    pub frame_interval_ms: u64,

    /// Animation frames, cycled in order
    pub glyphs: String,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bar_width: 30,
            frame_interval_ms: 125,
            glyphs: "|/-\\".to_string(),
        }
    }
}

impl ProgressConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json_format: false,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| JpegFitError::config(
                format!("Failed to read config file {:?}: {}", path.as_ref(), e)
            ))?;

        match config_extension(path.as_ref()).as_str() {
            "toml" => toml::from_str(&content).map_err(Into::into),
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(Into::into),
            _ => Err(JpegFitError::config(
                "Unsupported config file format. Use .toml or .yaml"
            )),
        }
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = match config_extension(path.as_ref()).as_str() {
            "toml" => toml::to_string_pretty(self)
                .map_err(|e| JpegFitError::config(format!("TOML serialization failed: {e}")))?,
            "yaml" | "yml" => serde_yaml::to_string(self)
                .map_err(|e| JpegFitError::config(format!("YAML serialization failed: {e}")))?,
            _ => return Err(JpegFitError::config(
                "Unsupported config file format. Use .toml or .yaml"
            )),
        };

        std::fs::write(&path, content)
            .map_err(|e| JpegFitError::config(
                format!("Failed to write config file {:?}: {}", path.as_ref(), e)
            ))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.limits.validate()?;

        if self.processing.threads == Some(0) {
            return Err(JpegFitError::config("Thread count must be greater than 0"));
        }

        for ext in &self.processing.extra_extensions {
            if ext.is_empty() || ext.contains(['.', '/', '\\']) {
                return Err(JpegFitError::config(format!(
                    "Invalid extra extension {ext:?}: give the bare extension, e.g. \"jfif\""
                )));
            }
        }

        if self.progress.bar_width == 0 {
            return Err(JpegFitError::config("Progress bar width must be greater than 0"));
        }
        if self.progress.glyphs.is_empty() {
            return Err(JpegFitError::config("Progress animation needs at least one glyph"));
        }

        Ok(())
    }
}

fn config_extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase()
}
