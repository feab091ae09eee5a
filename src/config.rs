//! Daemon configuration.
//!
//! All tunables live in a single TOML file split into sections that
//! mirror the runtime components: capture, storage, LED, health and the
//! HTTP server. Every section has working defaults so an empty file is
//! a valid configuration.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which frame source the capture context should drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Deterministic synthetic test pattern (always available).
    Synthetic,
    /// Real camera device (requires the `camera` build feature).
    Camera,
}

/// Color selection strategy for the status LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorMode {
    /// Saturated colors with a constrained brightness sum.
    Vivid,
    /// Perceptually uniform pastels (fixed lightness and chroma, random hue).
    PastelHue,
}

/// Frame acquisition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Which frame source to use.
    pub source: SourceKind,
    /// Camera device index (only meaningful for `source = "camera"`).
    pub device_index: u32,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Requested frames per second from the device.
    pub fps: u32,
    /// JPEG quality (1-100) for the synthetic source.
    pub jpeg_quality: u8,
    /// Milliseconds between capture cycles.
    pub interval_ms: u64,
    /// Upper bound on a single staged frame, in bytes.
    pub max_frame_bytes: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Synthetic,
            device_index: 0,
            width: 800,
            height: 600,
            fps: 15,
            jpeg_quality: 75,
            interval_ms: 3000,
            max_frame_bytes: 4 * 1024 * 1024,
        }
    }
}

impl CaptureConfig {
    /// Returns the capture cadence as a `Duration`.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Validates the capture parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(ConfigError::InvalidJpegQuality);
        }
        if self.fps == 0 || self.fps > 120 {
            return Err(ConfigError::InvalidFrameRate);
        }
        if self.interval_ms < 100 {
            return Err(ConfigError::IntervalTooShort);
        }
        if self.max_frame_bytes < 1024 {
            return Err(ConfigError::FrameCapTooSmall);
        }
        Ok(())
    }
}

/// Image storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the backing store.
    pub root: PathBuf,
    /// Directory under the root that holds captured images.
    pub image_dir: String,
    /// Maximum number of images retained (history ring capacity).
    pub max_images: usize,
    /// Path prefix for stored images, relative to the store root.
    pub path_prefix: String,
    /// Filename suffix for stored images.
    pub path_suffix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data"),
            image_dir: "i".to_string(),
            max_images: 5,
            path_prefix: "i/img_".to_string(),
            path_suffix: ".jpg".to_string(),
        }
    }
}

impl StorageConfig {
    /// Returns the history ring capacity as a `NonZeroUsize`.
    ///
    /// A capacity of zero has no sensible ring semantics and is
    /// rejected here rather than at runtime.
    pub fn ring_capacity(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.max_images).ok_or(ConfigError::ZeroMaxImages)
    }

    /// Validates the storage parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ring_capacity()?;
        if self.image_dir.is_empty()
            || self.image_dir.contains('/')
            || self.image_dir == "."
            || self.image_dir == ".."
        {
            return Err(ConfigError::InvalidImageDir);
        }
        let expected = format!("{}/", self.image_dir);
        if !self.path_prefix.starts_with(&expected) {
            return Err(ConfigError::PrefixOutsideImageDir { expected });
        }
        if !self.path_suffix.starts_with('.') || self.path_suffix.len() < 2 {
            return Err(ConfigError::InvalidSuffix);
        }
        Ok(())
    }
}

/// Status LED configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedConfig {
    /// Peak brightness (0-255 scale applied to the chosen color).
    pub max_brightness: u8,
    /// Full breath period (dark to peak to dark) in milliseconds.
    pub breath_period_ms: u64,
    /// Duration of the one-shot capture pulse in milliseconds.
    pub pulse_ms: u64,
    /// Color selection strategy.
    pub color: ColorMode,
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            max_brightness: 10,
            breath_period_ms: 5000,
            pulse_ms: 3000,
            color: ColorMode::Vivid,
        }
    }
}

impl LedConfig {
    /// Validates the LED parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.breath_period_ms < 100 {
            return Err(ConfigError::BreathPeriodTooShort);
        }
        if self.breath_period_ms > 86_400_000 {
            return Err(ConfigError::BreathPeriodTooLong);
        }
        Ok(())
    }
}

/// Memory health configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Free-memory floor below which capture cycles are skipped.
    pub admission_floor_bytes: u64,
    /// Free-memory floor below which the process requests a restart.
    pub critical_floor_bytes: u64,
    /// Milliseconds between periodic health checks.
    pub check_interval_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            admission_floor_bytes: 50_000_000,
            critical_floor_bytes: 30_000_000,
            check_interval_ms: 30_000,
        }
    }
}

impl HealthConfig {
    /// Returns the health check cadence as a `Duration`.
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Validates the health parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.critical_floor_bytes >= self.admission_floor_bytes {
            return Err(ConfigError::FloorsInverted {
                critical: self.critical_floor_bytes,
                admission: self.admission_floor_bytes,
            });
        }
        Ok(())
    }
}

/// HTTP service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address and port for the HTTP listener.
    pub listen: SocketAddr,
    /// Refresh interval, in seconds, baked into the index page.
    pub page_refresh_seconds: u32,
    /// Upper bound on time a status read may wait for the writer.
    pub status_read_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: ([0, 0, 0, 0], 8080).into(),
            page_refresh_seconds: 5,
            status_read_timeout_ms: 50,
        }
    }
}

impl ServerConfig {
    /// Returns the status read bound as a `Duration`.
    pub fn status_read_timeout(&self) -> Duration {
        Duration::from_millis(self.status_read_timeout_ms)
    }

    /// Validates the server parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_refresh_seconds == 0 || self.page_refresh_seconds > 86_400 {
            return Err(ConfigError::InvalidPageRefresh);
        }
        if self.status_read_timeout_ms == 0 {
            return Err(ConfigError::InvalidStatusTimeout);
        }
        Ok(())
    }
}

/// Configuration validation and loading errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    #[error("jpeg quality must be 1-100")]
    InvalidJpegQuality,
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    #[error("capture interval must be at least 100 ms")]
    IntervalTooShort,
    #[error("max_frame_bytes must be at least 1024")]
    FrameCapTooSmall,
    #[error("max_images must be at least 1")]
    ZeroMaxImages,
    #[error("image_dir must be a single non-empty path segment")]
    InvalidImageDir,
    #[error("path_prefix must start with \"{expected}\"")]
    PrefixOutsideImageDir { expected: String },
    #[error("path_suffix must be an extension starting with '.'")]
    InvalidSuffix,
    #[error("breath period must be at least 100 ms")]
    BreathPeriodTooShort,
    #[error("breath period must be at most 86400000 ms")]
    BreathPeriodTooLong,
    #[error("critical floor ({critical} bytes) must be below admission floor ({admission} bytes)")]
    FloorsInverted { critical: u64, admission: u64 },
    #[error("page refresh must be 1-86400 seconds")]
    InvalidPageRefresh,
    #[error("status read timeout must be nonzero")]
    InvalidStatusTimeout,
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Frame acquisition settings.
    #[serde(default)]
    pub capture: CaptureConfig,
    /// Image storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Status LED settings.
    #[serde(default)]
    pub led: LedConfig,
    /// Memory floor settings.
    #[serde(default)]
    pub health: HealthConfig,
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
}

impl AppConfig {
    /// Loads and validates configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        let config: AppConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.capture.validate()?;
        self.storage.validate()?;
        self.led.validate()?;
        self.health.validate()?;
        self.server.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_parses_to_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.storage.max_images, 5);
        assert_eq!(config.capture.interval_ms, 3000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_dimensions_invalid() {
        let mut config = CaptureConfig::default();
        config.width = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDimensions)
        ));
    }

    #[test]
    fn test_zero_max_images_rejected() {
        let mut config = StorageConfig::default();
        config.max_images = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroMaxImages)
        ));
    }

    #[test]
    fn test_prefix_must_live_under_image_dir() {
        let mut config = StorageConfig::default();
        config.path_prefix = "elsewhere/img_".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PrefixOutsideImageDir { .. })
        ));
    }

    #[test]
    fn test_breath_period_out_of_bounds_rejected() {
        let mut config = LedConfig::default();
        config.breath_period_ms = 50;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BreathPeriodTooShort)
        ));

        config.breath_period_ms = 86_400_001;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BreathPeriodTooLong)
        ));

        config.breath_period_ms = 86_400_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inverted_floors_rejected() {
        let mut config = HealthConfig::default();
        config.critical_floor_bytes = config.admission_floor_bytes;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::FloorsInverted { .. })
        ));
    }

    #[test]
    fn test_source_kind_round_trip() {
        let parsed: AppConfig = toml::from_str("[capture]\nsource = \"camera\"\n").unwrap();
        assert_eq!(parsed.capture.source, SourceKind::Camera);
    }

    #[test]
    fn test_color_mode_kebab_case() {
        let parsed: AppConfig = toml::from_str("[led]\ncolor = \"pastel-hue\"\n").unwrap();
        assert_eq!(parsed.led.color, ColorMode::PastelHue);
    }

    #[test]
    fn test_ring_capacity_conversion() {
        let config = StorageConfig::default();
        assert_eq!(config.ring_capacity().unwrap().get(), 5);
    }
}
