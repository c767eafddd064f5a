//! Configuration types for background replacement operations

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BgReplaceError, Result};

/// Default foreground threshold for alpha matting
pub const DEFAULT_FOREGROUND_THRESHOLD: u8 = 50;

/// Step of the interactive threshold control
pub const THRESHOLD_STEP: u8 = 5;

/// Default rembg server endpoint
pub const DEFAULT_REMBG_ENDPOINT: &str = "http://127.0.0.1:7000/api/remove";

/// Default request timeout of the HTTP backend, in seconds
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 120;

/// Options passed to the background removal collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationOptions {
    /// Refine mask edges with alpha matting
    pub alpha_matting: bool,
    /// Pixels with mask confidence above this are treated as sure foreground
    pub foreground_threshold: u8,
    /// Pixels with mask confidence below this are treated as sure background
    pub background_threshold: u8,
    /// Erosion applied to the trimap before matting
    pub erode_size: u32,
}

impl Default for SegmentationOptions {
    fn default() -> Self {
        Self {
            alpha_matting: true,
            foreground_threshold: DEFAULT_FOREGROUND_THRESHOLD,
            background_threshold: 10,
            erode_size: 10,
        }
    }
}

impl SegmentationOptions {
    /// Whether the foreground threshold sits on the threshold control step grid
    #[must_use]
    pub fn threshold_on_step(&self) -> bool {
        self.foreground_threshold % THRESHOLD_STEP == 0
    }
}

/// Which external collaborator removes the subject's background
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BackendConfig {
    /// rembg-compatible HTTP server
    RembgHttp {
        /// Full URL of the removal endpoint
        #[serde(default = "default_endpoint")]
        endpoint: String,
        /// Request timeout in seconds
        #[serde(default = "default_backend_timeout")]
        timeout_secs: u64,
    },
    /// External program invoked once per image
    Command {
        /// Program to run
        program: String,
        /// Arguments; see `CommandBackend` for the supported placeholders
        #[serde(default)]
        args: Vec<String>,
    },
}

fn default_endpoint() -> String {
    DEFAULT_REMBG_ENDPOINT.to_string()
}

fn default_backend_timeout() -> u64 {
    DEFAULT_BACKEND_TIMEOUT_SECS
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::RembgHttp {
            endpoint: default_endpoint(),
            timeout_secs: DEFAULT_BACKEND_TIMEOUT_SECS,
        }
    }
}

impl BackendConfig {
    /// Command backend running the `rembg` CLI
    #[must_use]
    pub fn rembg_cli() -> Self {
        Self::Command {
            program: "rembg".to_string(),
            args: ["i", "{matting}", "{input}", "{output}"]
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    /// Short backend name used in logs and errors
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::RembgHttp { .. } => "rembg-http",
            Self::Command { .. } => "command",
        }
    }
}

/// Output image format for the merged result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JPEG, the default download format
    #[default]
    Jpeg,
    /// Lossless PNG
    Png,
}

impl OutputFormat {
    /// File extension without the dot
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    /// MIME type offered for download
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

/// Resampling filter used when fitting the background to the subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeFilter {
    Nearest,
    #[default]
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Configuration for background replacement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaceConfig {
    /// Options forwarded to the removal collaborator
    pub segmentation: SegmentationOptions,

    /// Removal collaborator selection
    pub backend: BackendConfig,

    /// Merged result format
    pub output_format: OutputFormat,

    /// JPEG quality (1-100, only used for JPEG output)
    pub jpeg_quality: u8,

    /// Filter used to fit the background to the subject
    pub resize_filter: ResizeFilter,

    /// Timeout for fetching image URLs, in seconds
    pub fetch_timeout_secs: u64,

    /// Base directory for session workspaces (None = user cache dir)
    pub work_dir: Option<PathBuf>,
}

impl Default for ReplaceConfig {
    fn default() -> Self {
        Self {
            segmentation: SegmentationOptions::default(),
            backend: BackendConfig::default(),
            output_format: OutputFormat::default(),
            jpeg_quality: 90,
            resize_filter: ResizeFilter::default(),
            fetch_timeout_secs: 30,
            work_dir: None,
        }
    }
}

impl ReplaceConfig {
    /// Create a new configuration builder
    ///
    /// ```rust
    /// use imgly_bgreplace::{ReplaceConfig, OutputFormat};
    ///
    /// let config = ReplaceConfig::builder()
    ///     .foreground_threshold(120)
    ///     .output_format(OutputFormat::Png)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.segmentation.foreground_threshold, 120);
    /// ```
    #[must_use]
    pub fn builder() -> ReplaceConfigBuilder {
        ReplaceConfigBuilder::default()
    }

    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| BgReplaceError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            BgReplaceError::invalid_config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - JPEG quality outside 1-100
    /// - Zero fetch or backend timeout
    /// - Backend endpoint that is not an http(s) URL
    /// - Empty command program
    pub fn validate(&self) -> Result<()> {
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(BgReplaceError::config_value_error(
                "JPEG quality",
                self.jpeg_quality,
                "1-100",
                Some(90),
            ));
        }

        if self.fetch_timeout_secs == 0 {
            return Err(BgReplaceError::config_value_error(
                "fetch timeout",
                self.fetch_timeout_secs,
                "1 or more seconds",
                Some(30),
            ));
        }

        match &self.backend {
            BackendConfig::RembgHttp {
                endpoint,
                timeout_secs,
            } => {
                if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                    return Err(BgReplaceError::invalid_config(format!(
                        "Backend endpoint must be an http(s) URL, got '{}'",
                        endpoint
                    )));
                }
                if *timeout_secs == 0 {
                    return Err(BgReplaceError::config_value_error(
                        "backend timeout",
                        *timeout_secs,
                        "1 or more seconds",
                        Some(DEFAULT_BACKEND_TIMEOUT_SECS),
                    ));
                }
            },
            BackendConfig::Command { program, .. } => {
                if program.trim().is_empty() {
                    return Err(BgReplaceError::invalid_config(
                        "Command backend requires a program",
                    ));
                }
            },
        }

        Ok(())
    }
}

/// Builder for `ReplaceConfig`
#[derive(Debug, Default)]
pub struct ReplaceConfigBuilder {
    config: ReplaceConfig,
}

impl ReplaceConfigBuilder {
    /// Start from an existing configuration (e.g. one loaded from JSON)
    #[must_use]
    pub fn from_config(config: ReplaceConfig) -> Self {
        Self { config }
    }

    /// Enable or disable alpha matting
    #[must_use]
    pub fn alpha_matting(mut self, enabled: bool) -> Self {
        self.config.segmentation.alpha_matting = enabled;
        self
    }

    /// Set the alpha matting foreground threshold
    #[must_use]
    pub fn foreground_threshold(mut self, threshold: u8) -> Self {
        self.config.segmentation.foreground_threshold = threshold;
        self
    }

    /// Set the alpha matting background threshold
    #[must_use]
    pub fn background_threshold(mut self, threshold: u8) -> Self {
        self.config.segmentation.background_threshold = threshold;
        self
    }

    /// Set the alpha matting erode size
    #[must_use]
    pub fn erode_size(mut self, size: u32) -> Self {
        self.config.segmentation.erode_size = size;
        self
    }

    /// Set the removal backend
    #[must_use]
    pub fn backend(mut self, backend: BackendConfig) -> Self {
        self.config.backend = backend;
        self
    }

    /// Set output format
    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    /// Set JPEG quality, clamped to 1-100
    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Set the background resize filter
    #[must_use]
    pub fn resize_filter(mut self, filter: ResizeFilter) -> Self {
        self.config.resize_filter = filter;
        self
    }

    /// Set the URL fetch timeout in seconds
    #[must_use]
    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    /// Set the base directory for session workspaces
    #[must_use]
    pub fn work_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<ReplaceConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}
