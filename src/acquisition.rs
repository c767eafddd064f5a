//! Image acquisition: local files, uploaded bytes, or HTTP(S) URLs

use crate::error::{BgReplaceError, Result};
use crate::workspace::sanitize_file_name;
use image::DynamicImage;
use reqwest::{Client, Url};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, instrument};

/// Name used when a URL has no usable last path segment
pub const FALLBACK_FILE_NAME: &str = "image.jpg";

/// How an input argument should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMode {
    /// `http://` and `https://` arguments are URLs, the rest are paths
    #[default]
    Auto,
    /// Always a local file
    Local,
    /// Always a URL
    Url,
}

/// Where an input image comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Remote image fetched over HTTP(S)
    Url(String),
    /// Local file
    File(PathBuf),
    /// Uploaded bytes with their original file name
    Bytes {
        /// Original file name
        name: String,
        /// Raw encoded image
        data: Vec<u8>,
    },
}

impl ImageSource {
    /// Interpret a user-supplied argument
    ///
    /// ```rust
    /// use imgly_bgreplace::acquisition::{ImageSource, SourceMode};
    ///
    /// assert!(matches!(ImageSource::from_arg("https://example.com/a.jpg", SourceMode::Auto), ImageSource::Url(_)));
    /// assert!(matches!(ImageSource::from_arg("photos/a.jpg", SourceMode::Auto), ImageSource::File(_)));
    /// ```
    #[must_use]
    pub fn from_arg(arg: &str, mode: SourceMode) -> Self {
        match mode {
            SourceMode::Url => Self::Url(arg.to_string()),
            SourceMode::Local => Self::File(PathBuf::from(arg)),
            SourceMode::Auto => {
                let lower = arg.to_ascii_lowercase();
                if lower.starts_with("http://") || lower.starts_with("https://") {
                    Self::Url(arg.to_string())
                } else {
                    Self::File(PathBuf::from(arg))
                }
            },
        }
    }

    /// Whether the image is fetched from the network
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Url(_))
    }

    /// File name the image is stored under in the session's `original/` directory
    #[must_use]
    pub fn file_name(&self) -> String {
        match self {
            Self::Url(url) => file_name_from_url(url),
            Self::File(path) => path
                .file_name()
                .map(|name| sanitize_file_name(&name.to_string_lossy()))
                .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string()),
            Self::Bytes { name, .. } => sanitize_file_name(name),
        }
    }
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{}", url),
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Bytes { name, data } => write!(f, "{} ({} bytes)", name, data.len()),
        }
    }
}

/// An input image persisted to the session workspace
#[derive(Debug, Clone)]
pub struct AcquiredImage {
    /// Sanitized file name
    pub name: String,
    /// Location inside the session's `original/` directory
    pub path: PathBuf,
    /// Encoded bytes as persisted
    pub bytes: Vec<u8>,
    /// Decoded image
    pub image: DynamicImage,
}

/// File name for an image fetched from `url`
///
/// Takes the last non-empty path segment, drops a `:size` suffix such as
/// `photo.jpg:large`, and swaps any other extension for `.jpg` because
/// fetched images are stored re-encoded as JPEG.
#[must_use]
pub fn file_name_from_url(url: &str) -> String {
    let segment = Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last().map(str::to_string))
        })
        .unwrap_or_default();

    let without_suffix = match segment.rsplit_once(':') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => segment,
    };

    let name = sanitize_file_name(&without_suffix);
    if name.is_empty() || name == FALLBACK_FILE_NAME {
        return FALLBACK_FILE_NAME.to_string();
    }

    let path = std::path::Path::new(&name);
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg") => name,
        _ => path.with_extension("jpg").to_string_lossy().into_owned(),
    }
}

/// HTTP(S) image fetcher
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    client: Client,
}

impl ImageFetcher {
    /// Create a fetcher with the given request timeout
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BgReplaceError::internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Fetch the bytes of an image
    ///
    /// # Errors
    /// - `Fetch` for malformed or non-http(s) URLs, transport failures,
    ///   timeouts, non-success status codes, and content that is not an image
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let parsed = Url::parse(url)
            .map_err(|e| BgReplaceError::fetch(format!("Invalid URL '{}': {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BgReplaceError::fetch(format!(
                "Unsupported URL scheme '{}' in '{}'",
                parsed.scheme(),
                url
            )));
        }

        let response = self.client.get(parsed).send().await.map_err(|e| {
            if e.is_timeout() {
                BgReplaceError::fetch(format!("GET '{}' timed out", url))
            } else {
                BgReplaceError::fetch(format!("GET '{}' failed: {}", url, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BgReplaceError::fetch_status_error(
                url,
                status.as_u16(),
                status.canonical_reason(),
            ));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_ascii_lowercase);
        if let Some(content_type) = &content_type {
            if !is_image_content_type(content_type) {
                return Err(BgReplaceError::fetch(format!(
                    "'{}' returned non-image content ({})",
                    url, content_type
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BgReplaceError::fetch(format!("Reading body of '{}' failed: {}", url, e)))?;

        if image::guess_format(&bytes).is_err() {
            return Err(BgReplaceError::fetch(format!(
                "'{}' did not return a recognizable image",
                url
            )));
        }

        debug!(bytes = bytes.len(), content_type = ?content_type, "Fetched image");
        Ok(bytes.to_vec())
    }
}

fn is_image_content_type(content_type: &str) -> bool {
    content_type.starts_with("image/")
        || content_type.starts_with("application/octet-stream")
        || content_type.starts_with("binary/octet-stream")
}
