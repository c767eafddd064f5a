//! Error types for background replacement operations

use thiserror::Error;

/// Result type alias for background replacement operations
pub type Result<T> = std::result::Result<T, BgReplaceError>;

/// Error taxonomy for a single generate attempt
///
/// Every variant is terminal for the attempt that produced it.
#[derive(Error, Debug)]
pub enum BgReplaceError {
    /// Image URL could not be fetched (network, status, non-image content, timeout)
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// The background removal collaborator failed
    #[error("Segmentation error: {0}")]
    Segmentation(String),

    /// Image dimensions cannot be made to match (zero-sized or mismatched)
    #[error("Image shape error: {0}")]
    ImageShape(String),

    /// Foreground image carries no alpha channel
    #[error("Missing alpha channel: {0}")]
    MissingAlphaChannel(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgReplaceError {
    /// Create a new fetch error
    pub fn fetch<S: Into<String>>(msg: S) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create a new segmentation error
    pub fn segmentation<S: Into<String>>(msg: S) -> Self {
        Self::Segmentation(msg.into())
    }

    /// Create a new image shape error
    pub fn image_shape<S: Into<String>>(msg: S) -> Self {
        Self::ImageShape(msg.into())
    }

    /// Create a new missing alpha channel error
    pub fn missing_alpha_channel<S: Into<String>>(msg: S) -> Self {
        Self::MissingAlphaChannel(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    // Contextual error creators

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create fetch error for a non-success HTTP status
    pub fn fetch_status_error(url: &str, status: u16, reason: Option<&str>) -> Self {
        Self::Fetch(format!(
            "GET '{}' returned HTTP {} {}",
            url,
            status,
            reason.unwrap_or("")
        ))
    }

    /// Create segmentation error naming the backend that failed
    pub fn segmentation_with_backend(backend: &str, operation: &str, error: &str) -> Self {
        Self::Segmentation(format!(
            "{} failed using '{}' backend: {}",
            operation, backend, error
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = BgReplaceError::fetch("connection refused");
        assert!(matches!(err, BgReplaceError::Fetch(_)));

        let err = BgReplaceError::segmentation("model unreachable");
        assert!(matches!(err, BgReplaceError::Segmentation(_)));

        let err = BgReplaceError::image_shape("0x0");
        assert!(matches!(err, BgReplaceError::ImageShape(_)));

        let err = BgReplaceError::missing_alpha_channel("rgb8");
        assert!(matches!(err, BgReplaceError::MissingAlphaChannel(_)));
    }

    #[test]
    fn test_error_display() {
        let err = BgReplaceError::invalid_config("bad endpoint");
        assert_eq!(err.to_string(), "Invalid configuration: bad endpoint");

        let err = BgReplaceError::image_shape("foreground is 0x4");
        assert_eq!(err.to_string(), "Image shape error: foreground is 0x4");
    }

    #[test]
    fn test_contextual_errors() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = BgReplaceError::file_io_error("write merged image", Path::new("/out/merged.jpg"), &io_error);
        let error_string = err.to_string();
        assert!(error_string.contains("write merged image"));
        assert!(error_string.contains("/out/merged.jpg"));
        if let BgReplaceError::Io(inner) = err {
            assert_eq!(inner.kind(), std::io::ErrorKind::PermissionDenied);
        } else {
            panic!("expected Io variant");
        }

        let err = BgReplaceError::fetch_status_error("https://example.com/a.jpg", 404, Some("Not Found"));
        let error_string = err.to_string();
        assert!(error_string.contains("404"));
        assert!(error_string.contains("https://example.com/a.jpg"));

        let err = BgReplaceError::segmentation_with_backend("rembg-http", "Background removal", "timed out");
        let error_string = err.to_string();
        assert!(error_string.contains("rembg-http"));
        assert!(error_string.contains("timed out"));

        let err = BgReplaceError::config_value_error("JPEG quality", 150, "1-100", Some(90));
        let error_string = err.to_string();
        assert!(error_string.contains("JPEG quality"));
        assert!(error_string.contains("150"));
        assert!(error_string.contains("Recommended: 90"));
    }
}
