//! Core types for background replacement operations

use crate::config::OutputFormat;
use crate::error::Result;
use chrono::{DateTime, Utc};
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Inputs of one compositing step
///
/// Transient: built for a single generate action and dropped afterwards.
#[derive(Debug, Clone)]
pub struct CompositeRequest {
    /// Subject after background removal (expected to carry alpha)
    pub subject: DynamicImage,

    /// Replacement background, any size
    pub background: DynamicImage,
}

impl CompositeRequest {
    /// Create a new composite request
    #[must_use]
    pub fn new(subject: DynamicImage, background: DynamicImage) -> Self {
        Self {
            subject,
            background,
        }
    }
}

/// Per-stage timing breakdown of one generate action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Background removal by the external collaborator
    pub segmentation_ms: u64,

    /// Decoding the cut-out and background images
    pub decode_ms: u64,

    /// Background fitting and alpha compositing
    pub composite_ms: u64,

    /// Encoding and writing the merged image
    pub encode_ms: u64,

    /// Total end-to-end time
    pub total_ms: u64,
}

impl ProcessingTimings {
    /// Share of the total spent waiting on the removal collaborator
    #[must_use]
    pub fn segmentation_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.segmentation_ms as f64 / self.total_ms as f64
        }
    }
}

/// Metadata recorded alongside a merged result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    /// Session that produced the result
    pub session_id: String,

    /// Removal backend that produced the cut-out
    pub backend: String,

    /// Foreground threshold used for alpha matting
    pub foreground_threshold: u8,

    /// Encoded output format
    pub output_format: OutputFormat,

    /// Timing breakdown
    pub timings: ProcessingTimings,

    /// When the result was produced
    pub created_at: DateTime<Utc>,
}

/// Flattened RGB result of a generate action
#[derive(Debug, Clone)]
pub struct MergedResult {
    /// Merged opaque image, same dimensions as the subject
    pub image: RgbImage,

    /// Where the encoded result was written
    pub output_path: PathBuf,

    /// Processing metadata
    pub metadata: ProcessingMetadata,
}

impl MergedResult {
    /// Image dimensions
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Suggested file name for the download action
    #[must_use]
    pub fn download_file_name(&self) -> String {
        format!("merged_image.{}", self.metadata.output_format.extension())
    }

    /// Encode the merged image in the given format
    pub fn to_bytes(&self, format: OutputFormat, jpeg_quality: u8) -> Result<Vec<u8>> {
        crate::services::ImageIOService::encode(
            &DynamicImage::ImageRgb8(self.image.clone()),
            format,
            jpeg_quality,
        )
    }

    /// Human-readable one-line summary
    #[must_use]
    pub fn summary(&self) -> String {
        let (width, height) = self.dimensions();
        format!(
            "{}x{} {} via {} (threshold {}) in {:.2}s",
            width,
            height,
            self.metadata.output_format.extension(),
            self.metadata.backend,
            self.metadata.foreground_threshold,
            self.metadata.timings.total_ms as f64 / 1000.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb};

    fn sample_result(format: OutputFormat) -> MergedResult {
        MergedResult {
            image: RgbImage::from_pixel(4, 3, Rgb([10, 20, 30])),
            output_path: PathBuf::from("/tmp/session/masked/merged.jpg"),
            metadata: ProcessingMetadata {
                session_id: "abc".to_string(),
                backend: "mock".to_string(),
                foreground_threshold: 50,
                output_format: format,
                timings: ProcessingTimings {
                    segmentation_ms: 750,
                    decode_ms: 50,
                    composite_ms: 100,
                    encode_ms: 100,
                    total_ms: 1000,
                },
                created_at: Utc::now(),
            },
        }
    }

    #[test]
    fn test_segmentation_ratio() {
        let result = sample_result(OutputFormat::Jpeg);
        assert!((result.metadata.timings.segmentation_ratio() - 0.75).abs() < f64::EPSILON);
        assert_eq!(ProcessingTimings::default().segmentation_ratio(), 0.0);
    }

    #[test]
    fn test_download_file_name() {
        assert_eq!(sample_result(OutputFormat::Jpeg).download_file_name(), "merged_image.jpg");
        assert_eq!(sample_result(OutputFormat::Png).download_file_name(), "merged_image.png");
    }

    #[test]
    fn test_to_bytes_decodes_back() {
        let result = sample_result(OutputFormat::Png);
        let bytes = result.to_bytes(OutputFormat::Png, 90).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.to_rgb8().get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_summary_mentions_backend_and_size() {
        let summary = sample_result(OutputFormat::Jpeg).summary();
        assert!(summary.contains("4x3"));
        assert!(summary.contains("mock"));
        assert!(summary.contains("1.00s"));
    }
}
