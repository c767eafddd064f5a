#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # IMG.LY Background Replacement Library
//!
//! Replace the background of a photo with another image: the subject's
//! background is removed by an external segmentation collaborator (a rembg
//! server or command), the cut-out is alpha-composited onto the new
//! background, and the flattened RGB result is written to disk.
//!
//! ## Features
//!
//! - **Flexible inputs**: local files, in-memory uploads, or HTTP(S) URLs
//! - **Pluggable removal**: rembg-compatible HTTP servers or any external
//!   program, behind the [`SegmentationBackend`] trait
//! - **Deterministic compositing**: per-pixel alpha blending onto a
//!   background resized to the subject's dimensions
//! - **Session isolation**: every session works in its own directory
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imgly_bgreplace::{BackgroundReplacementProcessor, ImageSource, ReplaceConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ReplaceConfig::builder()
//!     .foreground_threshold(50)
//!     .build()?;
//! let processor = BackgroundReplacementProcessor::new(config)?;
//!
//! let result = processor
//!     .replace(
//!         &ImageSource::File("car.jpg".into()),
//!         &ImageSource::Url("https://example.com/beach.jpg".to_string()),
//!     )
//!     .await?;
//! processor.download(&result, "merged_image.jpg")?;
//! processor.cleanup()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Compositing only
//!
//! When a cut-out with alpha is already at hand, the compositor can be used
//! on its own:
//!
//! ```rust
//! use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
//! use imgly_bgreplace::{merge_cutout, ResizeFilter};
//!
//! let cutout = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255])));
//! let background = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([0, 0, 255])));
//!
//! let merged = merge_cutout(&cutout, &background, ResizeFilter::Nearest).unwrap();
//! assert_eq!(merged.dimensions(), (2, 2));
//! assert_eq!(merged.get_pixel(0, 0), &Rgb([255, 0, 0]));
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface, spinner and tracing subscriber setup
//! - `webp-support` (default): WebP input decoding

pub mod acquisition;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod error;
pub mod processor;
pub mod segmentation;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod workspace;

// Public API exports
pub use acquisition::{file_name_from_url, AcquiredImage, ImageFetcher, ImageSource, SourceMode};
pub use compositor::Compositor;
pub use config::{
    BackendConfig, OutputFormat, ReplaceConfig, ReplaceConfigBuilder, ResizeFilter,
    SegmentationOptions,
};
pub use error::{BgReplaceError, Result};
pub use processor::BackgroundReplacementProcessor;
pub use segmentation::{create_backend, CommandBackend, RembgHttpBackend, SegmentationBackend};
pub use services::ImageIOService;
pub use types::{CompositeRequest, MergedResult, ProcessingMetadata, ProcessingTimings};
pub use workspace::{sanitize_file_name, SessionWorkspace};

#[cfg(feature = "cli")]
pub use tracing_config::{events, spans, TracingConfig, TracingFormat};

/// Replace the background of `subject` with `background` in a fresh session
///
/// Convenience wrapper around [`BackgroundReplacementProcessor`]. The
/// session workspace is kept on disk because the returned result points
/// into it; remove it with [`SessionWorkspace::cleanup`] once done.
///
/// # Examples
/// ```rust,no_run
/// use imgly_bgreplace::{replace_background, ImageSource, ReplaceConfig};
///
/// # async fn example() -> anyhow::Result<()> {
/// let (result, workspace) = replace_background(
///     &ImageSource::File("portrait.png".into()),
///     &ImageSource::File("studio.jpg".into()),
///     ReplaceConfig::default(),
/// )
/// .await?;
/// println!("{}", result.summary());
/// workspace.cleanup()?;
/// # Ok(())
/// # }
/// ```
pub async fn replace_background(
    subject: &ImageSource,
    background: &ImageSource,
    config: ReplaceConfig,
) -> Result<(MergedResult, SessionWorkspace)> {
    let processor = BackgroundReplacementProcessor::new(config)?;
    match processor.replace(subject, background).await {
        Ok(result) => Ok((result, processor.into_workspace())),
        Err(e) => {
            if let Err(cleanup_error) = processor.cleanup() {
                log::warn!("Failed to remove session workspace: {}", cleanup_error);
            }
            Err(e)
        },
    }
}

/// Fit `background` to `cutout` and composite, without any I/O
pub fn merge_cutout(
    cutout: &image::DynamicImage,
    background: &image::DynamicImage,
    filter: ResizeFilter,
) -> Result<image::RgbImage> {
    let fitted = Compositor::fit_background(
        background,
        (cutout.width(), cutout.height()),
        filter.into(),
    )?;
    Compositor::composite(cutout, &fitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn test_merge_cutout_rejects_opaque_cutout() {
        let cutout = DynamicImage::ImageRgb8(RgbImage::new(2, 2));
        let background = DynamicImage::ImageRgb8(RgbImage::new(2, 2));
        assert!(matches!(
            merge_cutout(&cutout, &background, ResizeFilter::Triangle),
            Err(BgReplaceError::MissingAlphaChannel(_))
        ));
    }

    #[test]
    fn test_merge_cutout_transparent_shows_background() {
        let cutout = DynamicImage::new_rgba8(3, 2);
        let background = DynamicImage::ImageRgb8(RgbImage::from_pixel(5, 5, Rgb([0, 200, 0])));
        let merged = merge_cutout(&cutout, &background, ResizeFilter::Nearest).unwrap();
        assert_eq!(merged.dimensions(), (3, 2));
        assert!(merged.pixels().all(|p| p.0 == [0, 200, 0]));
    }

    #[tokio::test]
    async fn test_replace_background_missing_subject_cleans_up() {
        let base = TempDir::new().unwrap();
        let config = ReplaceConfig::builder().work_dir(base.path()).build().unwrap();

        let err = replace_background(
            &ImageSource::File(base.path().join("missing.jpg")),
            &ImageSource::File(base.path().join("also-missing.jpg")),
            config,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BgReplaceError::Io(_)));
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
    }
}
