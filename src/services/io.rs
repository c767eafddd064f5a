//! Image I/O operations service
//!
//! Keeps decoding, encoding and file writes out of the pipeline logic.

use crate::{
    config::OutputFormat,
    error::{BgReplaceError, Result},
};
use image::DynamicImage;
use std::path::Path;

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// Tries extension-based detection first, then falls back to sniffing
    /// the file content (uploaded files are often misnamed).
    ///
    /// ```rust,no_run
    /// use imgly_bgreplace::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("subject.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(BgReplaceError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );

                let data = std::fs::read(path_ref).map_err(|io_err| {
                    BgReplaceError::file_io_error("read image data", path_ref, &io_err)
                })?;

                image::load_from_memory(&data).map_err(|content_err| {
                    BgReplaceError::Image(content_err)
                })
            },
        }
    }

    /// Decode an image from bytes
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes).map_err(BgReplaceError::Image)
    }

    /// Encode an image in the given output format
    ///
    /// JPEG output drops any alpha channel.
    pub fn encode(image: &DynamicImage, format: OutputFormat, jpeg_quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);

        match format {
            OutputFormat::Png => {
                image.write_to(&mut cursor, image::ImageFormat::Png)?;
            },
            OutputFormat::Jpeg => {
                let rgb_image = image.to_rgb8();
                let mut jpeg_encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                    &mut cursor,
                    jpeg_quality.clamp(1, 100),
                );
                jpeg_encoder.encode_image(&rgb_image)?;
            },
        }

        Ok(buffer)
    }

    /// Encode and write an image, creating parent directories as needed
    pub fn save_image<P: AsRef<Path>>(
        image: &DynamicImage,
        path: P,
        format: OutputFormat,
        jpeg_quality: u8,
    ) -> Result<u64> {
        let bytes = Self::encode(image, format, jpeg_quality)?;
        Self::write_bytes(path, &bytes)?;
        Ok(bytes.len() as u64)
    }

    /// Write raw bytes, creating parent directories as needed
    pub fn write_bytes<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                BgReplaceError::file_io_error("create output directory", parent, &e)
            })?;
        }

        std::fs::write(path_ref, bytes)
            .map_err(|e| BgReplaceError::file_io_error("write file", path_ref, &e))
    }

    /// Guess a file extension from image magic bytes
    #[must_use]
    pub fn guess_extension(bytes: &[u8]) -> Option<&'static str> {
        match image::guess_format(bytes).ok()? {
            image::ImageFormat::Png => Some("png"),
            image::ImageFormat::Jpeg => Some("jpg"),
            image::ImageFormat::WebP => Some("webp"),
            image::ImageFormat::Tiff => Some("tiff"),
            image::ImageFormat::Bmp => Some("bmp"),
            image::ImageFormat::Gif => Some("gif"),
            _ => None,
        }
    }
}
