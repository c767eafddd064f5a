//! Alpha compositing of a cut-out subject onto a replacement background
//!
//! Everything in this module is pure: images go in, a new image comes out.
//! Writing the result anywhere is the processor's job.

use crate::{
    error::{BgReplaceError, Result},
    types::CompositeRequest,
};
use image::{imageops::FilterType, DynamicImage, GenericImageView, Rgb, RgbImage, Rgba};
use tracing::{debug, instrument};

/// Stateless compositor
pub struct Compositor;

impl Compositor {
    /// Resize the background to exactly `dimensions`
    ///
    /// Aspect ratio is not preserved. A background that already has the target
    /// size is returned unchanged.
    ///
    /// # Errors
    /// - `ImageShape` when the target or the background has a zero dimension
    pub fn fit_background(
        background: &DynamicImage,
        dimensions: (u32, u32),
        filter: FilterType,
    ) -> Result<DynamicImage> {
        let (target_width, target_height) = dimensions;
        if target_width == 0 || target_height == 0 {
            return Err(BgReplaceError::image_shape(format!(
                "cannot resize background to {}x{}",
                target_width, target_height
            )));
        }

        let (width, height) = background.dimensions();
        if width == 0 || height == 0 {
            return Err(BgReplaceError::image_shape(format!(
                "background image is {}x{}",
                width, height
            )));
        }

        if (width, height) == dimensions {
            return Ok(background.clone());
        }

        debug!(
            from_width = width,
            from_height = height,
            to_width = target_width,
            to_height = target_height,
            ?filter,
            "Fitting background to subject"
        );
        Ok(background.resize_exact(target_width, target_height, filter))
    }

    /// Composite `foreground` over `background` at origin (0,0)
    ///
    /// Pixels with zero alpha take the background color. All others are
    /// blended as `fg * a/255 + bg * (1 - a/255)`. The result is opaque RGB.
    ///
    /// # Errors
    /// - `MissingAlphaChannel` when the foreground has no alpha channel
    /// - `ImageShape` when either image is zero-sized or the sizes differ
    pub fn composite(foreground: &DynamicImage, background: &DynamicImage) -> Result<RgbImage> {
        if !foreground.color().has_alpha() {
            return Err(BgReplaceError::missing_alpha_channel(format!(
                "foreground color type is {:?}",
                foreground.color()
            )));
        }

        let (width, height) = foreground.dimensions();
        if width == 0 || height == 0 {
            return Err(BgReplaceError::image_shape(format!(
                "foreground image is {}x{}",
                width, height
            )));
        }

        let background_dimensions = background.dimensions();
        if background_dimensions != (width, height) {
            return Err(BgReplaceError::image_shape(format!(
                "background is {}x{} but foreground is {}x{}",
                background_dimensions.0, background_dimensions.1, width, height
            )));
        }

        let fg = foreground.to_rgba8();
        let bg = background.to_rgb8();
        let mut merged = RgbImage::new(width, height);

        for ((out, fg_pixel), bg_pixel) in merged.pixels_mut().zip(fg.pixels()).zip(bg.pixels()) {
            *out = blend_pixel(*fg_pixel, *bg_pixel);
        }

        Ok(merged)
    }

    /// Fit the request's background to its subject, then composite
    #[instrument(skip_all, fields(width = request.subject.width(), height = request.subject.height()))]
    pub fn composite_request(request: &CompositeRequest, filter: FilterType) -> Result<RgbImage> {
        let background =
            Self::fit_background(&request.background, request.subject.dimensions(), filter)?;
        Self::composite(&request.subject, &background)
    }
}

/// Blend one foreground pixel over one background pixel
#[must_use]
pub fn blend_pixel(foreground: Rgba<u8>, background: Rgb<u8>) -> Rgb<u8> {
    let [fr, fg, fb, alpha] = foreground.0;
    match alpha {
        0 => background,
        255 => Rgb([fr, fg, fb]),
        _ => {
            let a = f32::from(alpha) / 255.0;
            let inv_a = 1.0 - a;
            let [br, bg, bb] = background.0;
            Rgb([
                blend_channel(fr, br, a, inv_a),
                blend_channel(fg, bg, a, inv_a),
                blend_channel(fb, bb, a, inv_a),
            ])
        },
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn blend_channel(fg: u8, bg: u8, a: f32, inv_a: f32) -> u8 {
    // Inputs are u8 and weights sum to 1, so the clamp only guards rounding
    (f32::from(fg) * a + f32::from(bg) * inv_a)
        .round()
        .clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, RgbaImage};

    fn solid_rgba(width: u32, height: u32, color: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(ImageBuffer::from_pixel(width, height, Rgba(color)))
    }

    fn solid_rgb(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb(color)))
    }

    #[test]
    fn test_blend_pixel_extremes() {
        let bg = Rgb([10, 20, 30]);
        assert_eq!(blend_pixel(Rgba([200, 100, 50, 255]), bg), Rgb([200, 100, 50]));
        assert_eq!(blend_pixel(Rgba([200, 100, 50, 0]), bg), bg);
    }

    #[test]
    fn test_blend_pixel_midpoint() {
        let out = blend_pixel(Rgba([255, 0, 200, 128]), Rgb([0, 255, 100]));
        let expected = [127.5_f32, 127.5, 150.0];
        for (channel, want) in out.0.iter().zip(expected) {
            assert!((f32::from(*channel) - want).abs() <= 1.0, "{} vs {}", channel, want);
        }
    }

    #[test]
    fn test_opaque_red_over_blue_is_red() {
        let fg = solid_rgba(2, 2, [255, 0, 0, 255]);
        let bg = solid_rgb(2, 2, [0, 0, 255]);
        let merged = Compositor::composite(&fg, &bg).unwrap();
        assert_eq!(merged.dimensions(), (2, 2));
        assert!(merged.pixels().all(|p| *p == Rgb([255, 0, 0])));
    }

    #[test]
    fn test_transparent_over_green_is_green() {
        let fg = solid_rgba(2, 2, [255, 0, 0, 0]);
        let bg = solid_rgb(2, 2, [0, 255, 0]);
        let merged = Compositor::composite(&fg, &bg).unwrap();
        assert!(merged.pixels().all(|p| *p == Rgb([0, 255, 0])));
    }

    #[test]
    fn test_per_pixel_alpha_mask() {
        let mut fg = RgbaImage::from_pixel(2, 1, Rgba([255, 255, 255, 255]));
        fg.put_pixel(1, 0, Rgba([255, 255, 255, 0]));
        let bg = solid_rgb(2, 1, [0, 0, 0]);

        let merged = Compositor::composite(&DynamicImage::ImageRgba8(fg), &bg).unwrap();
        assert_eq!(*merged.get_pixel(0, 0), Rgb([255, 255, 255]));
        assert_eq!(*merged.get_pixel(1, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_missing_alpha_channel() {
        let fg = solid_rgb(2, 2, [255, 0, 0]);
        let bg = solid_rgb(2, 2, [0, 0, 255]);
        let err = Compositor::composite(&fg, &bg).unwrap_err();
        assert!(matches!(err, BgReplaceError::MissingAlphaChannel(_)));
    }

    #[test]
    fn test_luma_alpha_foreground_is_accepted() {
        let fg = DynamicImage::ImageLumaA8(ImageBuffer::from_pixel(
            3,
            3,
            image::LumaA([200, 255]),
        ));
        let bg = solid_rgb(3, 3, [0, 0, 0]);
        let merged = Compositor::composite(&fg, &bg).unwrap();
        assert!(merged.pixels().all(|p| *p == Rgb([200, 200, 200])));
    }

    #[test]
    fn test_dimension_mismatch_is_shape_error() {
        let fg = solid_rgba(4, 4, [0, 0, 0, 255]);
        let bg = solid_rgb(2, 2, [0, 0, 0]);
        assert!(matches!(
            Compositor::composite(&fg, &bg),
            Err(BgReplaceError::ImageShape(_))
        ));
    }

    #[test]
    fn test_zero_sized_images_are_shape_errors() {
        let empty = solid_rgba(0, 0, [0, 0, 0, 0]);
        let bg = solid_rgb(2, 2, [0, 0, 0]);
        assert!(matches!(
            Compositor::composite(&empty, &bg),
            Err(BgReplaceError::ImageShape(_))
        ));
        assert!(matches!(
            Compositor::fit_background(&bg, (0, 5), FilterType::Triangle),
            Err(BgReplaceError::ImageShape(_))
        ));
        assert!(matches!(
            Compositor::fit_background(&solid_rgb(0, 3, [0, 0, 0]), (4, 4), FilterType::Triangle),
            Err(BgReplaceError::ImageShape(_))
        ));
    }

    #[test]
    fn test_fit_background_ignores_aspect_ratio() {
        let bg = solid_rgb(100, 10, [1, 2, 3]);
        let fitted = Compositor::fit_background(&bg, (7, 33), FilterType::Nearest).unwrap();
        assert_eq!(fitted.dimensions(), (7, 33));
    }

    #[test]
    fn test_composite_request_resizes_background() {
        let request = CompositeRequest::new(
            solid_rgba(5, 3, [9, 9, 9, 0]),
            solid_rgb(40, 40, [0, 200, 0]),
        );
        let merged = Compositor::composite_request(&request, FilterType::Triangle).unwrap();
        assert_eq!(merged.dimensions(), (5, 3));
        assert!(merged.pixels().all(|p| *p == Rgb([0, 200, 0])));
    }

    #[test]
    fn test_composite_is_deterministic() {
        let fg = DynamicImage::ImageRgba8(RgbaImage::from_fn(16, 16, |x, y| {
            Rgba([(x * 16) as u8, (y * 16) as u8, 77, ((x + y) * 8) as u8])
        }));
        let bg = DynamicImage::ImageRgb8(RgbImage::from_fn(16, 16, |x, y| {
            Rgb([(y * 15) as u8, 3, (x * 15) as u8])
        }));
        let first = Compositor::composite(&fg, &bg).unwrap();
        let second = Compositor::composite(&fg, &bg).unwrap();
        assert_eq!(first.as_raw(), second.as_raw());
    }
}
