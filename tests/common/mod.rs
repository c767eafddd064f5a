//! Shared helpers for integration tests: mock removal backends, image
//! builders and a one-shot HTTP server.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba};
use imgly_bgreplace::{
    error::{BgReplaceError, Result},
    SegmentationBackend, SegmentationOptions,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub(crate) const GREEN: [u8; 3] = [0, 255, 0];
pub(crate) const RED: [u8; 3] = [255, 0, 0];
pub(crate) const BLUE: [u8; 3] = [0, 0, 255];

/// Keys out pixels close to a color, like a green screen
#[derive(Debug, Clone)]
pub(crate) struct GreenScreenBackend {
    key: [u8; 3],
    calls: Arc<AtomicUsize>,
}

impl GreenScreenBackend {
    pub(crate) fn new() -> Self {
        Self {
            key: GREEN,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SegmentationBackend for GreenScreenBackend {
    fn name(&self) -> &str {
        "green-screen"
    }

    async fn remove_background(
        &self,
        image_bytes: &[u8],
        _options: &SegmentationOptions,
    ) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let image = image::load_from_memory(image_bytes)
            .map_err(|e| BgReplaceError::segmentation(e.to_string()))?;
        let mut rgba = image.to_rgba8();
        for pixel in rgba.pixels_mut() {
            let Rgba([r, g, b, _]) = *pixel;
            let keyed = [r, g, b]
                .iter()
                .zip(self.key)
                .all(|(channel, key)| channel.abs_diff(key) <= 8);
            *pixel = Rgba([r, g, b, if keyed { 0 } else { 255 }]);
        }
        Ok(encode(&DynamicImage::ImageRgba8(rgba), ImageFormat::Png))
    }
}

/// Always fails, like an unreachable model server
#[derive(Debug, Default)]
pub(crate) struct UnreachableBackend;

#[async_trait]
impl SegmentationBackend for UnreachableBackend {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn remove_background(
        &self,
        _image_bytes: &[u8],
        _options: &SegmentationOptions,
    ) -> Result<Vec<u8>> {
        Err(BgReplaceError::segmentation("connection refused"))
    }
}

pub(crate) fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut buffer), format)
        .unwrap();
    buffer
}

pub(crate) fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
}

/// Subject with a green-screen left half and a red right half
pub(crate) fn green_screen_subject(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgb(GREEN)
        } else {
            Rgb(RED)
        }
    }))
}

/// Serve exactly one HTTP response on a random local port
pub(crate) async fn serve_once(
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut chunk = [0_u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..n]);
        }

        let head = format!(
            "HTTP/1.1 {} Status\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            content_type,
            body.len()
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(&body).await.unwrap();
        socket.shutdown().await.ok();
    });

    (url, handle)
}
