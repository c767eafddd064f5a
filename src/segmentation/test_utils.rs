//! Test utilities: mock removal backends and a one-shot HTTP server
//!
//! The mocks implement `SegmentationBackend` so the pipeline can be tested
//! without a model server.

use super::SegmentationBackend;
use crate::{
    config::SegmentationOptions,
    error::{BgReplaceError, Result},
};
use async_trait::async_trait;
use image::{DynamicImage, Rgba};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Mock backend keying out one color
///
/// Pixels within `tolerance` of `key` become fully transparent, everything
/// else fully opaque.
#[derive(Debug, Clone)]
pub struct KeyColorBackend {
    key: [u8; 3],
    tolerance: u8,
    calls: Arc<Mutex<Vec<SegmentationOptions>>>,
}

impl KeyColorBackend {
    #[must_use]
    pub fn new(key: [u8; 3], tolerance: u8) -> Self {
        Self {
            key,
            tolerance,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Options received so far, in call order
    pub fn calls(&self) -> Vec<SegmentationOptions> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SegmentationBackend for KeyColorBackend {
    fn name(&self) -> &str {
        "mock-key-color"
    }

    async fn remove_background(
        &self,
        image_bytes: &[u8],
        options: &SegmentationOptions,
    ) -> Result<Vec<u8>> {
        self.calls.lock().unwrap().push(*options);

        let image = image::load_from_memory(image_bytes)
            .map_err(|e| BgReplaceError::segmentation(format!("mock cannot decode input: {}", e)))?;
        let mut rgba = image.to_rgba8();
        for pixel in rgba.pixels_mut() {
            let Rgba([r, g, b, _]) = *pixel;
            let near_key = [r, g, b]
                .iter()
                .zip(self.key)
                .all(|(channel, key)| channel.abs_diff(key) <= self.tolerance);
            *pixel = Rgba([r, g, b, if near_key { 0 } else { 255 }]);
        }

        Ok(encode_png(&DynamicImage::ImageRgba8(rgba)))
    }
}

/// Mock backend that always fails
#[derive(Debug, Default)]
pub struct FailingBackend;

#[async_trait]
impl SegmentationBackend for FailingBackend {
    fn name(&self) -> &str {
        "mock-failing"
    }

    async fn remove_background(
        &self,
        _image_bytes: &[u8],
        _options: &SegmentationOptions,
    ) -> Result<Vec<u8>> {
        Err(BgReplaceError::segmentation("mock model unreachable"))
    }
}

/// Mock backend returning bytes that are not an image
#[derive(Debug, Default)]
pub struct GarbageBackend;

#[async_trait]
impl SegmentationBackend for GarbageBackend {
    fn name(&self) -> &str {
        "mock-garbage"
    }

    async fn remove_background(
        &self,
        _image_bytes: &[u8],
        _options: &SegmentationOptions,
    ) -> Result<Vec<u8>> {
        Ok(b"not an image".to_vec())
    }
}

/// Encode an image as PNG bytes
pub fn encode_png(image: &DynamicImage) -> Vec<u8> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
        .unwrap();
    buffer
}

/// URL of a local port nothing listens on
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/api/remove", port)
}

/// Serve exactly one HTTP response, returning the base URL and the raw request
pub async fn serve_once(
    status: u16,
    content_type: &str,
    body: Vec<u8>,
) -> (String, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let content_type = content_type.to_string();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;

        let head = format!(
            "HTTP/1.1 {} Status\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            content_type,
            body.len()
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(&body).await.unwrap();
        socket.shutdown().await.ok();
        request
    });

    (url, handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Vec<u8> {
    let mut request = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        request.extend_from_slice(&chunk[..n]);

        let Some(header_end) = find(&request, b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&request[..header_end]).to_lowercase();
        let body_len = request.len() - header_end - 4;
        let content_length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok());

        match content_length {
            Some(len) if body_len >= len => break,
            Some(_) => continue,
            None if head.contains("transfer-encoding: chunked") => {
                if request.ends_with(b"0\r\n\r\n") {
                    break;
                }
            },
            None => break,
        }
    }
    request
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}
