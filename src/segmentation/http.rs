//! rembg-compatible HTTP backend

use super::SegmentationBackend;
use crate::{
    config::SegmentationOptions,
    error::{BgReplaceError, Result},
};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

/// Backend posting images to a rembg server's `/api/remove` endpoint
///
/// The image goes in the multipart field `file`; matting options travel as
/// the form fields `a`, `af`, `ab` and `ae`.
#[derive(Debug, Clone)]
pub struct RembgHttpBackend {
    client: Client,
    endpoint: String,
}

impl RembgHttpBackend {
    /// Create a backend for the given endpoint
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new<S: Into<String>>(endpoint: S, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                BgReplaceError::internal(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Form fields carrying the matting options
    #[must_use]
    pub fn form_fields(options: &SegmentationOptions) -> Vec<(&'static str, String)> {
        vec![
            ("a", options.alpha_matting.to_string()),
            ("af", options.foreground_threshold.to_string()),
            ("ab", options.background_threshold.to_string()),
            ("ae", options.erode_size.to_string()),
        ]
    }

    fn build_form(image_bytes: &[u8], options: &SegmentationOptions) -> Result<Form> {
        let part = Part::bytes(image_bytes.to_vec())
            .file_name("subject")
            .mime_str("application/octet-stream")
            .map_err(|e| BgReplaceError::internal(format!("Invalid multipart MIME type: {}", e)))?;

        let form = Self::form_fields(options)
            .into_iter()
            .fold(Form::new().part("file", part), |form, (name, value)| {
                form.text(name, value)
            });
        Ok(form)
    }
}

#[async_trait]
impl SegmentationBackend for RembgHttpBackend {
    fn name(&self) -> &str {
        "rembg-http"
    }

    #[instrument(skip_all, fields(endpoint = %self.endpoint, bytes = image_bytes.len()))]
    async fn remove_background(
        &self,
        image_bytes: &[u8],
        options: &SegmentationOptions,
    ) -> Result<Vec<u8>> {
        let form = Self::build_form(image_bytes, options)?;

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    format!("request to {} timed out", self.endpoint)
                } else {
                    format!("request to {} failed: {}", self.endpoint, e)
                };
                BgReplaceError::segmentation_with_backend(self.name(), "Background removal", &reason)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(BgReplaceError::segmentation_with_backend(
                self.name(),
                "Background removal",
                &format!("server answered HTTP {}: {}", status, snippet.trim()),
            ));
        }

        let bytes = response.bytes().await.map_err(|e| {
            BgReplaceError::segmentation_with_backend(
                self.name(),
                "Reading removal response",
                &e.to_string(),
            )
        })?;

        if bytes.is_empty() {
            return Err(BgReplaceError::segmentation_with_backend(
                self.name(),
                "Background removal",
                "server returned an empty body",
            ));
        }

        debug!(response_bytes = bytes.len(), "Background removal response received");
        Ok(bytes.to_vec())
    }
}
