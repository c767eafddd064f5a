//! Background removal collaborators
//!
//! The crate never segments images itself. A `SegmentationBackend` takes the
//! encoded subject image plus matting options and hands back an encoded image
//! whose alpha channel marks the foreground.
//!
//! - `RembgHttpBackend` talks to a rembg-compatible HTTP server
//! - `CommandBackend` runs an external program such as the `rembg` CLI

pub mod command;
pub mod http;

#[cfg(test)]
pub mod test_utils;

use crate::{
    config::{BackendConfig, SegmentationOptions},
    error::Result,
};
use async_trait::async_trait;

pub use self::command::CommandBackend;
pub use self::http::RembgHttpBackend;

/// Narrow interface to an external background removal model
#[async_trait]
pub trait SegmentationBackend: Send + Sync {
    /// Short name used in logs and error messages
    fn name(&self) -> &str;

    /// Remove the background from an encoded image
    ///
    /// # Errors
    /// - `Segmentation` when the collaborator is unreachable, rejects the
    ///   input, or produces no output
    async fn remove_background(
        &self,
        image_bytes: &[u8],
        options: &SegmentationOptions,
    ) -> Result<Vec<u8>>;
}

/// Build the backend described by a configuration
pub fn create_backend(config: &BackendConfig) -> Result<Box<dyn SegmentationBackend>> {
    match config {
        BackendConfig::RembgHttp {
            endpoint,
            timeout_secs,
        } => Ok(Box::new(RembgHttpBackend::new(
            endpoint.clone(),
            std::time::Duration::from_secs(*timeout_secs),
        )?)),
        BackendConfig::Command { program, args } => {
            Ok(Box::new(CommandBackend::new(program.clone(), args.clone())))
        },
    }
}
