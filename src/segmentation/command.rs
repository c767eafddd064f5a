//! External program backend
//!
//! Runs a command once per image with the subject written to a scratch file.
//! Arguments may contain these placeholders:
//!
//! | placeholder | replaced with |
//! |-------------|---------------|
//! | `{input}`   | scratch path of the subject image |
//! | `{output}`  | scratch path the program must write the cut-out to |
//! | `{af}`      | foreground threshold |
//! | `{ab}`      | background threshold |
//! | `{ae}`      | erode size |
//! | `{matting}` | whole argument expands to `-a -af N -ab N -ae N`, or nothing when matting is off |

use super::SegmentationBackend;
use crate::{
    config::SegmentationOptions,
    error::{BgReplaceError, Result},
    services::ImageIOService,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, instrument};

/// Backend delegating to an external program such as `rembg i`
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
}

impl CommandBackend {
    /// Create a backend running `program` with argument templates `args`
    #[must_use]
    pub fn new<S: Into<String>>(program: S, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Substitute placeholders in the argument templates
    #[must_use]
    pub fn expand_args(
        templates: &[String],
        input: &Path,
        output: &Path,
        options: &SegmentationOptions,
    ) -> Vec<String> {
        let af = options.foreground_threshold.to_string();
        let ab = options.background_threshold.to_string();
        let ae = options.erode_size.to_string();
        let input = input.display().to_string();
        let output = output.display().to_string();

        let mut expanded = Vec::with_capacity(templates.len() + 7);
        for template in templates {
            if template == "{matting}" {
                if options.alpha_matting {
                    expanded.extend([
                        "-a".to_string(),
                        "-af".to_string(),
                        af.clone(),
                        "-ab".to_string(),
                        ab.clone(),
                        "-ae".to_string(),
                        ae.clone(),
                    ]);
                }
                continue;
            }

            expanded.push(
                template
                    .replace("{input}", &input)
                    .replace("{output}", &output)
                    .replace("{af}", &af)
                    .replace("{ab}", &ab)
                    .replace("{ae}", &ae),
            );
        }
        expanded
    }

    /// Create a scratch directory under `base` holding the subject image
    ///
    /// Returns the directory guard with the input and output paths.
    async fn prepare_scratch(
        &self,
        base: &Path,
        image_bytes: &[u8],
    ) -> Result<(TempDir, PathBuf, PathBuf)> {
        let scratch = tempfile::Builder::new()
            .prefix("imgly-bgreplace-")
            .tempdir_in(base)
            .map_err(|e| self.error("Creating scratch directory for", &e.to_string()))?;

        let extension = ImageIOService::guess_extension(image_bytes).unwrap_or("png");
        let input = scratch.path().join(format!("input.{}", extension));
        let output = scratch.path().join("output.png");

        tokio::fs::write(&input, image_bytes)
            .await
            .map_err(|e| self.error("Writing scratch input for", &e.to_string()))?;

        Ok((scratch, input, output))
    }

    fn error(&self, operation: &str, detail: &str) -> BgReplaceError {
        BgReplaceError::segmentation_with_backend(
            "command",
            &format!("{} '{}'", operation, self.program),
            detail,
        )
    }
}

#[async_trait]
impl SegmentationBackend for CommandBackend {
    fn name(&self) -> &str {
        "command"
    }

    #[instrument(skip_all, fields(program = %self.program, bytes = image_bytes.len()))]
    async fn remove_background(
        &self,
        image_bytes: &[u8],
        options: &SegmentationOptions,
    ) -> Result<Vec<u8>> {
        let (_scratch, input, output) = self
            .prepare_scratch(&std::env::temp_dir(), image_bytes)
            .await?;

        let args = Self::expand_args(&self.args, &input, &output, options);
        debug!(?args, "Running background removal command");

        let result = tokio::process::Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| self.error("Launching", &e.to_string()))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let snippet: String = stderr.trim().chars().take(300).collect();
            return Err(self.error(
                "Running",
                &format!("exited with {}: {}", result.status, snippet),
            ));
        }

        let bytes = tokio::fs::read(&output)
            .await
            .map_err(|e| self.error("Reading output of", &format!("no output produced ({})", e)))?;

        if bytes.is_empty() {
            return Err(self.error("Reading output of", "output file is empty"));
        }

        Ok(bytes)
    }
}
