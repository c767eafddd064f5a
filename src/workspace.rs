//! Per-session working storage
//!
//! Each session gets its own directory tree so concurrent users never touch
//! each other's files:
//!
//! ```text
//! <base>/<session-id>/original/   inputs as acquired
//! <base>/<session-id>/masked/     cut-outs and the merged result
//! ```

use crate::{
    config::OutputFormat,
    error::{BgReplaceError, Result},
    services::ImageIOService,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory holding acquired inputs
pub const ORIGINAL_DIR: &str = "original";

/// Directory holding cut-outs and the merged result
pub const MASKED_DIR: &str = "masked";

/// File stem of the merged result
pub const MERGED_STEM: &str = "merged_image";

/// Working directories of one session
#[derive(Debug, Clone)]
pub struct SessionWorkspace {
    session_id: String,
    root: PathBuf,
}

impl SessionWorkspace {
    /// Default base directory: the user cache dir, else the system temp dir
    #[must_use]
    pub fn default_base_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("imgly-bgreplace")
            .join("sessions")
    }

    /// Create a fresh session under `base` with a random session id
    ///
    /// # Errors
    /// - Failed to create the session directories
    pub fn create<P: AsRef<Path>>(base: P) -> Result<Self> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let root = base.as_ref().join(&session_id);

        for dir in [root.join(ORIGINAL_DIR), root.join(MASKED_DIR)] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                BgReplaceError::file_io_error("create session directory", &dir, &e)
            })?;
        }

        info!(session_id = %session_id, root = %root.display(), "Session workspace created");
        Ok(Self { session_id, root })
    }

    /// Session identifier
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Root directory of the session
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn original_dir(&self) -> PathBuf {
        self.root.join(ORIGINAL_DIR)
    }

    #[must_use]
    pub fn masked_dir(&self) -> PathBuf {
        self.root.join(MASKED_DIR)
    }

    /// Path of the merged result for the given format
    #[must_use]
    pub fn output_path(&self, format: OutputFormat) -> PathBuf {
        self.masked_dir()
            .join(format!("{}.{}", MERGED_STEM, format.extension()))
    }

    /// Path of the cut-out for a subject named `name`
    ///
    /// Cut-outs are PNG, so the extension is replaced.
    #[must_use]
    pub fn masked_path(&self, name: &str) -> PathBuf {
        let sanitized = sanitize_file_name(name);
        let stem = Path::new(&sanitized)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "subject".to_string());
        let stem = if stem == MERGED_STEM {
            format!("{}_cutout", stem)
        } else {
            stem
        };
        self.masked_dir().join(format!("{}.png", stem))
    }

    /// Persist an input under `original/`, keeping names unique within the session
    ///
    /// Returns the name actually used and the full path.
    pub fn save_original(&self, name: &str, bytes: &[u8]) -> Result<(String, PathBuf)> {
        let name = self.unique_original_name(&sanitize_file_name(name));
        let path = self.original_dir().join(&name);
        ImageIOService::write_bytes(&path, bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "Saved original image");
        Ok((name, path))
    }

    /// Persist a cut-out under `masked/`
    pub fn save_masked(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.masked_path(name);
        ImageIOService::write_bytes(&path, bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "Saved cut-out image");
        Ok(path)
    }

    /// Remove the whole session directory
    pub fn cleanup(self) -> Result<()> {
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root).map_err(|e| {
                BgReplaceError::file_io_error("remove session directory", &self.root, &e)
            })?;
        }
        debug!(session_id = %self.session_id, "Session workspace removed");
        Ok(())
    }

    fn unique_original_name(&self, name: &str) -> String {
        let dir = self.original_dir();
        if !dir.join(name).exists() {
            return name.to_string();
        }

        let path = Path::new(name);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        (1..)
            .map(|n| format!("{}-{}{}", stem, n, extension))
            .find(|candidate| !dir.join(candidate).exists())
            .unwrap_or_else(|| name.to_string())
    }
}

/// Reduce an arbitrary name to a safe single path component
///
/// Keeps only the last component, replaces anything outside
/// `[A-Za-z0-9._-]` with `_`, and strips leading dots. Empty results become
/// `image.jpg`.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        crate::acquisition::FALLBACK_FILE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}
