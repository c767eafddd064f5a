//! Background replacement processor
//!
//! `BackgroundReplacementProcessor` owns everything one session needs: the
//! configuration, a removal backend, an image fetcher and the session's
//! working directories. The CLI drives it; library users can drive it the
//! same way.

use crate::{
    acquisition::{file_name_from_url, AcquiredImage, ImageFetcher, ImageSource},
    compositor::Compositor,
    config::{OutputFormat, ReplaceConfig},
    error::{BgReplaceError, Result},
    segmentation::{create_backend, SegmentationBackend},
    services::ImageIOService,
    types::{CompositeRequest, MergedResult, ProcessingMetadata, ProcessingTimings},
    workspace::SessionWorkspace,
};
use image::{DynamicImage, GenericImageView};
use instant::Instant;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info_span, instrument, warn, Instrument};

/// Runs the acquire, remove, composite and save pipeline for one session
pub struct BackgroundReplacementProcessor {
    config: ReplaceConfig,
    backend: Box<dyn SegmentationBackend>,
    fetcher: ImageFetcher,
    workspace: SessionWorkspace,
}

impl std::fmt::Debug for BackgroundReplacementProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundReplacementProcessor")
            .field("config", &self.config)
            .field("backend", &self.backend.name())
            .field("workspace", &self.workspace)
            .finish_non_exhaustive()
    }
}

impl BackgroundReplacementProcessor {
    /// Create a processor with the backend described by the configuration
    ///
    /// The session workspace is created under `config.work_dir`, or under
    /// [`SessionWorkspace::default_base_dir`] when unset.
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Failed to create the backend's HTTP client
    /// - Failed to create the session directories
    pub fn new(config: ReplaceConfig) -> Result<Self> {
        config.validate()?;
        let backend = create_backend(&config.backend)?;
        let base = config
            .work_dir
            .clone()
            .unwrap_or_else(SessionWorkspace::default_base_dir);
        let workspace = SessionWorkspace::create(base)?;
        Self::with_backend(config, backend, workspace)
    }

    /// Create a processor with an explicit backend and workspace
    pub fn with_backend(
        config: ReplaceConfig,
        backend: Box<dyn SegmentationBackend>,
        workspace: SessionWorkspace,
    ) -> Result<Self> {
        config.validate()?;
        let fetcher = ImageFetcher::new(Duration::from_secs(config.fetch_timeout_secs))?;

        info!(
            "Background replacement processor ready (session {}, backend {})",
            workspace.session_id(),
            backend.name()
        );

        Ok(Self {
            config,
            backend,
            fetcher,
            workspace,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ReplaceConfig {
        &self.config
    }

    #[must_use]
    pub fn workspace(&self) -> &SessionWorkspace {
        &self.workspace
    }

    /// Name of the removal backend in use
    #[must_use]
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Obtain an input image and persist it under the session's `original/`
    ///
    /// URL images are re-encoded as JPEG before they are stored; local files
    /// and uploaded bytes are stored verbatim.
    ///
    /// # Errors
    /// - `Fetch` when a URL cannot be retrieved or is not an image
    /// - `Io` when a local file cannot be read
    /// - `Image` when local bytes do not decode
    #[instrument(skip_all, fields(source = %source, session_id = %self.workspace.session_id()))]
    pub async fn acquire(&self, source: &ImageSource) -> Result<AcquiredImage> {
        let (name, stored_bytes, image) = match source {
            ImageSource::Url(url) => {
                let fetched = self.fetcher.fetch(url).await?;
                let decoded = ImageIOService::load_from_bytes(&fetched).map_err(|e| {
                    BgReplaceError::fetch(format!("'{}' did not decode as an image: {}", url, e))
                })?;
                let jpeg =
                    ImageIOService::encode(&decoded, OutputFormat::Jpeg, self.config.jpeg_quality)?;
                // keep pixels and stored bytes in agreement
                let image = ImageIOService::load_from_bytes(&jpeg)?;
                (file_name_from_url(url), jpeg, image)
            },
            ImageSource::File(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| BgReplaceError::file_io_error("read input image", path, &e))?;
                let image = ImageIOService::load_from_bytes(&bytes)?;
                (source.file_name(), bytes, image)
            },
            ImageSource::Bytes { data, .. } => {
                let image = ImageIOService::load_from_bytes(data)?;
                (source.file_name(), data.clone(), image)
            },
        };

        let (name, path) = self.workspace.save_original(&name, &stored_bytes)?;
        debug!(
            "Acquired {} as {} ({}x{})",
            source,
            name,
            image.width(),
            image.height()
        );

        Ok(AcquiredImage {
            name,
            path,
            bytes: stored_bytes,
            image,
        })
    }

    /// Replace the subject's background with `background`
    ///
    /// Removes the subject's background, stores the cut-out under `masked/`,
    /// fits the background to the cut-out's dimensions, composites and writes
    /// the merged image to [`SessionWorkspace::output_path`]. Nothing is
    /// written to the output path unless every step succeeds.
    ///
    /// # Errors
    /// - `Segmentation` when the backend fails or returns undecodable bytes
    /// - `MissingAlphaChannel` when the cut-out has no alpha channel
    /// - `ImageShape` for zero-sized images
    /// - `Io`/`Image` when the merged image cannot be encoded or written
    #[instrument(
        skip_all,
        fields(
            session_id = %self.workspace.session_id(),
            backend = %self.backend.name(),
            subject = %subject.name,
            background = %background.name
        )
    )]
    pub async fn generate(
        &self,
        subject: &AcquiredImage,
        background: &AcquiredImage,
    ) -> Result<MergedResult> {
        let mut timings = ProcessingTimings::default();
        let total_start = Instant::now();
        let options = self.config.segmentation;

        let segmentation_start = Instant::now();
        let cutout_bytes = self
            .backend
            .remove_background(&subject.bytes, &options)
            .instrument(info_span!(
                "segmentation",
                foreground_threshold = options.foreground_threshold,
                alpha_matting = options.alpha_matting
            ))
            .await?;
        timings.segmentation_ms = segmentation_start.elapsed().as_millis() as u64;
        self.workspace.save_masked(&subject.name, &cutout_bytes)?;

        let decode_start = Instant::now();
        let cutout = image::load_from_memory(&cutout_bytes).map_err(|e| {
            BgReplaceError::segmentation_with_backend(
                self.backend.name(),
                "Decoding cut-out",
                &e.to_string(),
            )
        })?;
        timings.decode_ms = decode_start.elapsed().as_millis() as u64;

        if cutout.dimensions() != subject.image.dimensions() {
            warn!(
                cutout = ?cutout.dimensions(),
                subject = ?subject.image.dimensions(),
                "Cut-out size differs from the subject, compositing at cut-out size"
            );
        }

        let composite_start = Instant::now();
        let request = CompositeRequest::new(cutout, background.image.clone());
        let merged = {
            let _span = info_span!("compositing").entered();
            Compositor::composite_request(&request, self.config.resize_filter.into())?
        };
        timings.composite_ms = composite_start.elapsed().as_millis() as u64;

        let encode_start = Instant::now();
        let output_path = self.workspace.output_path(self.config.output_format);
        let merged = DynamicImage::ImageRgb8(merged);
        let written = ImageIOService::save_image(
            &merged,
            &output_path,
            self.config.output_format,
            self.config.jpeg_quality,
        )?;
        timings.encode_ms = encode_start.elapsed().as_millis() as u64;
        timings.total_ms = total_start.elapsed().as_millis() as u64;

        info!(
            "Merged image written to {} ({} bytes, {}ms)",
            output_path.display(),
            written,
            timings.total_ms
        );

        Ok(MergedResult {
            image: merged.into_rgb8(),
            output_path,
            metadata: ProcessingMetadata {
                session_id: self.workspace.session_id().to_string(),
                backend: self.backend.name().to_string(),
                foreground_threshold: options.foreground_threshold,
                output_format: self.config.output_format,
                timings,
                created_at: chrono::Utc::now(),
            },
        })
    }

    /// Acquire both images and generate the merged result
    pub async fn replace(
        &self,
        subject: &ImageSource,
        background: &ImageSource,
    ) -> Result<MergedResult> {
        let subject = self.acquire(subject).await?;
        let background = self.acquire(background).await?;
        self.generate(&subject, &background).await
    }

    /// Copy a merged result to `destination`
    ///
    /// Parent directories are created as needed. When `destination` is an
    /// existing directory the result is copied into it under
    /// [`MergedResult::download_file_name`]. Returns the final path.
    /// A destination that is the merged image itself is left untouched.
    ///
    /// # Errors
    /// - `Io` when the result file is missing or the copy fails
    pub fn download<P: AsRef<Path>>(&self, result: &MergedResult, destination: P) -> Result<PathBuf> {
        let destination = destination.as_ref();
        let target = if destination.is_dir() {
            destination.join(result.download_file_name())
        } else {
            destination.to_path_buf()
        };

        if is_same_file(&target, &result.output_path) {
            debug!("Download target {} is the merged image itself", target.display());
            return Ok(target);
        }

        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                BgReplaceError::file_io_error("create download directory", parent, &e)
            })?;
        }

        std::fs::copy(&result.output_path, &target)
            .map_err(|e| BgReplaceError::file_io_error("copy merged image", &result.output_path, &e))?;

        info!("Downloaded merged image to {}", target.display());
        Ok(target)
    }

    /// Give up the processor, keeping the session directories on disk
    #[must_use]
    pub fn into_workspace(self) -> SessionWorkspace {
        self.workspace
    }

    /// Remove the session directories
    pub fn cleanup(self) -> Result<()> {
        self.workspace.cleanup()
    }
}

/// Whether both paths exist and resolve to the same file
fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
