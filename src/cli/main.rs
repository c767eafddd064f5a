//! Background Replacement CLI Tool
//!
//! Command-line interface that removes a subject's background and composites
//! it onto a replacement background.

use super::config::CliConfigBuilder;
use crate::{
    acquisition::{AcquiredImage, ImageSource, SourceMode},
    config::{OutputFormat, ResizeFilter},
    processor::BackgroundReplacementProcessor,
    tracing_config::{events, spans, TracingConfig, TracingFormat},
    types::MergedResult,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use image::GenericImageView;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn, Instrument};

/// Replace the background of a subject image with another image
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "imgly-bgreplace")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Subject image: local path or http(s) URL
    #[arg(value_name = "SUBJECT")]
    pub subject: String,

    /// Background image: local path or http(s) URL
    #[arg(value_name = "BACKGROUND")]
    pub background: String,

    /// How to interpret SUBJECT and BACKGROUND
    #[arg(long, value_enum, default_value_t = CliSourceMode::Auto)]
    pub source: CliSourceMode,

    /// Foreground threshold for alpha matting, 0-255 [default: 50]
    #[arg(short, long)]
    pub threshold: Option<u8>,

    /// Background threshold for alpha matting [default: 10]
    #[arg(long)]
    pub background_threshold: Option<u8>,

    /// Erode size for alpha matting [default: 10]
    #[arg(long)]
    pub erode_size: Option<u32>,

    /// Disable alpha matting
    #[arg(long)]
    pub no_alpha_matting: bool,

    /// Background removal collaborator [default: http]
    #[arg(long, value_enum)]
    pub backend: Option<CliBackend>,

    /// Removal endpoint of a rembg server [default: http://127.0.0.1:7000/api/remove]
    #[arg(long, value_name = "URL", conflicts_with = "command")]
    pub endpoint: Option<String>,

    /// Removal program and argument templates, whitespace separated
    /// (placeholders: {input} {output} {matting} {af} {ab} {ae}) [default: rembg i {matting} {input} {output}]
    #[arg(long, value_name = "PROGRAM ARGS")]
    pub command: Option<String>,

    /// Download destination for the merged image. Use "-" for stdout. [default: merged_image.<ext>]
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<String>,

    /// Merged image format [default: jpeg]
    #[arg(short, long, value_enum)]
    pub format: Option<CliOutputFormat>,

    /// JPEG quality (1-100) [default: 90]
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub jpeg_quality: Option<u8>,

    /// Filter used to resize the background [default: triangle]
    #[arg(long, value_enum)]
    pub resize_filter: Option<CliResizeFilter>,

    /// Timeout for fetching image URLs, in seconds [default: 30]
    #[arg(long, value_name = "SECONDS")]
    pub fetch_timeout: Option<u64>,

    /// Base directory for session workspaces [default: user cache dir]
    #[arg(long, value_name = "PATH")]
    pub work_dir: Option<PathBuf>,

    /// Keep the session workspace (originals, cut-out, merged image) after exit
    #[arg(long)]
    pub keep_workspace: bool,

    /// JSON configuration file; command-line flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Show a spinner while images are fetched and processed
    #[arg(long)]
    pub progress: bool,

    /// Log output style
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// Log filter directive such as "imgly_bgreplace=debug,reqwest=warn"; overrides -v and RUST_LOG
    #[arg(long, value_name = "DIRECTIVE")]
    pub log_filter: Option<String>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliSourceMode {
    /// URLs for http(s) arguments, local paths otherwise
    Auto,
    /// Always local files
    Local,
    /// Always URLs
    Url,
}

impl From<CliSourceMode> for SourceMode {
    fn from(mode: CliSourceMode) -> Self {
        match mode {
            CliSourceMode::Auto => SourceMode::Auto,
            CliSourceMode::Local => SourceMode::Local,
            CliSourceMode::Url => SourceMode::Url,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    /// Colored console output
    Console,
    /// Plain compact output, for CI logs
    Compact,
}

impl From<CliLogFormat> for TracingFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Console => TracingFormat::Console,
            CliLogFormat::Compact => TracingFormat::Compact,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliBackend {
    /// rembg-compatible HTTP server
    Http,
    /// External program
    Command,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Jpeg,
    Png,
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Jpeg => OutputFormat::Jpeg,
            CliOutputFormat::Png => OutputFormat::Png,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<CliResizeFilter> for ResizeFilter {
    fn from(filter: CliResizeFilter) -> Self {
        match filter {
            CliResizeFilter::Nearest => ResizeFilter::Nearest,
            CliResizeFilter::Triangle => ResizeFilter::Triangle,
            CliResizeFilter::CatmullRom => ResizeFilter::CatmullRom,
            CliResizeFilter::Gaussian => ResizeFilter::Gaussian,
            CliResizeFilter::Lanczos3 => ResizeFilter::Lanczos3,
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli).context("Failed to initialize tracing")?;

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    if !config.segmentation.threshold_on_step() {
        events::warning_with_recommendation(
            &format!(
                "Foreground threshold {} is not a multiple of {}",
                config.segmentation.foreground_threshold,
                crate::config::THRESHOLD_STEP
            ),
            "Thresholds are usually tuned in steps of 5",
        );
    }

    let processor = BackgroundReplacementProcessor::new(config)
        .context("Failed to create background replacement processor")?;

    let session_span = spans::session(processor.workspace().session_id(), processor.backend_name());
    let outcome = run_session(&cli, &processor).instrument(session_span).await;

    if let Err(e) = &outcome {
        events::error_with_context(&**e, "background replacement");
    }

    release_workspace(processor, cli.keep_workspace);
    outcome
}

/// Initialize tracing from the verbosity and log flags
fn init_tracing(cli: &Cli) -> Result<()> {
    tracing_config(cli)
        .init()
        .context("Failed to initialize tracing subscriber")?;

    debug!(verbosity = cli.verbose, "Tracing initialized");
    Ok(())
}

fn tracing_config(cli: &Cli) -> TracingConfig {
    let config = TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(cli.log_format.into());
    match &cli.log_filter {
        Some(filter) => config.with_env_filter(filter.clone()),
        None => config,
    }
}

/// Keep or remove the session workspace once the run is over
///
/// A failed removal is only logged so that the run's own outcome reaches
/// the user.
fn release_workspace(processor: BackgroundReplacementProcessor, keep: bool) {
    if keep {
        info!(
            "Session workspace kept at {}",
            processor.workspace().root().display()
        );
    } else if let Err(e) = processor.cleanup() {
        warn!(error = %e, "Failed to remove session workspace");
    }
}

/// Acquire both images, generate the merged result and deliver it
async fn run_session(cli: &Cli, processor: &BackgroundReplacementProcessor) -> Result<()> {
    let mode = SourceMode::from(cli.source);
    let subject_source = ImageSource::from_arg(&cli.subject, mode);
    let background_source = ImageSource::from_arg(&cli.background, mode);
    let spinner = Spinner::new(cli.progress);

    spinner.stage(&acquiring_message("subject", &subject_source));
    let subject = processor
        .acquire(&subject_source)
        .instrument(spans::acquisition("subject", &cli.subject))
        .await
        .with_context(|| format!("Failed to acquire subject image '{}'", cli.subject))?;
    report_image("Subject", &subject);

    spinner.stage(&acquiring_message("background", &background_source));
    let background = processor
        .acquire(&background_source)
        .instrument(spans::acquisition("background", &cli.background))
        .await
        .with_context(|| format!("Failed to acquire background image '{}'", cli.background))?;
    report_image("Background", &background);

    spinner.stage(&format!("Removing background via {}", processor.backend_name()));
    let result = processor
        .generate(&subject, &background)
        .instrument(spans::generation(&subject.name, &background.name))
        .await
        .context("Failed to replace background")?;
    spinner.finish();

    report_timings(&result);
    deliver(cli, processor, &result, &mut std::io::stdout().lock())
}

fn acquiring_message(role: &str, source: &ImageSource) -> String {
    let verb = if source.is_remote() { "Fetching" } else { "Reading" };
    format!("{} {} {}", verb, role, source)
}

fn report_image(role: &str, image: &AcquiredImage) {
    let (width, height) = image.image.dimensions();
    events::progress(
        &format!(
            "{}: {} ({}x{}) stored at {}",
            role,
            image.name,
            width,
            height,
            image.path.display()
        ),
        "🖼️",
    );
}

fn report_timings(result: &MergedResult) {
    let timings = &result.metadata.timings;
    events::stage_timing("segmentation", timings.segmentation_ms, timings.total_ms);
    events::stage_timing("decode", timings.decode_ms, timings.total_ms);
    events::stage_timing("composite", timings.composite_ms, timings.total_ms);
    events::stage_timing("encode", timings.encode_ms, timings.total_ms);
    info!(
        "Merged {} (removal took {:.0}% of the time)",
        result.summary(),
        timings.segmentation_ratio() * 100.0
    );
}

/// Where the merged image goes once generated
#[derive(Debug, PartialEq, Eq)]
enum Delivery {
    Stdout,
    File(PathBuf),
}

impl Delivery {
    /// `-` means stdout; no `-o` means `merged_image.<ext>` in the current directory
    fn resolve(output: Option<&str>, result: &MergedResult) -> Self {
        match output {
            Some("-") => Self::Stdout,
            Some(path) => Self::File(PathBuf::from(path)),
            None => Self::File(PathBuf::from(result.download_file_name())),
        }
    }
}

/// Copy the merged image to its destination, or stream its bytes to `out`
///
/// When copying to a file, the confirmation line is written to `out`.
fn deliver<W: Write>(
    cli: &Cli,
    processor: &BackgroundReplacementProcessor,
    result: &MergedResult,
    out: &mut W,
) -> Result<()> {
    match Delivery::resolve(cli.output.as_deref(), result) {
        Delivery::Stdout => {
            let config = processor.config();
            let bytes = result
                .to_bytes(config.output_format, config.jpeg_quality)
                .context("Failed to encode merged image")?;
            debug!(
                mime_type = config.output_format.mime_type(),
                bytes = bytes.len(),
                "Streaming merged image to stdout"
            );
            out.write_all(&bytes)
                .context("Failed to write merged image to stdout")?;
            out.flush().context("Failed to flush stdout")
        },
        Delivery::File(destination) => {
            let _span = spans::download(&destination).entered();
            let target = processor
                .download(result, &destination)
                .with_context(|| format!("Failed to download merged image to {}", destination.display()))?;
            writeln!(out, "✅ Merged image saved to {}", target.display())
                .context("Failed to write to stdout")?;
            Ok(())
        },
    }
}

/// Optional spinner shown while the pipeline runs
struct Spinner {
    bar: Option<ProgressBar>,
}

impl Spinner {
    fn new(enabled: bool) -> Self {
        let bar = enabled.then(|| {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });
        Self { bar }
    }

    fn stage(&self, message: &str) {
        match &self.bar {
            Some(bar) => bar.set_message(message.to_string()),
            None => debug!("{}", message),
        }
    }

    fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.finish();
    }
}
