//! Tracing configuration for the command-line front end
//!
//! The library only emits spans and events; installing a subscriber is left
//! to the application. This module is what the CLI uses to do that.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Output format of the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output with colors (default)
    Console,
    /// Compact console output without colors, for CI logs
    Compact,
}

/// Tracing configuration builder
#[derive(Debug)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    /// Output format
    pub format: TracingFormat,
    /// Environment filter string (overrides verbosity if set)
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-2+)
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Set a custom filter directive such as `imgly_bgreplace=trace`
    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Convert verbosity level to a filter directive
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Resolve the filter directive: explicit filter, then `RUST_LOG`, then verbosity
    #[must_use]
    pub fn filter_directive(&self) -> String {
        if let Some(filter) = &self.env_filter {
            return filter.clone();
        }
        if self.verbosity == 0 {
            if let Ok(from_env) = std::env::var(EnvFilter::DEFAULT_ENV) {
                if !from_env.trim().is_empty() {
                    return from_env;
                }
            }
        }
        self.verbosity_to_filter().to_string()
    }

    /// Install the global tracing subscriber
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let filter = EnvFilter::try_new(self.filter_directive())?;
        let registry = Registry::default().with(filter);

        match self.format {
            TracingFormat::Console => {
                let fmt_layer = fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },
            TracingFormat::Compact => {
                let fmt_layer = fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },
        }

        Ok(())
    }
}

/// Span creation helpers for common operations
pub mod spans {
    use tracing::{Level, Span};

    /// Span covering a whole CLI run
    #[must_use]
    pub fn session(session_id: &str, backend: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "session",
            session_id = %session_id,
            backend = %backend
        )
    }

    /// Span covering acquisition of one input (`role` is subject or background)
    #[must_use]
    pub fn acquisition(role: &str, source: &str) -> Span {
        tracing::span!(Level::INFO, "acquisition", role = %role, source = %source)
    }

    /// Span covering removal, compositing and saving
    #[must_use]
    pub fn generation(subject: &str, background: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "generation",
            subject = %subject,
            background = %background
        )
    }

    /// Span covering the copy of the merged image to its destination
    #[must_use]
    pub fn download(destination: &std::path::Path) -> Span {
        tracing::span!(Level::DEBUG, "download", destination = %destination.display())
    }
}

/// Event helpers for common logging patterns
pub mod events {
    use tracing::{debug, error, info, warn};

    /// Log a user-facing progress update
    pub fn progress(message: &str, emoji: &str) {
        info!("{} {}", emoji, message);
    }

    /// Log an error with context
    pub fn error_with_context(error: &dyn std::error::Error, context: &str) {
        error!(error = %error, context = %context, "Operation failed");
    }

    /// Log a warning with recommendation
    pub fn warning_with_recommendation(message: &str, recommendation: &str) {
        warn!(
            message = %message,
            recommendation = %recommendation,
            "Warning"
        );
    }

    /// Log the duration of one pipeline stage
    pub fn stage_timing(stage: &str, duration_ms: u64, total_ms: u64) {
        let share = if total_ms == 0 {
            0.0
        } else {
            duration_ms as f64 / total_ms as f64 * 100.0
        };
        debug!(
            stage = %stage,
            duration_ms = duration_ms,
            share_percent = %format!("{:.1}", share),
            "Stage timing"
        );
    }
}
