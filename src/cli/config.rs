//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliBackend};
use crate::config::{
    BackendConfig, ReplaceConfig, ReplaceConfigBuilder, DEFAULT_BACKEND_TIMEOUT_SECS,
    DEFAULT_REMBG_ENDPOINT,
};
use anyhow::{Context, Result};

/// Convert CLI arguments to a `ReplaceConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the configuration: defaults, then `--config FILE`, then flags
    pub(crate) fn from_cli(cli: &Cli) -> Result<ReplaceConfig> {
        let base = match &cli.config {
            Some(path) => ReplaceConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => ReplaceConfig::default(),
        };

        let backend = Self::backend_from_cli(cli, &base.backend);
        let mut builder = ReplaceConfigBuilder::from_config(base);

        if let Some(threshold) = cli.threshold {
            builder = builder.foreground_threshold(threshold);
        }
        if let Some(threshold) = cli.background_threshold {
            builder = builder.background_threshold(threshold);
        }
        if let Some(size) = cli.erode_size {
            builder = builder.erode_size(size);
        }
        if cli.no_alpha_matting {
            builder = builder.alpha_matting(false);
        }
        if let Some(backend) = backend {
            builder = builder.backend(backend);
        }
        if let Some(format) = cli.format {
            builder = builder.output_format(format.into());
        }
        if let Some(quality) = cli.jpeg_quality {
            builder = builder.jpeg_quality(quality);
        }
        if let Some(filter) = cli.resize_filter {
            builder = builder.resize_filter(filter.into());
        }
        if let Some(secs) = cli.fetch_timeout {
            builder = builder.fetch_timeout_secs(secs);
        }
        if let Some(dir) = &cli.work_dir {
            builder = builder.work_dir(dir.clone());
        }

        builder.build().context("Invalid configuration")
    }

    /// Backend selected by the flags, or `None` to keep the configured one
    ///
    /// `--endpoint` implies the HTTP backend and `--command` the command
    /// backend. Switching kind without details falls back to that kind's
    /// defaults.
    fn backend_from_cli(cli: &Cli, current: &BackendConfig) -> Option<BackendConfig> {
        let kind = cli.backend.or(if cli.endpoint.is_some() {
            Some(CliBackend::Http)
        } else if cli.command.is_some() {
            Some(CliBackend::Command)
        } else {
            None
        })?;

        match kind {
            CliBackend::Http => {
                let (endpoint, timeout_secs) = match current {
                    BackendConfig::RembgHttp {
                        endpoint,
                        timeout_secs,
                    } => (endpoint.clone(), *timeout_secs),
                    BackendConfig::Command { .. } => (
                        DEFAULT_REMBG_ENDPOINT.to_string(),
                        DEFAULT_BACKEND_TIMEOUT_SECS,
                    ),
                };
                Some(BackendConfig::RembgHttp {
                    endpoint: cli.endpoint.clone().unwrap_or(endpoint),
                    timeout_secs,
                })
            },
            CliBackend::Command => match cli.command.as_deref().map(split_command) {
                Some((program, args)) => Some(BackendConfig::Command { program, args }),
                None if matches!(current, BackendConfig::Command { .. }) => Some(current.clone()),
                None => Some(BackendConfig::rembg_cli()),
            },
        }
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if cli.subject.trim().is_empty() {
            anyhow::bail!("SUBJECT must not be empty");
        }
        if cli.background.trim().is_empty() {
            anyhow::bail!("BACKGROUND must not be empty");
        }

        match cli.backend {
            Some(CliBackend::Http) if cli.command.is_some() => {
                anyhow::bail!("--command requires --backend command");
            },
            Some(CliBackend::Command) if cli.endpoint.is_some() => {
                anyhow::bail!("--endpoint requires --backend http");
            },
            _ => {},
        }

        if let Some(command) = &cli.command {
            if command.trim().is_empty() {
                anyhow::bail!("--command must name a program");
            }
        }

        if let Some(endpoint) = &cli.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                anyhow::bail!("--endpoint must be an http(s) URL, got '{}'", endpoint);
            }
        }

        if cli.fetch_timeout == Some(0) {
            anyhow::bail!("--fetch-timeout must be at least 1 second");
        }

        Ok(())
    }
}

/// Split a command line on whitespace into program and argument templates
fn split_command(command: &str) -> (String, Vec<String>) {
    let mut parts = command.split_whitespace().map(ToString::to_string);
    let program = parts.next().unwrap_or_default();
    (program, parts.collect())
}
