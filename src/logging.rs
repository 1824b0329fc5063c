//! Structured logging setup.
//!
//! Every component logs through `tracing` with structured fields
//! (`request_id`, `handler`, `kind`, `latency_ms`). This module installs the
//! process-wide subscriber:
//!
//! - an `EnvFilter` at the configured level, overridable with `RUST_LOG`
//! - JSON output for production, pretty output for development
//! - optional non-blocking output through `tracing-appender`
//!
//! ## Environment Variables
//!
//! - `BRRTSERVE_LOG_FORMAT`: `json` (default) or `pretty`
//! - `BRRTSERVE_LOG_ASYNC`: buffered non-blocking output (default `true`)
//! - `BRRTSERVE_LOG_BUFFER_SIZE`: buffered lines before events are dropped (default 8192)
//! - `BRRTSERVE_LOG_TARGET_FILTER`: extra comma-separated filter directives
//! - `BRRTSERVE_LOG_INCLUDE_LOCATION`: include file:line (default `false`)
//!
//! The level itself comes from `SAGEMAKER_INFERENCE_LOGGING_LEVEL`.

use crate::environment::Environment;
use anyhow::{Context, Result};
use tracing::Level;
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    /// Write through a background thread
    pub async_logging: bool,
    /// Lines buffered by the background writer
    pub buffer_size: usize,
    /// Extra filter directives (comma-separated)
    pub target_filter: Option<String>,
    /// Include file:line location
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Json,
            async_logging: true,
            buffer_size: 8192,
            target_filter: None,
            include_location: false,
        }
    }
}

impl LogConfig {
    /// Level from `env`, everything else from `BRRTSERVE_LOG_*`
    pub fn from_environment(env: &Environment) -> Self {
        Self::from_lookup(env, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(env: &Environment, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            level: env.log_level(),
            format: lookup("BRRTSERVE_LOG_FORMAT")
                .map(|s| LogFormat::parse(&s))
                .unwrap_or(defaults.format),
            async_logging: lookup("BRRTSERVE_LOG_ASYNC")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.async_logging),
            buffer_size: lookup("BRRTSERVE_LOG_BUFFER_SIZE")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.buffer_size),
            target_filter: lookup("BRRTSERVE_LOG_TARGET_FILTER").filter(|s| !s.trim().is_empty()),
            include_location: lookup("BRRTSERVE_LOG_INCLUDE_LOCATION")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.include_location),
        }
    }

    /// Filter for this configuration; `RUST_LOG` replaces the level when set.
    pub fn env_filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str()));

        // Client disconnects are logged by the transport at debug/info
        if let Ok(directive) = "may_minihttp::http_server=warn".parse::<Directive>() {
            filter = filter.add_directive(directive);
        }

        if let Some(target_filter) = &self.target_filter {
            for raw in target_filter.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                match raw.parse::<Directive>() {
                    Ok(directive) => filter = filter.add_directive(directive),
                    Err(_) => eprintln!("Warning: Invalid log filter directive: {}", raw),
                }
            }
        }
        filter
    }
}

/// Install the global subscriber.
///
/// With async logging the returned guard flushes buffered lines when dropped;
/// keep it alive for the life of the process.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_logging_with_config(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let registry = tracing_subscriber::registry().with(config.env_filter());

    let (writer, guard) = if config.async_logging {
        let (writer, guard) = NonBlockingBuilder::default()
            .buffered_lines_limit(config.buffer_size)
            .finish(std::io::stdout());
        (tracing_subscriber::fmt::writer::BoxMakeWriter::new(writer), Some(guard))
    } else {
        (
            tracing_subscriber::fmt::writer::BoxMakeWriter::new(std::io::stdout),
            None,
        )
    };

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_list(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
    };

    registry
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}
