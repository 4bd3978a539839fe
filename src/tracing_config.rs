//! Tracing subscriber setup for the command-line tool
//!
//! The library only emits spans and events; subscribers are configured here,
//! by the binary.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingFormat {
    /// Colored, human-readable console output
    #[default]
    Console,
    /// Plain compact output for CI logs
    Compact,
    /// JSON lines for log collectors
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Tracing configuration builder
#[derive(Debug, Default)]
pub struct TracingConfig {
    /// Verbosity level (`-v` count)
    pub verbosity: u8,
    pub format: TracingFormat,
    /// Filter directive, overrides verbosity when set
    pub env_filter: Option<String>,
    /// Session ID for correlation
    pub session_id: Option<String>,
}

impl TracingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Filter directive for the configured verbosity
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Install the global subscriber
    ///
    /// Fails if the filter directive is malformed or a subscriber is already
    /// installed.
    pub fn init(self) -> anyhow::Result<()> {
        let filter = match &self.env_filter {
            Some(directive) => EnvFilter::try_new(directive)?,
            None => EnvFilter::try_new(self.verbosity_to_filter())?,
        };
        let registry = Registry::default().with(filter);

        match self.format {
            TracingFormat::Console => {
                let layer = fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .compact();
                registry.with(layer).try_init()?;
            },
            TracingFormat::Compact => {
                let layer = fmt::layer().with_ansi(false).with_target(false).compact();
                registry.with(layer).try_init()?;
            },
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => {
                let layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true);
                registry.with(layer).try_init()?;
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::debug!(session_id = %session_id, "Cutout session started");
        }

        Ok(())
    }
}

/// Initialize tracing with CLI defaults and a fresh session id
///
/// `RUST_LOG`, when set, takes precedence over `verbosity`.
pub fn init_cli_tracing(verbosity: u8, format: TracingFormat) -> anyhow::Result<String> {
    let session_id = uuid::Uuid::new_v4().to_string();
    let mut config = TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(format)
        .with_session_id(session_id.clone());
    if let Ok(directive) = std::env::var("RUST_LOG") {
        config = config.with_env_filter(directive);
    }
    config.init()?;
    Ok(session_id)
}

/// Span helpers for the stages of a CLI run
pub mod spans {
    use tracing::{Level, Span};

    /// Whole CLI invocation
    pub fn session(session_id: &str, command: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "session",
            session_id = %session_id,
            command = %command
        )
    }

    /// One input file through one segmentation path
    pub fn file_processing(file_path: &std::path::Path, subject: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "file_processing",
            file_path = %file_path.display(),
            subject = %subject
        )
    }

    /// Loading of externally produced masks or boxes
    pub fn producer_loading(source: &std::path::Path) -> Span {
        tracing::span!(Level::DEBUG, "producer_loading", source = %source.display())
    }
}

/// Event helpers for common logging patterns
pub mod events {
    use crate::{error::SegmentationError, types::SegmentationResult};
    use tracing::{debug, error, info};

    /// Log a failed request with both the technical and the user message
    pub fn request_failed(error: &SegmentationError, context: &str) {
        error!(
            error = %error,
            user_message = error.user_message(),
            context = %context,
            "Segmentation failed"
        );
    }

    /// Log a completed request with its stage timings
    pub fn request_completed(result: &SegmentationResult) {
        let timings = result.timings();
        info!(
            subject = %result.metadata.subject,
            width = result.dimensions().0,
            height = result.dimensions().1,
            orientation = %result.orientation,
            total_ms = timings.total_ms,
            "Cutout ready"
        );
        debug!(
            mask_ms = timings.mask_ms,
            composite_ms = timings.composite_ms,
            orientation_ms = timings.orientation_ms,
            subject_ratio = result.metadata.mask_statistics.subject_ratio(),
            "Stage timings"
        );
    }

    /// Log where the output was written
    pub fn output_written(path: &std::path::Path, bytes: usize) {
        info!(path = %path.display(), bytes, "Wrote cutout");
    }
}
