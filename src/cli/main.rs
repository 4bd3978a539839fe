//! Subject cutout CLI
//!
//! Applies an externally produced person mask or saliency box set to a photo
//! and writes the transparent cutout.

use super::config::CliConfigBuilder;
use crate::{
    config::OutputFormat,
    error::SegmentationError,
    producers::PrecomputedMaskProducer,
    services::OutputFormatHandler,
    tracing_config::{events, init_cli_tracing, spans, TracingFormat},
    types::SegmentationResult,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::{
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, info, Instrument};

/// Cut a person or the most salient object out of a photo
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "subject-cutout")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output file. Use "-" for stdout [default: <INPUT>_cutout.<ext>]
    #[arg(short, long, value_name = "OUTPUT", global = true)]
    pub output: Option<String>,

    /// Output format [default: from the output extension, else png]
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<CliOutputFormat>,

    /// JSON file with compositing settings; flags override its values
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Mask values below this are background
    #[arg(long, global = true)]
    pub person_threshold: Option<u8>,

    /// Mask values at or above this are opaque
    #[arg(long, global = true)]
    pub high_confidence_threshold: Option<u8>,

    /// Steepness of the edge alpha ramp
    #[arg(long, global = true)]
    pub edge_blend_factor: Option<f32>,

    /// Worker threads (0 = all cores)
    #[arg(short, long, global = true)]
    pub threads: Option<usize>,

    /// Object mask sampling
    #[arg(long, value_enum, global = true)]
    pub sampling: Option<CliSampling>,

    /// Longest side of the rasterized object mask
    #[arg(long, value_name = "PIXELS", global = true)]
    pub mask_max_side: Option<u32>,

    /// Object background as RRGGBB or RRGGBBAA hex
    #[arg(long, value_name = "HEX", value_parser = parse_color, global = true)]
    pub background: Option<[u8; 4]>,

    /// Ignore the EXIF orientation of the input
    #[arg(long, global = true)]
    pub no_orientation: bool,

    /// Log mask statistics for each request
    #[arg(long, global = true)]
    pub debug: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console, global = true)]
    pub log_format: CliLogFormat,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Cut out a person using a per-pixel coverage mask
    Person {
        /// Input photo
        input: PathBuf,
        /// Grayscale coverage mask (any resolution)
        #[arg(short, long, value_name = "MASK")]
        mask: PathBuf,
    },
    /// Cut out the most salient object using saliency boxes
    Object {
        /// Input photo
        input: PathBuf,
        /// JSON array of {x, y, width, height, confidence}
        #[arg(short, long, value_name = "BOXES")]
        boxes: PathBuf,
    },
}

impl Command {
    #[must_use]
    pub fn input(&self) -> &Path {
        match self {
            Self::Person { input, .. } | Self::Object { input, .. } => input,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Person { .. } => "person",
            Self::Object { .. } => "object",
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Tiff,
    Rgba8,
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Png => Self::Png,
            CliOutputFormat::Tiff => Self::Tiff,
            CliOutputFormat::Rgba8 => Self::Rgba8,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliSampling {
    Nearest,
    Bilinear,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl From<CliLogFormat> for TracingFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Console => Self::Console,
            CliLogFormat::Compact => Self::Compact,
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => Self::Json,
        }
    }
}

/// Parse `RRGGBB` or `RRGGBBAA`, with an optional leading `#`
fn parse_color(value: &str) -> std::result::Result<[u8; 4], String> {
    let hex = value.trim_start_matches('#');
    if !matches!(hex.len(), 6 | 8) || !hex.is_ascii() {
        return Err(format!("expected RRGGBB or RRGGBBAA, got '{}'", value));
    }
    let mut color = [0, 0, 0, u8::MAX];
    for (i, slot) in color.iter_mut().enumerate().take(hex.len() / 2) {
        *slot = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|e| format!("invalid hex in '{}': {}", value, e))?;
    }
    Ok(color)
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    let session_id =
        init_cli_tracing(cli.verbose, cli.log_format.into()).context("Failed to initialize tracing")?;
    let session = spans::session(&session_id, cli.command.name());
    run(cli).instrument(session).await
}

async fn run(cli: Cli) -> Result<()> {
    let config = CliConfigBuilder::from_cli(&cli).context("Invalid settings")?;
    let format = CliConfigBuilder::output_format(&cli, &config);
    let input = cli.command.input().to_path_buf();
    let output = resolve_output_path(cli.output.as_deref(), &input, format);
    debug!(?config, ?format, "Resolved configuration");

    let bytes = std::fs::read(&input)
        .with_context(|| format!("Failed to read input '{}'", input.display()))?;

    let file_span = spans::file_processing(&input, cli.command.name());
    let result = match &cli.command {
        Command::Person { mask, .. } => {
            let producer = {
                let _span = spans::producer_loading(mask).entered();
                PrecomputedMaskProducer::from_mask_file(mask)
                    .with_context(|| format!("Failed to load mask '{}'", mask.display()))?
            };
            crate::segment_person_from_bytes(bytes, config, producer)
                .instrument(file_span)
                .await
        },
        Command::Object { boxes, .. } => {
            let producer = {
                let _span = spans::producer_loading(boxes).entered();
                PrecomputedMaskProducer::from_boxes_file(boxes)
                    .with_context(|| format!("Failed to load boxes '{}'", boxes.display()))?
            };
            crate::segment_object_from_bytes(bytes, config, producer)
                .instrument(file_span)
                .await
        },
    };

    let result = result.map_err(|e| report_failure(e, &input))?;
    events::request_completed(&result);
    write_output(&result, output.as_deref(), format)?;
    info!("{}", result.timing_summary());
    Ok(())
}

fn report_failure(error: SegmentationError, input: &Path) -> anyhow::Error {
    events::request_failed(&error, &input.display().to_string());
    let user_message = error.user_message();
    anyhow::Error::new(error).context(user_message)
}

/// `None` means stdout
fn resolve_output_path(output: Option<&str>, input: &Path, format: OutputFormat) -> Option<PathBuf> {
    match output {
        Some("-") => None,
        Some(path) => Some(PathBuf::from(path)),
        None => {
            let stem = input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("output");
            let name = format!("{}_cutout.{}", stem, OutputFormatHandler::get_extension(format));
            Some(input.with_file_name(name))
        },
    }
}

fn write_output(result: &SegmentationResult, output: Option<&Path>, format: OutputFormat) -> Result<()> {
    let bytes = result.to_bytes(format).context("Failed to encode cutout")?;
    match output {
        Some(path) => {
            std::fs::write(path, &bytes)
                .with_context(|| format!("Failed to write output '{}'", path.display()))?;
            events::output_written(path, bytes.len());
        },
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes).context("Failed to write to stdout")?;
            stdout.flush().context("Failed to flush stdout")?;
        },
    }
    Ok(())
}
