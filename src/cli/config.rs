//! Conversion of CLI arguments into processor configuration

use super::main_impl::{Cli, CliSampling};
use crate::{
    compositing::MaskSampling,
    config::{CompositeConfig, CompositeConfigBuilder, OutputFormat},
    processor::ProcessorConfig,
    services::OutputFormatHandler,
};
use anyhow::{Context, Result};

pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Start from `--config` (or defaults) and apply every flag that was given
    pub(crate) fn from_cli(cli: &Cli) -> Result<ProcessorConfig> {
        let base = match &cli.config {
            Some(path) => CompositeConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config '{}'", path.display()))?,
            None => CompositeConfig::default(),
        };

        let mut builder = CompositeConfigBuilder::from_config(base);
        if let Some(threshold) = cli.person_threshold {
            builder = builder.person_threshold(threshold);
        }
        if let Some(threshold) = cli.high_confidence_threshold {
            builder = builder.high_confidence_threshold(threshold);
        }
        if let Some(factor) = cli.edge_blend_factor {
            builder = builder.edge_blend_factor(factor);
        }
        if let Some(threads) = cli.threads {
            builder = builder.worker_threads(threads);
        }
        if let Some(sampling) = cli.sampling {
            builder = builder.object_mask_sampling(match sampling {
                CliSampling::Nearest => MaskSampling::Nearest,
                CliSampling::Bilinear => MaskSampling::Bilinear,
            });
        }
        if let Some(max_side) = cli.mask_max_side {
            builder = builder.object_mask_max_side(Some(max_side));
        }
        if let Some(color) = cli.background {
            builder = builder.background_color(color);
        }
        if let Some(format) = cli.format {
            builder = builder.output_format(format.into());
        }
        let composite = builder.build().context("Invalid compositing settings")?;

        ProcessorConfig::builder()
            .composite(composite)
            .apply_orientation(!cli.no_orientation)
            .debug(cli.debug)
            .build()
            .context("Invalid processor settings")
    }

    /// `--format`, else the output file extension, else the configured format
    pub(crate) fn output_format(cli: &Cli, config: &ProcessorConfig) -> OutputFormat {
        if let Some(format) = cli.format {
            return format.into();
        }
        match cli.output.as_deref() {
            Some(path) if path != "-" => {
                OutputFormatHandler::format_for_path(path, config.composite.output_format)
            },
            _ => config.composite.output_format,
        }
    }
}
