//! Configuration types for compositing operations

use crate::{
    compositing::{CoverageClassifier, MaskSampling},
    error::{Result, SegmentationError},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Output image format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    #[default]
    Png,
    /// TIFF with alpha channel transparency
    Tiff,
    /// Raw RGBA8 pixel data (4 bytes per pixel, no header)
    Rgba8,
}

impl OutputFormat {
    /// File extension without the dot
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Tiff => "tiff",
            Self::Rgba8 => "raw",
        }
    }

    /// Guess the format from a file extension
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "tif" | "tiff" => Some(Self::Tiff),
            "raw" | "rgba" => Some(Self::Rgba8),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Png => write!(f, "png"),
            Self::Tiff => write!(f, "tiff"),
            Self::Rgba8 => write!(f, "rgba8"),
        }
    }
}

/// Configuration for the compositing engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    /// Mask values below this are background (default 128)
    pub person_threshold: u8,

    /// Mask values at or above this are opaque foreground (default 220)
    pub high_confidence_threshold: u8,

    /// Steepness of the edge-band alpha ramp (default 1.5)
    pub edge_blend_factor: f32,

    /// Worker threads for the row-parallel passes (0 = all cores)
    pub worker_threads: usize,

    /// Mask sampling for the object path
    pub object_mask_sampling: MaskSampling,

    /// Longest side of the rasterized object mask (None = image resolution)
    pub object_mask_max_side: Option<u32>,

    /// Straight-alpha RGBA background for the object path
    pub background_color: [u8; 4],

    /// Output format
    pub output_format: OutputFormat,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            person_threshold: CoverageClassifier::DEFAULT_PERSON_THRESHOLD,
            high_confidence_threshold: CoverageClassifier::DEFAULT_HIGH_CONFIDENCE_THRESHOLD,
            edge_blend_factor: CoverageClassifier::DEFAULT_EDGE_BLEND_FACTOR,
            worker_threads: 0,
            object_mask_sampling: MaskSampling::default(),
            object_mask_max_side: None,
            background_color: [0, 0, 0, 0],
            output_format: OutputFormat::default(),
        }
    }
}

impl CompositeConfig {
    /// Create a new configuration builder for fluent API construction
    ///
    /// # Examples
    ///
    /// ```rust
    /// use subject_cutout::{CompositeConfig, MaskSampling};
    ///
    /// let config = CompositeConfig::builder()
    ///     .person_threshold(100)
    ///     .high_confidence_threshold(240)
    ///     .object_mask_sampling(MaskSampling::Bilinear)
    ///     .worker_threads(4)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.person_threshold, 100);
    /// ```
    #[must_use]
    pub fn builder() -> CompositeConfigBuilder {
        CompositeConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Validation Rules
    ///
    /// - `person_threshold < high_confidence_threshold`
    /// - `edge_blend_factor` finite and non-negative
    /// - `object_mask_max_side`, when set, at least 1
    ///
    /// # Errors
    /// - `InvalidConfig` naming the offending parameter
    ///
    /// # Examples
    ///
    /// ```rust
    /// use subject_cutout::CompositeConfig;
    ///
    /// let mut config = CompositeConfig::default();
    /// assert!(config.validate().is_ok());
    ///
    /// config.person_threshold = 230; // above the high-confidence threshold
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        CoverageClassifier::from_config(self)?;

        if self.object_mask_max_side == Some(0) {
            return Err(SegmentationError::config_value_error(
                "object mask max side",
                0,
                ">= 1",
                None,
            ));
        }

        Ok(())
    }

    /// Load a configuration from a JSON file
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    /// - `Io` if the file cannot be read
    /// - `InvalidConfig` if it is not valid JSON or fails validation
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SegmentationError::file_io_error("read config file", path, &e))?;
        Self::from_json_str(&text)
    }

    /// Parse a configuration from JSON text
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| SegmentationError::invalid_config(format!("malformed config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

/// Builder for `CompositeConfig`
#[derive(Debug, Default)]
pub struct CompositeConfigBuilder {
    config: CompositeConfig,
}

impl CompositeConfigBuilder {
    /// Start from an existing configuration, e.g. one loaded from a file
    #[must_use]
    pub fn from_config(config: CompositeConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn person_threshold(mut self, threshold: u8) -> Self {
        self.config.person_threshold = threshold;
        self
    }

    #[must_use]
    pub fn high_confidence_threshold(mut self, threshold: u8) -> Self {
        self.config.high_confidence_threshold = threshold;
        self
    }

    #[must_use]
    pub fn edge_blend_factor(mut self, factor: f32) -> Self {
        self.config.edge_blend_factor = factor;
        self
    }

    #[must_use]
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.config.worker_threads = threads;
        self
    }

    #[must_use]
    pub fn object_mask_sampling(mut self, sampling: MaskSampling) -> Self {
        self.config.object_mask_sampling = sampling;
        self
    }

    #[must_use]
    pub fn object_mask_max_side(mut self, max_side: Option<u32>) -> Self {
        self.config.object_mask_max_side = max_side;
        self
    }

    #[must_use]
    pub fn background_color(mut self, color: [u8; 4]) -> Self {
        self.config.background_color = color;
        self
    }

    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - `InvalidConfig` if thresholds are out of order or the blend factor
    ///   is not a finite non-negative number
    pub fn build(self) -> Result<CompositeConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CompositeConfig::default();
        assert_eq!(config.person_threshold, 128);
        assert_eq!(config.high_confidence_threshold, 220);
        assert!((config.edge_blend_factor - 1.5).abs() < f32::EPSILON);
        assert_eq!(config.worker_threads, 0);
        assert_eq!(config.object_mask_sampling, MaskSampling::Nearest);
        assert_eq!(config.background_color, [0, 0, 0, 0]);
        assert_eq!(config.output_format, OutputFormat::Png);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = CompositeConfig::builder()
            .person_threshold(90)
            .high_confidence_threshold(200)
            .edge_blend_factor(2.0)
            .worker_threads(3)
            .background_color([255, 255, 255, 255])
            .output_format(OutputFormat::Tiff)
            .build()
            .unwrap();

        assert_eq!(config.person_threshold, 90);
        assert_eq!(config.high_confidence_threshold, 200);
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.background_color, [255, 255, 255, 255]);
        assert_eq!(config.output_format, OutputFormat::Tiff);
    }

    #[test]
    fn test_threshold_order_validation() {
        let err = CompositeConfig::builder()
            .person_threshold(220)
            .high_confidence_threshold(220)
            .build()
            .unwrap_err();
        assert!(matches!(err, SegmentationError::InvalidConfig(_)));
        assert!(err.to_string().contains("person threshold"));

        let err = CompositeConfig::builder()
            .edge_blend_factor(f32::INFINITY)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("edge blend factor"));

        let err = CompositeConfig::builder()
            .object_mask_max_side(Some(0))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("object mask max side"));
    }

    #[test]
    fn test_config_from_partial_json() {
        let config =
            CompositeConfig::from_json_str(r#"{"person_threshold": 100, "object_mask_sampling": "bilinear"}"#)
                .unwrap();
        assert_eq!(config.person_threshold, 100);
        assert_eq!(config.high_confidence_threshold, 220);
        assert_eq!(config.object_mask_sampling, MaskSampling::Bilinear);

        assert!(CompositeConfig::from_json_str(r#"{"person_threshold": 250}"#).is_err());
        assert!(CompositeConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = CompositeConfig::builder()
            .object_mask_max_side(Some(512))
            .output_format(OutputFormat::Rgba8)
            .build()
            .unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(CompositeConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_output_format_extensions() {
        assert_eq!(OutputFormat::Png.extension(), "png");
        assert_eq!(OutputFormat::from_extension("TIF"), Some(OutputFormat::Tiff));
        assert_eq!(OutputFormat::from_extension("jpg"), None);
        assert_eq!(OutputFormat::Rgba8.to_string(), "rgba8");
    }
}
