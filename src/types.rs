//! Result and metadata types for segmentation requests

use crate::{
    buffer::{MaskStatistics, PixelBuffer},
    compositing::{orientation, Orientation},
    config::OutputFormat,
    error::{Result, SegmentationError},
    services::OutputFormatHandler,
};
use chrono::{DateTime, Utc};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which segmentation path produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    /// Per-pixel coverage mask with edge-blended alpha
    Person,
    /// Most salient bounding box blended over a background
    Object,
}

impl std::fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Person => write!(f, "person"),
            Self::Object => write!(f, "object"),
        }
    }
}

/// Result of a segmentation request
///
/// `image` is RGBA with straight alpha, in the same stored pixel order as the
/// source. `orientation` is the transform a viewer applies on display.
#[derive(Debug, Clone)]
pub struct SegmentationResult {
    pub image: PixelBuffer,
    pub orientation: Orientation,
    pub metadata: ProcessingMetadata,
}

impl SegmentationResult {
    #[must_use]
    pub fn new(image: PixelBuffer, orientation: Orientation, metadata: ProcessingMetadata) -> Self {
        Self {
            image,
            orientation,
            metadata,
        }
    }

    /// Stored dimensions of the output
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Dimensions after the display orientation is applied
    #[must_use]
    pub fn display_dimensions(&self) -> (u32, u32) {
        let (width, height) = self.image.dimensions();
        self.orientation.display_dimensions(width, height)
    }

    #[must_use]
    pub fn timings(&self) -> &ProcessingTimings {
        &self.metadata.timings
    }

    /// Output as an `RgbaImage` in stored order
    pub fn to_rgba_image(&self) -> Result<RgbaImage> {
        self.image.to_rgba_image()
    }

    /// Output with the display orientation baked into the pixels
    ///
    /// Encoders that drop EXIF metadata (PNG, raw RGBA8) otherwise lose the
    /// orientation tag.
    pub fn to_display_image(&self) -> Result<RgbaImage> {
        orientation::apply(self.image.clone(), self.orientation)?.to_rgba_image()
    }

    /// Encode the display image in `format`
    ///
    /// # Errors
    /// - `EncodingFailed` if the codec rejects the image
    pub fn to_bytes(&self, format: OutputFormat) -> Result<Vec<u8>> {
        let image = self.to_display_image()?;
        OutputFormatHandler::encode(&image, format)
    }

    /// Encode the display image in `format` and write it to `path`
    pub fn save<P: AsRef<Path>>(&self, path: P, format: OutputFormat) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes(format)?;
        std::fs::write(path, bytes)
            .map_err(|e| SegmentationError::file_io_error("write output image", path, &e))
    }

    /// Save as PNG
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.save(path, OutputFormat::Png)
    }

    /// One-line timing summary for display
    #[must_use]
    pub fn timing_summary(&self) -> String {
        let t = &self.metadata.timings;
        let mut summary = format!(
            "Total: {}ms | Mask: {}ms | Composite: {}ms | Orientation: {}ms",
            t.total_ms, t.mask_ms, t.composite_ms, t.orientation_ms
        );

        let other_ms = t.other_overhead_ms();
        if other_ms > 5 {
            summary.push_str(&format!(" | Other: {}ms", other_ms));
        }

        summary
    }
}

/// Wall-clock time spent per stage, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Mask producer call
    pub mask_ms: u64,

    /// Classification / rasterization and blending
    pub composite_ms: u64,

    /// Normalize plus restore
    pub orientation_ms: u64,

    /// End-to-end
    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Time not attributed to a measured stage
    #[must_use]
    pub fn other_overhead_ms(&self) -> u64 {
        self.total_ms
            .saturating_sub(self.mask_ms + self.composite_ms + self.orientation_ms)
    }
}

/// Metadata about a completed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub subject: SubjectKind,

    /// Stage timings
    pub timings: ProcessingTimings,

    /// Worker threads requested (0 = all cores)
    pub worker_threads: usize,

    /// Dimensions of the mask that was applied
    pub mask_dimensions: (u32, u32),

    /// Classification counts of that mask
    pub mask_statistics: MaskStatistics,

    /// Name of the mask producer
    pub producer: String,

    pub completed_at: DateTime<Utc>,
}

impl ProcessingMetadata {
    #[must_use]
    pub fn new(subject: SubjectKind, producer: impl Into<String>) -> Self {
        Self {
            subject,
            timings: ProcessingTimings::new(),
            worker_threads: 0,
            mask_dimensions: (0, 0),
            mask_statistics: MaskStatistics::default(),
            producer: producer.into(),
            completed_at: Utc::now(),
        }
    }

    /// Record final timings and stamp the completion time
    pub fn finish(&mut self, timings: ProcessingTimings) {
        self.timings = timings;
        self.completed_at = Utc::now();
    }
}
