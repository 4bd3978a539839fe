#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Subject Cutout
//!
//! Mask-compositing engine for person and object cutouts. A separately
//! produced coverage mask (or a saliency bounding box) is combined with the
//! original photo into an RGBA image whose background is transparent and
//! whose subject keeps its original color, with an anti-aliased edge.
//!
//! ## Features
//!
//! - **Orientation aware**: all eight EXIF orientations are normalized before
//!   the mask is produced and restored afterwards
//! - **Any mask resolution**: masks are resampled per axis onto the image grid
//! - **Edge blending**: a configurable alpha ramp between background and
//!   high-confidence foreground
//! - **Object path**: the most salient bounding box is rasterized and blended
//!   over a solid background, with nearest or bilinear mask sampling
//! - **Row-parallel**: compositing runs on a `rayon` pool; output is identical
//!   for any worker count
//! - **Async single-shot API**: each request runs on the `tokio` blocking pool
//!   and completes with one result or one error
//! - **CLI Integration**: optional command-line tool (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use subject_cutout::{
//!     segment_person_from_bytes, OutputFormat, PrecomputedMaskProducer, ProcessorConfig,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! // Mask computed by the platform's person segmentation, stored as grayscale
//! let producer = PrecomputedMaskProducer::from_mask_file("portrait_mask.png")?;
//!
//! let photo = std::fs::read("portrait.jpg")?;
//! let result = segment_person_from_bytes(photo, ProcessorConfig::default(), producer).await?;
//! result.save("portrait_cutout.png", OutputFormat::Png)?;
//! println!("{}", result.timing_summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Synchronous Usage
//!
//! ```rust,no_run
//! use subject_cutout::{
//!     BoundingBox, CompositeConfig, MaskSampling, Orientation, PrecomputedMaskProducer,
//!     ProcessorConfig, SegmentationProcessor,
//! };
//!
//! # fn example() -> anyhow::Result<()> {
//! let composite = CompositeConfig::builder()
//!     .object_mask_sampling(MaskSampling::Bilinear)
//!     .background_color([255, 255, 255, 255])
//!     .build()?;
//! let config = ProcessorConfig::builder().composite(composite).build()?;
//!
//! let producer = PrecomputedMaskProducer::new()
//!     .with_boxes(vec![BoundingBox::new(0.2, 0.1, 0.5, 0.7, 0.93)]);
//! let mut processor = SegmentationProcessor::new(config, Box::new(producer))?;
//!
//! let image = image::open("product.jpg")?;
//! let result = processor.segment_object(&image, Orientation::Normal)?;
//! result.save_png("product_cutout.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface and tracing subscriber setup
//! - `tracing-json`: JSON log output for the CLI

pub mod buffer;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositing;
pub mod config;
pub mod error;
pub mod processor;
pub mod producer;
pub mod producers;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;

use image::DynamicImage;
use tracing::Span;

// Public API exports
pub use buffer::{ChannelLayout, CoverageMask, MaskReadGuard, MaskStatistics, PixelBuffer};
pub use compositing::{
    composite_person, masked_blend, normalize, rasterize, resize_nearest, restore,
    select_most_salient, BoundingBox, Compositor, CoverageClassifier, MaskSampling, MaskScale,
    Orientation, OrientedBuffer, PixelClass, PixelRect, WorkerPool,
};
pub use config::{CompositeConfig, CompositeConfigBuilder, OutputFormat};
pub use error::{Result, SegmentationError};
pub use processor::{ProcessorConfig, ProcessorConfigBuilder, SegmentationProcessor};
pub use producer::MaskProducer;
pub use producers::{test_utils::MockMaskProducer, PrecomputedMaskProducer};
pub use services::{ImageIOService, OutputFormatHandler};
pub use types::{ProcessingMetadata, ProcessingTimings, SegmentationResult, SubjectKind};

#[cfg(feature = "cli")]
pub use tracing_config::{events, init_cli_tracing, spans, TracingConfig, TracingFormat};

/// Cut out the person in a decoded image
///
/// Runs on the `tokio` blocking pool and resolves exactly once.
///
/// # Examples
///
/// ```rust,no_run
/// use subject_cutout::{segment_person, MockMaskProducer, Orientation, ProcessorConfig};
///
/// # async fn example() -> anyhow::Result<()> {
/// let image = image::open("selfie.jpg")?;
/// let result = segment_person(
///     image,
///     Orientation::Rotate90,
///     ProcessorConfig::default(),
///     MockMaskProducer::new(),
/// )
/// .await?;
/// assert_eq!(result.orientation, Orientation::Rotate90);
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// - `NoSegmentationMask` if the producer finds no person
/// - `InvalidConfig` for invalid thresholds
/// - `Internal` if the blocking task panics
pub async fn segment_person<P>(
    image: DynamicImage,
    orientation: Orientation,
    config: ProcessorConfig,
    producer: P,
) -> Result<SegmentationResult>
where
    P: MaskProducer + 'static,
{
    run_blocking(move || {
        SegmentationProcessor::new(config, Box::new(producer))?.segment_person(&image, orientation)
    })
    .await
}

/// Cut out the most salient object in a decoded image
///
/// # Errors
/// - `NoSalientObjects` / `NoMostSalientObject` if no box can be chosen
/// - `InvalidConfig` for invalid settings
/// - `Internal` if the blocking task panics
pub async fn segment_object<P>(
    image: DynamicImage,
    orientation: Orientation,
    config: ProcessorConfig,
    producer: P,
) -> Result<SegmentationResult>
where
    P: MaskProducer + 'static,
{
    run_blocking(move || {
        SegmentationProcessor::new(config, Box::new(producer))?.segment_object(&image, orientation)
    })
    .await
}

/// Person cutout from encoded image bytes; orientation is read from EXIF
///
/// # Errors
/// - `InvalidImage` if the bytes cannot be decoded
pub async fn segment_person_from_bytes<P>(
    image_bytes: Vec<u8>,
    config: ProcessorConfig,
    producer: P,
) -> Result<SegmentationResult>
where
    P: MaskProducer + 'static,
{
    run_blocking(move || {
        SegmentationProcessor::new(config, Box::new(producer))?.segment_person_bytes(&image_bytes)
    })
    .await
}

/// Object cutout from encoded image bytes; orientation is read from EXIF
///
/// # Errors
/// - `InvalidImage` if the bytes cannot be decoded
pub async fn segment_object_from_bytes<P>(
    image_bytes: Vec<u8>,
    config: ProcessorConfig,
    producer: P,
) -> Result<SegmentationResult>
where
    P: MaskProducer + 'static,
{
    run_blocking(move || {
        SegmentationProcessor::new(config, Box::new(producer))?.segment_object_bytes(&image_bytes)
    })
    .await
}

/// Run one request on the blocking pool, inside the caller's span
async fn run_blocking<F>(request: F) -> Result<SegmentationResult>
where
    F: FnOnce() -> Result<SegmentationResult> + Send + 'static,
{
    let span = Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(request))
        .await
        .map_err(|e| SegmentationError::internal(format!("segmentation task failed: {}", e)))?
}
