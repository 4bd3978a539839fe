//! Segmentation request processor
//!
//! Runs one request end to end: orientation normalization, mask production,
//! compositing, restore. Each request completes with exactly one result or
//! one error; nothing partial is returned.

use crate::{
    buffer::{CoverageMask, PixelBuffer},
    compositing::{
        orientation::{self, OrientedBuffer},
        select_most_salient, Compositor, Orientation,
    },
    config::CompositeConfig,
    error::Result,
    producer::MaskProducer,
    services::ImageIOService,
    types::{ProcessingMetadata, ProcessingTimings, SegmentationResult, SubjectKind},
};
use image::DynamicImage;
use instant::Instant;
use std::path::Path;
use tracing::{debug, info, instrument, span, Level};

/// Request-level configuration for [`SegmentationProcessor`]
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorConfig {
    /// Thresholds, sampling, workers and output settings
    pub composite: CompositeConfig,
    /// Physically normalize orientation before producing the mask
    pub apply_orientation: bool,
    /// Log mask statistics at info level
    pub debug: bool,
}

impl ProcessorConfig {
    #[must_use]
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::new()
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            composite: CompositeConfig::default(),
            apply_orientation: true,
            debug: false,
        }
    }
}

/// Builder for [`ProcessorConfig`]
#[derive(Debug, Clone)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ProcessorConfig::default(),
        }
    }

    #[must_use]
    pub fn composite(mut self, composite: CompositeConfig) -> Self {
        self.config.composite = composite;
        self
    }

    #[must_use]
    pub fn apply_orientation(mut self, apply: bool) -> Self {
        self.config.apply_orientation = apply;
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    #[must_use]
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.config.composite.worker_threads = threads;
        self
    }

    /// Build the processor configuration
    ///
    /// # Errors
    /// - `InvalidConfig` if the composite settings fail validation
    pub fn build(self) -> Result<ProcessorConfig> {
        self.config.composite.validate()?;
        Ok(self.config)
    }
}

impl Default for ProcessorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs person and object segmentation requests against one mask producer
pub struct SegmentationProcessor {
    config: ProcessorConfig,
    compositor: Compositor,
    producer: Box<dyn MaskProducer>,
}

impl SegmentationProcessor {
    /// Create a processor
    ///
    /// # Errors
    /// - `InvalidConfig` if the composite settings are invalid
    pub fn new(config: ProcessorConfig, producer: Box<dyn MaskProducer>) -> Result<Self> {
        config.composite.validate()?;
        let compositor = Compositor::new(&config.composite)?;
        Ok(Self {
            config,
            compositor,
            producer,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    #[must_use]
    pub fn producer_name(&self) -> &str {
        self.producer.name()
    }

    /// Cut out the person in `image`
    ///
    /// `orientation` is the declared display transform of the stored pixels.
    /// The result is in stored order and tagged with that orientation.
    ///
    /// # Errors
    /// - `InvalidImage` if the pixels cannot be read
    /// - `NoSegmentationMask` if the producer finds no person
    /// - `BufferAllocationFailed`, `MaskAccessFailed` from compositing
    pub fn segment_person(
        &mut self,
        image: &DynamicImage,
        orientation: Orientation,
    ) -> Result<SegmentationResult> {
        self.segment_person_buffer(PixelBuffer::from_dynamic_image(image)?, orientation)
    }

    /// Cut out the most salient object in `image`
    ///
    /// # Errors
    /// - `InvalidImage` if the pixels cannot be read
    /// - `NoSalientObjects` if the producer returns no boxes
    /// - `NoMostSalientObject` if no box has a comparable confidence
    pub fn segment_object(
        &mut self,
        image: &DynamicImage,
        orientation: Orientation,
    ) -> Result<SegmentationResult> {
        self.segment_object_buffer(PixelBuffer::from_dynamic_image(image)?, orientation)
    }

    /// Person path on an encoded image; orientation comes from its EXIF data
    pub fn segment_person_bytes(&mut self, bytes: &[u8]) -> Result<SegmentationResult> {
        let (image, orientation) = ImageIOService::decode_with_orientation(bytes)?;
        self.segment_person(&image, orientation)
    }

    /// Object path on an encoded image; orientation comes from its EXIF data
    pub fn segment_object_bytes(&mut self, bytes: &[u8]) -> Result<SegmentationResult> {
        let (image, orientation) = ImageIOService::decode_with_orientation(bytes)?;
        self.segment_object(&image, orientation)
    }

    /// Person path on an image file
    pub fn segment_person_file<P: AsRef<Path>>(&mut self, path: P) -> Result<SegmentationResult> {
        let (image, orientation) = ImageIOService::load_with_orientation(path)?;
        self.segment_person(&image, orientation)
    }

    /// Object path on an image file
    pub fn segment_object_file<P: AsRef<Path>>(&mut self, path: P) -> Result<SegmentationResult> {
        let (image, orientation) = ImageIOService::load_with_orientation(path)?;
        self.segment_object(&image, orientation)
    }

    /// Person path on raw pixels
    #[instrument(
        skip(self, image),
        fields(
            producer = %self.producer.name(),
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    pub fn segment_person_buffer(
        &mut self,
        image: PixelBuffer,
        orientation: Orientation,
    ) -> Result<SegmentationResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::new();
        info!("Starting person segmentation");

        let canonical = self.normalize(image, orientation, &mut timings)?;

        let mask = {
            let _span = span!(Level::DEBUG, "mask_production", subject = "person").entered();
            let start = Instant::now();
            let mask = self.producer.produce_person_mask(&canonical)?;
            timings.mask_ms = start.elapsed().as_millis() as u64;
            mask
        };

        let composited = {
            let _span = span!(
                Level::DEBUG,
                "compositing",
                mode = "direct_alpha_write",
                workers = self.compositor.workers()
            )
            .entered();
            let start = Instant::now();
            let out = self.compositor.direct_alpha_write(&canonical, &mask)?;
            timings.composite_ms = start.elapsed().as_millis() as u64;
            out
        };

        let restored = self.restore(composited, orientation, &mut timings)?;
        Ok(self.finish(SubjectKind::Person, restored, &mask, timings, total_start))
    }

    /// Object path on raw pixels
    #[instrument(
        skip(self, image),
        fields(
            producer = %self.producer.name(),
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    pub fn segment_object_buffer(
        &mut self,
        image: PixelBuffer,
        orientation: Orientation,
    ) -> Result<SegmentationResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::new();
        info!("Starting object segmentation");

        let canonical = self.normalize(image, orientation, &mut timings)?;
        let (width, height) = canonical.dimensions();

        let best = {
            let _span = span!(Level::DEBUG, "mask_production", subject = "object").entered();
            let start = Instant::now();
            let boxes = self.producer.produce_saliency_boxes(&canonical)?;
            debug!(candidates = boxes.len(), "Received saliency boxes");
            let best = select_most_salient(&boxes)?;
            timings.mask_ms = start.elapsed().as_millis() as u64;
            best
        };
        debug!(?best, "Selected most salient object");

        let (mask, composited) = {
            let _span = span!(
                Level::DEBUG,
                "compositing",
                mode = "masked_blend",
                workers = self.compositor.workers()
            )
            .entered();
            let start = Instant::now();
            let mask = self.compositor.object_mask(&best, width, height)?;
            let out = self.compositor.masked_blend(&canonical, &mask)?;
            timings.composite_ms = start.elapsed().as_millis() as u64;
            (mask, out)
        };

        let restored = self.restore(composited, orientation, &mut timings)?;
        Ok(self.finish(SubjectKind::Object, restored, &mask, timings, total_start))
    }

    fn normalize(
        &self,
        image: PixelBuffer,
        declared: Orientation,
        timings: &mut ProcessingTimings,
    ) -> Result<PixelBuffer> {
        if !self.config.apply_orientation || declared.is_identity() {
            return Ok(image);
        }
        let _span = span!(Level::DEBUG, "orientation", step = "normalize", %declared).entered();
        let start = Instant::now();
        let (canonical, _) = orientation::normalize(image, declared)?;
        timings.orientation_ms += start.elapsed().as_millis() as u64;
        Ok(canonical)
    }

    fn restore(
        &self,
        processed: PixelBuffer,
        declared: Orientation,
        timings: &mut ProcessingTimings,
    ) -> Result<OrientedBuffer> {
        if !self.config.apply_orientation || declared.is_identity() {
            return Ok(OrientedBuffer {
                buffer: processed,
                orientation: declared,
            });
        }
        let _span = span!(Level::DEBUG, "orientation", step = "restore", %declared).entered();
        let start = Instant::now();
        let restored = orientation::restore(processed, declared)?;
        timings.orientation_ms += start.elapsed().as_millis() as u64;
        Ok(restored)
    }

    fn finish(
        &self,
        subject: SubjectKind,
        restored: OrientedBuffer,
        mask: &CoverageMask,
        mut timings: ProcessingTimings,
        total_start: Instant,
    ) -> SegmentationResult {
        let statistics = mask.statistics(self.compositor.classifier());
        if self.config.debug {
            info!(
                background = statistics.background_pixels,
                edge = statistics.edge_pixels,
                foreground = statistics.foreground_pixels,
                subject_ratio = statistics.subject_ratio(),
                "Mask statistics"
            );
        }

        timings.total_ms = total_start.elapsed().as_millis() as u64;
        let mut metadata = ProcessingMetadata::new(subject, self.producer.name());
        metadata.worker_threads = self.compositor.workers();
        metadata.mask_dimensions = mask.dimensions();
        metadata.mask_statistics = statistics;
        metadata.finish(timings);

        info!(
            subject = %subject,
            total_ms = metadata.timings.total_ms,
            "Segmentation completed"
        );
        SegmentationResult::new(restored.buffer, restored.orientation, metadata)
    }
}
