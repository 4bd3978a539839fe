//! Coverage classification and edge alpha blending
//!
//! A mask value below `person_threshold` is background, a value at or above
//! `high_confidence_threshold` is opaque foreground, and the band between is
//! an anti-aliased edge with a linear alpha ramp.

use super::{
    resample::{self, MaskScale},
    WorkerPool,
};
use crate::{
    buffer::{ChannelLayout, CoverageMask, PixelBuffer},
    config::CompositeConfig,
    error::{Result, SegmentationError},
};
use tracing::{debug, instrument};

/// Classification of a single mask value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelClass {
    /// Fully transparent
    Background,
    /// Source color with the given partial alpha
    Edge(u8),
    /// Source color, fully opaque
    Foreground,
}

impl PixelClass {
    #[must_use]
    pub fn alpha(self) -> u8 {
        match self {
            Self::Background => 0,
            Self::Edge(alpha) => alpha,
            Self::Foreground => u8::MAX,
        }
    }
}

/// Threshold classifier for coverage values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageClassifier {
    person_threshold: u8,
    high_confidence_threshold: u8,
    edge_blend_factor: f32,
}

impl CoverageClassifier {
    pub const DEFAULT_PERSON_THRESHOLD: u8 = 128;
    pub const DEFAULT_HIGH_CONFIDENCE_THRESHOLD: u8 = 220;
    pub const DEFAULT_EDGE_BLEND_FACTOR: f32 = 1.5;

    /// Create a classifier
    ///
    /// # Errors
    /// - `InvalidConfig` unless `person_threshold < high_confidence_threshold`
    ///   and `edge_blend_factor` is finite and non-negative
    pub fn new(
        person_threshold: u8,
        high_confidence_threshold: u8,
        edge_blend_factor: f32,
    ) -> Result<Self> {
        if person_threshold >= high_confidence_threshold {
            return Err(SegmentationError::config_value_error(
                "person threshold",
                person_threshold,
                &format!("0-{}", high_confidence_threshold.saturating_sub(1)),
                Some(Self::DEFAULT_PERSON_THRESHOLD),
            ));
        }
        if !edge_blend_factor.is_finite() || edge_blend_factor < 0.0 {
            return Err(SegmentationError::config_value_error(
                "edge blend factor",
                edge_blend_factor,
                "finite and >= 0",
                Some(Self::DEFAULT_EDGE_BLEND_FACTOR),
            ));
        }
        Ok(Self {
            person_threshold,
            high_confidence_threshold,
            edge_blend_factor,
        })
    }

    /// Build a classifier from the thresholds of a composite configuration
    pub fn from_config(config: &CompositeConfig) -> Result<Self> {
        Self::new(
            config.person_threshold,
            config.high_confidence_threshold,
            config.edge_blend_factor,
        )
    }

    #[must_use]
    pub fn person_threshold(&self) -> u8 {
        self.person_threshold
    }

    #[must_use]
    pub fn high_confidence_threshold(&self) -> u8 {
        self.high_confidence_threshold
    }

    #[must_use]
    pub fn edge_blend_factor(&self) -> f32 {
        self.edge_blend_factor
    }

    /// Classify one coverage value
    #[must_use]
    pub fn classify(&self, value: u8) -> PixelClass {
        if value < self.person_threshold {
            PixelClass::Background
        } else if value >= self.high_confidence_threshold {
            PixelClass::Foreground
        } else {
            let ramp = f32::from(value - self.person_threshold) * self.edge_blend_factor;
            PixelClass::Edge(ramp.round().clamp(0.0, 255.0) as u8)
        }
    }
}

impl Default for CoverageClassifier {
    fn default() -> Self {
        Self {
            person_threshold: Self::DEFAULT_PERSON_THRESHOLD,
            high_confidence_threshold: Self::DEFAULT_HIGH_CONFIDENCE_THRESHOLD,
            edge_blend_factor: Self::DEFAULT_EDGE_BLEND_FACTOR,
        }
    }
}

/// Write a fresh straight-alpha RGBA cutout of `image` under `mask`
///
/// The mask may have any resolution; it is resampled per axis with
/// nearest-neighbor sampling. Background pixels stay zero. Rows are split
/// across the threads of `pool`; the output does not depend on the worker
/// count.
///
/// # Errors
/// - `InvalidImage` if `image` carries no color channels
/// - `BufferAllocationFailed` if the destination cannot be allocated
/// - `MaskAccessFailed` if the mask cannot be locked for reading
#[instrument(
    skip(image, mask, classifier, pool),
    fields(
        image = %format!("{}x{}", image.width(), image.height()),
        mask = %format!("{}x{}", mask.width(), mask.height())
    )
)]
pub fn composite_person_on(
    image: &PixelBuffer,
    mask: &CoverageMask,
    classifier: &CoverageClassifier,
    pool: &WorkerPool,
) -> Result<PixelBuffer> {
    if !image.layout().has_color() {
        return Err(SegmentationError::invalid_image(format!(
            "cannot composite a {} buffer",
            image.layout()
        )));
    }

    let (width, height) = image.dimensions();
    let mut dest = PixelBuffer::new(width, height, ChannelLayout::Rgba)?;
    let guard = mask.lock_for_read()?;
    let scale = MaskScale::between((width, height), guard.dimensions())?;
    if !scale.is_identity() {
        debug!(
            scale_x = scale.scale_x,
            scale_y = scale.scale_y,
            "Resampling coverage mask onto image grid"
        );
    }

    let src_bpp = image.bytes_per_pixel();
    pool.for_each_row(&mut dest, |y, dst_row| {
        let Some(src_row) = image.row(y) else {
            return;
        };
        let pixels = dst_row
            .chunks_exact_mut(4)
            .zip(src_row.chunks_exact(src_bpp))
            .take(width as usize);
        for (x, (dst, src)) in (0..width).zip(pixels) {
            let Some(value) = resample::sample(&guard, x, y, scale) else {
                continue;
            };
            match classifier.classify(value) {
                PixelClass::Background => {},
                class => write_rgba(dst, src, class.alpha()),
            }
        }
    });

    Ok(dest)
}

/// [`composite_person_on`] with `workers` threads started for this call
///
/// 0 uses every core. Callers compositing repeatedly should keep a
/// [`WorkerPool`] instead.
pub fn composite_person(
    image: &PixelBuffer,
    mask: &CoverageMask,
    classifier: &CoverageClassifier,
    workers: usize,
) -> Result<PixelBuffer> {
    composite_person_on(image, mask, classifier, &WorkerPool::new(workers)?)
}

/// Copy the first three source channels and set alpha
fn write_rgba(dst: &mut [u8], src: &[u8], alpha: u8) {
    if let ([dr, dg, db, da], [r, g, b, ..]) = (dst, src) {
        *dr = *r;
        *dg = *g;
        *db = *b;
        *da = alpha;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> PixelBuffer {
        let mut image = PixelBuffer::new(width, height, ChannelLayout::Rgb).unwrap();
        for y in 0..height {
            for x in 0..width {
                let px = image.pixel_mut(x, y).unwrap();
                px.copy_from_slice(&[(x * 10) as u8, (y * 10) as u8, 77]);
            }
        }
        image
    }

    #[test]
    fn test_default_thresholds() {
        let classifier = CoverageClassifier::default();
        assert_eq!(classifier.person_threshold(), 128);
        assert_eq!(classifier.high_confidence_threshold(), 220);
        assert!((classifier.edge_blend_factor() - 1.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_threshold_order_is_enforced() {
        assert!(CoverageClassifier::new(128, 128, 1.5).is_err());
        assert!(CoverageClassifier::new(200, 100, 1.5).is_err());
        assert!(CoverageClassifier::new(0, 255, 1.5).is_ok());
        assert!(CoverageClassifier::new(10, 20, f32::NAN).is_err());
        assert!(CoverageClassifier::new(10, 20, -1.0).is_err());
    }

    #[test]
    fn test_classify_bands() {
        let classifier = CoverageClassifier::default();
        assert_eq!(classifier.classify(0), PixelClass::Background);
        assert_eq!(classifier.classify(127), PixelClass::Background);
        assert_eq!(classifier.classify(128), PixelClass::Edge(0));
        assert_eq!(classifier.classify(129), PixelClass::Edge(2));
        assert_eq!(classifier.classify(200), PixelClass::Edge(108));
        assert_eq!(classifier.classify(219), PixelClass::Edge(137));
        assert_eq!(classifier.classify(220), PixelClass::Foreground);
        assert_eq!(classifier.classify(255), PixelClass::Foreground);
    }

    #[test]
    fn test_edge_ramp_clamps_at_opaque() {
        let classifier = CoverageClassifier::new(0, 255, 4.0).unwrap();
        assert_eq!(classifier.classify(100), PixelClass::Edge(255));
    }

    #[test]
    fn test_composite_bands() {
        let image = gradient(4, 1);
        let mask = CoverageMask::from_raw(4, 1, vec![10, 150, 230, 255]).unwrap();
        let out = composite_person(&image, &mask, &CoverageClassifier::default(), 1).unwrap();

        assert_eq!(out.layout(), ChannelLayout::Rgba);
        assert_eq!(out.pixel(0, 0).unwrap(), &[0, 0, 0, 0]);
        assert_eq!(out.pixel(1, 0).unwrap(), &[10, 0, 77, 33]);
        assert_eq!(out.pixel(2, 0).unwrap(), &[20, 0, 77, 255]);
        assert_eq!(out.pixel(3, 0).unwrap(), &[30, 0, 77, 255]);
        assert!(!mask.is_locked());
    }

    #[test]
    fn test_composite_resamples_smaller_mask() {
        let image = gradient(4, 4);
        let mask = CoverageMask::from_raw(2, 2, vec![0, 255, 255, 0]).unwrap();
        let out = composite_person(&image, &mask, &CoverageClassifier::default(), 2).unwrap();
        for y in 0..4 {
            for x in 0..4 {
                let expected_opaque = (x >= 2) != (y >= 2);
                let alpha = out.pixel(x, y).unwrap()[3];
                assert_eq!(alpha == 255, expected_opaque, "pixel ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn test_composite_rejects_coverage_source() {
        let image = PixelBuffer::new(2, 2, ChannelLayout::Coverage).unwrap();
        let mask = CoverageMask::filled(2, 2, 255).unwrap();
        let err = composite_person(&image, &mask, &CoverageClassifier::default(), 1).unwrap_err();
        assert!(matches!(err, SegmentationError::InvalidImage(_)));
    }
}
