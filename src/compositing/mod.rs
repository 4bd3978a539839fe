//! Mask-compositing engine
//!
//! - [`orientation`]: normalize pixels into display order and restore them
//! - [`resample`]: map target pixels onto a mask of another resolution
//! - [`classifier`]: background / edge / foreground classification and the
//!   row-parallel person cutout
//! - [`rasterize`]: saliency box to binary coverage mask
//! - [`blend`]: mask-guided blend against a background for the object path

pub mod blend;
pub mod classifier;
pub mod orientation;
pub mod rasterize;
pub mod resample;

pub use blend::{masked_blend, masked_blend_on, MaskSampling};
pub use classifier::{composite_person, composite_person_on, CoverageClassifier, PixelClass};
pub use orientation::{normalize, restore, OrientedBuffer, Orientation};
pub use rasterize::{rasterize, select_most_salient, BoundingBox, PixelRect};
pub use resample::{resize_nearest, MaskScale};

use crate::{
    buffer::{CoverageMask, PixelBuffer},
    config::CompositeConfig,
    error::{Result, SegmentationError},
};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::debug;

/// Threads that composite rows
///
/// `WorkerPool::new(0)` runs on the global rayon pool; any other count starts
/// a dedicated pool of that size once, and every pass reuses it.
#[derive(Debug, Clone, Default)]
pub struct WorkerPool {
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl WorkerPool {
    /// # Errors
    /// - `Internal` if the worker threads cannot be started
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Ok(Self::default());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("cutout-worker-{}", index))
            .build()
            .map_err(|e| {
                SegmentationError::internal(format!(
                    "failed to start {} compositing workers: {}",
                    workers, e
                ))
            })?;
        debug!(workers, "Started compositing pool");
        Ok(Self {
            pool: Some(Arc::new(pool)),
        })
    }

    /// Configured thread count, 0 for the global pool
    #[must_use]
    pub fn workers(&self) -> usize {
        self.pool
            .as_ref()
            .map_or(0, |pool| pool.current_num_threads())
    }

    /// Run `f(y, row)` over every destination row
    ///
    /// Rows are disjoint mutable slices, so workers never share a write
    /// target.
    pub(crate) fn for_each_row<F>(&self, dest: &mut PixelBuffer, f: F)
    where
        F: Fn(u32, &mut [u8]) + Send + Sync,
    {
        let run = |dest: &mut PixelBuffer| {
            dest.par_rows_mut()
                .enumerate()
                .for_each(|(y, row)| f(y as u32, row));
        };
        match &self.pool {
            Some(pool) => pool.install(|| run(dest)),
            None => run(dest),
        }
    }
}

/// Both compositing modes configured from one [`CompositeConfig`]
#[derive(Debug, Clone)]
pub struct Compositor {
    classifier: CoverageClassifier,
    sampling: MaskSampling,
    pool: WorkerPool,
    background: [u8; 4],
    object_mask_max_side: Option<u32>,
}

impl Compositor {
    /// # Errors
    /// - `InvalidConfig` if the thresholds are out of order
    /// - `Internal` if the worker threads cannot be started
    pub fn new(config: &CompositeConfig) -> Result<Self> {
        Ok(Self {
            classifier: CoverageClassifier::from_config(config)?,
            sampling: config.object_mask_sampling,
            pool: WorkerPool::new(config.worker_threads)?,
            background: config.background_color,
            object_mask_max_side: config.object_mask_max_side,
        })
    }

    #[must_use]
    pub fn classifier(&self) -> &CoverageClassifier {
        &self.classifier
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.pool.workers()
    }

    /// Person path: fresh RGBA cutout with edge-blended alpha
    pub fn direct_alpha_write(&self, image: &PixelBuffer, mask: &CoverageMask) -> Result<PixelBuffer> {
        composite_person_on(image, mask, &self.classifier, &self.pool)
    }

    /// Rasterize `bbox` for an image of the given size
    ///
    /// With `object_mask_max_side` set, the mask is rasterized at a reduced
    /// resolution whose longer side fits the limit and is resampled during the
    /// blend.
    pub fn object_mask(&self, bbox: &BoundingBox, image_width: u32, image_height: u32) -> Result<CoverageMask> {
        let (mask_width, mask_height) = match self.object_mask_max_side {
            Some(max_side) => fit_within(image_width, image_height, max_side),
            None => (image_width, image_height),
        };
        debug!(
            mask_width,
            mask_height,
            image_width,
            image_height,
            "Object mask resolution"
        );
        rasterize(bbox, mask_width, mask_height)
    }

    /// Object path: blend `image` over the configured solid background
    pub fn masked_blend(&self, image: &PixelBuffer, mask: &CoverageMask) -> Result<PixelBuffer> {
        let background = PixelBuffer::solid(image.width(), image.height(), self.background)?;
        masked_blend_on(image, mask, &background, self.sampling, &self.pool)
    }
}

/// Largest size with the same aspect ratio whose longer side is `max_side`
fn fit_within(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    let longer = width.max(height);
    if max_side == 0 || longer <= max_side {
        return (width, height);
    }
    let ratio = f64::from(max_side) / f64::from(longer);
    let scaled = |v: u32| ((f64::from(v) * ratio).round() as u32).max(1);
    (scaled(width), scaled(height))
}
