//! Mask resampling onto a target pixel grid
//!
//! Each axis has its own scale factor, `target / mask`. Nearest sampling maps
//! target `(x, y)` to mask `(floor(x / scale_x), floor(y / scale_y))` and fails
//! closed: a coordinate that lands outside the mask yields `None`, which
//! callers treat as background.

use crate::{
    buffer::{CoverageMask, MaskReadGuard},
    error::{Result, SegmentationError},
};

/// Per-axis scale factors from mask space to target space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskScale {
    pub scale_x: f64,
    pub scale_y: f64,
}

impl MaskScale {
    pub const IDENTITY: MaskScale = MaskScale {
        scale_x: 1.0,
        scale_y: 1.0,
    };

    /// Scale factors that stretch a `mask` sized grid over a `target` sized one
    ///
    /// # Errors
    /// - `MaskAccessFailed` when either size is empty
    pub fn between(target: (u32, u32), mask: (u32, u32)) -> Result<Self> {
        if target.0 == 0 || target.1 == 0 || mask.0 == 0 || mask.1 == 0 {
            return Err(SegmentationError::mask_access(format!(
                "cannot map a {}x{} mask onto a {}x{} image",
                mask.0, mask.1, target.0, target.1
            )));
        }
        Ok(Self {
            scale_x: f64::from(target.0) / f64::from(mask.0),
            scale_y: f64::from(target.1) / f64::from(mask.1),
        })
    }

    #[must_use]
    pub fn is_identity(&self) -> bool {
        (self.scale_x - 1.0).abs() < f64::EPSILON && (self.scale_y - 1.0).abs() < f64::EPSILON
    }
}

/// Nearest-neighbor coverage for target pixel `(x, y)`
///
/// Returns `None` when the mapped coordinate falls outside the mask or a scale
/// factor is not a positive number.
#[must_use]
pub fn sample(mask: &MaskReadGuard<'_>, x: u32, y: u32, scale: MaskScale) -> Option<u8> {
    let mx = map_axis(x, scale.scale_x, mask.width())?;
    let my = map_axis(y, scale.scale_y, mask.height())?;
    mask.value(mx, my)
}

fn map_axis(coordinate: u32, scale: f64, extent: u32) -> Option<u32> {
    if !(scale.is_finite() && scale > 0.0) {
        return None;
    }
    let mapped = (f64::from(coordinate) / scale).floor();
    if mapped >= 0.0 && mapped < f64::from(extent) {
        Some(mapped as u32)
    } else {
        None
    }
}

/// Continuous coverage for target pixel `(x, y)` in `[0, 1]`
///
/// Pixel centers are aligned between the two grids and the four surrounding
/// mask values are interpolated. Coordinates are clamped to the mask, so the
/// border value extends outward.
#[must_use]
pub fn sample_bilinear(mask: &MaskReadGuard<'_>, x: u32, y: u32, scale: MaskScale) -> f32 {
    if !(scale.scale_x.is_finite() && scale.scale_x > 0.0)
        || !(scale.scale_y.is_finite() && scale.scale_y > 0.0)
    {
        return 0.0;
    }

    let max_x = f64::from(mask.width().saturating_sub(1));
    let max_y = f64::from(mask.height().saturating_sub(1));
    let fx = ((f64::from(x) + 0.5) / scale.scale_x - 0.5).clamp(0.0, max_x);
    let fy = ((f64::from(y) + 0.5) / scale.scale_y - 0.5).clamp(0.0, max_y);

    let x0 = fx.floor() as u32;
    let y0 = fy.floor() as u32;
    let x1 = (x0 + 1).min(mask.width() - 1);
    let y1 = (y0 + 1).min(mask.height() - 1);
    let tx = fx - f64::from(x0);
    let ty = fy - f64::from(y0);

    let at = |mx: u32, my: u32| f64::from(mask.value(mx, my).unwrap_or(0));
    let top = at(x0, y0) * (1.0 - tx) + at(x1, y0) * tx;
    let bottom = at(x0, y1) * (1.0 - tx) + at(x1, y1) * tx;

    ((top * (1.0 - ty) + bottom * ty) / 255.0) as f32
}

/// Resample `mask` to `width` x `height` with nearest-neighbor sampling
///
/// # Errors
/// - `BufferAllocationFailed` if the output mask cannot be allocated
/// - `MaskAccessFailed` if `mask` cannot be read
pub fn resize_nearest(mask: &CoverageMask, width: u32, height: u32) -> Result<CoverageMask> {
    let mut out = CoverageMask::new(width, height)?;
    let guard = mask.lock_for_read()?;
    let scale = MaskScale::between((width, height), guard.dimensions())?;

    for (y, row) in (0..height).zip(out.rows_mut()) {
        for (x, value) in (0..width).zip(row.iter_mut()) {
            *value = sample(&guard, x, y, scale).unwrap_or(0);
        }
    }

    Ok(out)
}
