//! Mask-guided blend of a source image over a background
//!
//! Used by the object path, where the mask is a rasterized saliency box that
//! may have been produced below image resolution. Output is
//! `source * m + background * (1 - m)` per channel with `m` the sampled
//! coverage in `[0, 1]`; for a binary mask that is a plain select.

use super::{
    resample::{self, MaskScale},
    WorkerPool,
};
use crate::{
    buffer::{ChannelLayout, CoverageMask, PixelBuffer},
    error::{Result, SegmentationError},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// How the mask is read when its resolution differs from the image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskSampling {
    /// Nearest mask pixel; a binary mask gives hard edges
    #[default]
    Nearest,
    /// Interpolated mask; edges ramp smoothly between source and background
    Bilinear,
}

impl std::fmt::Display for MaskSampling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nearest => write!(f, "nearest"),
            Self::Bilinear => write!(f, "bilinear"),
        }
    }
}

/// Blend `source` over `background` under `mask`
///
/// `background` must match the source dimensions and carry color. Mask
/// samples that fall outside the mask select the background.
///
/// # Errors
/// - `InvalidImage` for color-less inputs or mismatched background size
/// - `BufferAllocationFailed` if the destination cannot be allocated
/// - `MaskAccessFailed` if the mask cannot be locked for reading
#[instrument(
    skip(source, mask, background, pool),
    fields(
        image = %format!("{}x{}", source.width(), source.height()),
        mask = %format!("{}x{}", mask.width(), mask.height())
    )
)]
pub fn masked_blend_on(
    source: &PixelBuffer,
    mask: &CoverageMask,
    background: &PixelBuffer,
    sampling: MaskSampling,
    pool: &WorkerPool,
) -> Result<PixelBuffer> {
    if !source.layout().has_color() || !background.layout().has_color() {
        return Err(SegmentationError::invalid_image(format!(
            "cannot blend {} over {}",
            source.layout(),
            background.layout()
        )));
    }
    if source.dimensions() != background.dimensions() {
        return Err(SegmentationError::invalid_image(format!(
            "background is {}x{}, image is {}x{}",
            background.width(),
            background.height(),
            source.width(),
            source.height()
        )));
    }

    let (width, height) = source.dimensions();
    let mut dest = PixelBuffer::new(width, height, ChannelLayout::Rgba)?;
    let guard = mask.lock_for_read()?;
    let scale = MaskScale::between((width, height), guard.dimensions())?;

    pool.for_each_row(&mut dest, |y, dst_row| {
        let (Some(src_row), Some(bg_row)) = (source.row(y), background.row(y)) else {
            return;
        };
        let src_pixels = src_row.chunks_exact(source.bytes_per_pixel());
        let bg_pixels = bg_row.chunks_exact(background.bytes_per_pixel());
        let pixels = dst_row.chunks_exact_mut(4).zip(src_pixels.zip(bg_pixels));

        for (x, (dst, (src, bg))) in (0..width).zip(pixels) {
            let weight = match sampling {
                MaskSampling::Nearest => resample::sample(&guard, x, y, scale)
                    .map_or(0.0, |v| f32::from(v) / 255.0),
                MaskSampling::Bilinear => resample::sample_bilinear(&guard, x, y, scale),
            };
            mix(dst, rgba(src), rgba(bg), weight);
        }
    });

    Ok(dest)
}

/// [`masked_blend_on`] with `workers` threads started for this call
///
/// 0 uses every core.
pub fn masked_blend(
    source: &PixelBuffer,
    mask: &CoverageMask,
    background: &PixelBuffer,
    sampling: MaskSampling,
    workers: usize,
) -> Result<PixelBuffer> {
    masked_blend_on(source, mask, background, sampling, &WorkerPool::new(workers)?)
}

fn rgba(pixel: &[u8]) -> [u8; 4] {
    match pixel {
        [r, g, b, a, ..] => [*r, *g, *b, *a],
        [r, g, b] => [*r, *g, *b, u8::MAX],
        _ => [0; 4],
    }
}

fn mix(dst: &mut [u8], src: [u8; 4], bg: [u8; 4], weight: f32) {
    let weight = weight.clamp(0.0, 1.0);
    for ((d, s), b) in dst.iter_mut().zip(src).zip(bg) {
        let value = f32::from(s) * weight + f32::from(b) * (1.0 - weight);
        *d = value.round().clamp(0.0, 255.0) as u8;
    }
}
