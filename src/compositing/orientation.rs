//! Orientation normalization
//!
//! Pixels are physically remapped into display order ("top-left origin, no
//! rotation or mirroring") before a mask is produced and applied, and remapped
//! back into the source's stored order afterwards. The declared orientation
//! travels with the result as metadata.

use crate::{
    buffer::PixelBuffer,
    error::{Result, SegmentationError},
};
use serde::{Deserialize, Serialize};

/// How stored pixels must be transformed for display
///
/// Discriminants match the EXIF Orientation tag (TIFF tag 274).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum Orientation {
    /// Stored upright.
    #[default]
    Normal = 1,
    /// Mirrored left-right.
    FlipHorizontal = 2,
    /// Rotated 180 degrees.
    Rotate180 = 3,
    /// Mirrored top-bottom.
    FlipVertical = 4,
    /// Mirrored across the main diagonal.
    Transpose = 5,
    /// Needs a 90 degree clockwise turn.
    Rotate90 = 6,
    /// Mirrored across the anti-diagonal.
    Transverse = 7,
    /// Needs a 90 degree counter-clockwise turn.
    Rotate270 = 8,
}

impl Orientation {
    /// All eight orientations in EXIF order
    pub const ALL: [Orientation; 8] = [
        Self::Normal,
        Self::FlipHorizontal,
        Self::Rotate180,
        Self::FlipVertical,
        Self::Transpose,
        Self::Rotate90,
        Self::Transverse,
        Self::Rotate270,
    ];

    /// Orientation for an EXIF tag value; unknown values read as `Normal`
    #[must_use]
    pub fn from_exif(value: u32) -> Self {
        match value {
            2 => Self::FlipHorizontal,
            3 => Self::Rotate180,
            4 => Self::FlipVertical,
            5 => Self::Transpose,
            6 => Self::Rotate90,
            7 => Self::Transverse,
            8 => Self::Rotate270,
            _ => Self::Normal,
        }
    }

    #[must_use]
    pub fn exif_value(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub fn is_identity(self) -> bool {
        matches!(self, Self::Normal)
    }

    /// True for the four orientations that exchange width and height
    #[must_use]
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Self::Transpose | Self::Rotate90 | Self::Transverse | Self::Rotate270
        )
    }

    /// Display dimensions for a buffer stored as `width` x `height`
    #[must_use]
    pub fn display_dimensions(self, width: u32, height: u32) -> (u32, u32) {
        if self.swaps_dimensions() {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// The transform that undoes this one
    #[must_use]
    pub fn inverse(self) -> Self {
        match self {
            Self::Rotate90 => Self::Rotate270,
            Self::Rotate270 => Self::Rotate90,
            other => other,
        }
    }

    /// Stored coordinate shown at display coordinate `(x, y)`
    ///
    /// `width` and `height` are the stored dimensions. For `Rotate90` the
    /// display pixel `(x, y)` reads stored `(y, height - 1 - x)`. Coordinates
    /// are clamped to the stored bounds.
    #[must_use]
    pub fn source_coordinate(self, x: u32, y: u32, width: u32, height: u32) -> (u32, u32) {
        let max_x = width.saturating_sub(1);
        let max_y = height.saturating_sub(1);
        let (sx, sy) = match self {
            Self::Normal => (x, y),
            Self::FlipHorizontal => (max_x.saturating_sub(x), y),
            Self::Rotate180 => (max_x.saturating_sub(x), max_y.saturating_sub(y)),
            Self::FlipVertical => (x, max_y.saturating_sub(y)),
            Self::Transpose => (y, x),
            Self::Rotate90 => (y, max_y.saturating_sub(x)),
            Self::Transverse => (max_x.saturating_sub(y), max_y.saturating_sub(x)),
            Self::Rotate270 => (max_x.saturating_sub(y), x),
        };
        (sx.min(max_x), sy.min(max_y))
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Normal => "normal",
            Self::FlipHorizontal => "flip-horizontal",
            Self::Rotate180 => "rotate-180",
            Self::FlipVertical => "flip-vertical",
            Self::Transpose => "transpose",
            Self::Rotate90 => "rotate-90",
            Self::Transverse => "transverse",
            Self::Rotate270 => "rotate-270",
        };
        write!(f, "{} ({})", name, self.exif_value())
    }
}

/// A pixel buffer tagged with the orientation to apply on display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrientedBuffer {
    pub buffer: PixelBuffer,
    pub orientation: Orientation,
}

/// Remap `image` into display order
///
/// Returns the canonical buffer together with the declared orientation so the
/// caller can hand both to [`restore`] later.
///
/// # Errors
/// - `BufferAllocationFailed` if the remapped buffer cannot be allocated
pub fn normalize(image: PixelBuffer, declared: Orientation) -> Result<(PixelBuffer, Orientation)> {
    Ok((apply(image, declared)?, declared))
}

/// Return processed display-order pixels to the source's stored order and tag
/// them with `declared`
///
/// `restore(normalize(img, o).0, o)` reproduces `img` exactly.
///
/// # Errors
/// - `BufferAllocationFailed` if the remapped buffer cannot be allocated
pub fn restore(processed: PixelBuffer, declared: Orientation) -> Result<OrientedBuffer> {
    Ok(OrientedBuffer {
        buffer: apply(processed, declared.inverse())?,
        orientation: declared,
    })
}

/// Physically apply `orientation` to `image`, producing display order
pub(crate) fn apply(image: PixelBuffer, orientation: Orientation) -> Result<PixelBuffer> {
    if orientation.is_identity() {
        return Ok(image);
    }

    let (width, height) = image.dimensions();
    let (out_width, out_height) = orientation.display_dimensions(width, height);
    let mut out = PixelBuffer::new(out_width, out_height, image.layout())?;

    for y in 0..out_height {
        for x in 0..out_width {
            let (sx, sy) = orientation.source_coordinate(x, y, width, height);
            let src = image.pixel(sx, sy).ok_or_else(|| {
                SegmentationError::internal(format!(
                    "orientation {} mapped ({}, {}) outside {}x{}",
                    orientation, x, y, width, height
                ))
            })?;
            if let Some(dst) = out.pixel_mut(x, y) {
                dst.copy_from_slice(src);
            }
        }
    }

    Ok(out)
}
