//! Bounding-box mask rasterization for the object path
//!
//! Saliency boxes arrive normalized to `[0, 1]` with the y axis measured from
//! the bottom edge. They are flipped to a top-left origin and filled as a hard
//! edged rectangle: the upstream signal is only a box, not a pixel mask.

use crate::{
    buffer::CoverageMask,
    error::{Result, SegmentationError},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Normalized, bottom-left origin rectangle with a confidence score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub confidence: f32,
}

impl BoundingBox {
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64, confidence: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence,
        }
    }

    /// Whether every coordinate lies in `[0, 1]` and the box stays inside
    #[must_use]
    pub fn is_normalized(&self) -> bool {
        let unit = 0.0..=1.0;
        unit.contains(&self.x)
            && unit.contains(&self.y)
            && unit.contains(&self.width)
            && unit.contains(&self.height)
            && self.x + self.width <= 1.0
            && self.y + self.height <= 1.0
    }

    /// Pixel rectangle in top-left origin, clamped to the image
    #[must_use]
    pub fn to_pixel_rect(&self, image_width: u32, image_height: u32) -> PixelRect {
        let w = f64::from(image_width);
        let h = f64::from(image_height);
        let px = self.x * w;
        let py = (1.0 - self.y - self.height) * h;
        let pw = self.width * w;
        let ph = self.height * h;

        PixelRect {
            left: clamp_edge(px, image_width),
            top: clamp_edge(py, image_height),
            right: clamp_edge(px + pw, image_width),
            bottom: clamp_edge(py + ph, image_height),
        }
    }
}

fn clamp_edge(value: f64, max: u32) -> u32 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, f64::from(max)) as u32
}

/// Half-open pixel rectangle `[left, right) x [top, bottom)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl PixelRect {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        (self.left..self.right).contains(&x) && (self.top..self.bottom).contains(&y)
    }

    #[must_use]
    pub fn area(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            u64::from(self.right - self.left) * u64::from(self.bottom - self.top)
        }
    }
}

/// Rasterize `bbox` into a binary coverage mask of the given size
///
/// Pixels inside the rectangle are 255, all others 0.
///
/// # Errors
/// - `BufferAllocationFailed` if the mask cannot be allocated
pub fn rasterize(bbox: &BoundingBox, image_width: u32, image_height: u32) -> Result<CoverageMask> {
    let mut mask = CoverageMask::new(image_width, image_height)?;
    let rect = bbox.to_pixel_rect(image_width, image_height);
    debug!(?rect, width = image_width, height = image_height, "Rasterizing saliency box");

    if rect.is_empty() {
        return Ok(mask);
    }
    for row in mask
        .rows_mut()
        .skip(rect.top as usize)
        .take((rect.bottom - rect.top) as usize)
    {
        if let Some(span) = row.get_mut(rect.left as usize..rect.right as usize) {
            span.fill(u8::MAX);
        }
    }

    Ok(mask)
}

/// Pick the box with the highest confidence
///
/// Ties keep the first box. Boxes whose confidence is NaN never win.
///
/// # Errors
/// - `NoSalientObjects` for an empty set
/// - `NoMostSalientObject` when no confidence can be compared
pub fn select_most_salient(boxes: &[BoundingBox]) -> Result<BoundingBox> {
    if boxes.is_empty() {
        return Err(SegmentationError::NoSalientObjects);
    }

    boxes
        .iter()
        .filter(|b| !b.confidence.is_nan())
        .fold(None::<&BoundingBox>, |best, candidate| match best {
            Some(current) if current.confidence >= candidate.confidence => Some(current),
            _ => Some(candidate),
        })
        .copied()
        .ok_or(SegmentationError::NoMostSalientObject {
            candidates: boxes.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_rect_flips_y_axis() {
        let bbox = BoundingBox::new(0.1, 0.0, 0.2, 0.25, 1.0);
        let rect = bbox.to_pixel_rect(100, 200);
        assert_eq!(
            rect,
            PixelRect {
                left: 10,
                top: 150,
                right: 30,
                bottom: 200,
            }
        );
        assert_eq!(rect.area(), 20 * 50);
    }

    #[test]
    fn test_rasterize_centered_box() {
        let bbox = BoundingBox::new(0.25, 0.25, 0.5, 0.5, 0.9);
        let mask = rasterize(&bbox, 100, 100).unwrap();
        let guard = mask.lock_for_read().unwrap();
        for y in 0..100 {
            for x in 0..100 {
                let inside = (25..=74).contains(&x) && (25..=74).contains(&y);
                let expected = if inside { 255 } else { 0 };
                assert_eq!(guard.value(x, y), Some(expected), "pixel ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn test_rasterize_clamps_to_bounds() {
        let bbox = BoundingBox::new(0.8, -0.1, 0.5, 0.5, 0.5);
        let rect = bbox.to_pixel_rect(10, 10);
        assert_eq!(rect.right, 10);
        assert_eq!(rect.bottom, 10);
        let mask = rasterize(&bbox, 10, 10).unwrap();
        let stats = mask.statistics(&crate::compositing::CoverageClassifier::default());
        assert_eq!(stats.foreground_pixels as u64, rect.area());
    }

    #[test]
    fn test_rasterize_degenerate_box_is_empty() {
        let bbox = BoundingBox::new(0.5, 0.5, 0.0, 0.3, 0.5);
        let mask = rasterize(&bbox, 8, 8).unwrap();
        let guard = mask.lock_for_read().unwrap();
        assert!((0..8).all(|y| (0..8).all(|x| guard.value(x, y) == Some(0))));

        let nan = BoundingBox::new(f64::NAN, 0.0, 0.5, 0.5, 0.5);
        assert!(nan.to_pixel_rect(8, 8).left == 0);
    }

    #[test]
    fn test_is_normalized() {
        assert!(BoundingBox::new(0.0, 0.0, 1.0, 1.0, 0.0).is_normalized());
        assert!(!BoundingBox::new(0.6, 0.0, 0.5, 0.5, 0.0).is_normalized());
        assert!(!BoundingBox::new(-0.1, 0.0, 0.5, 0.5, 0.0).is_normalized());
    }

    #[test]
    fn test_select_most_salient() {
        let boxes = [
            BoundingBox::new(0.0, 0.0, 0.1, 0.1, 0.3),
            BoundingBox::new(0.1, 0.1, 0.2, 0.2, 0.8),
            BoundingBox::new(0.2, 0.2, 0.3, 0.3, 0.8),
            BoundingBox::new(0.3, 0.3, 0.4, 0.4, f32::NAN),
        ];
        let best = select_most_salient(&boxes).unwrap();
        assert_eq!(best, boxes[1]);
    }

    #[test]
    fn test_select_most_salient_failures() {
        assert!(matches!(
            select_most_salient(&[]),
            Err(SegmentationError::NoSalientObjects)
        ));

        let undecidable = [
            BoundingBox::new(0.0, 0.0, 0.1, 0.1, f32::NAN),
            BoundingBox::new(0.1, 0.1, 0.1, 0.1, f32::NAN),
        ];
        assert!(matches!(
            select_most_salient(&undecidable),
            Err(SegmentationError::NoMostSalientObject { candidates: 2 })
        ));
    }

    #[test]
    fn test_boxes_deserialize_from_json() {
        let json = r#"[{"x":0.1,"y":0.2,"width":0.3,"height":0.4,"confidence":0.9},
                       {"x":0.0,"y":0.0,"width":1.0,"height":1.0}]"#;
        let boxes: Vec<BoundingBox> = serde_json::from_str(json).unwrap();
        assert_eq!(boxes.len(), 2);
        assert!((boxes[0].confidence - 0.9).abs() < f32::EPSILON);
        assert_eq!(boxes[1].confidence, 0.0);
    }
}
