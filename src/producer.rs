//! Mask producer abstraction
//!
//! The segmentation analysis itself runs elsewhere; the engine only consumes
//! its output through this trait.

use crate::{
    buffer::{CoverageMask, PixelBuffer},
    compositing::BoundingBox,
    error::Result,
};

/// Source of coverage masks and saliency boxes
///
/// Producers receive the image in display order (after orientation
/// normalization) and answer in that frame: a mask whose resolution may
/// differ from the image, or boxes normalized to `[0, 1]` with a bottom-left
/// origin.
pub trait MaskProducer: Send {
    /// Short name used in logs and result metadata
    fn name(&self) -> &str;

    /// Per-pixel person coverage for `image`
    ///
    /// # Errors
    /// - `NoSegmentationMask` if no person mask can be produced
    fn produce_person_mask(&mut self, image: &PixelBuffer) -> Result<CoverageMask>;

    /// Candidate salient objects in `image`
    ///
    /// An empty list is valid; the caller reports `NoSalientObjects`.
    ///
    /// # Errors
    /// - Producer-specific failures
    fn produce_saliency_boxes(&mut self, image: &PixelBuffer) -> Result<Vec<BoundingBox>>;
}

impl<P: MaskProducer + ?Sized> MaskProducer for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn produce_person_mask(&mut self, image: &PixelBuffer) -> Result<CoverageMask> {
        (**self).produce_person_mask(image)
    }

    fn produce_saliency_boxes(&mut self, image: &PixelBuffer) -> Result<Vec<BoundingBox>> {
        (**self).produce_saliency_boxes(image)
    }
}
