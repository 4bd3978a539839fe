//! Producer backed by analysis results computed out of process

use crate::{
    buffer::{CoverageMask, PixelBuffer},
    compositing::BoundingBox,
    error::{Result, SegmentationError},
    producer::MaskProducer,
    services::ImageIOService,
};
use std::path::Path;
use tracing::debug;

/// Serves a fixed person mask and/or saliency box set
///
/// The mask is a grayscale image (any resolution) and the boxes a JSON array
/// of `{x, y, width, height, confidence}` objects, both expressed for the
/// source image in display orientation.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedMaskProducer {
    mask: Option<CoverageMask>,
    boxes: Option<Vec<BoundingBox>>,
}

impl PrecomputedMaskProducer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_mask(mut self, mask: CoverageMask) -> Self {
        self.mask = Some(mask);
        self
    }

    #[must_use]
    pub fn with_boxes(mut self, boxes: Vec<BoundingBox>) -> Self {
        self.boxes = Some(boxes);
        self
    }

    /// Producer serving the grayscale mask stored at `path`
    pub fn from_mask_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new().with_mask(ImageIOService::load_mask(path)?))
    }

    /// Producer serving the saliency boxes stored as JSON at `path`
    pub fn from_boxes_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new().with_boxes(read_boxes(path.as_ref())?))
    }

    /// Producer with whichever of the two inputs are given
    pub fn load(mask_path: Option<&Path>, boxes_path: Option<&Path>) -> Result<Self> {
        let mut producer = Self::new();
        if let Some(path) = mask_path {
            producer.mask = Some(ImageIOService::load_mask(path)?);
        }
        if let Some(path) = boxes_path {
            producer.boxes = Some(read_boxes(path)?);
        }
        Ok(producer)
    }

    #[must_use]
    pub fn has_mask(&self) -> bool {
        self.mask.is_some()
    }

    #[must_use]
    pub fn has_boxes(&self) -> bool {
        self.boxes.is_some()
    }
}

fn read_boxes(path: &Path) -> Result<Vec<BoundingBox>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| SegmentationError::file_io_error("read saliency boxes", path, &e))?;
    let boxes: Vec<BoundingBox> = serde_json::from_str(&text).map_err(|e| {
        SegmentationError::invalid_config(format!(
            "malformed saliency boxes in '{}': {}",
            path.display(),
            e
        ))
    })?;
    debug!(count = boxes.len(), path = %path.display(), "Loaded saliency boxes");
    Ok(boxes)
}

impl MaskProducer for PrecomputedMaskProducer {
    fn name(&self) -> &str {
        "precomputed"
    }

    fn produce_person_mask(&mut self, image: &PixelBuffer) -> Result<CoverageMask> {
        let mask = self
            .mask
            .clone()
            .ok_or_else(|| SegmentationError::no_mask("no precomputed person mask was supplied"))?;
        if mask.dimensions() != image.dimensions() {
            debug!(
                mask = %format!("{}x{}", mask.width(), mask.height()),
                image = %format!("{}x{}", image.width(), image.height()),
                "Precomputed mask differs from image resolution"
            );
        }
        Ok(mask)
    }

    fn produce_saliency_boxes(&mut self, _image: &PixelBuffer) -> Result<Vec<BoundingBox>> {
        self.boxes.clone().ok_or(SegmentationError::NoSalientObjects)
    }
}
