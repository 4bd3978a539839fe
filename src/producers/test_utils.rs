//! Scripted mask producer for tests
//!
//! `MockMaskProducer` returns masks and boxes chosen up front, records every
//! call with the image size it was given, and can be switched to fail either
//! operation.

use crate::{
    buffer::{CoverageMask, PixelBuffer},
    compositing::BoundingBox,
    error::{Result, SegmentationError},
    producer::MaskProducer,
};
use std::sync::{Arc, Mutex};

/// Which person mask the mock returns
#[derive(Debug, Clone)]
pub enum MockMask {
    /// This exact mask, whatever the image
    Fixed(CoverageMask),
    /// A constant value at the given resolution (`None` = image resolution)
    Uniform { value: u8, size: Option<(u32, u32)> },
    /// Soft disc centered in the image, opaque center fading to 0 at the rim
    Radial,
    /// Luma of the image itself, so the mask follows the pixels under any
    /// rotation or mirroring
    FromLuma,
}

/// Mask producer test double
#[derive(Debug, Clone)]
pub struct MockMaskProducer {
    mask: MockMask,
    boxes: Vec<BoundingBox>,
    call_history: Arc<Mutex<Vec<String>>>,
    should_fail_mask: bool,
    should_fail_boxes: bool,
}

impl MockMaskProducer {
    /// Mock serving a radial mask and no boxes
    #[must_use]
    pub fn new() -> Self {
        Self {
            mask: MockMask::Radial,
            boxes: Vec::new(),
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail_mask: false,
            should_fail_boxes: false,
        }
    }

    #[must_use]
    pub fn with_mask(mask: CoverageMask) -> Self {
        Self::new().mask(MockMask::Fixed(mask))
    }

    /// Constant mask at image resolution
    #[must_use]
    pub fn uniform(value: u8) -> Self {
        Self::new().mask(MockMask::Uniform { value, size: None })
    }

    #[must_use]
    pub fn with_boxes(boxes: Vec<BoundingBox>) -> Self {
        Self::new().boxes(boxes)
    }

    /// Mock whose person mask call fails with `NoSegmentationMask`
    #[must_use]
    pub fn new_failing_mask() -> Self {
        let mut producer = Self::new();
        producer.should_fail_mask = true;
        producer
    }

    /// Mock whose saliency call fails with `Internal`
    #[must_use]
    pub fn new_failing_boxes() -> Self {
        let mut producer = Self::new();
        producer.should_fail_boxes = true;
        producer
    }

    #[must_use]
    pub fn mask(mut self, mask: MockMask) -> Self {
        self.mask = mask;
        self
    }

    #[must_use]
    pub fn boxes(mut self, boxes: Vec<BoundingBox>) -> Self {
        self.boxes = boxes;
        self
    }

    /// Shared handle to the call log, usable after the mock is moved into a
    /// processor
    #[must_use]
    pub fn history_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.call_history)
    }

    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    pub fn clear_call_history(&self) {
        if let Ok(mut history) = self.call_history.lock() {
            history.clear();
        }
    }

    fn record_call(&self, method: &str, image: &PixelBuffer) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(format!("{} {}x{}", method, image.width(), image.height()));
        }
    }

    fn generate_mask(&self, image: &PixelBuffer) -> Result<CoverageMask> {
        let (width, height) = image.dimensions();
        match &self.mask {
            MockMask::Fixed(mask) => Ok(mask.clone()),
            MockMask::Uniform { value, size } => {
                let (w, h) = size.unwrap_or((width, height));
                CoverageMask::filled(w, h, *value)
            },
            MockMask::Radial => {
                let mut mask = CoverageMask::new(width, height)?;
                let center_x = width as f32 / 2.0;
                let center_y = height as f32 / 2.0;
                let radius = (width.min(height) as f32 / 2.0).max(1.0);
                for y in 0..height {
                    for x in 0..width {
                        let dx = x as f32 + 0.5 - center_x;
                        let dy = y as f32 + 0.5 - center_y;
                        let distance = (dx * dx + dy * dy).sqrt();
                        let coverage = ((radius - distance) / radius).clamp(0.0, 1.0);
                        mask.set(x, y, (coverage * 255.0).round() as u8);
                    }
                }
                Ok(mask)
            },
            MockMask::FromLuma => {
                let luma = image::DynamicImage::ImageRgba8(image.to_rgba_image()?).to_luma8();
                CoverageMask::from_luma_image(&luma)
            },
        }
    }
}

impl Default for MockMaskProducer {
    fn default() -> Self {
        Self::new()
    }
}

impl MaskProducer for MockMaskProducer {
    fn name(&self) -> &str {
        "mock"
    }

    fn produce_person_mask(&mut self, image: &PixelBuffer) -> Result<CoverageMask> {
        self.record_call("produce_person_mask", image);
        if self.should_fail_mask {
            return Err(SegmentationError::no_mask("mock producer found no person"));
        }
        self.generate_mask(image)
    }

    fn produce_saliency_boxes(&mut self, image: &PixelBuffer) -> Result<Vec<BoundingBox>> {
        self.record_call("produce_saliency_boxes", image);
        if self.should_fail_boxes {
            return Err(SegmentationError::internal("mock saliency analysis failed"));
        }
        Ok(self.boxes.clone())
    }
}

/// Deterministic image builders for tests and benchmarks
pub mod test_helpers {
    use crate::buffer::PixelBuffer;

    /// RGB gradient: red follows x, green follows y, blue is their mix
    ///
    /// # Panics
    /// If either dimension is zero
    #[must_use]
    pub fn create_test_image(width: u32, height: u32) -> PixelBuffer {
        let mut image = image::RgbImage::new(width, height);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            let r = ((x * 255) / width.max(1)) as u8;
            let g = ((y * 255) / height.max(1)) as u8;
            let b = (((x + y) * 127) / (width + height).max(1)) as u8;
            *pixel = image::Rgb([r, g, b]);
        }
        PixelBuffer::from_rgb_image(&image).expect("test image dimensions must be non-zero")
    }

    /// RGBA image whose every pixel differs from its neighbors, so any
    /// remapping error shows up
    ///
    /// # Panics
    /// If either dimension is zero
    #[must_use]
    pub fn create_unique_pixel_image(width: u32, height: u32) -> PixelBuffer {
        let mut image = image::RgbaImage::new(width, height);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            let index = y * width + x;
            *pixel = image::Rgba([
                (index % 251) as u8,
                (index / 251 % 251) as u8,
                ((x * 7 + y * 13) % 256) as u8,
                u8::MAX,
            ]);
        }
        PixelBuffer::from_rgba_image(&image).expect("test image dimensions must be non-zero")
    }
}
