//! Owned, stride-aware pixel buffers and coverage masks
//!
//! Every access goes through range-checked accessors. Row-parallel writers get
//! disjoint `&mut [u8]` row slices from [`PixelBuffer::par_rows_mut`], so no
//! offset arithmetic is ever shared between threads.

use crate::{
    compositing::{CoverageClassifier, PixelClass},
    error::{Result, SegmentationError},
};
use image::{DynamicImage, GenericImageView, GrayImage, ImageBuffer, RgbImage, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Channel layout of a [`PixelBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelLayout {
    /// 8-bit RGB, 3 bytes per pixel
    Rgb,
    /// 8-bit straight-alpha RGBA, 4 bytes per pixel
    Rgba,
    /// 8-bit premultiplied RGBA, 4 bytes per pixel
    RgbaPremultiplied,
    /// Single-channel coverage, 1 byte per pixel
    Coverage,
}

impl ChannelLayout {
    #[must_use]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Rgba | Self::RgbaPremultiplied => 4,
            Self::Coverage => 1,
        }
    }

    #[must_use]
    pub fn has_color(self) -> bool {
        !matches!(self, Self::Coverage)
    }

    #[must_use]
    pub fn has_alpha(self) -> bool {
        matches!(self, Self::Rgba | Self::RgbaPremultiplied)
    }
}

impl std::fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rgb => write!(f, "rgb"),
            Self::Rgba => write!(f, "rgba"),
            Self::RgbaPremultiplied => write!(f, "rgba-premultiplied"),
            Self::Coverage => write!(f, "coverage"),
        }
    }
}

/// Contiguous 8-bit pixel storage with an explicit row stride
///
/// Invariant: `bytes_per_row >= width * bytes_per_pixel` and the backing
/// storage holds exactly `height * bytes_per_row` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
    bytes_per_row: usize,
    layout: ChannelLayout,
}

impl PixelBuffer {
    /// Allocate a zero-filled buffer with tightly packed rows
    ///
    /// # Errors
    /// - `BufferAllocationFailed` for empty dimensions or when the storage
    ///   cannot be reserved
    pub fn new(width: u32, height: u32, layout: ChannelLayout) -> Result<Self> {
        let bytes_per_row = (width as usize)
            .checked_mul(layout.bytes_per_pixel())
            .ok_or_else(|| SegmentationError::buffer_allocation_for(width, height, usize::MAX))?;
        Self::with_stride(width, height, bytes_per_row, layout)
    }

    /// Allocate a zero-filled buffer whose rows are `bytes_per_row` apart
    ///
    /// # Errors
    /// - `BufferAllocationFailed` for empty dimensions, a stride shorter than
    ///   one row of pixels, or when the storage cannot be reserved
    pub fn with_stride(
        width: u32,
        height: u32,
        bytes_per_row: usize,
        layout: ChannelLayout,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SegmentationError::buffer_allocation(format!(
                "cannot allocate an empty {}x{} buffer",
                width, height
            )));
        }
        let min_stride = width as usize * layout.bytes_per_pixel();
        if bytes_per_row < min_stride {
            return Err(SegmentationError::buffer_allocation(format!(
                "stride {} is shorter than a {} row of {} pixels ({} bytes)",
                bytes_per_row, layout, width, min_stride
            )));
        }
        let len = bytes_per_row
            .checked_mul(height as usize)
            .ok_or_else(|| SegmentationError::buffer_allocation_for(width, height, bytes_per_row))?;

        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| SegmentationError::buffer_allocation_for(width, height, bytes_per_row))?;
        data.resize(len, 0);

        Ok(Self {
            data,
            width,
            height,
            bytes_per_row,
            layout,
        })
    }

    /// Wrap existing pixel bytes
    ///
    /// Trailing bytes beyond `height * bytes_per_row` are dropped.
    ///
    /// # Errors
    /// - `InvalidImage` when the geometry is empty or inconsistent, or `data`
    ///   is too short for it
    pub fn from_raw(
        width: u32,
        height: u32,
        bytes_per_row: usize,
        layout: ChannelLayout,
        mut data: Vec<u8>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SegmentationError::invalid_image(format!(
                "empty {}x{} pixel data",
                width, height
            )));
        }
        if bytes_per_row < width as usize * layout.bytes_per_pixel() {
            return Err(SegmentationError::invalid_image(format!(
                "stride {} too short for {} {} pixels",
                bytes_per_row, width, layout
            )));
        }
        let needed = bytes_per_row
            .checked_mul(height as usize)
            .ok_or_else(|| SegmentationError::invalid_image("pixel data size overflows"))?;
        if data.len() < needed {
            return Err(SegmentationError::invalid_image(format!(
                "expected at least {} bytes of {} data, got {}",
                needed,
                layout,
                data.len()
            )));
        }
        data.truncate(needed);

        Ok(Self {
            data,
            width,
            height,
            bytes_per_row,
            layout,
        })
    }

    /// Fill a straight-alpha RGBA buffer with one color
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Result<Self> {
        let mut buffer = Self::new(width, height, ChannelLayout::Rgba)?;
        for pixel in buffer.data.chunks_exact_mut(4) {
            pixel.copy_from_slice(&color);
        }
        Ok(buffer)
    }

    /// Read the pixels of a decoded image
    ///
    /// Images with an alpha channel become [`ChannelLayout::Rgba`], all others
    /// [`ChannelLayout::Rgb`].
    ///
    /// # Errors
    /// - `InvalidImage` for images with no pixels
    pub fn from_dynamic_image(image: &DynamicImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(SegmentationError::invalid_image(format!(
                "decoded image has no pixels ({}x{})",
                width, height
            )));
        }
        if image.color().has_alpha() {
            Self::from_rgba_image(&image.to_rgba8())
        } else {
            Self::from_rgb_image(&image.to_rgb8())
        }
    }

    /// # Errors
    /// - `InvalidImage` for an image with no pixels
    pub fn from_rgb_image(image: &RgbImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::from_raw(
            width,
            height,
            width as usize * 3,
            ChannelLayout::Rgb,
            image.as_raw().clone(),
        )
    }

    /// # Errors
    /// - `InvalidImage` for an image with no pixels
    pub fn from_rgba_image(image: &RgbaImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::from_raw(
            width,
            height,
            width as usize * 4,
            ChannelLayout::Rgba,
            image.as_raw().clone(),
        )
    }

    /// Copy the visible pixels into an `RgbaImage`, dropping row padding
    ///
    /// RGB pixels become opaque; coverage values become opaque gray.
    ///
    /// # Errors
    /// - `EncodingFailed` if the packed pixels cannot form an image
    pub fn to_rgba_image(&self) -> Result<RgbaImage> {
        let mut packed = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for row in self.rows() {
            match self.layout {
                ChannelLayout::Rgba | ChannelLayout::RgbaPremultiplied => {
                    packed.extend_from_slice(row);
                },
                ChannelLayout::Rgb => {
                    for px in row.chunks_exact(3) {
                        packed.extend_from_slice(px);
                        packed.push(u8::MAX);
                    }
                },
                ChannelLayout::Coverage => {
                    for &v in row {
                        packed.extend_from_slice(&[v, v, v, u8::MAX]);
                    }
                },
            }
        }

        ImageBuffer::from_raw(self.width, self.height, packed).ok_or_else(|| {
            SegmentationError::encoding(format!(
                "cannot build {}x{} RGBA image from {} buffer",
                self.width, self.height, self.layout
            ))
        })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    #[must_use]
    pub fn bytes_per_pixel(&self) -> usize {
        self.layout.bytes_per_pixel()
    }

    #[must_use]
    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    /// Raw backing bytes, including row padding
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Visible bytes of row `y`, without padding
    #[must_use]
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.bytes_per_row;
        self.data
            .get(start..start + self.width as usize * self.bytes_per_pixel())
    }

    /// Iterate the visible bytes of every row, top to bottom
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let visible = self.width as usize * self.bytes_per_pixel();
        self.data
            .chunks_exact(self.bytes_per_row)
            .map(move |row| row.get(..visible).unwrap_or(row))
    }

    /// Bytes of the pixel at `(x, y)`
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        let offset = self.offset(x, y)?;
        self.data.get(offset..offset + self.bytes_per_pixel())
    }

    /// Mutable bytes of the pixel at `(x, y)`
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> Option<&mut [u8]> {
        let offset = self.offset(x, y)?;
        let bpp = self.bytes_per_pixel();
        self.data.get_mut(offset..offset + bpp)
    }

    /// Disjoint mutable rows (including padding) for row-parallel writers
    pub fn par_rows_mut(&mut self) -> rayon::slice::ChunksMut<'_, u8> {
        self.data.par_chunks_mut(self.bytes_per_row)
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.bytes_per_row + x as usize * self.bytes_per_pixel();
        (offset + self.bytes_per_pixel() <= self.data.len()).then_some(offset)
    }
}

/// Single-channel coverage mask
///
/// 0 is definite background, 255 definite foreground, anything between is
/// uncertain. Sampling goes through [`CoverageMask::lock_for_read`].
#[derive(Debug)]
pub struct CoverageMask {
    buffer: PixelBuffer,
    readers: AtomicUsize,
}

impl CoverageMask {
    /// Allocate an all-background mask
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Self::from_buffer(PixelBuffer::new(width, height, ChannelLayout::Coverage)?)
    }

    /// Allocate a mask with every value set to `value`
    pub fn filled(width: u32, height: u32, value: u8) -> Result<Self> {
        let mut mask = Self::new(width, height)?;
        mask.buffer.data.fill(value);
        Ok(mask)
    }

    /// Wrap tightly packed coverage values
    ///
    /// # Errors
    /// - `MaskAccessFailed` when `data` does not cover `width * height` values
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let buffer =
            PixelBuffer::from_raw(width, height, width as usize, ChannelLayout::Coverage, data)
                .map_err(|e| SegmentationError::mask_access(e.to_string()))?;
        Self::from_buffer(buffer)
    }

    /// Wrap a coverage-layout pixel buffer
    ///
    /// # Errors
    /// - `MaskAccessFailed` for any other channel layout
    pub fn from_buffer(buffer: PixelBuffer) -> Result<Self> {
        if buffer.layout() != ChannelLayout::Coverage {
            return Err(SegmentationError::mask_access(format!(
                "expected a coverage buffer, got {}",
                buffer.layout()
            )));
        }
        Ok(Self {
            buffer,
            readers: AtomicUsize::new(0),
        })
    }

    /// # Errors
    /// - `MaskAccessFailed` for an image with no pixels
    pub fn from_luma_image(image: &GrayImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::from_raw(width, height, image.as_raw().clone())
    }

    /// Copy the mask into a grayscale image
    pub fn to_luma_image(&self) -> Result<GrayImage> {
        let mut packed = Vec::with_capacity(self.width() as usize * self.height() as usize);
        for row in self.buffer.rows() {
            packed.extend_from_slice(row);
        }
        ImageBuffer::from_raw(self.width(), self.height(), packed)
            .ok_or_else(|| SegmentationError::encoding("cannot build grayscale image from mask"))
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    #[must_use]
    pub fn as_buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    /// Write the value at `(x, y)`; returns `false` when out of bounds
    pub fn set(&mut self, x: u32, y: u32, value: u8) -> bool {
        match self.buffer.pixel_mut(x, y) {
            Some([v]) => {
                *v = value;
                true
            },
            _ => false,
        }
    }

    /// Mutable rows for writers that fill the mask
    pub(crate) fn rows_mut(&mut self) -> std::slice::ChunksExactMut<'_, u8> {
        let stride = self.buffer.bytes_per_row;
        self.buffer.data.chunks_exact_mut(stride)
    }

    /// Pin the mask for reading
    ///
    /// The returned guard releases the read lock when dropped, so every exit
    /// path of a sampling pass unlocks the mask.
    ///
    /// # Errors
    /// - `MaskAccessFailed` if the backing storage does not cover the declared
    ///   geometry
    pub fn lock_for_read(&self) -> Result<MaskReadGuard<'_>> {
        let needed = self.buffer.bytes_per_row * self.buffer.height as usize;
        if self.buffer.data.len() < needed {
            return Err(SegmentationError::mask_access(format!(
                "mask storage holds {} bytes, {}x{} needs {}",
                self.buffer.data.len(),
                self.width(),
                self.height(),
                needed
            )));
        }
        self.readers.fetch_add(1, Ordering::AcqRel);
        Ok(MaskReadGuard { mask: self })
    }

    /// Whether any read guard is alive
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.readers.load(Ordering::Acquire) > 0
    }

    /// Count background, edge and foreground values under `classifier`
    #[must_use]
    pub fn statistics(&self, classifier: &CoverageClassifier) -> MaskStatistics {
        let mut stats = MaskStatistics::default();
        for &v in self.buffer.rows().flatten() {
            match classifier.classify(v) {
                PixelClass::Background => stats.background_pixels += 1,
                PixelClass::Edge(_) => stats.edge_pixels += 1,
                PixelClass::Foreground => stats.foreground_pixels += 1,
            }
        }
        stats.total_pixels = stats.background_pixels + stats.edge_pixels + stats.foreground_pixels;
        stats
    }
}

impl Clone for CoverageMask {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
            readers: AtomicUsize::new(0),
        }
    }
}

impl PartialEq for CoverageMask {
    fn eq(&self, other: &Self) -> bool {
        self.buffer == other.buffer
    }
}

/// Scoped read access to a [`CoverageMask`]
#[derive(Debug)]
pub struct MaskReadGuard<'a> {
    mask: &'a CoverageMask,
}

impl MaskReadGuard<'_> {
    #[must_use]
    pub fn width(&self) -> u32 {
        self.mask.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.mask.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    /// Coverage at `(x, y)`, `None` outside the mask
    #[must_use]
    pub fn value(&self, x: u32, y: u32) -> Option<u8> {
        self.mask.buffer.pixel(x, y).and_then(|px| px.first().copied())
    }
}

impl Drop for MaskReadGuard<'_> {
    fn drop(&mut self) {
        self.mask.readers.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Pixel counts of a coverage mask per classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub background_pixels: usize,
    pub edge_pixels: usize,
    pub foreground_pixels: usize,
}

impl MaskStatistics {
    /// Share of pixels that are edge or foreground
    #[must_use]
    pub fn subject_ratio(&self) -> f32 {
        if self.total_pixels == 0 {
            0.0
        } else {
            (self.edge_pixels + self.foreground_pixels) as f32 / self.total_pixels as f32
        }
    }
}
