//! Image I/O operations service
//!
//! Decoding, EXIF orientation lookup and loading of externally produced
//! masks. Compositing itself never touches the filesystem.

use crate::{
    buffer::CoverageMask,
    compositing::Orientation,
    error::{Result, SegmentationError},
};
use image::DynamicImage;
use std::{io::Cursor, path::Path};
use tracing::debug;

/// Service for reading source images and masks
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// Falls back to content-based format detection when the extension is
    /// missing or wrong.
    ///
    /// # Errors
    /// - `Io` if the file does not exist or cannot be read
    /// - `InvalidImage` if the content cannot be decoded
    ///
    /// # Examples
    /// ```rust,no_run
    /// use subject_cutout::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("input.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path = path.as_ref();
        Self::ensure_exists(path)?;

        match image::open(path) {
            Ok(image) => Ok(image),
            Err(e) => {
                debug!(
                    path = %path.display(),
                    error = %e,
                    "Extension-based decode failed, trying content detection"
                );
                Self::decode_bytes(&Self::read_file(path)?)
            },
        }
    }

    /// Decode an image held in memory
    ///
    /// # Errors
    /// - `InvalidImage` if the bytes are not a supported image
    pub fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes).map_err(|e| {
            SegmentationError::invalid_image(format!(
                "cannot decode {} bytes: {}",
                bytes.len(),
                e
            ))
        })
    }

    /// Read the EXIF Orientation tag of an encoded image
    ///
    /// Images without EXIF data, or with an unknown tag value, are `Normal`.
    #[must_use]
    pub fn read_orientation(bytes: &[u8]) -> Orientation {
        let mut cursor = Cursor::new(bytes);
        let Ok(exif) = exif::Reader::new().read_from_container(&mut cursor) else {
            return Orientation::Normal;
        };

        exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .map_or(Orientation::Normal, Orientation::from_exif)
    }

    /// Decode an image and read its declared orientation in one pass
    pub fn decode_with_orientation(bytes: &[u8]) -> Result<(DynamicImage, Orientation)> {
        let image = Self::decode_bytes(bytes)?;
        let orientation = Self::read_orientation(bytes);
        debug!(%orientation, "Read declared orientation");
        Ok((image, orientation))
    }

    /// Load an image file together with its declared orientation
    pub fn load_with_orientation<P: AsRef<Path>>(path: P) -> Result<(DynamicImage, Orientation)> {
        let data = Self::read_file(path.as_ref())?;
        Self::decode_with_orientation(&data)
    }

    /// Load a single-channel coverage mask from an image file
    ///
    /// Color images are reduced to luma.
    pub fn load_mask<P: AsRef<Path>>(path: P) -> Result<CoverageMask> {
        let image = Self::load_image(path)?;
        CoverageMask::from_luma_image(&image.to_luma8())
    }

    /// Whether the path has an extension the decoder is built for
    #[must_use]
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                matches!(
                    ext.to_ascii_lowercase().as_str(),
                    "jpg" | "jpeg" | "png" | "tif" | "tiff"
                )
            })
    }

    fn ensure_exists(path: &Path) -> Result<()> {
        if path.exists() {
            return Ok(());
        }
        Err(SegmentationError::file_io_error(
            "read image file",
            path,
            &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
        ))
    }

    fn read_file(path: &Path) -> Result<Vec<u8>> {
        Self::ensure_exists(path)?;
        std::fs::read(path).map_err(|e| SegmentationError::file_io_error("read image data", path, &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    /// JPEG markers with only an APP1 EXIF segment holding Orientation
    fn jpeg_with_orientation(value: u8) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE1, 0x00, 0x22];
        bytes.extend_from_slice(b"Exif\0\0");
        // big-endian TIFF header, first IFD at offset 8
        bytes.extend_from_slice(&[b'M', b'M', 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08]);
        // one entry: tag 0x0112, SHORT, count 1
        bytes.extend_from_slice(&[0x00, 0x01, 0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01]);
        bytes.extend_from_slice(&[0x00, value, 0x00, 0x00]);
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        bytes.extend_from_slice(&[0xFF, 0xD9]);
        bytes
    }

    #[test]
    fn test_read_orientation_from_exif() {
        assert_eq!(
            ImageIOService::read_orientation(&jpeg_with_orientation(6)),
            Orientation::Rotate90
        );
        assert_eq!(
            ImageIOService::read_orientation(&jpeg_with_orientation(3)),
            Orientation::Rotate180
        );
    }

    #[test]
    fn test_read_orientation_defaults_to_normal() {
        assert_eq!(ImageIOService::read_orientation(b"not an image"), Orientation::Normal);

        let mut png = Vec::new();
        GrayImage::new(2, 2)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        assert_eq!(ImageIOService::read_orientation(&png), Orientation::Normal);
    }

    #[test]
    fn test_decode_bytes_rejects_garbage() {
        let err = ImageIOService::decode_bytes(&[0, 1, 2, 3]).unwrap_err();
        assert!(matches!(err, SegmentationError::InvalidImage(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ImageIOService::load_image("/definitely/not/here.png").unwrap_err();
        assert!(matches!(err, SegmentationError::Io(_)));
    }

    #[test]
    fn test_load_mask_and_content_detection() {
        let dir = tempfile::tempdir().unwrap();
        // PNG content behind a misleading extension
        let path = dir.path().join("mask.jpg");
        let mut mask = GrayImage::new(3, 1);
        mask.put_pixel(1, 0, Luma([200]));
        let mut png = Vec::new();
        mask.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        std::fs::write(&path, png).unwrap();

        let loaded = ImageIOService::load_mask(&path).unwrap();
        assert_eq!(loaded.dimensions(), (3, 1));
        let guard = loaded.lock_for_read().unwrap();
        assert_eq!(guard.value(1, 0), Some(200));
        assert_eq!(guard.value(0, 0), Some(0));
    }

    #[test]
    fn test_is_supported_format() {
        assert!(ImageIOService::is_supported_format("a.JPG"));
        assert!(ImageIOService::is_supported_format("a.tif"));
        assert!(!ImageIOService::is_supported_format("a.gif"));
        assert!(!ImageIOService::is_supported_format("noext"));
    }
}
