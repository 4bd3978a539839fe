//! Output format handling service
//!
//! Keeps codec details out of the compositing and result types.

use crate::{
    config::OutputFormat,
    error::{Result, SegmentationError},
};
use image::{ImageFormat, RgbaImage};
use std::{io::Cursor, path::Path};

/// Service for encoding cut-out images
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Encode an RGBA image in the requested output format
    ///
    /// PNG and TIFF keep the alpha channel; `Rgba8` is the packed pixel data
    /// with no header.
    ///
    /// # Errors
    /// - `EncodingFailed` if the codec rejects the image
    ///
    /// # Examples
    /// ```rust
    /// use subject_cutout::{services::OutputFormatHandler, OutputFormat};
    /// use image::RgbaImage;
    ///
    /// let image = RgbaImage::new(4, 4);
    /// let raw = OutputFormatHandler::encode(&image, OutputFormat::Rgba8)?;
    /// assert_eq!(raw.len(), 64);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn encode(image: &RgbaImage, format: OutputFormat) -> Result<Vec<u8>> {
        let codec = match format {
            OutputFormat::Rgba8 => return Ok(image.as_raw().clone()),
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Tiff => ImageFormat::Tiff,
        };

        let mut cursor = Cursor::new(Vec::new());
        image.write_to(&mut cursor, codec).map_err(|e| {
            SegmentationError::encoding(format!(
                "{}x{} {} encode failed: {}",
                image.width(),
                image.height(),
                format,
                e
            ))
        })?;
        Ok(cursor.into_inner())
    }

    /// File extension (without the dot) for a format
    #[must_use]
    pub fn get_extension(format: OutputFormat) -> &'static str {
        format.extension()
    }

    /// Output format implied by a path's extension, or `fallback`
    #[must_use]
    pub fn format_for_path<P: AsRef<Path>>(path: P, fallback: OutputFormat) -> OutputFormat {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(OutputFormat::from_extension)
            .unwrap_or(fallback)
    }

    /// Replace the extension of `path` with the one for `format`
    #[must_use]
    pub fn output_path_for<P: AsRef<Path>>(path: P, format: OutputFormat) -> std::path::PathBuf {
        path.as_ref().with_extension(Self::get_extension(format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_encode_png_keeps_alpha() {
        let image = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 128]));
        let bytes = OutputFormatHandler::encode(&image, OutputFormat::Png).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");

        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(1, 1).0, [255, 0, 0, 128]);
    }

    #[test]
    fn test_encode_tiff() {
        let image = RgbaImage::from_pixel(3, 1, Rgba([1, 2, 3, 4]));
        let bytes = OutputFormatHandler::encode(&image, OutputFormat::Tiff).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (3, 1));
        assert_eq!(decoded.get_pixel(2, 0).0, [1, 2, 3, 4]);
    }

    #[test]
    fn test_encode_rejects_empty_image() {
        let err = OutputFormatHandler::encode(&RgbaImage::new(0, 0), OutputFormat::Png).unwrap_err();
        assert!(matches!(err, SegmentationError::EncodingFailed(_)));
        assert!(err.to_string().contains("0x0 png"));
    }

    #[test]
    fn test_get_extension() {
        assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Png), "png");
        assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Tiff), "tiff");
        assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Rgba8), "raw");
    }

    #[test]
    fn test_format_for_path() {
        assert_eq!(
            OutputFormatHandler::format_for_path("out.tif", OutputFormat::Png),
            OutputFormat::Tiff
        );
        assert_eq!(
            OutputFormatHandler::format_for_path("out.jpg", OutputFormat::Png),
            OutputFormat::Png
        );
        assert_eq!(
            OutputFormatHandler::format_for_path("no_extension", OutputFormat::Rgba8),
            OutputFormat::Rgba8
        );
        assert_eq!(
            OutputFormatHandler::output_path_for("photo.jpg", OutputFormat::Png),
            std::path::PathBuf::from("photo.png")
        );
    }
}
