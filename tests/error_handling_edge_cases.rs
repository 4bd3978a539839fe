//! Error handling and edge case tests
//!
//! Every failing stage must surface exactly one error of the right kind, and
//! boundary inputs that are not errors (out-of-range samples, degenerate
//! boxes, padded rows) must produce well-defined output.

use image::DynamicImage;
use rayon::prelude::*;
use subject_cutout::{
    compositing::{composite_person, masked_blend, rasterize, resample},
    producers::test_utils::{test_helpers, MockMaskProducer},
    segment_object, segment_person, segment_person_from_bytes, BoundingBox, ChannelLayout,
    CompositeConfig, CoverageClassifier, CoverageMask, ImageIOService, MaskProducer, MaskSampling,
    MaskScale, Orientation, OutputFormat, OutputFormatHandler, PixelBuffer,
    PrecomputedMaskProducer, ProcessorConfig, Result, SegmentationError, SegmentationProcessor,
};
use tempfile::TempDir;

/// Producer whose analysis panics mid-request
struct PanickingProducer;

impl MaskProducer for PanickingProducer {
    fn name(&self) -> &str {
        "panicking"
    }

    fn produce_person_mask(&mut self, _image: &PixelBuffer) -> Result<CoverageMask> {
        panic!("analysis crashed");
    }

    fn produce_saliency_boxes(&mut self, _image: &PixelBuffer) -> Result<Vec<BoundingBox>> {
        panic!("analysis crashed");
    }
}

fn small_image() -> DynamicImage {
    DynamicImage::ImageRgba8(
        test_helpers::create_unique_pixel_image(6, 4)
            .to_rgba_image()
            .unwrap(),
    )
}

fn processor_with(producer: MockMaskProducer) -> SegmentationProcessor {
    SegmentationProcessor::new(ProcessorConfig::default(), Box::new(producer)).unwrap()
}

#[test]
fn test_producer_without_mask_reports_no_segmentation_mask() {
    let mut processor = processor_with(MockMaskProducer::new_failing_mask());
    let err = processor
        .segment_person(&small_image(), Orientation::Normal)
        .unwrap_err();

    assert!(matches!(err, SegmentationError::NoSegmentationMask(_)));
    assert_eq!(err.user_message(), "No person was found in the photo.");
}

#[test]
fn test_empty_saliency_set_reports_no_salient_objects() {
    let mut processor = processor_with(MockMaskProducer::with_boxes(Vec::new()));
    let err = processor
        .segment_object(&small_image(), Orientation::Normal)
        .unwrap_err();
    assert!(matches!(err, SegmentationError::NoSalientObjects));

    // A precomputed producer without boxes reports the same kind
    let mut processor = SegmentationProcessor::new(
        ProcessorConfig::default(),
        Box::new(PrecomputedMaskProducer::new()),
    )
    .unwrap();
    let err = processor
        .segment_object(&small_image(), Orientation::Normal)
        .unwrap_err();
    assert!(matches!(err, SegmentationError::NoSalientObjects));
}

#[test]
fn test_nan_confidences_report_no_most_salient_object() {
    let boxes = vec![
        BoundingBox::new(0.0, 0.0, 0.5, 0.5, f32::NAN),
        BoundingBox::new(0.5, 0.5, 0.5, 0.5, f32::NAN),
    ];
    let mut processor = processor_with(MockMaskProducer::with_boxes(boxes));
    let err = processor
        .segment_object(&small_image(), Orientation::Normal)
        .unwrap_err();

    assert!(matches!(
        err,
        SegmentationError::NoMostSalientObject { candidates: 2 }
    ));
}

#[test]
fn test_most_salient_selection_edge_cases() -> Result<()> {
    // NaN never wins over a comparable confidence
    let boxes = [
        BoundingBox::new(0.0, 0.0, 0.1, 0.1, f32::NAN),
        BoundingBox::new(0.2, 0.2, 0.1, 0.1, 0.3),
    ];
    assert_eq!(subject_cutout::select_most_salient(&boxes)?, boxes[1]);

    // Ties keep the first box
    let boxes = [
        BoundingBox::new(0.0, 0.0, 0.1, 0.1, 0.7),
        BoundingBox::new(0.5, 0.5, 0.1, 0.1, 0.7),
    ];
    assert_eq!(subject_cutout::select_most_salient(&boxes)?, boxes[0]);
    Ok(())
}

#[test]
fn test_producer_failure_propagates_unchanged() {
    let mut processor = processor_with(MockMaskProducer::new_failing_boxes());
    let err = processor
        .segment_object(&small_image(), Orientation::Rotate180)
        .unwrap_err();
    assert!(matches!(err, SegmentationError::Internal(_)));
}

#[test]
fn test_undecodable_bytes_report_invalid_image() {
    let mut processor = processor_with(MockMaskProducer::new());
    let err = processor
        .segment_person_bytes(b"definitely not an image")
        .unwrap_err();

    assert!(matches!(err, SegmentationError::InvalidImage(_)));
    assert_eq!(err.user_message(), "The selected photo could not be read.");
}

#[test]
fn test_missing_files_report_io_errors() {
    let err = ImageIOService::load_image("/no/such/photo.jpg").unwrap_err();
    assert!(matches!(err, SegmentationError::Io(_)));
    assert!(err.to_string().contains("/no/such/photo.jpg"));

    let err = PrecomputedMaskProducer::from_mask_file("/no/such/mask.png").unwrap_err();
    assert!(matches!(err, SegmentationError::Io(_)));

    let err = PrecomputedMaskProducer::from_boxes_file("/no/such/boxes.json").unwrap_err();
    assert!(matches!(err, SegmentationError::Io(_)));
}

#[test]
fn test_malformed_boxes_file_reports_invalid_config() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("boxes.json");
    std::fs::write(&path, r#"[{"x": "left"}]"#)?;

    let err = PrecomputedMaskProducer::from_boxes_file(&path).unwrap_err();
    assert!(matches!(err, SegmentationError::InvalidConfig(_)));
    Ok(())
}

#[test]
fn test_invalid_configuration_is_rejected_up_front() {
    let config = ProcessorConfig {
        composite: CompositeConfig {
            person_threshold: 200,
            high_confidence_threshold: 100,
            ..CompositeConfig::default()
        },
        ..ProcessorConfig::default()
    };
    let producer = MockMaskProducer::new();
    let history = producer.history_handle();

    let result = SegmentationProcessor::new(config, Box::new(producer));
    assert!(matches!(result, Err(SegmentationError::InvalidConfig(_))));

    // The producer is never consulted
    assert!(history.lock().unwrap().is_empty());

    let err = CompositeConfig::builder()
        .edge_blend_factor(-1.0)
        .build()
        .unwrap_err();
    assert_eq!(err.user_message(), "The cut-out settings are invalid.");
}

#[test]
fn test_buffer_geometry_errors() {
    // Empty buffers cannot be allocated
    let err = PixelBuffer::new(0, 10, ChannelLayout::Rgba).unwrap_err();
    assert!(matches!(err, SegmentationError::BufferAllocationFailed(_)));

    // Pixel data shorter than its declared geometry is not a readable image
    let err = PixelBuffer::from_raw(4, 4, 16, ChannelLayout::Rgba, vec![0; 63]).unwrap_err();
    assert!(matches!(err, SegmentationError::InvalidImage(_)));

    // A stride shorter than a row of pixels is rejected too
    let err = PixelBuffer::from_raw(4, 1, 10, ChannelLayout::Rgb, vec![0; 12]).unwrap_err();
    assert!(matches!(err, SegmentationError::InvalidImage(_)));

    // Truncated or color masks cannot be read as coverage
    let err = CoverageMask::from_raw(3, 3, vec![0; 8]).unwrap_err();
    assert!(matches!(err, SegmentationError::MaskAccessFailed(_)));
    let rgb = PixelBuffer::new(2, 2, ChannelLayout::Rgb).unwrap();
    let err = CoverageMask::from_buffer(rgb).unwrap_err();
    assert!(matches!(err, SegmentationError::MaskAccessFailed(_)));
}

#[test]
fn test_padded_rows_composite_like_tight_rows() -> Result<()> {
    // 3 RGB pixels per row, padded to 16 bytes
    let mut data = Vec::new();
    for y in 0..2u8 {
        data.extend_from_slice(&[y, 1, 2, y, 3, 4, y, 5, 6]);
        data.extend_from_slice(&[0xEE; 7]);
    }
    let padded = PixelBuffer::from_raw(3, 2, 16, ChannelLayout::Rgb, data)?;
    let tight = PixelBuffer::from_raw(
        3,
        2,
        9,
        ChannelLayout::Rgb,
        vec![0, 1, 2, 0, 3, 4, 0, 5, 6, 1, 1, 2, 1, 3, 4, 1, 5, 6],
    )?;
    let mask = CoverageMask::filled(3, 2, 255)?;
    let classifier = CoverageClassifier::default();

    let from_padded = composite_person(&padded, &mask, &classifier, 2)?;
    let from_tight = composite_person(&tight, &mask, &classifier, 2)?;
    assert_eq!(from_padded.as_bytes(), from_tight.as_bytes());
    assert!(!from_padded.as_bytes().contains(&0xEE));
    Ok(())
}

#[test]
fn test_coverage_buffer_cannot_be_composited() -> Result<()> {
    let image = PixelBuffer::new(2, 2, ChannelLayout::Coverage)?;
    let mask = CoverageMask::filled(2, 2, 255)?;
    let err = composite_person(&image, &mask, &CoverageClassifier::default(), 1).unwrap_err();
    assert!(matches!(err, SegmentationError::InvalidImage(_)));
    assert!(!mask.is_locked());
    Ok(())
}

#[test]
fn test_out_of_range_samples_are_background() -> Result<()> {
    let mask = CoverageMask::filled(2, 2, 255)?;
    let guard = mask.lock_for_read()?;
    assert_eq!(resample::sample(&guard, 1, 1, MaskScale::IDENTITY), Some(255));
    assert_eq!(resample::sample(&guard, 2, 0, MaskScale::IDENTITY), None);
    assert_eq!(resample::sample(&guard, 0, 7, MaskScale::IDENTITY), None);

    // A non-positive scale cannot map anything
    let broken = MaskScale {
        scale_x: 0.0,
        scale_y: 1.0,
    };
    assert_eq!(resample::sample(&guard, 0, 0, broken), None);
    Ok(())
}

#[test]
fn test_mask_lock_is_released_on_every_path() -> Result<()> {
    let mask = CoverageMask::filled(4, 4, 200)?;

    {
        let _guard = mask.lock_for_read()?;
        assert!(mask.is_locked());
    }
    assert!(!mask.is_locked());

    // Successful pass
    let image = test_helpers::create_test_image(4, 4);
    composite_person(&image, &mask, &CoverageClassifier::default(), 3)?;
    assert!(!mask.is_locked());

    // Rejected inputs never take the lock
    let background = PixelBuffer::solid(3, 3, [0, 0, 0, 255])?;
    let err = masked_blend(&image, &mask, &background, MaskSampling::Bilinear, 1).unwrap_err();
    assert!(matches!(err, SegmentationError::InvalidImage(_)));
    assert!(!mask.is_locked());

    // An error returned while the guard is held
    let failing_pass = |mask: &CoverageMask| -> Result<()> {
        let guard = mask.lock_for_read()?;
        guard
            .value(4, 4)
            .ok_or_else(|| SegmentationError::mask_access("sample outside the mask"))?;
        Ok(())
    };
    let err = failing_pass(&mask).unwrap_err();
    assert!(matches!(err, SegmentationError::MaskAccessFailed(_)));
    assert!(!mask.is_locked());

    // A worker panicking mid-pass unwinds through the guard
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let guard = mask.lock_for_read().unwrap();
        (0..4u32).into_par_iter().for_each(|y| {
            assert!(guard.value(0, y).is_some());
            if y == 2 {
                panic!("row worker crashed");
            }
        });
    }));
    assert!(outcome.is_err());
    assert!(!mask.is_locked());
    Ok(())
}

#[test]
fn test_degenerate_boxes_are_background_not_errors() -> Result<()> {
    // Zero-area box rasterizes to an empty mask
    let mask = rasterize(&BoundingBox::new(0.5, 0.5, 0.0, 0.3, 1.0), 10, 10)?;
    let stats = mask.statistics(&CoverageClassifier::default());
    assert_eq!(stats.foreground_pixels, 0);

    // The object path then yields only the background
    let composite = CompositeConfig::builder()
        .background_color([1, 2, 3, 4])
        .build()?;
    let config = ProcessorConfig::builder().composite(composite).build()?;
    let producer = MockMaskProducer::with_boxes(vec![BoundingBox::new(2.0, 2.0, 0.5, 0.5, 1.0)]);
    let mut processor = SegmentationProcessor::new(config, Box::new(producer))?;

    let result = processor.segment_object(&small_image(), Orientation::Normal)?;
    let rgba = result.to_rgba_image()?;
    assert!(rgba.pixels().all(|p| p.0 == [1, 2, 3, 4]));
    Ok(())
}

#[test]
fn test_single_pixel_image() -> Result<()> {
    let image = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(1, 1, image::Rgb([7, 8, 9])));
    let mut processor = processor_with(MockMaskProducer::uniform(255));

    for orientation in Orientation::ALL {
        let result = processor.segment_person(&image, orientation)?;
        assert_eq!(result.dimensions(), (1, 1));
        assert_eq!(result.to_rgba_image()?.get_pixel(0, 0).0, [7, 8, 9, 255]);
    }
    Ok(())
}

#[tokio::test]
async fn test_panicking_producer_resolves_with_internal_error() {
    let err = segment_person(
        small_image(),
        Orientation::Normal,
        ProcessorConfig::default(),
        PanickingProducer,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SegmentationError::Internal(_)));

    let err = segment_object(
        small_image(),
        Orientation::FlipHorizontal,
        ProcessorConfig::default(),
        PanickingProducer,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SegmentationError::Internal(_)));
}

#[tokio::test]
async fn test_async_request_reports_decode_failure() {
    let err = segment_person_from_bytes(
        vec![0xFF, 0xD8, 0xFF],
        ProcessorConfig::default(),
        MockMaskProducer::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SegmentationError::InvalidImage(_)));
}

#[test]
fn test_unencodable_output_reports_encoding_failed() {
    let empty = image::RgbaImage::new(0, 0);
    let err = OutputFormatHandler::encode(&empty, OutputFormat::Png).unwrap_err();

    assert!(matches!(err, SegmentationError::EncodingFailed(_)));
    assert_eq!(err.user_message(), "The cut-out image could not be created.");
}

#[test]
fn test_every_error_kind_has_a_user_message() {
    let errors = vec![
        SegmentationError::invalid_image("x"),
        SegmentationError::no_mask("x"),
        SegmentationError::NoSalientObjects,
        SegmentationError::NoMostSalientObject { candidates: 0 },
        SegmentationError::buffer_allocation("x"),
        SegmentationError::mask_access("x"),
        SegmentationError::encoding("x"),
        SegmentationError::invalid_config("x"),
        SegmentationError::internal("x"),
        SegmentationError::Io(std::io::Error::new(std::io::ErrorKind::Other, "x")),
    ];
    for err in &errors {
        assert!(!err.user_message().is_empty(), "{:?}", err);
        assert!(!err.to_string().is_empty());
    }
}
