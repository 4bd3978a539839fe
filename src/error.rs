//! Error types for segmentation and compositing operations

use thiserror::Error;

/// Result type alias for segmentation operations
pub type Result<T> = std::result::Result<T, SegmentationError>;

/// Error kinds a segmentation request can terminate with
///
/// Every stage fails fast and propagates its error unchanged. Out-of-range
/// mask samples are not errors; they are treated as background.
#[derive(Error, Debug)]
pub enum SegmentationError {
    /// The source could not be read as raw pixels
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// The mask producer yielded no coverage mask
    #[error("No segmentation mask: {0}")]
    NoSegmentationMask(String),

    /// The mask producer returned an empty saliency set
    #[error("No salient objects detected")]
    NoSalientObjects,

    /// The saliency set was non-empty but no box had a comparable confidence
    #[error("No most salient object among {candidates} candidates")]
    NoMostSalientObject { candidates: usize },

    /// A pixel buffer could not be created
    #[error("Buffer allocation failed: {0}")]
    BufferAllocationFailed(String),

    /// A locked mask buffer could not be read
    #[error("Mask access failed: {0}")]
    MaskAccessFailed(String),

    /// The result could not be materialized into an image asset
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the image codec layer
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SegmentationError {
    /// Create a new invalid image error
    pub fn invalid_image<S: Into<String>>(msg: S) -> Self {
        Self::InvalidImage(msg.into())
    }

    /// Create a new missing mask error
    pub fn no_mask<S: Into<String>>(msg: S) -> Self {
        Self::NoSegmentationMask(msg.into())
    }

    /// Create a new buffer allocation error
    pub fn buffer_allocation<S: Into<String>>(msg: S) -> Self {
        Self::BufferAllocationFailed(msg.into())
    }

    /// Create a new mask access error
    pub fn mask_access<S: Into<String>>(msg: S) -> Self {
        Self::MaskAccessFailed(msg.into())
    }

    /// Create a new encoding error
    pub fn encoding<S: Into<String>>(msg: S) -> Self {
        Self::EncodingFailed(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create buffer allocation error with the requested geometry
    pub fn buffer_allocation_for(width: u32, height: u32, bytes_per_row: usize) -> Self {
        Self::BufferAllocationFailed(format!(
            "cannot allocate {}x{} buffer with stride {} bytes",
            width, height, bytes_per_row
        ))
    }

    /// Human-readable message for the end user, derived from the error kind
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidImage(_) | Self::Image(_) => "The selected photo could not be read.",
            Self::NoSegmentationMask(_) => "No person was found in the photo.",
            Self::NoSalientObjects => "No objects were found in the photo.",
            Self::NoMostSalientObject { .. } => "No single main object could be chosen.",
            Self::BufferAllocationFailed(_) => "Not enough memory to process the photo.",
            Self::MaskAccessFailed(_) => "The subject mask could not be read.",
            Self::EncodingFailed(_) => "The cut-out image could not be created.",
            Self::InvalidConfig(_) => "The cut-out settings are invalid.",
            Self::Io(_) => "A file could not be read or written.",
            Self::Internal(_) => "An unexpected error occurred.",
        }
    }
}
