//! Service layer for image I/O and output encoding

pub mod format;
pub mod io;

pub use format::OutputFormatHandler;
pub use io::ImageIOService;
