pub mod chunk;
pub mod file;

pub use chunk::{CaptureMetadata, CaptureWriter};
pub use file::CaptureClip;
