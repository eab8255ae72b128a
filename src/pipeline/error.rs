use crate::metadata::{MetadataParseError, MetadataSyncError};
use crate::stack::StackError;
use crate::tiff_io::TiffIoError;

/// Errors that can occur while running the channel combination pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// I/O error while opening the input
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Input container could not be decoded
    #[error("TIFF error: {0}")]
    TiffError(#[from] TiffIoError),

    /// Channel names could not be read from the input metadata
    #[error("Metadata parse error: {0}")]
    ParseError(#[from] MetadataParseError),

    /// Stack construction, selection or combination failed
    #[error("Stack error: {0}")]
    StackError(#[from] StackError),

    /// Output metadata could not be synchronized (strict mode only)
    #[error("Metadata sync error: {0}")]
    SyncError(#[from] MetadataSyncError),

    /// No membrane channel was requested
    #[error("At least one membrane channel is required")]
    NoMembraneChannels,
}
