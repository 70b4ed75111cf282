//! Error handling module for the export pipeline

use serde::Serialize;
use thiserror::Error;

/// Reportable failure categories with stable numeric codes for host bridges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Generic,
    Io,
    Cancelled,
    CodecUnavailable,
    InsufficientMemory,
    InvalidParameters,
    EncoderInitFailed,
    FrameProcessingFailed,
}

impl ErrorKind {
    /// Numeric code reported across the host boundary (0 is success)
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::Generic => -1,
            ErrorKind::Io => -2,
            ErrorKind::Cancelled => -3,
            ErrorKind::CodecUnavailable => -4,
            ErrorKind::InsufficientMemory => -5,
            ErrorKind::InvalidParameters => -6,
            ErrorKind::EncoderInitFailed => -7,
            ErrorKind::FrameProcessingFailed => -8,
        }
    }
}

/// Main error type for export operations
#[derive(Error, Debug)]
pub enum ExportError {
    /// Request or collaborator setup is unusable
    #[error("Invalid parameters: {message}")]
    InvalidParameters { message: String },

    /// Output handle acquisition or write failure
    #[error("Output I/O failed: {message}")]
    Io { message: String },

    /// Allocation of a pipeline structure failed
    #[error("Insufficient memory: {message}")]
    InsufficientMemory { message: String },

    /// Every encoder candidate, including the generic fallback, failed
    #[error("No usable encoder: {message}")]
    CodecUnavailable { message: String },

    /// An encoder opened but rejected configuration it should accept
    #[error("Encoder initialization failed: {message}")]
    EncoderInitFailed { message: String },

    /// Scale or encode failure mid-stream
    #[error("Frame processing failed: {message}")]
    FrameProcessingFailed { message: String },

    /// The job observed its cancellation token
    #[error("Export cancelled")]
    Cancelled,

    /// Failure outside the reportable taxonomy
    #[error("Export failed: {message}")]
    Generic { message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// FFmpeg error
    #[error("FFmpeg error: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),
}

impl ExportError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ExportError::InvalidParameters { message: message.into() }
    }

    pub fn io(message: impl Into<String>) -> Self {
        ExportError::Io { message: message.into() }
    }

    pub fn frame(message: impl Into<String>) -> Self {
        ExportError::FrameProcessingFailed { message: message.into() }
    }

    pub fn generic(message: impl Into<String>) -> Self {
        ExportError::Generic { message: message.into() }
    }

    pub fn memory(message: impl Into<String>) -> Self {
        ExportError::InsufficientMemory { message: message.into() }
    }

    /// Category used for host reporting
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExportError::InvalidParameters { .. } => ErrorKind::InvalidParameters,
            ExportError::Io { .. } | ExportError::IoError(_) => ErrorKind::Io,
            ExportError::InsufficientMemory { .. } => ErrorKind::InsufficientMemory,
            ExportError::CodecUnavailable { .. } => ErrorKind::CodecUnavailable,
            ExportError::EncoderInitFailed { .. } => ErrorKind::EncoderInitFailed,
            ExportError::FrameProcessingFailed { .. } => ErrorKind::FrameProcessingFailed,
            ExportError::Cancelled => ErrorKind::Cancelled,
            ExportError::Generic { .. } | ExportError::FFmpegError(_) => ErrorKind::Generic,
        }
    }

    pub fn code(&self) -> i32 {
        self.kind().code()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExportError::Cancelled)
    }
}

/// Result type alias for export operations
pub type ExportResult<T> = std::result::Result<T, ExportError>;
