//! Error types and handling for the acquisition daemon.

use thiserror::Error;

/// Result type alias for daemon operations.
pub type Result<T> = std::result::Result<T, AcqError>;

/// Main error type for the acquisition daemon.
#[derive(Error, Debug)]
pub enum AcqError {
    /// I/O errors from filesystem or device operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Ring buffer is full and the producer stalled.
    #[error("ring buffer full")]
    RingBufferFull,

    /// Invalid configuration parameter.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration problem.
        message: String,
    },

    /// The hardware device could not be opened or failed irrecoverably.
    #[error("device error: {message}")]
    Device {
        /// Description of the device failure.
        message: String,
    },

    /// Run directory or output-path creation failed.
    #[error("directory error: {message}")]
    Directory {
        /// Description of the filesystem failure.
        message: String,
    },

    /// Opening or closing a compressed output file failed.
    #[error("compressed file error: {message}")]
    CompressedFile {
        /// Description of the gzip open/close failure.
        message: String,
    },

    /// The persisted status snapshot could not be memory-mapped.
    #[error("status mmap error: {message}")]
    StatusMmap {
        /// Description of the mmap failure.
        message: String,
    },

    /// Serialization/deserialization errors in the record wire format.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization problem.
        message: String,
    },

    /// CPU affinity or real-time scheduling errors.
    #[error("scheduling error: {0}")]
    Scheduling(#[from] nix::Error),

    /// System resource errors (mmap, mlock, thread spawn).
    #[error("system resource error: {message}")]
    SystemResource {
        /// Description of the system resource issue.
        message: String,
    },

    /// Operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// Generic error for unexpected conditions that should not occur in a
    /// correctly functioning daemon.
    #[error("unexpected error: {message}")]
    Unexpected {
        /// Description of the unexpected condition.
        message: String,
    },
}

impl AcqError {
    /// Create a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }

    /// Create a new device error.
    pub fn device(message: impl Into<String>) -> Self {
        Self::Device { message: message.into() }
    }

    /// Create a new directory/filesystem error.
    pub fn directory(message: impl Into<String>) -> Self {
        Self::Directory { message: message.into() }
    }

    /// Create a new compressed-file error.
    pub fn compressed_file(message: impl Into<String>) -> Self {
        Self::CompressedFile { message: message.into() }
    }

    /// Create a new status-mmap error.
    pub fn status_mmap(message: impl Into<String>) -> Self {
        Self::StatusMmap { message: message.into() }
    }

    /// Create a new serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into() }
    }

    /// Create a new system resource error.
    pub fn system_resource(message: impl Into<String>) -> Self {
        Self::SystemResource { message: message.into() }
    }

    /// Create a new unexpected error.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected { message: message.into() }
    }

    /// Whether a worker may simply log and retry after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::RingBufferFull
                | Self::Timeout
                | Self::Io(_)
                | Self::CompressedFile { .. }
                | Self::StatusMmap { .. }
        )
    }

    /// Whether this error should abort daemon startup outright.
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(self, Self::Device { .. } | Self::Directory { .. })
    }

    /// Whether this error is related to system resources (mmap, scheduling).
    pub fn is_system_resource_error(&self) -> bool {
        matches!(self, Self::SystemResource { .. } | Self::Scheduling(_))
    }
}

/// Convenience macro for creating configuration errors.
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::error::AcqError::config(format!($($arg)*))
    };
}

/// Convenience macro for creating device errors.
#[macro_export]
macro_rules! device_error {
    ($($arg:tt)*) => {
        $crate::error::AcqError::device(format!($($arg)*))
    };
}

/// Convenience macro for creating directory errors.
#[macro_export]
macro_rules! directory_error {
    ($($arg:tt)*) => {
        $crate::error::AcqError::directory(format!($($arg)*))
    };
}
