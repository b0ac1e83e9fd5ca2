//! Error and load-status types.
//!
//! Loading reports its outcome as a [`LoadStatus`] stored on the resource, so
//! a failed load still yields something the caller can free. The detailed
//! cause is kept as a [`CwavError`], which is also what every fallible
//! playback or configuration call returns.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::backend::ServiceError;
use crate::cwav_parser::BlockKind;
use crate::lifecycle::NotificationPath;

/// Result type for cwav operations.
pub type Result<T> = std::result::Result<T, CwavError>;

/// Outcome of loading a CWAV, kept on the resource.
///
/// Numeric values are stable and may be handed across an FFI boundary;
/// `NotAllocated` is what a freed (or never loaded) resource reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum LoadStatus {
    /// Loaded properly and ready to play.
    Success = 0,
    /// Failed to open the specified file.
    FileOpenFailed = 1,
    /// The file does not fit in the available memory.
    FileTooLarge = 2,
    /// The buffer is not a CWAV container.
    UnknownFileFormat = 3,
    /// The INFO block is invalid or not supported.
    InvalidInfoBlock = 4,
    /// The DATA block is invalid or not supported.
    InvalidDataBlock = 5,
    /// The audio encoding is not supported by the active backend.
    UnsupportedEncoding = 6,
    /// An argument to the load call was rejected.
    InvalidArgument = 7,
    /// Not loaded yet, or already freed.
    NotAllocated = 8,
}

impl LoadStatus {
    /// True only for [`LoadStatus::Success`].
    pub fn is_success(self) -> bool {
        self == LoadStatus::Success
    }
}

/// Errors raised while loading, configuring or driving playback.
#[derive(Error, Debug)]
pub enum CwavError {
    /// The resource is not in the loaded state.
    #[error("CWAV is not loaded")]
    NotLoaded,

    /// An argument was rejected before any work was done.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The file could not be opened or read.
    #[error("failed to open '{}': {source}", path.display())]
    FileOpen {
        /// Path that was requested.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: io::Error,
    },

    /// The file buffer could not be allocated.
    #[error("file of {size} bytes is too large to load")]
    FileTooLarge {
        /// File size reported by the filesystem.
        size: u64,
    },

    /// Header constants did not match a CWAV container.
    #[error("unknown file format: {0}")]
    UnknownFileFormat(String),

    /// The INFO block failed validation.
    #[error("invalid INFO block: {0}")]
    InvalidInfoBlock(String),

    /// The DATA block failed validation.
    #[error("invalid DATA block: {0}")]
    InvalidDataBlock(String),

    /// A read reached past the end of the block it was bounded to.
    #[error("{block} truncated: {len} bytes at offset 0x{offset:x} exceed {available} available")]
    Truncated {
        /// Block whose bounds were exceeded.
        block: BlockKind,
        /// Offset of the read, relative to the block start.
        offset: usize,
        /// Length of the read.
        len: usize,
        /// Size of the block view.
        available: usize,
    },

    /// The encoding byte names an encoding the active backend cannot play.
    #[error("unsupported audio encoding {raw}")]
    UnsupportedEncoding {
        /// Encoding byte as stored in the INFO block.
        raw: u8,
    },

    /// A logical channel index is not present in the file.
    #[error("logical channel {channel} out of range (file has {count})")]
    ChannelOutOfRange {
        /// Requested logical channel.
        channel: u32,
        /// Number of channels in the file.
        count: u32,
    },

    /// Every hardware channel of the backend is busy.
    #[error("no free hardware channel for logical channel {logical}")]
    NoFreeChannel {
        /// Logical channel that could not be placed.
        logical: u32,
    },

    /// The sound service rejected a command.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Lifecycle events were delivered through the other notification path.
    #[error("lifecycle notifications are already delivered through the {active} path")]
    NotificationPathConflict {
        /// Path that was activated first.
        active: NotificationPath,
    },

    /// IO error outside of container loading.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed JSON configuration.
    #[error("configuration parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CwavError {
    /// Status a load attempt reports when it fails with this error.
    ///
    /// Errors that cannot come out of a load map to `InvalidArgument`.
    pub fn load_status(&self) -> LoadStatus {
        match self {
            CwavError::NotLoaded => LoadStatus::NotAllocated,
            CwavError::FileOpen { .. } => LoadStatus::FileOpenFailed,
            CwavError::FileTooLarge { .. } => LoadStatus::FileTooLarge,
            CwavError::UnknownFileFormat(_) => LoadStatus::UnknownFileFormat,
            CwavError::InvalidInfoBlock(_) => LoadStatus::InvalidInfoBlock,
            CwavError::InvalidDataBlock(_) => LoadStatus::InvalidDataBlock,
            CwavError::Truncated { block, .. } => match block {
                BlockKind::Header => LoadStatus::UnknownFileFormat,
                BlockKind::Info => LoadStatus::InvalidInfoBlock,
                BlockKind::Data => LoadStatus::InvalidDataBlock,
            },
            CwavError::UnsupportedEncoding { .. } => LoadStatus::UnsupportedEncoding,
            _ => LoadStatus::InvalidArgument,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncation_maps_to_block_status() {
        let err = CwavError::Truncated {
            block: BlockKind::Info,
            offset: 0x20,
            len: 4,
            available: 0x20,
        };
        assert_eq!(err.load_status(), LoadStatus::InvalidInfoBlock);

        let err = CwavError::Truncated {
            block: BlockKind::Header,
            offset: 0,
            len: 4,
            available: 2,
        };
        assert_eq!(err.load_status(), LoadStatus::UnknownFileFormat);
    }

    #[test]
    fn test_status_codes_are_stable() {
        assert_eq!(LoadStatus::Success as u32, 0);
        assert_eq!(LoadStatus::UnsupportedEncoding as u32, 6);
        assert!(!LoadStatus::NotAllocated.is_success());
    }

    #[test]
    fn test_file_open_error_names_path() {
        let err = CwavError::FileOpen {
            path: PathBuf::from("romfs:/beep.bcwav"),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("romfs:/beep.bcwav"));
        assert_eq!(err.load_status(), LoadStatus::FileOpenFailed);
    }
}
