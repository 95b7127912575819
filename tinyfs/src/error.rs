//! The error taxonomy of the filesystem.

use thiserror::Error;
use tinyfs_api::error::ApiError;

/// Everything that can go wrong in a filesystem operation.
///
/// One enum serves all layers, so `?` composes across the whole ladder.
/// Every variant corresponds to one of the historical numeric error codes,
/// still reachable through [`FsError::errno`] for callers that speak the
/// original status-code convention.
#[derive(Error, Debug)]
pub enum FsError {
    /// A failure in the device controller or the block codec
    #[error("disk operation failed")]
    DiskOperation(#[from] ApiError),
    /// Growing the open-file table failed
    #[error("open-file table growth failed")]
    NoMemory,
    /// Path resolution failed, or a block that should hold an inode does not
    #[error("file not found: {0}")]
    FileNotFound(&'static str),
    /// The descriptor is not present in the open-file table
    #[error("descriptor {0} not in the open-file table")]
    FdNotFound(u32),
    /// The free list is exhausted, or an inode's link table is full
    #[error("no space left in the filesystem or inode")]
    FileSizeLimit,
    /// The block count of an image falls outside the supported range
    #[error("invalid filesystem size: {0} blocks")]
    InvalidFsSize(u64),
    /// A read at or past the end of the file
    #[error("end of file reached")]
    EndOfFile,
    /// A kind or magic byte mismatch while mounting
    #[error("filesystem integrity check failed: {0}")]
    FsIntegrity(&'static str),
    /// A malformed name or path
    #[error("bad file name or path: {0}")]
    Filename(&'static str),
    /// An attempt to release a block that must never be released
    #[error("block {0} must not be released")]
    InvalidBlock(u8),
    /// Creating a directory over an existing name
    #[error("directory already exists")]
    DirExists,
    /// Removing a directory that still has entries
    #[error("directory is not empty")]
    DirNonempty,
}

impl FsError {
    /// The negative status code this error maps to at the C-style API
    /// boundary.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::DiskOperation(_) => -2,
            FsError::NoMemory => -3,
            FsError::FileNotFound(_) => -4,
            FsError::FdNotFound(_) => -5,
            FsError::FileSizeLimit => -6,
            FsError::InvalidFsSize(_) => -7,
            FsError::EndOfFile => -8,
            FsError::FsIntegrity(_) => -9,
            FsError::Filename(_) => -10,
            FsError::InvalidBlock(_) => -11,
            FsError::DirExists => -12,
            FsError::DirNonempty => -13,
        }
    }
}
