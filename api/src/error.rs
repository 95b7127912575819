//! Errors produced by the device controller and the block codec.
//!
//! Higher layers wrap [`ApiError`] into their own error enums with a
//! `#[from]` variant, so `?` converts transparently on the way up.

use std::io;
use thiserror::Error;

/// Error type of the `tinyfs_api` crate.
///
/// The `#[error]` attribute derives the `Display` implementation, and
/// `#[from]` generates the `From` conversions that make `?` work on the
/// underlying `io` and `bincode` errors.
#[derive(Error, Debug)]
pub enum ApiError {
    /// I/O failure while creating, mapping or accessing the image file
    #[error("device I/O failed")]
    DeviceIo(#[from] io::Error),
    /// (De)serialization of an on-disk structure failed
    #[error("block codec failure")]
    Codec(#[from] bincode::Error),
    /// Invalid request to the device controller
    #[error("invalid controller input: {0}")]
    ControllerInput(&'static str),
    /// Out-of-bounds access into a block buffer
    #[error("invalid block access: {0}")]
    BlockInput(&'static str),
}

/// Shorthand for results carrying an [`ApiError`].
pub type Result<T> = std::result::Result<T, ApiError>;
