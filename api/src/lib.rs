//! Shared vocabulary of the TinyFS project.
//!
//! This crate holds everything the filesystem layers agree on without
//! implementing any filesystem logic themselves:
//!
//! 1. The raw disk: a memory-mapped image file read and written one block at
//!    a time ([`controller`]).
//! 2. The block codec: the [`types`] module defines the fixed-size
//!    [`Block`](types::Block) buffer together with the on-disk header
//!    structures and the byte layout every block obeys.
//! 3. The error type shared by the controller and the codec ([`error`]).
//! 4. The capability traits the filesystem layers implement, from bare block
//!    bookkeeping up to path resolution ([`fs`]).
//!
//! The filesystem itself lives in the `tinyfs` crate, which builds on this
//! one.

#![deny(missing_docs)]

pub mod controller;
pub mod error;
pub mod fs;
pub mod types;
