//! The capability traits implemented by the filesystem layers.
//!
//! The filesystem is built as a ladder: each layer wraps the previous one,
//! delegates the traits it already satisfies, and adds one new trait of its
//! own. [`FileSysSupport`] is the base every layer implements; the other
//! traits extend it one abstraction at a time, from raw block bookkeeping
//! up to path resolution. The descriptor-level operations (open, read,
//! write, ...) are not a trait: they live as inherent methods on the top
//! layer in the `tinyfs` crate.

use super::{
    controller::Device,
    types::{Block, Inode, SuperBlock},
};
use std::{error, path::Path};

/// Creating, loading and unloading a filesystem image.
pub trait FileSysSupport: Sized {
    /// The error type of the implementation.
    /// All layers of one filesystem typically share a single error enum, so
    /// `?` composes across the ladder without conversions.
    type Error: error::Error;

    /// Is this superblock a plausible description of a filesystem?
    /// Checks the kind and magic bytes, the fixed root inode index and the
    /// block-count bounds; it does not touch the disk.
    fn sb_valid(sb: &SuperBlock) -> bool;

    /// Format a fresh image of `nbytes / BLOCK_SIZE` blocks at `path` and
    /// return the mounted result. Each layer initializes the structures it
    /// is responsible for: the block layer writes the superblock and the
    /// free list, the directory layer claims the root inode.
    /// Fails if the block count falls outside the supported range.
    fn mkfs<P: AsRef<Path>>(path: P, nbytes: u64) -> Result<Self, Self::Error>;

    /// Mount an existing device, verifying its integrity first: a valid
    /// superblock, and the magic byte in every block.
    fn mountfs(dev: Device) -> Result<Self, Self::Error>;

    /// Unmount this filesystem, returning the device backing it.
    /// Dropping the device flushes all outstanding writes.
    fn unmountfs(self) -> Device;
}

/// Block-level access and the free-block allocator.
pub trait BlockSupport: FileSysSupport {
    /// Read the block at index `i`.
    fn b_get(&self, i: u8) -> Result<Block, Self::Error>;

    /// Write the given block at its own index.
    fn b_put(&mut self, b: &Block) -> Result<(), Self::Error>;

    /// Release block `i` onto the free list.
    /// The freed block is rewritten as a free-list node pointing at the old
    /// head *before* the superblock is updated, so an interrupted release
    /// leaks the block instead of corrupting the list. Block 0 can never be
    /// released.
    fn b_free(&mut self, i: u8) -> Result<(), Self::Error>;

    /// Pop the head of the free list and return its index.
    /// The returned block still carries its free-list header; the caller
    /// must overwrite it before the block becomes reachable. Fails when the
    /// list is empty.
    fn b_alloc(&mut self) -> Result<u8, Self::Error>;

    /// The superblock describing this filesystem.
    fn sup_get(&self) -> Result<SuperBlock, Self::Error>;

    /// Persist the given superblock to block 0.
    fn sup_put(&mut self, sup: &SuperBlock) -> Result<(), Self::Error>;
}

/// Typed access to inode blocks.
pub trait InodeSupport: BlockSupport {
    /// Read block `i` as an inode.
    /// Fails when the block does not carry the inode kind byte, which is
    /// how stale references (e.g. a descriptor whose file was deleted) are
    /// detected.
    fn i_get(&self, i: u8) -> Result<Inode, Self::Error>;

    /// Write the given inode back to its block.
    fn i_put(&mut self, ino: &Inode) -> Result<(), Self::Error>;

    /// Release the contents of `ino`: free every linked block, clear the
    /// link table and the size, and persist the inode. The inode block
    /// itself stays allocated.
    fn i_trunc(&mut self, ino: &mut Inode) -> Result<(), Self::Error>;
}

/// Directory manipulation on already-resolved inodes.
pub trait DirectorySupport: InodeSupport {
    /// Search `dir`'s link table, in slot order, for a child inode whose
    /// padded name equals `name`. Returns the first match.
    /// Fails if `dir` is not a directory or the name has an invalid length.
    fn dirlookup(&self, dir: &Inode, name: &str) -> Result<Option<u8>, Self::Error>;

    /// Create a child inode named `name` under `dir`: allocate a block,
    /// write the fresh inode into it, and store its index in the first
    /// unused slot of `dir` (persisting `dir`). Returns the new block
    /// index. Fails with the size-limit error when `dir` has no free slot.
    fn dirlink(&mut self, dir: &mut Inode, name: &str, is_dir: bool) -> Result<u8, Self::Error>;

    /// Clear every slot of `dir` that points at block `child`, and persist
    /// `dir`. The child block itself is not touched.
    fn dirunlink(&mut self, dir: &mut Inode, child: u8) -> Result<(), Self::Error>;
}

/// Absolute-path resolution on top of the directory layer.
pub trait PathSupport: DirectorySupport {
    /// Is `name` acceptable as a single path component?
    fn valid_name(name: &str) -> bool;

    /// Walk `path` from the root and return the block index of its inode.
    ///
    /// Paths are `/`-separated; a missing leading `/` is tolerated and the
    /// first component is still resolved against the root. When `create` is
    /// set and only the final component is missing, a fresh inode (file or
    /// directory per `is_dir`) is created in the walked-to directory.
    /// Asking to create a directory that already exists is an error; the
    /// path `"/"` with `is_dir` set resolves to the root immediately.
    fn resolve(&mut self, path: &str, create: bool, is_dir: bool) -> Result<u8, Self::Error>;

    /// Remove the parent directory's link(s) to block `child`, where
    /// `path` is the path `child` was reached by. Only the final component
    /// is stripped to find the parent; a path without one (e.g. `afile`)
    /// has the root as its parent.
    fn clear_parent_links(&mut self, path: &str, child: u8) -> Result<(), Self::Error>;
}
