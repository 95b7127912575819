//! The inode layer: typed access to inode blocks.
//!
//! An inode is one block: the fixed header (name, 24-bit size, directory
//! flag) followed by the link table. This layer reads and writes whole
//! inodes and releases file contents; which blocks a link table may point
//! at (child inodes for directories, data blocks for files) is the business
//! of the layers above.

use std::path::Path;
use tinyfs_api::controller::Device;
use tinyfs_api::fs::{BlockSupport, FileSysSupport, InodeSupport};
use tinyfs_api::types::{Block, Inode, SuperBlock, BLOCK_INODE, LINK_SLOTS};

use crate::block::BlockFs;
use crate::error::FsError;

/// Filesystem view at the inode layer.
#[derive(Debug)]
pub struct InodeFs {
    block_fs: BlockFs,
}

impl InodeFs {
    /// Borrow the cached superblock.
    pub fn sup_as_ref(&self) -> &SuperBlock {
        self.block_fs.sup_as_ref()
    }
}

impl FileSysSupport for InodeFs {
    type Error = FsError;

    fn sb_valid(sb: &SuperBlock) -> bool {
        BlockFs::sb_valid(sb)
    }

    fn mkfs<P: AsRef<Path>>(path: P, nbytes: u64) -> Result<Self, Self::Error> {
        Ok(InodeFs {
            block_fs: BlockFs::mkfs(path, nbytes)?,
        })
    }

    fn mountfs(dev: Device) -> Result<Self, Self::Error> {
        Ok(InodeFs {
            block_fs: BlockFs::mountfs(dev)?,
        })
    }

    fn unmountfs(self) -> Device {
        self.block_fs.unmountfs()
    }
}

impl BlockSupport for InodeFs {
    fn b_get(&self, i: u8) -> Result<Block, Self::Error> {
        self.block_fs.b_get(i)
    }

    fn b_put(&mut self, b: &Block) -> Result<(), Self::Error> {
        self.block_fs.b_put(b)
    }

    fn b_free(&mut self, i: u8) -> Result<(), Self::Error> {
        self.block_fs.b_free(i)
    }

    fn b_alloc(&mut self) -> Result<u8, Self::Error> {
        self.block_fs.b_alloc()
    }

    fn sup_get(&self) -> Result<SuperBlock, Self::Error> {
        self.block_fs.sup_get()
    }

    fn sup_put(&mut self, sup: &SuperBlock) -> Result<(), Self::Error> {
        self.block_fs.sup_put(sup)
    }
}

impl InodeSupport for InodeFs {
    fn i_get(&self, i: u8) -> Result<Inode, Self::Error> {
        let b = self.b_get(i)?;
        let ino = Inode::from_block(&b)?;
        if ino.node.kind != BLOCK_INODE {
            return Err(FsError::FileNotFound("block is not an inode"));
        }
        Ok(ino)
    }

    fn i_put(&mut self, ino: &Inode) -> Result<(), Self::Error> {
        let b = ino.to_block()?;
        self.b_put(&b)
    }

    fn i_trunc(&mut self, ino: &mut Inode) -> Result<(), Self::Error> {
        for slot in 0..LINK_SLOTS {
            let linked = ino.links[slot];
            if linked != 0 {
                self.b_free(linked)?;
                ino.links[slot] = 0;
            }
        }
        ino.node.set_size(0);
        self.i_put(ino)
    }
}

#[cfg(test)]
#[path = "../../api/fs-tests/inode_test.rs"]
mod tests;
