//! The block layer: device binding, superblock bookkeeping and the
//! free-block allocator.
//!
//! The free list is a LIFO singly linked list threaded through the link
//! byte of each free block, with its head in the superblock. Allocation
//! pops the head; release pushes a freshly written free block. The order of
//! writes on release is fixed: the freed block is written before the
//! superblock, so an interruption between the two leaks the block instead
//! of leaving the list head dangling.
//!
//! Formatting at this layer lays out the superblock and chains *every*
//! other block into the free list, including the block the directory layer
//! will claim for the root inode. Mounting verifies the superblock and the
//! magic byte of every block before anything else touches the image.

use std::path::Path;
use tinyfs_api::controller::Device;
use tinyfs_api::fs::{BlockSupport, FileSysSupport};
use tinyfs_api::types::{
    Block, FreeBlock, SuperBlock, BLOCK_FREE, BLOCK_SIZE, BLOCK_SUPER, MAGIC, ROOT_BLOCK,
};

use crate::error::FsError;

/// Lowest bound on the number of blocks in an image: superblock plus root.
const MIN_BLOCKS: u64 = 2;
/// Highest bound on the number of blocks: indices must fit in a link byte.
const MAX_BLOCKS: u64 = 255;

/// Filesystem view at the block layer.
#[derive(Debug)]
pub struct BlockFs {
    device: Device,
    /// Cached copy of the on-disk superblock; `sup_put` writes through.
    sup: SuperBlock,
}

impl BlockFs {
    /// Borrow the cached superblock.
    pub fn sup_as_ref(&self) -> &SuperBlock {
        &self.sup
    }

    fn write_sup(&mut self, sup: &SuperBlock) -> Result<(), FsError> {
        let mut b = Block::new_zero(0);
        b.serialize_into(sup, 0)?;
        self.device.write_block(&b)?;
        self.sup = *sup;
        Ok(())
    }
}

impl FileSysSupport for BlockFs {
    type Error = FsError;

    fn sb_valid(sb: &SuperBlock) -> bool {
        sb.kind == BLOCK_SUPER
            && sb.magic == MAGIC
            && sb.root_inode == ROOT_BLOCK
            && (MIN_BLOCKS..=MAX_BLOCKS).contains(&(sb.nblocks as u64))
    }

    fn mkfs<P: AsRef<Path>>(path: P, nbytes: u64) -> Result<Self, Self::Error> {
        let nblocks = nbytes / BLOCK_SIZE;
        if !(MIN_BLOCKS..=MAX_BLOCKS).contains(&nblocks) {
            return Err(FsError::InvalidFsSize(nblocks));
        }
        let device = Device::create(path, nbytes)?;
        let sup = SuperBlock {
            kind: BLOCK_SUPER,
            magic: MAGIC,
            root_inode: ROOT_BLOCK,
            reserved: 0,
            nblocks: nblocks as u32,
            // The chain starts right after the superblock; the first free
            // block is claimed for the root inode by the directory layer.
            free_head: 1,
        };
        let mut fs = BlockFs { device, sup };
        fs.write_sup(&sup)?;
        for i in 1..nblocks {
            let next = if i + 1 < nblocks { (i + 1) as u8 } else { 0 };
            let mut b = Block::new_zero(i);
            b.serialize_into(
                &FreeBlock {
                    kind: BLOCK_FREE,
                    magic: MAGIC,
                    next,
                },
                0,
            )?;
            fs.device.write_block(&b)?;
        }
        Ok(fs)
    }

    fn mountfs(dev: Device) -> Result<Self, Self::Error> {
        let sup: SuperBlock = dev.read_block(0)?.deserialize_from(0)?;
        if !(MIN_BLOCKS..=MAX_BLOCKS).contains(&(sup.nblocks as u64)) {
            return Err(FsError::InvalidFsSize(sup.nblocks as u64));
        }
        if !Self::sb_valid(&sup) {
            return Err(FsError::FsIntegrity("first block is not a valid superblock"));
        }
        let mut hdr = [0u8; 2];
        for i in 0..sup.nblocks as u64 {
            dev.read_block(i)?.read_data(&mut hdr, 0)?;
            if hdr[1] != MAGIC {
                return Err(FsError::FsIntegrity("block without the magic byte"));
            }
        }
        Ok(BlockFs { device: dev, sup })
    }

    fn unmountfs(self) -> Device {
        self.device
    }
}

impl BlockSupport for BlockFs {
    fn b_get(&self, i: u8) -> Result<Block, Self::Error> {
        Ok(self.device.read_block(i as u64)?)
    }

    fn b_put(&mut self, b: &Block) -> Result<(), Self::Error> {
        Ok(self.device.write_block(b)?)
    }

    fn b_free(&mut self, i: u8) -> Result<(), Self::Error> {
        if i == 0 {
            return Err(FsError::InvalidBlock(0));
        }
        let mut b = Block::new_zero(i as u64);
        b.serialize_into(
            &FreeBlock {
                kind: BLOCK_FREE,
                magic: MAGIC,
                next: self.sup.free_head,
            },
            0,
        )?;
        // The freed block must be durable before the superblock points at it.
        self.b_put(&b)?;
        let mut sup = self.sup;
        sup.free_head = i;
        self.write_sup(&sup)
    }

    fn b_alloc(&mut self) -> Result<u8, Self::Error> {
        let head = self.sup.free_head;
        if head == 0 {
            return Err(FsError::FileSizeLimit);
        }
        let node: FreeBlock = self.b_get(head)?.deserialize_from(0)?;
        let mut sup = self.sup;
        sup.free_head = node.next;
        self.write_sup(&sup)?;
        Ok(head)
    }

    fn sup_get(&self) -> Result<SuperBlock, Self::Error> {
        Ok(self.sup)
    }

    fn sup_put(&mut self, sup: &SuperBlock) -> Result<(), Self::Error> {
        self.write_sup(sup)
    }
}

#[cfg(test)]
#[path = "../../api/fs-tests/block_test.rs"]
mod tests;
