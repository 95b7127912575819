//! On-disk layout of the filesystem and the codec for it.
//!
//! A disk image is a sequence of [`BLOCK_SIZE`]-byte blocks. Every block
//! starts with the same two-byte header: byte 0 carries the block kind
//! (superblock, inode, data or free block) and byte 1 carries the magic
//! value [`MAGIC`]. The remaining bytes are interpreted per kind:
//!
//! * the superblock (always at index 0) holds the root inode index, the
//!   total block count and the head of the free-block list;
//! * an inode block holds an 8-byte NUL-padded name, a 24-bit file size,
//!   the directory flag, and from byte [`LINK_OFFSET`] onwards a table of
//!   single-byte block indices (0 marks an unused slot);
//! * a data block carries raw file bytes from byte [`DATA_OFFSET`] onwards;
//! * a free block stores the index of the next free block in byte 2.
//!
//! The fixed-size headers are plain `serde` structs. Since bincode encodes
//! integers fixed-width and little-endian, serializing a header at offset 0
//! of a block produces exactly the byte layout described above; the
//! variable-length tails (link table, data payload) are accessed through the
//! raw [`Block::read_data`]/[`Block::write_data`] windows instead.

use super::error::{self, ApiError};
use lazy_static::lazy_static;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::prelude::*;
use std::io::{Cursor, SeekFrom};

/// Size of a disk block in bytes.
pub const BLOCK_SIZE: u64 = 256;

/// Magic byte stored at offset 1 of every block.
pub const MAGIC: u8 = 0x44;

/// Kind byte of the superblock.
pub const BLOCK_SUPER: u8 = 1;
/// Kind byte of an inode block.
pub const BLOCK_INODE: u8 = 2;
/// Kind byte of a data block.
pub const BLOCK_DATA: u8 = 3;
/// Kind byte of a free block.
pub const BLOCK_FREE: u8 = 4;

/// Block index of the root inode.
pub const ROOT_BLOCK: u8 = 1;

/// Maximum length of a single name, in bytes.
pub const NAME_LEN: usize = 8;

/// Maximum length of a full path, in bytes.
pub const MAX_PATH: usize = 255;

/// Byte offset of the link table inside an inode block.
pub const LINK_OFFSET: u64 = 16;

/// Number of link slots in an inode block. This is the hard fan-out limit
/// for directories and the hard block-count limit for files.
pub const LINK_SLOTS: usize = (BLOCK_SIZE - LINK_OFFSET) as usize;

/// Byte offset of the payload inside a data block.
pub const DATA_OFFSET: u64 = 4;

/// Payload bytes per data block.
pub const DATA_BYTES: u64 = BLOCK_SIZE - DATA_OFFSET;

/// A single disk block: its index on the disk and an owned byte buffer.
///
/// Blocks are the unit the device controller reads and writes. The methods
/// below give bounds-checked access to byte windows of the buffer, plus
/// (de)serialization of the fixed on-disk header structs at a given offset.
#[derive(Debug, PartialEq, Eq)]
pub struct Block {
    /// Index of this block on the disk
    pub block_no: u64,
    contents: Box<[u8]>,
}

impl Block {
    /// Create a block at index `block_no` owning the given bytes.
    pub fn new(block_no: u64, data: Box<[u8]>) -> Block {
        Block {
            block_no,
            contents: data,
        }
    }

    /// Create an all-zero block of [`BLOCK_SIZE`] bytes at index `block_no`.
    pub fn new_zero(block_no: u64) -> Block {
        Block {
            block_no,
            contents: vec![0; BLOCK_SIZE as usize].into_boxed_slice(),
        }
    }

    /// Length of the underlying buffer in bytes.
    pub fn len(&self) -> u64 {
        self.contents.len() as u64
    }

    /// True iff the underlying buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Borrow the raw contents of this block.
    pub fn contents_as_ref(&self) -> &[u8] {
        &self.contents
    }

    /// Fill `data` with the bytes starting at `offset`.
    /// Fails without reading anything if the window falls outside the block.
    pub fn read_data(&self, data: &mut [u8], offset: u64) -> error::Result<()> {
        if offset + data.len() as u64 > self.len() {
            return Err(ApiError::BlockInput("read beyond the end of the block"));
        }
        let mut c = Cursor::new(&self.contents);
        c.seek(SeekFrom::Start(offset))?;
        c.read_exact(data).map_err(|e| e.into())
    }

    /// Copy `data` into the block starting at `offset`.
    /// Fails without writing anything if the window falls outside the block.
    pub fn write_data(&mut self, data: &[u8], offset: u64) -> error::Result<()> {
        if offset + data.len() as u64 > self.len() {
            return Err(ApiError::BlockInput("write beyond the end of the block"));
        }
        let mut c = Cursor::new(&mut self.contents[..]);
        c.seek(SeekFrom::Start(offset))?;
        c.write_all(data).map_err(|e| e.into())
    }

    /// Decode a header struct stored at `offset` in this block.
    pub fn deserialize_from<S>(&self, offset: u64) -> error::Result<S>
    where
        S: DeserializeOwned,
    {
        let mut c = Cursor::new(&self.contents);
        c.seek(SeekFrom::Start(offset))?;
        Ok(bincode::deserialize_from(c)?)
    }

    /// Encode a header struct at `offset` in this block.
    /// Goes through [`Block::write_data`] so that out-of-bounds writes are
    /// rejected instead of growing the buffer.
    pub fn serialize_into<S>(&mut self, stru: &S, offset: u64) -> error::Result<()>
    where
        S: Serialize,
    {
        let bin = bincode::serialize(stru)?;
        self.write_data(&bin, offset)
    }
}

/// Header of the superblock, stored at byte 0 of block 0.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    /// Block kind, always [`BLOCK_SUPER`]
    pub kind: u8,
    /// Magic byte, always [`MAGIC`]
    pub magic: u8,
    /// Index of the root inode, always [`ROOT_BLOCK`]
    pub root_inode: u8,
    /// Unused padding byte
    pub reserved: u8,
    /// Total number of blocks in the image
    pub nblocks: u32,
    /// Head of the free-block list; 0 when the list is empty
    pub free_head: u8,
}

/// Header of an inode block, stored at byte 0 of the block.
/// The link table occupies the rest of the block and is not part of this
/// struct; see [`Inode`].
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DInode {
    /// Block kind, always [`BLOCK_INODE`]
    pub kind: u8,
    /// Magic byte, always [`MAGIC`]
    pub magic: u8,
    /// Generic link byte, unused for inodes
    pub link: u8,
    /// Unused padding byte
    pub reserved: u8,
    /// Name of the file or directory, NUL-padded and *not* NUL-terminated
    pub name: [u8; NAME_LEN],
    /// File size in bytes as a little-endian 24-bit integer; unused for
    /// directories. Use [`DInode::size`] and [`DInode::set_size`].
    pub size: [u8; 3],
    /// 1 for directories, 0 for regular files
    pub dir: u8,
}

impl DInode {
    /// A fresh inode header with the given padded name and kind, size 0.
    pub fn new(name: [u8; NAME_LEN], is_dir: bool) -> DInode {
        DInode {
            kind: BLOCK_INODE,
            magic: MAGIC,
            link: 0,
            reserved: 0,
            name,
            size: [0; 3],
            dir: is_dir as u8,
        }
    }

    /// The stored file size in bytes.
    pub fn size(&self) -> u32 {
        u32::from_le_bytes([self.size[0], self.size[1], self.size[2], 0])
    }

    /// Store a file size. Values above 2^24 − 1 do not occur: a file is
    /// capped at [`LINK_SLOTS`] × [`DATA_BYTES`] bytes, far below that.
    pub fn set_size(&mut self, size: u32) {
        let b = size.to_le_bytes();
        self.size = [b[0], b[1], b[2]];
    }

    /// Whether this inode represents a directory.
    pub fn is_dir(&self) -> bool {
        self.dir != 0
    }

    /// The name with its NUL padding stripped.
    pub fn name_str(&self) -> String {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_LEN);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

/// Header of a free block, stored at byte 0 of the block.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlock {
    /// Block kind, always [`BLOCK_FREE`]
    pub kind: u8,
    /// Magic byte, always [`MAGIC`]
    pub magic: u8,
    /// Index of the next free block; 0 terminates the list
    pub next: u8,
}

lazy_static! {
    /// Serialized size of the superblock header in bytes.
    /// Computed once at runtime from an actual encoding, so the tests can
    /// assert that the struct layout and the byte layout agree.
    pub static ref SUPERBLOCK_SIZE: u64 =
        bincode::serialize(&SuperBlock::default()).unwrap().len() as u64;
    /// Serialized size of an inode header in bytes; equals [`LINK_OFFSET`].
    pub static ref DINODE_SIZE: u64 =
        bincode::serialize(&DInode::default()).unwrap().len() as u64;
}

/// Pad a name to the fixed on-disk width.
/// Returns `None` when the name is empty or longer than [`NAME_LEN`] bytes.
///
/// On-disk names carry no terminator, so comparisons must always go through
/// the padded form rather than relying on a NUL.
pub fn pad_name(name: &str) -> Option<[u8; NAME_LEN]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > NAME_LEN {
        return None;
    }
    let mut padded = [0u8; NAME_LEN];
    padded[..bytes.len()].copy_from_slice(bytes);
    Some(padded)
}

/// An inode as manipulated in memory: the block it came from, its decoded
/// header, and its link table.
///
/// For a regular file the non-zero links name data blocks in logical order;
/// for a directory they name child inodes in arbitrary order.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Inode {
    /// Index of the block this inode lives in
    pub block_no: u8,
    /// The fixed-size header
    pub node: DInode,
    /// The link table; 0 marks an unused slot
    pub links: [u8; LINK_SLOTS],
}

impl Inode {
    /// A fresh inode at `block_no` with an empty link table.
    pub fn new(block_no: u8, node: DInode) -> Inode {
        Inode {
            block_no,
            node,
            links: [0; LINK_SLOTS],
        }
    }

    /// Decode an inode from the block it is stored in.
    /// The caller is responsible for checking the kind byte; this only
    /// splits the block into header and link table.
    pub fn from_block(b: &Block) -> error::Result<Inode> {
        let node: DInode = b.deserialize_from(0)?;
        let mut links = [0u8; LINK_SLOTS];
        b.read_data(&mut links, LINK_OFFSET)?;
        Ok(Inode {
            block_no: b.block_no as u8,
            node,
            links,
        })
    }

    /// Encode this inode into a full block, ready to be written to disk.
    pub fn to_block(&self) -> error::Result<Block> {
        let mut b = Block::new_zero(self.block_no as u64);
        b.serialize_into(&self.node, 0)?;
        b.write_data(&self.links, LINK_OFFSET)?;
        Ok(b)
    }

    /// Index of the first unused link slot, if any.
    pub fn first_free_slot(&self) -> Option<usize> {
        self.links.iter().position(|&l| l == 0)
    }
}

#[cfg(test)]
mod layout_tests {
    use super::*;

    #[test]
    fn header_sizes() {
        assert_eq!(*SUPERBLOCK_SIZE, 9);
        assert_eq!(*DINODE_SIZE, LINK_OFFSET);
    }

    #[test]
    fn superblock_bytes() {
        let sup = SuperBlock {
            kind: BLOCK_SUPER,
            magic: MAGIC,
            root_inode: ROOT_BLOCK,
            reserved: 0,
            nblocks: 200,
            free_head: 2,
        };
        let mut b = Block::new_zero(0);
        b.serialize_into(&sup, 0).unwrap();
        let mut hdr = [0u8; 9];
        b.read_data(&mut hdr, 0).unwrap();
        assert_eq!(hdr, [1, 0x44, 1, 0, 200, 0, 0, 0, 2]);
        assert_eq!(b.deserialize_from::<SuperBlock>(0).unwrap(), sup);
    }

    #[test]
    fn inode_block_roundtrip() {
        let mut ino = Inode::new(5, DInode::new(*b"log\0\0\0\0\0", false));
        ino.node.set_size(0x010203);
        ino.links[0] = 9;
        ino.links[LINK_SLOTS - 1] = 17;
        let blk = ino.to_block().unwrap();
        let raw = blk.contents_as_ref();
        assert_eq!(raw[0], BLOCK_INODE);
        assert_eq!(raw[1], MAGIC);
        assert_eq!(&raw[4..12], b"log\0\0\0\0\0");
        assert_eq!(&raw[12..15], &[0x03, 0x02, 0x01]);
        assert_eq!(raw[15], 0);
        assert_eq!(raw[16], 9);
        assert_eq!(raw[255], 17);

        let back = Inode::from_block(&blk).unwrap();
        assert_eq!(back, ino);
        assert_eq!(back.node.size(), 0x010203);
    }

    #[test]
    fn name_padding() {
        assert_eq!(pad_name("a"), Some(*b"a\0\0\0\0\0\0\0"));
        assert_eq!(pad_name("12345678"), Some(*b"12345678"));
        assert!(pad_name("").is_none());
        assert!(pad_name("123456789").is_none());

        let d = DInode::new(*b"notes\0\0\0", true);
        assert_eq!(d.name_str(), "notes");
        assert!(d.is_dir());
        assert!(!DInode::new(*b"notes\0\0\0", false).is_dir());
    }

    #[test]
    fn block_bounds() {
        let mut b = Block::new_zero(3);
        let mut window = [0u8; 4];
        assert!(b.read_data(&mut window, BLOCK_SIZE - 3).is_err());
        assert!(b.write_data(&window, BLOCK_SIZE - 3).is_err());
        b.write_data(&window, BLOCK_SIZE - 4).unwrap();
        b.read_data(&mut window, BLOCK_SIZE - 4).unwrap();
    }
}
