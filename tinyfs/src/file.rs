//! The top layer: the open-file table and the descriptor-based public API.
//!
//! A [`TinyFs`] value is one mounted filesystem; creating it with
//! [`TinyFs::mount`] (or [`TinyFs::mkfs`]) binds the image, consuming it
//! with `unmountfs` releases the image and every open descriptor. All
//! process-visible state lives in this value.
//!
//! Descriptors are handed out from a counter starting at 1 and are never
//! reused within a mount; 0 is not a valid descriptor. Each open file
//! remembers the path it was opened by, its inode block and a byte cursor.
//! The entry does not pin the file: deleting or removing it from another
//! descriptor leaves stale entries behind, and the next operation through
//! one of those notices that its block no longer holds an inode.

use std::io::{self, Write};
use std::path::Path;
use tinyfs_api::controller::Device;
use tinyfs_api::error::ApiError;
use tinyfs_api::fs::{BlockSupport, DirectorySupport, FileSysSupport, InodeSupport, PathSupport};
use tinyfs_api::types::{
    pad_name, Block, Inode, SuperBlock, BLOCK_DATA, DATA_BYTES, DATA_OFFSET, LINK_SLOTS, MAGIC,
    MAX_PATH, ROOT_BLOCK,
};

use crate::dir::DirFs;
use crate::error::FsError;

/// The open-file table grows by this many slots whenever it is full.
const TABLE_CHUNK: usize = 100;

/// One open file: its descriptor, the path it was opened by, the byte
/// cursor and the block index of its inode.
#[derive(Debug)]
struct OpenFile {
    fd: u32,
    path: String,
    offset: u64,
    inode_block: u8,
}

#[derive(Debug)]
struct OpenFileTable {
    entries: Vec<Option<OpenFile>>,
    next_fd: u32,
}

impl OpenFileTable {
    fn new() -> OpenFileTable {
        let mut entries = Vec::new();
        entries.resize_with(TABLE_CHUNK, || None);
        OpenFileTable {
            entries,
            next_fd: 1,
        }
    }

    fn insert(&mut self, path: &str, inode_block: u8) -> Result<u32, FsError> {
        let slot = match self.entries.iter().position(|e| e.is_none()) {
            Some(free) => free,
            None => {
                self.entries
                    .try_reserve(TABLE_CHUNK)
                    .map_err(|_| FsError::NoMemory)?;
                let end = self.entries.len();
                self.entries.resize_with(end + TABLE_CHUNK, || None);
                end
            }
        };
        let fd = self.next_fd;
        self.next_fd += 1;
        self.entries[slot] = Some(OpenFile {
            fd,
            path: path.to_string(),
            offset: 0,
            inode_block,
        });
        Ok(fd)
    }

    fn get(&self, fd: u32) -> Result<&OpenFile, FsError> {
        self.entries
            .iter()
            .flatten()
            .find(|e| e.fd == fd)
            .ok_or(FsError::FdNotFound(fd))
    }

    fn get_mut(&mut self, fd: u32) -> Result<&mut OpenFile, FsError> {
        self.entries
            .iter_mut()
            .flatten()
            .find(|e| e.fd == fd)
            .ok_or(FsError::FdNotFound(fd))
    }

    fn remove(&mut self, fd: u32) -> Result<OpenFile, FsError> {
        let slot = self
            .entries
            .iter()
            .position(|e| e.as_ref().map_or(false, |x| x.fd == fd))
            .ok_or(FsError::FdNotFound(fd))?;
        self.entries[slot].take().ok_or(FsError::FdNotFound(fd))
    }
}

/// Join a directory path and a child name with a single separator.
fn join_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{}{}", parent, name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// A mounted filesystem with its open-file table.
#[derive(Debug)]
pub struct TinyFs {
    dir_fs: DirFs,
    table: OpenFileTable,
}

impl FileSysSupport for TinyFs {
    type Error = FsError;

    fn sb_valid(sb: &SuperBlock) -> bool {
        DirFs::sb_valid(sb)
    }

    fn mkfs<P: AsRef<Path>>(path: P, nbytes: u64) -> Result<Self, Self::Error> {
        Ok(TinyFs {
            dir_fs: DirFs::mkfs(path, nbytes)?,
            table: OpenFileTable::new(),
        })
    }

    fn mountfs(dev: Device) -> Result<Self, Self::Error> {
        Ok(TinyFs {
            dir_fs: DirFs::mountfs(dev)?,
            table: OpenFileTable::new(),
        })
    }

    fn unmountfs(self) -> Device {
        self.dir_fs.unmountfs()
    }
}

impl BlockSupport for TinyFs {
    fn b_get(&self, i: u8) -> Result<Block, Self::Error> {
        self.dir_fs.b_get(i)
    }

    fn b_put(&mut self, b: &Block) -> Result<(), Self::Error> {
        self.dir_fs.b_put(b)
    }

    fn b_free(&mut self, i: u8) -> Result<(), Self::Error> {
        self.dir_fs.b_free(i)
    }

    fn b_alloc(&mut self) -> Result<u8, Self::Error> {
        self.dir_fs.b_alloc()
    }

    fn sup_get(&self) -> Result<SuperBlock, Self::Error> {
        self.dir_fs.sup_get()
    }

    fn sup_put(&mut self, sup: &SuperBlock) -> Result<(), Self::Error> {
        self.dir_fs.sup_put(sup)
    }
}

impl InodeSupport for TinyFs {
    fn i_get(&self, i: u8) -> Result<Inode, Self::Error> {
        self.dir_fs.i_get(i)
    }

    fn i_put(&mut self, ino: &Inode) -> Result<(), Self::Error> {
        self.dir_fs.i_put(ino)
    }

    fn i_trunc(&mut self, ino: &mut Inode) -> Result<(), Self::Error> {
        self.dir_fs.i_trunc(ino)
    }
}

impl DirectorySupport for TinyFs {
    fn dirlookup(&self, dir: &Inode, name: &str) -> Result<Option<u8>, Self::Error> {
        self.dir_fs.dirlookup(dir, name)
    }

    fn dirlink(&mut self, dir: &mut Inode, name: &str, is_dir: bool) -> Result<u8, Self::Error> {
        self.dir_fs.dirlink(dir, name, is_dir)
    }

    fn dirunlink(&mut self, dir: &mut Inode, child: u8) -> Result<(), Self::Error> {
        self.dir_fs.dirunlink(dir, child)
    }
}

impl PathSupport for TinyFs {
    fn valid_name(name: &str) -> bool {
        DirFs::valid_name(name)
    }

    fn resolve(&mut self, path: &str, create: bool, is_dir: bool) -> Result<u8, Self::Error> {
        self.dir_fs.resolve(path, create, is_dir)
    }

    fn clear_parent_links(&mut self, path: &str, child: u8) -> Result<(), Self::Error> {
        self.dir_fs.clear_parent_links(path, child)
    }
}

impl TinyFs {
    /// Format a fresh image of `nbytes / BLOCK_SIZE` blocks at `path`.
    /// The image is written, flushed and released again; use
    /// [`TinyFs::mount`] to start working with it.
    pub fn format<P: AsRef<Path>>(path: P, nbytes: u64) -> Result<(), FsError> {
        let fs = TinyFs::mkfs(path, nbytes)?;
        fs.unmountfs();
        Ok(())
    }

    /// Mount the image at `path` after verifying its integrity.
    pub fn mount<P: AsRef<Path>>(path: P) -> Result<TinyFs, FsError> {
        let dev = Device::open(path)?;
        TinyFs::mountfs(dev)
    }

    /// Open the file at `path`, creating it if it does not exist yet, and
    /// return a fresh descriptor. Opening the same path twice yields two
    /// descriptors with independent cursors on the same inode.
    pub fn open(&mut self, path: &str) -> Result<u32, FsError> {
        if path.is_empty() || path.len() > MAX_PATH {
            return Err(FsError::Filename("path must be 1..=255 bytes"));
        }
        let inode_block = self.resolve(path, true, false)?;
        self.table.insert(path, inode_block)
    }

    /// Close a descriptor. The file itself is untouched.
    pub fn close(&mut self, fd: u32) -> Result<(), FsError> {
        self.table.remove(fd)?;
        Ok(())
    }

    /// Replace the contents of the open file with `buf`.
    ///
    /// The old data blocks are released first; then the new contents go out
    /// one chunk at a time, with the inode (links and size) persisted after
    /// every chunk. When space runs out mid-write, whether the free list is
    /// exhausted or the link table is full, the durably written prefix is
    /// kept and the size-limit error is returned. On success the cursor is
    /// reset to 0.
    pub fn write(&mut self, fd: u32, buf: &[u8]) -> Result<(), FsError> {
        let inode_block = self.table.get(fd)?.inode_block;
        let mut ino = self.i_get(inode_block)?;
        self.i_trunc(&mut ino)?;

        let mut written = 0usize;
        let mut slot = 0usize;
        while slot < LINK_SLOTS && written < buf.len() {
            let n = usize::min(DATA_BYTES as usize, buf.len() - written);
            let data_no = self.b_alloc()?;
            let mut b = Block::new_zero(data_no as u64);
            b.write_data(&[BLOCK_DATA, MAGIC], 0)?;
            b.write_data(&buf[written..written + n], DATA_OFFSET)?;
            self.b_put(&b)?;
            ino.links[slot] = data_no;
            written += n;
            ino.node.set_size(written as u32);
            self.i_put(&ino)?;
            slot += 1;
        }
        if written < buf.len() {
            return Err(FsError::FileSizeLimit);
        }
        self.table.get_mut(fd)?.offset = 0;
        Ok(())
    }

    /// Read the byte under the cursor and advance the cursor by one.
    /// Reading at or past the stored file size is the end-of-file error.
    pub fn read_byte(&mut self, fd: u32) -> Result<u8, FsError> {
        let (inode_block, offset) = {
            let entry = self.table.get(fd)?;
            (entry.inode_block, entry.offset)
        };
        let ino = self.i_get(inode_block)?;
        if offset >= ino.node.size() as u64 {
            return Err(FsError::EndOfFile);
        }
        let slot = (offset / DATA_BYTES) as usize;
        let within = offset % DATA_BYTES;
        let data = self.b_get(ino.links[slot])?;
        let mut byte = [0u8; 1];
        data.read_data(&mut byte, DATA_OFFSET + within)?;
        self.table.get_mut(fd)?.offset += 1;
        Ok(byte[0])
    }

    /// Move the cursor of the open file.
    /// Any offset is accepted; one past the end of the file only surfaces
    /// as end-of-file on the next read.
    pub fn seek(&mut self, fd: u32, offset: u64) -> Result<(), FsError> {
        self.table.get_mut(fd)?.offset = offset;
        Ok(())
    }

    /// Delete the open file: release its data blocks, unlink it from its
    /// parent directory, free its inode block, and drop the descriptor.
    pub fn delete(&mut self, fd: u32) -> Result<(), FsError> {
        let (inode_block, path) = {
            let entry = self.table.get(fd)?;
            (entry.inode_block, entry.path.clone())
        };
        let mut ino = self.i_get(inode_block)?;
        self.i_trunc(&mut ino)?;
        self.clear_parent_links(&path, inode_block)?;
        self.b_free(inode_block)?;
        self.table.remove(fd)?;
        Ok(())
    }

    /// Create a directory at `path`. The whole prefix must already exist.
    pub fn create_dir(&mut self, path: &str) -> Result<(), FsError> {
        self.resolve(path, true, true)?;
        Ok(())
    }

    /// Remove the empty directory at `path` and the parent's link to it.
    /// The root cannot be removed.
    pub fn remove_dir(&mut self, path: &str) -> Result<(), FsError> {
        let dir_no = self.resolve(path, false, true)?;
        let dir = self.i_get(dir_no)?;
        if !dir.node.is_dir() {
            return Err(FsError::FileNotFound("not a directory"));
        }
        if dir.links.iter().any(|&l| l != 0) {
            return Err(FsError::DirNonempty);
        }
        if dir_no == ROOT_BLOCK {
            return Err(FsError::InvalidBlock(ROOT_BLOCK));
        }
        self.b_free(dir_no)?;
        self.clear_parent_links(path, dir_no)?;
        Ok(())
    }

    /// Remove the directory at `path` together with everything below it.
    /// Applied to the root, this empties the filesystem but keeps the root
    /// inode in place.
    ///
    /// An error partway through the traversal propagates, with the work
    /// done so far persisted: every link on disk is either still valid or
    /// already zero.
    pub fn remove_all(&mut self, path: &str) -> Result<(), FsError> {
        let dir_no = self.resolve(path, false, true)?;
        let mut dir = self.i_get(dir_no)?;
        if !dir.node.is_dir() {
            return Err(FsError::FileNotFound("not a directory"));
        }
        for slot in 0..LINK_SLOTS {
            let child_no = dir.links[slot];
            if child_no == 0 {
                continue;
            }
            let mut child = self.i_get(child_no)?;
            if child.node.is_dir() {
                let child_path = join_path(path, &child.node.name_str());
                self.remove_all(&child_path)?;
            } else {
                self.i_trunc(&mut child)?;
                self.b_free(child_no)?;
            }
            // The zeroed slot must be durable before the next child is
            // touched; an error from a later child aborts the loop, and no
            // freed block may still be linked from the directory then.
            dir.links[slot] = 0;
            self.i_put(&dir)?;
        }
        if dir_no != ROOT_BLOCK {
            self.remove_dir(path)?;
        }
        Ok(())
    }

    /// Rename the open file. Parent directories reference children by block
    /// index, so only the inode's own name field changes; the remembered
    /// open path keeps its old spelling.
    pub fn rename(&mut self, fd: u32, new_name: &str) -> Result<(), FsError> {
        let padded = pad_name(new_name).ok_or(FsError::Filename("name must be 1..=8 bytes"))?;
        let inode_block = self.table.get(fd)?.inode_block;
        let mut ino = self.i_get(inode_block)?;
        ino.node.name = padded;
        self.i_put(&ino)
    }

    /// Write the tree rooted at `/` to `out`, one line per entry: files of
    /// a directory first, then its subdirectories, each followed by its own
    /// listing.
    pub fn list_tree<W: Write>(&self, out: &mut W) -> Result<(), FsError> {
        writeln!(out, "(d)\t/").map_err(ApiError::from)?;
        self.list_dir(out, ROOT_BLOCK, "/")
    }

    /// Print the tree rooted at `/` on standard output.
    pub fn list_all(&self) -> Result<(), FsError> {
        let stdout = io::stdout();
        self.list_tree(&mut stdout.lock())
    }

    fn list_dir<W: Write>(&self, out: &mut W, dir_no: u8, path: &str) -> Result<(), FsError> {
        let dir = self.i_get(dir_no)?;
        for &child_no in dir.links.iter() {
            if child_no == 0 {
                continue;
            }
            let child = self.i_get(child_no)?;
            if !child.node.is_dir() {
                let line = join_path(path, &child.node.name_str());
                writeln!(out, "(f)\t{}", line).map_err(ApiError::from)?;
            }
        }
        for &child_no in dir.links.iter() {
            if child_no == 0 {
                continue;
            }
            let child = self.i_get(child_no)?;
            if child.node.is_dir() {
                let child_path = join_path(path, &child.node.name_str());
                writeln!(out, "(d)\t{}", child_path).map_err(ApiError::from)?;
                self.list_dir(out, child_no, &child_path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../api/fs-tests/file_test.rs"]
mod tests;
