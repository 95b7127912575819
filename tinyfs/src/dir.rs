//! The directory layer: the inode tree and absolute-path resolution.
//!
//! A directory is an inode whose link table names child inodes; names live
//! in the children, not in the directory. Resolution walks the tree from
//! the root one component at a time, comparing NUL-padded names. Formatting
//! at this layer claims the first free block for the root inode, which
//! therefore always sits at block 1.

use std::path::Path;
use tinyfs_api::controller::Device;
use tinyfs_api::fs::{BlockSupport, DirectorySupport, FileSysSupport, InodeSupport, PathSupport};
use tinyfs_api::types::{
    pad_name, Block, DInode, Inode, SuperBlock, LINK_SLOTS, NAME_LEN, ROOT_BLOCK,
};

use crate::error::FsError;
use crate::inode::InodeFs;

/// Filesystem view at the directory layer.
#[derive(Debug)]
pub struct DirFs {
    inode_fs: InodeFs,
}

/// The path prefix naming the parent of `path`, or `None` when the parent
/// is the root (no interior separator).
fn parent_path(path: &str) -> Option<&str> {
    match path.rfind('/') {
        None | Some(0) => None,
        Some(pos) => Some(&path[..pos]),
    }
}

impl FileSysSupport for DirFs {
    type Error = FsError;

    fn sb_valid(sb: &SuperBlock) -> bool {
        InodeFs::sb_valid(sb)
    }

    fn mkfs<P: AsRef<Path>>(path: P, nbytes: u64) -> Result<Self, Self::Error> {
        let mut inode_fs = InodeFs::mkfs(path, nbytes)?;
        // On a fresh image the free list starts right after the superblock,
        // so this claims block 1 for the root.
        let root_no = inode_fs.b_alloc()?;
        debug_assert_eq!(root_no, ROOT_BLOCK);
        let root = Inode::new(root_no, DInode::new(*b"/\0\0\0\0\0\0\0", true));
        inode_fs.i_put(&root)?;
        Ok(DirFs { inode_fs })
    }

    fn mountfs(dev: Device) -> Result<Self, Self::Error> {
        Ok(DirFs {
            inode_fs: InodeFs::mountfs(dev)?,
        })
    }

    fn unmountfs(self) -> Device {
        self.inode_fs.unmountfs()
    }
}

impl BlockSupport for DirFs {
    fn b_get(&self, i: u8) -> Result<Block, Self::Error> {
        self.inode_fs.b_get(i)
    }

    fn b_put(&mut self, b: &Block) -> Result<(), Self::Error> {
        self.inode_fs.b_put(b)
    }

    fn b_free(&mut self, i: u8) -> Result<(), Self::Error> {
        self.inode_fs.b_free(i)
    }

    fn b_alloc(&mut self) -> Result<u8, Self::Error> {
        self.inode_fs.b_alloc()
    }

    fn sup_get(&self) -> Result<SuperBlock, Self::Error> {
        self.inode_fs.sup_get()
    }

    fn sup_put(&mut self, sup: &SuperBlock) -> Result<(), Self::Error> {
        self.inode_fs.sup_put(sup)
    }
}

impl InodeSupport for DirFs {
    fn i_get(&self, i: u8) -> Result<Inode, Self::Error> {
        self.inode_fs.i_get(i)
    }

    fn i_put(&mut self, ino: &Inode) -> Result<(), Self::Error> {
        self.inode_fs.i_put(ino)
    }

    fn i_trunc(&mut self, ino: &mut Inode) -> Result<(), Self::Error> {
        self.inode_fs.i_trunc(ino)
    }
}

impl DirectorySupport for DirFs {
    fn dirlookup(&self, dir: &Inode, name: &str) -> Result<Option<u8>, Self::Error> {
        if !dir.node.is_dir() {
            return Err(FsError::FileNotFound("not a directory"));
        }
        let target = pad_name(name).ok_or(FsError::Filename("name must be 1..=8 bytes"))?;
        for &slot in dir.links.iter() {
            if slot == 0 {
                continue;
            }
            let child = self.i_get(slot)?;
            if child.node.name == target {
                return Ok(Some(slot));
            }
        }
        Ok(None)
    }

    fn dirlink(&mut self, dir: &mut Inode, name: &str, is_dir: bool) -> Result<u8, Self::Error> {
        let free_slot = dir.first_free_slot().ok_or(FsError::FileSizeLimit)?;
        let padded = pad_name(name).ok_or(FsError::Filename("name must be 1..=8 bytes"))?;
        let new_no = self.b_alloc()?;
        let child = Inode::new(new_no, DInode::new(padded, is_dir));
        self.i_put(&child)?;
        dir.links[free_slot] = new_no;
        self.i_put(dir)?;
        Ok(new_no)
    }

    fn dirunlink(&mut self, dir: &mut Inode, child: u8) -> Result<(), Self::Error> {
        for slot in 0..LINK_SLOTS {
            if dir.links[slot] == child {
                dir.links[slot] = 0;
            }
        }
        self.i_put(dir)
    }
}

impl PathSupport for DirFs {
    fn valid_name(name: &str) -> bool {
        !name.is_empty() && name.len() <= NAME_LEN
    }

    fn resolve(&mut self, path: &str, create: bool, is_dir: bool) -> Result<u8, Self::Error> {
        if path == "/" && is_dir {
            return Ok(ROOT_BLOCK);
        }
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let components: Vec<&str> = trimmed.split('/').collect();
        let mut dir = self.i_get(ROOT_BLOCK)?;
        for (depth, component) in components.iter().enumerate() {
            if !Self::valid_name(component) {
                return Err(FsError::Filename("component must be 1..=8 bytes"));
            }
            let terminal = depth == components.len() - 1;
            match self.dirlookup(&dir, component)? {
                Some(found) => {
                    if terminal {
                        if create && is_dir {
                            return Err(FsError::DirExists);
                        }
                        return Ok(found);
                    }
                    let next = self.i_get(found)?;
                    if !next.node.is_dir() {
                        return Err(FsError::FileNotFound("path runs through a file"));
                    }
                    dir = next;
                }
                None => {
                    if terminal && create {
                        return self.dirlink(&mut dir, component, is_dir);
                    }
                    return Err(FsError::FileNotFound("no such path"));
                }
            }
        }
        // Components are never empty, so the loop always returns.
        Err(FsError::FileNotFound("no such path"))
    }

    fn clear_parent_links(&mut self, path: &str, child: u8) -> Result<(), Self::Error> {
        let parent_no = match parent_path(path) {
            Some(prefix) => self.resolve(prefix, false, true)?,
            None => ROOT_BLOCK,
        };
        let mut parent = self.i_get(parent_no)?;
        self.dirunlink(&mut parent, child)
    }
}

#[cfg(test)]
#[path = "../../api/fs-tests/dir_test.rs"]
mod tests;
