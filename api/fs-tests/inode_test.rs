use super::InodeFs;
use crate::error::FsError;
use std::path::PathBuf;
use tinyfs_api::fs::{BlockSupport, FileSysSupport, InodeSupport};
use tinyfs_api::types::{DInode, Inode, BLOCK_SIZE, DATA_BYTES};

#[path = "utils.rs"]
mod utils;

fn disk_prep_path(name: &str) -> PathBuf {
    utils::disk_prep_path(&("fs-images-inode-".to_string() + name), "img")
}

#[test]
fn get_put_roundtrip() {
    let path = disk_prep_path("getput");
    let mut my_fs = InodeFs::mkfs(&path, 6 * BLOCK_SIZE).unwrap();

    let i = my_fs.b_alloc().unwrap();
    let mut ino = Inode::new(i, DInode::new(*b"notes\0\0\0", false));
    ino.node.set_size(300);
    ino.links[0] = 4;
    ino.links[1] = 5;
    my_fs.i_put(&ino).unwrap();

    let back = my_fs.i_get(i).unwrap();
    assert_eq!(back, ino);
    assert_eq!(back.node.size(), 300);
    assert_eq!(back.node.name_str(), "notes");
    assert!(!back.node.is_dir());

    //A free block does not decode as an inode
    assert!(matches!(my_fs.i_get(3), Err(FsError::FileNotFound(_))));
    //Neither does the superblock
    assert!(matches!(my_fs.i_get(0), Err(FsError::FileNotFound(_))));

    utils::disk_destruct(my_fs.unmountfs());
}

#[test]
fn trunc_releases_content() {
    let path = disk_prep_path("trunc");
    let mut my_fs = InodeFs::mkfs(&path, 8 * BLOCK_SIZE).unwrap();

    let i = my_fs.b_alloc().unwrap();
    let d1 = my_fs.b_alloc().unwrap();
    let d2 = my_fs.b_alloc().unwrap();
    let mut ino = Inode::new(i, DInode::new(*b"a\0\0\0\0\0\0\0", false));
    ino.links[0] = d1;
    ino.links[1] = d2;
    ino.node.set_size(2 * DATA_BYTES as u32);
    my_fs.i_put(&ino).unwrap();

    my_fs.i_trunc(&mut ino).unwrap();
    assert_eq!(ino.node.size(), 0);
    assert!(ino.links.iter().all(|&l| l == 0));
    //The truncated inode was persisted, and stays an inode
    assert_eq!(my_fs.i_get(i).unwrap(), ino);

    //The released blocks come back off the free list, most recent first
    assert_eq!(my_fs.b_alloc().unwrap(), d2);
    assert_eq!(my_fs.b_alloc().unwrap(), d1);
    assert_eq!(my_fs.b_alloc().unwrap(), 4);

    utils::disk_destruct(my_fs.unmountfs());
}
