use super::DirFs;
use crate::error::FsError;
use std::path::PathBuf;
use tinyfs_api::fs::{BlockSupport, DirectorySupport, FileSysSupport, InodeSupport, PathSupport};
use tinyfs_api::types::{BLOCK_SIZE, ROOT_BLOCK};

#[path = "utils.rs"]
mod utils;

fn disk_prep_path(name: &str) -> PathBuf {
    utils::disk_prep_path(&("fs-images-dir-".to_string() + name), "img")
}

#[test]
fn mkfs_creates_the_root() {
    let path = disk_prep_path("mkfs");
    let my_fs = DirFs::mkfs(&path, 4 * BLOCK_SIZE).unwrap();

    let root = my_fs.i_get(ROOT_BLOCK).unwrap();
    assert!(root.node.is_dir());
    assert_eq!(root.node.name_str(), "/");
    assert_eq!(root.node.size(), 0);
    assert!(root.links.iter().all(|&l| l == 0));

    //The root came off the head of the free chain
    assert_eq!(my_fs.sup_get().unwrap().free_head, 2);
    assert_eq!(utils::free_list_len(&my_fs), 2);

    utils::disk_destruct(my_fs.unmountfs());
}

#[test]
fn resolve_walks_creates_and_rejects() {
    let path = disk_prep_path("resolve");
    let mut my_fs = DirFs::mkfs(&path, 16 * BLOCK_SIZE).unwrap();

    //Creating a file links it into the root
    let f = my_fs.resolve("/notes", true, false).unwrap();
    assert_eq!(f, 2);
    assert_eq!(my_fs.i_get(ROOT_BLOCK).unwrap().links[0], f);

    //Found again, with or without the leading slash
    assert_eq!(my_fs.resolve("/notes", false, false).unwrap(), f);
    assert_eq!(my_fs.resolve("notes", false, false).unwrap(), f);
    //Opening an existing file with create set just returns it
    assert_eq!(my_fs.resolve("/notes", true, false).unwrap(), f);

    //Nested directories and a file inside them
    my_fs.resolve("/home", true, true).unwrap();
    my_fs.resolve("/home/user", true, true).unwrap();
    let cfg = my_fs.resolve("/home/user/cfg", true, false).unwrap();
    assert_eq!(my_fs.resolve("/home/user/cfg", false, false).unwrap(), cfg);

    //The root resolves immediately when asked for as a directory...
    assert_eq!(my_fs.resolve("/", false, true).unwrap(), ROOT_BLOCK);
    assert_eq!(my_fs.resolve("/", true, true).unwrap(), ROOT_BLOCK);
    //...but is not openable as a file
    assert!(matches!(
        my_fs.resolve("/", false, false),
        Err(FsError::Filename(_))
    ));

    //Missing intermediate, descent through a file, existing directory
    assert!(matches!(
        my_fs.resolve("/nope/cfg", false, false),
        Err(FsError::FileNotFound(_))
    ));
    assert!(matches!(
        my_fs.resolve("/notes/x", false, false),
        Err(FsError::FileNotFound(_))
    ));
    assert!(matches!(
        my_fs.resolve("/home", true, true),
        Err(FsError::DirExists)
    ));

    //Malformed components
    assert!(matches!(
        my_fs.resolve("/overlongname", true, false),
        Err(FsError::Filename(_))
    ));
    assert!(matches!(
        my_fs.resolve("/home/", false, true),
        Err(FsError::Filename(_))
    ));
    assert!(matches!(
        my_fs.resolve("", false, false),
        Err(FsError::Filename(_))
    ));

    utils::disk_destruct(my_fs.unmountfs());
}

#[test]
fn lookup_order_is_slot_order() {
    let path = disk_prep_path("lookup");
    let mut my_fs = DirFs::mkfs(&path, 8 * BLOCK_SIZE).unwrap();

    let a = my_fs.resolve("/a", true, false).unwrap();
    let b = my_fs.resolve("/b", true, false).unwrap();
    let root = my_fs.i_get(ROOT_BLOCK).unwrap();
    assert_eq!(my_fs.dirlookup(&root, "a").unwrap(), Some(a));
    assert_eq!(my_fs.dirlookup(&root, "b").unwrap(), Some(b));
    assert_eq!(my_fs.dirlookup(&root, "c").unwrap(), None);

    //dirlookup refuses to search a regular file
    let file = my_fs.i_get(a).unwrap();
    assert!(matches!(
        my_fs.dirlookup(&file, "x"),
        Err(FsError::FileNotFound(_))
    ));

    utils::disk_destruct(my_fs.unmountfs());
}

#[test]
fn clear_parent_links_detaches_the_child() {
    let path = disk_prep_path("unlink");
    let mut my_fs = DirFs::mkfs(&path, 8 * BLOCK_SIZE).unwrap();

    let d = my_fs.resolve("/d", true, true).unwrap();
    let child = my_fs.resolve("/d/leaf", true, false).unwrap();

    my_fs.clear_parent_links("/d/leaf", child).unwrap();
    let dir = my_fs.i_get(d).unwrap();
    assert!(dir.links.iter().all(|&l| l == 0));
    //Only the link is gone; the child block is untouched
    assert!(my_fs.i_get(child).is_ok());
    assert!(matches!(
        my_fs.resolve("/d/leaf", false, false),
        Err(FsError::FileNotFound(_))
    ));

    //A path with no interior separator has the root as parent
    let top = my_fs.resolve("/top", true, false).unwrap();
    my_fs.clear_parent_links("top", top).unwrap();
    assert!(matches!(
        my_fs.resolve("/top", false, false),
        Err(FsError::FileNotFound(_))
    ));

    utils::disk_destruct(my_fs.unmountfs());
}
