#![allow(dead_code)]

//General utilities for tests that need a disk image on the host filesystem
use std::fs::{create_dir_all, remove_dir, remove_file};
use std::path::{Path, PathBuf};
use tinyfs_api::controller::Device;
use tinyfs_api::fs::BlockSupport;
use tinyfs_api::types::FreeBlock;

//Create the directories leading up to 'img_name' under the crate root, and
//remove a leftover image from a previous (possibly failed) run.
//Every test passes its own unique 'name', so the suite can run in parallel.
pub fn disk_prep_path(name: &str, img_name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push(name);
    path.push(img_name);

    if path.exists() {
        remove_file(&path).unwrap();
    }
    create_dir_all(path.parent().unwrap()).unwrap();

    path
}

//Undo disk_prep_path, including the parent directory
pub fn disk_unprep_path(path: &Path) {
    remove_file(path).unwrap();
    remove_dir(path.parent().unwrap()).unwrap(); //Safety; only removes an empty directory
}

//Tear down a device and the directory holding its image
pub fn disk_destruct(dev: Device) {
    let path = dev.device_path().to_owned();
    drop(dev); //Release the memory map before touching the file
    disk_unprep_path(&path);
}

//Walk the free list and count its nodes
pub fn free_list_len<FS: BlockSupport>(fs: &FS) -> u64 {
    let mut head = fs.sup_get().unwrap().free_head;
    let mut count = 0;
    while head != 0 {
        count += 1;
        let node: FreeBlock = fs.b_get(head).unwrap().deserialize_from(0).unwrap();
        head = node.next;
    }
    count
}
