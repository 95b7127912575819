//! The raw block device: a disk image emulated by a memory-mapped host file.
//!
//! The controller knows nothing about the filesystem layout. It exposes
//! exactly four operations: create an image of a given size, open an
//! existing one, and read or write a single [`BLOCK_SIZE`]-byte block at a
//! given index. All multi-block structure lives in the layers above.
//!
//! No provisions are made to lock the backing file; mutating it from
//! outside while a [`Device`] is live is undefined behavior.

use super::error::{self, ApiError};
use super::types::{Block, BLOCK_SIZE};
use memmap::MmapMut;
use std::{
    fs::{remove_file, OpenOptions},
    path::{Path, PathBuf},
};

/// A disk image bound to a host file.
///
/// Writes land in the memory map and are flushed when the device is
/// dropped, so an image that is formatted, mounted and unmounted again is
/// byte-identical to a freshly formatted one.
#[derive(Debug)]
pub struct Device {
    /// Number of blocks in the image
    pub nblocks: u64,
    /// Path of the backing file
    path: PathBuf,
    /// Memory-mapped contents of the backing file
    contents: MmapMut,
}

impl Drop for Device {
    /// Persist all outstanding writes, unless the backing file is already
    /// gone (see [`Device::destruct`]).
    fn drop(&mut self) {
        if self.path.exists() {
            self.contents.flush().unwrap();
        }
    }
}

impl Device {
    /// Create (or overwrite) an image of `nbytes / BLOCK_SIZE` zero-filled
    /// blocks at `path`. Fails if `nbytes` is smaller than a single block.
    ///
    /// A pre-existing file at `path` is truncated first, so the resulting
    /// image is exactly the requested number of blocks long with no stale
    /// bytes behind it.
    pub fn create<P: AsRef<Path>>(path: P, nbytes: u64) -> error::Result<Device> {
        if nbytes < BLOCK_SIZE {
            return Err(ApiError::ControllerInput(
                "image smaller than a single block",
            ));
        }
        let nblocks = nbytes / BLOCK_SIZE;
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        // Shrinking to zero and growing again zero-fills the whole image.
        f.set_len(0)?;
        f.set_len(nblocks * BLOCK_SIZE)?;
        let contents = unsafe { memmap::MmapOptions::new().map_mut(&f)? };
        Ok(Device {
            nblocks,
            path: path.as_ref().to_path_buf(),
            contents,
        })
    }

    /// Open an existing image at `path`.
    /// Fails if there is no file there, or if it is smaller than one block.
    pub fn open<P: AsRef<Path>>(path: P) -> error::Result<Device> {
        if !path.as_ref().exists() {
            return Err(ApiError::ControllerInput("no image at the given path"));
        }
        let f = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = f.metadata()?.len();
        if len < BLOCK_SIZE {
            return Err(ApiError::ControllerInput(
                "image smaller than a single block",
            ));
        }
        let contents = unsafe { memmap::MmapOptions::new().map_mut(&f)? };
        Ok(Device {
            nblocks: len / BLOCK_SIZE,
            path: path.as_ref().to_path_buf(),
            contents,
        })
    }

    /// Remove the backing file and consume the device.
    /// Meant for tests tearing down their fixtures. Panics if the file
    /// cannot be removed.
    pub fn destruct(self) {
        remove_file(&self.path).unwrap();
    }

    /// Size of the image in bytes.
    pub fn device_size(&self) -> u64 {
        self.nblocks * BLOCK_SIZE
    }

    /// Path of the backing file.
    pub fn device_path(&self) -> &Path {
        &self.path
    }

    fn index_to_addr(&self, index: u64) -> u64 {
        index * BLOCK_SIZE
    }

    fn read(&self, addr: u64, nb: u64) -> error::Result<Box<[u8]>> {
        if addr + nb > self.device_size() {
            return Err(ApiError::ControllerInput("read past the end of the device"));
        }
        let start = addr as usize;
        let end = (addr + nb) as usize;
        Ok(self.contents[start..end].into())
    }

    fn write(&mut self, addr: u64, b: &[u8]) -> error::Result<()> {
        if addr + b.len() as u64 > self.device_size() {
            return Err(ApiError::ControllerInput(
                "write past the end of the device",
            ));
        }
        let start = addr as usize;
        let end = start + b.len();
        self.contents[start..end].copy_from_slice(b);
        Ok(())
    }

    /// Read the block at `index`.
    /// Fails if the index lies past the end of the image.
    pub fn read_block(&self, index: u64) -> error::Result<Block> {
        let addr = self.index_to_addr(index);
        let data = self.read(addr, BLOCK_SIZE)?;
        Ok(Block::new(index, data))
    }

    /// Write the given block at its own index.
    /// Fails if the block is not exactly [`BLOCK_SIZE`] bytes long, or if
    /// its index lies past the end of the image.
    pub fn write_block(&mut self, b: &Block) -> error::Result<()> {
        if b.len() != BLOCK_SIZE {
            return Err(ApiError::ControllerInput(
                "writing a block of the wrong size",
            ));
        }
        let addr = self.index_to_addr(b.block_no);
        self.write(addr, b.contents_as_ref())
    }
}

// Each test works on its own image in its own directory, so the suite can
// run in parallel.
#[cfg(test)]
mod tests {
    use super::Device;
    use crate::types::{Block, BLOCK_SIZE};
    use std::fs::{create_dir_all, remove_dir, remove_file};
    use std::path::{Path, PathBuf};

    const NBLOCKS: u64 = 4;

    fn disk_prep_path(name: &str) -> PathBuf {
        let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        path.push("disk-images-".to_string() + name);
        path.push("img");
        if path.exists() {
            remove_file(&path).unwrap();
        }
        create_dir_all(path.parent().unwrap()).unwrap();
        path
    }

    fn disk_destruct(dev: Device) {
        let path = dev.device_path().to_owned();
        dev.destruct();
        remove_dir(path.parent().unwrap()).unwrap();
    }

    fn pattern_block(block_no: u64) -> Block {
        let data: Vec<u8> = (0..BLOCK_SIZE).map(|i| (i % 251) as u8).collect();
        Block::new(block_no, data.into_boxed_slice())
    }

    #[test]
    fn create_and_rw() {
        let path = disk_prep_path("create");
        let mut dev = Device::create(&path, NBLOCKS * BLOCK_SIZE).unwrap();
        assert_eq!(dev.nblocks, NBLOCKS);
        assert_eq!(dev.device_size(), NBLOCKS * BLOCK_SIZE);

        // A fresh image is all zeroes
        assert_eq!(dev.read_block(2).unwrap(), Block::new_zero(2));

        // Out-of-range accesses are rejected
        assert!(dev.read_block(NBLOCKS).is_err());
        assert!(dev.write_block(&Block::new_zero(NBLOCKS)).is_err());

        // Blocks of the wrong size are rejected
        let small = Block::new(1, vec![0; 16].into_boxed_slice());
        assert!(dev.write_block(&small).is_err());

        // Do we read back what we wrote?
        let bw = pattern_block(1);
        dev.write_block(&bw).unwrap();
        assert_eq!(dev.read_block(1).unwrap(), bw);

        disk_destruct(dev);
        assert!(!path.exists());
    }

    #[test]
    fn reopen_persists() {
        let path = disk_prep_path("reopen");
        let mut dev = Device::create(&path, NBLOCKS * BLOCK_SIZE).unwrap();
        let bw = pattern_block(3);
        dev.write_block(&bw).unwrap();
        drop(dev);

        let dev = Device::open(&path).unwrap();
        assert_eq!(dev.nblocks, NBLOCKS);
        assert_eq!(dev.read_block(3).unwrap(), bw);
        disk_destruct(dev);
    }

    #[test]
    fn create_rejects_sub_block_images() {
        let path = disk_prep_path("small");
        assert!(Device::create(&path, BLOCK_SIZE - 1).is_err());
        // Nothing was created, so opening fails too
        assert!(Device::open(&path).is_err());
        remove_dir(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn create_truncates_existing_images() {
        let path = disk_prep_path("truncate");
        let mut dev = Device::create(&path, 6 * BLOCK_SIZE).unwrap();
        dev.write_block(&pattern_block(5)).unwrap();
        drop(dev);

        let dev = Device::create(&path, NBLOCKS * BLOCK_SIZE).unwrap();
        assert_eq!(dev.nblocks, NBLOCKS);
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            NBLOCKS * BLOCK_SIZE
        );
        for i in 0..NBLOCKS {
            assert_eq!(dev.read_block(i).unwrap(), Block::new_zero(i));
        }
        disk_destruct(dev);
    }
}
