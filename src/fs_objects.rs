//! File system objects layered over the raw blocks.
//!
//! This module holds the working representations the operations act on:
//! the flat [`Directory`] loaded from its single data block, validated
//! [`FileName`]s, and the process-wide open-file table handing out
//! descriptors.

use crate::disk::BlockDevice;
use crate::disk_layout::{BlockData, DirectoryBlock, DirectoryEntry, SealedBlock};
use crate::types::BlockIndex;
use crate::{FsError, Result};

/// A validated file name: one to seven ASCII bytes.
///
/// Stored zero-padded in eight bytes, the eighth byte always zero, and
/// compared byte-wise against directory entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileName([u8; 8]);

impl FileName {
    /// Maximum usable name length in bytes.
    pub const MAX_LEN: usize = 7;

    /// Validates and zero-pads a name.
    pub fn new(name: &str) -> Result<Self> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > Self::MAX_LEN {
            return Err(FsError::InvalidFilename);
        }
        if !bytes.iter().all(|&b| b != 0 && b.is_ascii()) {
            return Err(FsError::InvalidFilename);
        }
        let mut padded = [0u8; 8];
        padded[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(padded))
    }

    /// The zero-padded representation stored in a directory entry.
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

/// The flat root directory, loaded from its fixed data block.
///
/// Mutations happen in memory; [`Directory::store`] reseals the block
/// checksum and persists, so every on-disk state of the directory is
/// sealed.
pub struct Directory {
    location: BlockIndex,
    block: DirectoryBlock,
}

impl Directory {
    /// Reads the directory block at `location`.
    pub fn load(dev: &mut BlockDevice, location: BlockIndex) -> Result<Self> {
        Ok(Self {
            location,
            block: DirectoryBlock::load(dev, location)?,
        })
    }

    /// Seals the directory checksum and writes the block back.
    pub fn store(&mut self, dev: &mut BlockDevice) -> Result<()> {
        self.block.seal_and_store(dev, self.location)
    }

    /// Slot index of the first entry named `name`, scanning in ascending
    /// slot order.
    pub fn find(&self, name: &FileName) -> Option<usize> {
        self.block
            .iter()
            .position(|e| !e.is_free() && &e.name == name.as_bytes())
    }

    /// Slot index of the first entry whose inode block is `inode_block`.
    pub fn find_by_inode(&self, inode_block: BlockIndex) -> Option<usize> {
        self.block
            .iter()
            .position(|e| !e.is_free() && e.inode_block == inode_block)
    }

    /// A copy of the entry in `slot`.
    pub fn entry(&self, slot: usize) -> DirectoryEntry {
        self.block[slot]
    }

    /// Iterates over the occupied entries in slot order.
    pub fn entries(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.block.iter().filter(|e| !e.is_free())
    }

    /// Places `(name, inode_block)` in the first free slot.
    pub fn insert(&mut self, name: &FileName, inode_block: BlockIndex) -> Result<usize> {
        let slot = self
            .block
            .iter()
            .position(DirectoryEntry::is_free)
            .ok_or(FsError::DirectoryFull)?;
        self.block[slot] = DirectoryEntry {
            name: *name.as_bytes(),
            inode_block,
        };
        Ok(slot)
    }

    /// Whether any slot is free, without claiming one.
    pub fn has_free_slot(&self) -> bool {
        self.block.iter().any(DirectoryEntry::is_free)
    }

    /// Frees the entry in `slot`.
    pub fn remove(&mut self, slot: usize) {
        self.block[slot].clear();
    }

    /// Overwrites the name of the entry in `slot` in place.
    pub fn rename(&mut self, slot: usize, name: &FileName) {
        self.block[slot].name = *name.as_bytes();
    }
}

/// Capacity of the open-file table.
pub const MAX_OPEN_FILES: usize = 5;

/// One open descriptor: the file's inode block and a read cursor.
#[derive(Debug, Clone, Copy)]
pub struct FileSlot {
    /// Whether the slot is handed out.
    pub in_use: bool,
    /// Inode block of the open file.
    pub inode_block: BlockIndex,
    /// Byte position the next `read_byte` will serve.
    pub cursor: u32,
}

impl Default for FileSlot {
    fn default() -> Self {
        Self {
            in_use: false,
            inode_block: BlockIndex::INVALID,
            cursor: 0,
        }
    }
}

/// The fixed-capacity table of open descriptors.
///
/// A descriptor is simply the slot index. Closing never touches the disk;
/// it only releases the slot.
#[derive(Debug, Default)]
pub struct FileTable {
    slots: [FileSlot; MAX_OPEN_FILES],
}

impl FileTable {
    /// Claims the first free slot for `inode_block`, cursor at zero.
    pub fn acquire(&mut self, inode_block: BlockIndex) -> Result<usize> {
        let fd = self
            .slots
            .iter()
            .position(|s| !s.in_use)
            .ok_or(FsError::FileTableFull)?;
        self.slots[fd] = FileSlot {
            in_use: true,
            inode_block,
            cursor: 0,
        };
        Ok(fd)
    }

    /// The slot behind descriptor `fd`.
    pub fn get(&self, fd: usize) -> Result<&FileSlot> {
        let slot = self.slots.get(fd).ok_or(FsError::OutOfFileTableRange)?;
        if !slot.in_use {
            return Err(FsError::FileNotInUse);
        }
        Ok(slot)
    }

    /// Mutable access to the slot behind descriptor `fd`.
    pub fn get_mut(&mut self, fd: usize) -> Result<&mut FileSlot> {
        let slot = self.slots.get_mut(fd).ok_or(FsError::OutOfFileTableRange)?;
        if !slot.in_use {
            return Err(FsError::FileNotInUse);
        }
        Ok(slot)
    }

    /// Releases descriptor `fd`.
    pub fn release(&mut self, fd: usize) {
        self.slots[fd] = FileSlot::default();
    }

    /// Releases every descriptor.
    pub fn release_all(&mut self) {
        self.slots = Default::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk_layout::MAX_DIRECTORY_ENTRIES;

    #[test]
    fn file_name_validation() {
        assert!(FileName::new("alpha").is_ok());
        assert!(FileName::new("a").is_ok());
        assert!(FileName::new("seven77").is_ok());
        assert_eq!(FileName::new("").unwrap_err(), FsError::InvalidFilename);
        assert_eq!(
            FileName::new("eight888").unwrap_err(),
            FsError::InvalidFilename
        );
        assert_eq!(FileName::new("héllo").unwrap_err(), FsError::InvalidFilename);
    }

    #[test]
    fn file_name_is_zero_padded() {
        let name = FileName::new("ab").unwrap();
        assert_eq!(name.as_bytes(), &[b'a', b'b', 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn table_hands_out_slots_in_order() {
        let mut table = FileTable::default();
        assert_eq!(table.acquire(BlockIndex::new(6)).unwrap(), 0);
        assert_eq!(table.acquire(BlockIndex::new(10)).unwrap(), 1);
        table.release(0);
        assert_eq!(table.acquire(BlockIndex::new(14)).unwrap(), 0);
    }

    #[test]
    fn table_saturates_at_capacity() {
        let mut table = FileTable::default();
        for _ in 0..MAX_OPEN_FILES {
            table.acquire(BlockIndex::new(6)).unwrap();
        }
        assert_eq!(
            table.acquire(BlockIndex::new(6)).unwrap_err(),
            FsError::FileTableFull
        );
    }

    fn scratch_directory() -> (tempfile::TempDir, BlockDevice, Directory) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.img");
        let mut dev = BlockDevice::open(&path, 8 * crate::BLOCK_SIZE as u64).unwrap();
        let block = DirectoryBlock::empty();
        block.store(&mut dev, BlockIndex::new(3)).unwrap();
        let directory = Directory::load(&mut dev, BlockIndex::new(3)).unwrap();
        (dir, dev, directory)
    }

    #[test]
    fn directory_insert_find_remove() {
        let (_tmp, mut dev, mut directory) = scratch_directory();
        let alpha = FileName::new("alpha").unwrap();
        let beta = FileName::new("beta").unwrap();

        assert_eq!(directory.find(&alpha), None);
        let slot = directory.insert(&alpha, BlockIndex::new(6)).unwrap();
        assert_eq!(slot, 0);
        directory.insert(&beta, BlockIndex::new(10)).unwrap();
        assert_eq!(directory.find(&alpha), Some(0));
        assert_eq!(directory.find(&beta), Some(1));
        assert_eq!(directory.find_by_inode(BlockIndex::new(10)), Some(1));

        directory.store(&mut dev).unwrap();
        let reloaded = Directory::load(&mut dev, BlockIndex::new(3)).unwrap();
        assert_eq!(reloaded.find(&alpha), Some(0));

        directory.remove(0);
        assert_eq!(directory.find(&alpha), None);
        // The freed slot is reused first.
        let gamma = FileName::new("gamma").unwrap();
        assert_eq!(directory.insert(&gamma, BlockIndex::new(14)).unwrap(), 0);
    }

    #[test]
    fn directory_rename_in_place() {
        let (_tmp, _dev, mut directory) = scratch_directory();
        let alpha = FileName::new("alpha").unwrap();
        let beta = FileName::new("beta").unwrap();
        let slot = directory.insert(&alpha, BlockIndex::new(6)).unwrap();
        directory.rename(slot, &beta);
        assert_eq!(directory.find(&alpha), None);
        assert_eq!(directory.find(&beta), Some(slot));
        assert_eq!(directory.entry(slot).inode_block, BlockIndex::new(6));
    }

    #[test]
    fn directory_saturates_at_capacity() {
        let (_tmp, _dev, mut directory) = scratch_directory();
        for i in 0..MAX_DIRECTORY_ENTRIES {
            let name = FileName::new(&format!("f{i}")).unwrap();
            directory.insert(&name, BlockIndex::new(6 + i as u32)).unwrap();
        }
        assert!(!directory.has_free_slot());
        let overflow = FileName::new("x22").unwrap();
        assert_eq!(
            directory.insert(&overflow, BlockIndex::new(90)).unwrap_err(),
            FsError::DirectoryFull
        );
    }

    #[test]
    fn table_rejects_bad_descriptors() {
        let mut table = FileTable::default();
        assert_eq!(
            table.get(MAX_OPEN_FILES).unwrap_err(),
            FsError::OutOfFileTableRange
        );
        assert_eq!(table.get(0).unwrap_err(), FsError::FileNotInUse);
        let fd = table.acquire(BlockIndex::new(6)).unwrap();
        table.get(fd).unwrap();
        table.release(fd);
        assert_eq!(table.get(fd).unwrap_err(), FsError::FileNotInUse);
    }
}
