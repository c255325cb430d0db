//! On-disk layout of the file system's block structures.
//!
//! This module defines the byte-exact representation of the four block
//! kinds: the superblock, the allocation bitmap, inodes, and data blocks
//! (plus the two interpretations of a data block, as a directory and as an
//! indirect pointer table). Each type is laid out to match the packed
//! little-endian format persisted in the disk image, and a compile-time
//! assert pins every one of them to exactly one block.
//!
//! Structured blocks implement [`SealedBlock`]: writing goes through a
//! *seal* step that recomputes the stored checksum, and reading may verify
//! it. The superblock and inodes checksum the whole block with the
//! checksum field zeroed; data blocks checksum their 254 payload bytes
//! only.

use crate::disk::{BLOCK_SIZE, BlockDevice};
use crate::types::BlockIndex;
use crate::{Result, crc};
use bytemuck::{Pod, Zeroable};

/// Magic byte identifying a formatted volume.
pub const MAGIC: u8 = 0x5A;

/// Payload bytes of a data block (the rest is the checksum).
pub const DATA_SIZE: usize = BLOCK_SIZE - 2;

/// Pointer slots held by one indirect block.
pub const MAX_INDIRECT_POINTERS: usize = DATA_SIZE / 4;

/// Entries held by the directory block.
pub const MAX_DIRECTORY_ENTRIES: usize = DATA_SIZE / size_of::<DirectoryEntry>();

/// Largest representable file: two direct chunks plus one chunk per
/// indirect slot.
pub const MAX_FILE_SIZE: usize = (2 + MAX_INDIRECT_POINTERS) * DATA_SIZE;

/// Block index of the superblock.
pub const SUPERBLOCK_BLOCK: BlockIndex = BlockIndex::new(0);
/// Block index of the allocation bitmap.
pub const BITMAP_BLOCK: BlockIndex = BlockIndex::new(1);
/// Block index of the root directory's inode.
pub const ROOT_INODE_BLOCK: BlockIndex = BlockIndex::new(2);
/// Block index of the root directory's data block.
pub const ROOT_DIR_BLOCK: BlockIndex = BlockIndex::new(3);

/// A type whose in-memory layout is exactly one on-disk block.
///
/// Provides whole-block transfer between the typed representation and the
/// disk image. Implementors assert `size_of::<Self>() == BLOCK_SIZE`.
pub trait BlockData: Pod {
    /// Reads the block at `index` and reinterprets it as `Self`.
    fn load(dev: &mut BlockDevice, index: BlockIndex) -> Result<Self> {
        let mut buf = [0u8; BLOCK_SIZE];
        dev.read_block(index, &mut buf)?;
        Ok(bytemuck::cast(buf))
    }

    /// Writes this block to `index`.
    fn store(&self, dev: &mut BlockDevice, index: BlockIndex) -> Result<()> {
        dev.write_block(index, bytemuck::cast_ref(self))
    }
}

/// A block protected by a stored 16-bit truncated CRC-32.
pub trait SealedBlock: BlockData {
    /// Recomputes the checksum and stores it in the block.
    fn seal(&mut self);

    /// Checks the stored checksum against the block contents.
    fn verify(&self) -> bool;

    /// Seals the block and persists it, so a mutated block can never reach
    /// the disk with a stale checksum.
    fn seal_and_store(&mut self, dev: &mut BlockDevice, index: BlockIndex) -> Result<()> {
        self.seal();
        self.store(dev, index)
    }
}

/// Block 0: describes the volume.
#[repr(C, packed)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct SuperBlock {
    /// Volume magic, [`MAGIC`] on a formatted image.
    pub magic: u8,
    /// Index of the allocation bitmap block.
    pub bitmap_block: BlockIndex,
    /// Index of the root directory's inode block.
    pub root_dir_inode: BlockIndex,
    /// Volume size in bytes.
    pub fs_size: u32,
    /// Truncated CRC-32 over the whole block with this field zeroed.
    pub checksum: u16,
    padding: [u8; BLOCK_SIZE - 15],
}

const _: () = assert!(size_of::<SuperBlock>() == BLOCK_SIZE);

impl SuperBlock {
    /// Builds the superblock of a fresh volume of `fs_size` bytes.
    pub fn new(fs_size: u32) -> Self {
        Self {
            magic: MAGIC,
            bitmap_block: BITMAP_BLOCK,
            root_dir_inode: ROOT_INODE_BLOCK,
            fs_size,
            checksum: 0,
            padding: [0; BLOCK_SIZE - 15],
        }
    }

    /// Number of blocks described by this superblock.
    pub fn block_count(&self) -> usize {
        ({ self.fs_size } as usize) / BLOCK_SIZE
    }
}

impl core::fmt::Debug for SuperBlock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SuperBlock")
            .field("magic", &{ self.magic })
            .field("bitmap_block", &{ self.bitmap_block })
            .field("root_dir_inode", &{ self.root_dir_inode })
            .field("fs_size", &{ self.fs_size })
            .finish()
    }
}

impl BlockData for SuperBlock {}

impl SealedBlock for SuperBlock {
    fn seal(&mut self) {
        self.checksum = 0;
        self.checksum = crc::checksum16(bytemuck::bytes_of(self));
    }

    fn verify(&self) -> bool {
        let mut copy = *self;
        copy.checksum = 0;
        (self.checksum) == crc::checksum16(bytemuck::bytes_of(&copy))
    }
}

/// Block 1: one allocation bit per block, LSB-first within each byte.
///
/// Bit `n` lives at byte `n >> 3`, position `n & 7`; a set bit means block
/// `n` is allocated. The 2048 bits bound the volume at 2048 blocks.
#[repr(transparent)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct BitmapBlock {
    bits: [u8; BLOCK_SIZE],
}

const _: () = assert!(size_of::<BitmapBlock>() == BLOCK_SIZE);

/// Blocks representable by the bitmap.
pub const BITMAP_CAPACITY: usize = BLOCK_SIZE * 8;

impl BitmapBlock {
    /// Whether block `n` is marked allocated.
    pub fn is_used(&self, n: usize) -> bool {
        (self.bits[n >> 3] >> (n & 7)) & 1 != 0
    }

    /// Marks block `n` allocated.
    pub fn mark_used(&mut self, n: usize) {
        self.bits[n >> 3] |= 1 << (n & 7);
    }

    /// Marks block `n` free.
    pub fn mark_free(&mut self, n: usize) {
        self.bits[n >> 3] &= !(1 << (n & 7));
    }

    /// First clear bit in `[0, block_count)`, scanning in ascending order.
    pub fn first_free(&self, block_count: usize) -> Option<usize> {
        (0..block_count).find(|&n| !self.is_used(n))
    }
}

impl BlockData for BitmapBlock {}

/// An on-disk inode: type, size, and the block pointers of one file.
#[repr(C, packed)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct Inode {
    /// File type byte, one of the [`FileKind`] values.
    ///
    /// [`FileKind`]: crate::types::FileKind
    pub kind: u8,
    /// File size in bytes.
    pub size: u32,
    /// The first two data blocks of the file.
    pub direct: [BlockIndex; 2],
    /// Block holding the pointer table for the rest of the file.
    pub indirect: BlockIndex,
    /// Truncated CRC-32 over the whole block with this field zeroed.
    pub checksum: u16,
    padding: [u8; BLOCK_SIZE - 19],
}

const _: () = assert!(size_of::<Inode>() == BLOCK_SIZE);

impl Inode {
    /// Builds an unsealed inode block with zeroed padding.
    pub fn new(kind: u8, size: u32, direct: [BlockIndex; 2], indirect: BlockIndex) -> Self {
        Self {
            kind,
            size,
            direct,
            indirect,
            checksum: 0,
            padding: [0; BLOCK_SIZE - 19],
        }
    }
}

impl core::fmt::Debug for Inode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Inode")
            .field("kind", &{ self.kind })
            .field("size", &{ self.size })
            .field("direct", &{ self.direct })
            .field("indirect", &{ self.indirect })
            .finish()
    }
}

impl BlockData for Inode {}

impl SealedBlock for Inode {
    fn seal(&mut self) {
        self.checksum = 0;
        self.checksum = crc::checksum16(bytemuck::bytes_of(self));
    }

    fn verify(&self) -> bool {
        let mut copy = *self;
        copy.checksum = 0;
        (self.checksum) == crc::checksum16(bytemuck::bytes_of(&copy))
    }
}

/// A plain data block: 254 payload bytes and their checksum.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct DataBlock {
    /// File content bytes.
    pub data: [u8; DATA_SIZE],
    /// Truncated CRC-32 over `data`.
    pub checksum: u16,
}

const _: () = assert!(size_of::<DataBlock>() == BLOCK_SIZE);

impl BlockData for DataBlock {}

impl SealedBlock for DataBlock {
    fn seal(&mut self) {
        self.checksum = crc::checksum16(&self.data);
    }

    fn verify(&self) -> bool {
        self.checksum == crc::checksum16(&self.data)
    }
}

/// A single directory entry: a zero-padded name and the entry's inode
/// block.
///
/// A free slot carries [`BlockIndex::INVALID`]. Names hold at most seven
/// ASCII bytes; the eighth byte stays zero so the name is always
/// terminated on display.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct DirectoryEntry {
    /// Zero-padded file name bytes.
    pub name: [u8; 8],
    /// Inode block of the entry, or [`BlockIndex::INVALID`] when free.
    pub inode_block: BlockIndex,
}

const _: () = assert!(size_of::<DirectoryEntry>() == 12);

impl DirectoryEntry {
    /// Whether this slot holds no file.
    pub fn is_free(&self) -> bool {
        !self.inode_block.is_valid()
    }

    /// The entry's name, when the slot is in use and the bytes are valid
    /// UTF-8 (always true for the ASCII names this file system stores).
    pub fn name(&self) -> Option<&str> {
        if self.is_free() {
            return None;
        }
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(7);
        core::str::from_utf8(&self.name[..len]).ok()
    }

    /// Frees the slot: zeroes the name and invalidates the inode pointer.
    pub fn clear(&mut self) {
        self.name = [0; 8];
        self.inode_block = BlockIndex::INVALID;
    }
}

/// A data block interpreted as the flat directory.
///
/// The payload is a contiguous array of [`MAX_DIRECTORY_ENTRIES`] entries;
/// the two bytes between the last entry and the checksum stay zero.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct DirectoryBlock {
    entries: [DirectoryEntry; MAX_DIRECTORY_ENTRIES],
    _reserved: [u8; DATA_SIZE - MAX_DIRECTORY_ENTRIES * size_of::<DirectoryEntry>()],
    /// Truncated CRC-32 over the 254 payload bytes.
    pub checksum: u16,
}

const _: () = assert!(size_of::<DirectoryBlock>() == BLOCK_SIZE);

impl DirectoryBlock {
    /// An empty directory: every slot free, checksum sealed.
    pub fn empty() -> Self {
        let mut block = Self::zeroed();
        for entry in block.entries.iter_mut() {
            entry.inode_block = BlockIndex::INVALID;
        }
        block.seal();
        block
    }
}

impl core::ops::Deref for DirectoryBlock {
    type Target = [DirectoryEntry; MAX_DIRECTORY_ENTRIES];
    fn deref(&self) -> &Self::Target {
        &self.entries
    }
}

impl core::ops::DerefMut for DirectoryBlock {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.entries
    }
}

impl BlockData for DirectoryBlock {}

impl SealedBlock for DirectoryBlock {
    fn seal(&mut self) {
        self.checksum = crc::checksum16(&bytemuck::bytes_of(self)[..DATA_SIZE]);
    }

    fn verify(&self) -> bool {
        self.checksum == crc::checksum16(&bytemuck::bytes_of(self)[..DATA_SIZE])
    }
}

/// A data block interpreted as an indirect pointer table.
///
/// Slot `k` holds the physical block of the file's `(2 + k)`-th chunk, or
/// [`BlockIndex::INVALID`] when that chunk does not exist.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct IndirectBlock {
    slots: [BlockIndex; MAX_INDIRECT_POINTERS],
    _reserved: [u8; DATA_SIZE - MAX_INDIRECT_POINTERS * 4],
    /// Truncated CRC-32 over the 254 payload bytes.
    pub checksum: u16,
}

const _: () = assert!(size_of::<IndirectBlock>() == BLOCK_SIZE);

impl IndirectBlock {
    /// A pointer table with every slot invalidated, checksum sealed.
    pub fn empty() -> Self {
        let mut block = Self::zeroed();
        block.slots = [BlockIndex::INVALID; MAX_INDIRECT_POINTERS];
        block.seal();
        block
    }
}

impl core::ops::Deref for IndirectBlock {
    type Target = [BlockIndex; MAX_INDIRECT_POINTERS];
    fn deref(&self) -> &Self::Target {
        &self.slots
    }
}

impl core::ops::DerefMut for IndirectBlock {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.slots
    }
}

impl BlockData for IndirectBlock {}

impl SealedBlock for IndirectBlock {
    fn seal(&mut self) {
        self.checksum = crc::checksum16(&bytemuck::bytes_of(self)[..DATA_SIZE]);
    }

    fn verify(&self) -> bool {
        self.checksum == crc::checksum16(&bytemuck::bytes_of(self)[..DATA_SIZE])
    }
}
