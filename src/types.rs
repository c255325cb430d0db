//! Core type definitions for the file system.
//!
//! This module defines fundamental data types used throughout the
//! file system implementation. Most types here are simple wrappers around
//! integers, with utility methods to convert between on-disk values and
//! internal structures.

use crate::{FsError, Result};
use bytemuck::{Pod, Zeroable};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Index of a 256-byte block within the volume.
///
/// The all-ones value (`0xFFFF_FFFF`) is the on-disk sentinel for "no
/// block"; every other value addresses the block at `index * 256` bytes in
/// the disk image.
#[repr(transparent)]
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Pod, Zeroable)]
pub struct BlockIndex(u32);

impl BlockIndex {
    /// The "no block" sentinel.
    pub const INVALID: Self = Self(u32::MAX);

    /// Creates a [`BlockIndex`] addressing block `n`.
    pub const fn new(n: u32) -> Self {
        Self(n)
    }

    /// Whether this index addresses an actual block.
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }

    /// Returns the contained value as a `u32`.
    #[inline]
    pub const fn into_u32(self) -> u32 {
        self.0
    }

    /// Returns the contained value as a `usize`.
    #[inline]
    pub const fn into_usize(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Debug for BlockIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_valid() {
            write!(f, "BlockIndex({})", self.0)
        } else {
            write!(f, "BlockIndex(INVALID)")
        }
    }
}

/// Represents the type of a file in the file system.
///
/// Stored on disk as the first byte of an inode block. There are no
/// directories beyond the root, so the only distinction carried here is the
/// write permission of a regular file.
#[derive(Debug, Eq, PartialEq, Copy, Clone, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FileKind {
    /// A read-only file. Writes and deletion are rejected.
    ReadOnly = 0x01,
    /// A read-write file.
    ReadWrite = 0x02,
}

impl FileKind {
    /// Decodes the on-disk type byte.
    pub fn from_disk(byte: u8) -> Result<Self> {
        Self::try_from(byte).map_err(|_| FsError::FilesystemCorrupted("invalid inode type byte"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_index_sentinel() {
        assert!(!BlockIndex::INVALID.is_valid());
        assert!(BlockIndex::new(0).is_valid());
        assert_eq!(BlockIndex::new(7).into_usize(), 7);
        assert_eq!(BlockIndex::INVALID.into_u32(), u32::MAX);
    }

    #[test]
    fn file_kind_round_trip() {
        assert_eq!(FileKind::from_disk(0x01).unwrap(), FileKind::ReadOnly);
        assert_eq!(FileKind::from_disk(0x02).unwrap(), FileKind::ReadWrite);
        assert_eq!(u8::from(FileKind::ReadWrite), 0x02);
        assert!(FileKind::from_disk(0x00).is_err());
        assert!(FileKind::from_disk(0x5A).is_err());
    }
}
