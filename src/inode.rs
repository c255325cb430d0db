//! In-memory inode and the file-offset indexing scheme.
//!
//! An inode maps a logical byte offset within a file to a physical block
//! and an intra-block offset. The first two 254-byte chunks live in the
//! inode's direct pointers; every later chunk is reached through the
//! single indirect block:
//!
//! ```text
//!        +──────────────+
//!        │ Inode        │
//!        +──────────────+
//!        │ direct[0]    │──► chunk 0   (bytes 0..254)
//!        │ direct[1]    │──► chunk 1   (bytes 254..508)
//!        │ indirect     │──┐
//!        +──────────────+  │
//!                          │   +──────────────+
//!                          └──►│ Indirect blk │
//!                              +──────────────+
//!                              │ slot 0       │──► chunk 2
//!                              │ slot 1       │──► chunk 3
//!                              │ ...          │
//!                              │ slot 62      │──► chunk 64
//!                              +──────────────+
//! ```
//!
//! [`Chunk::locate`] centralizes the dispatch arithmetic so that reads,
//! byte writes, and deletion all translate offsets the same way, and
//! [`Inode::resolve`] turns the result into a physical block by consulting
//! the indirect table on disk when needed.

use crate::disk::BlockDevice;
use crate::disk_layout::{self, BlockData, DATA_SIZE, IndirectBlock, SealedBlock};
use crate::types::{BlockIndex, FileKind};
use crate::{FsError, Result};

/// Which pointer of an inode covers a given file chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk {
    /// One of the two direct pointers.
    Direct(usize),
    /// A slot of the indirect pointer table.
    Indirect(usize),
}

impl Chunk {
    /// Splits a logical byte offset into the covering chunk and the byte
    /// position inside it.
    pub fn locate(offset: u32) -> (Chunk, usize) {
        let depth = (offset as usize) / DATA_SIZE;
        let intra = (offset as usize) % DATA_SIZE;
        if depth < 2 {
            (Chunk::Direct(depth), intra)
        } else {
            (Chunk::Indirect(depth - 2), intra)
        }
    }
}

/// The decoded metadata of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    /// Read-only or read-write.
    pub kind: FileKind,
    /// File size in bytes.
    pub size: u32,
    /// The first two data blocks.
    pub direct: [BlockIndex; 2],
    /// The indirect pointer-table block.
    pub indirect: BlockIndex,
}

impl Inode {
    /// A fresh read-write file of size zero over the given blocks.
    pub fn new(direct: [BlockIndex; 2], indirect: BlockIndex) -> Self {
        Self {
            kind: FileKind::ReadWrite,
            size: 0,
            direct,
            indirect,
        }
    }

    /// Decodes an inode block loaded from disk.
    pub fn from_disk(raw: &disk_layout::Inode) -> Result<Self> {
        Ok(Self {
            kind: FileKind::from_disk(raw.kind)?,
            size: { raw.size },
            direct: { raw.direct },
            indirect: { raw.indirect },
        })
    }

    /// Encodes this inode as a sealed on-disk block.
    pub fn to_disk(&self) -> disk_layout::Inode {
        let mut raw =
            disk_layout::Inode::new(self.kind.into(), self.size, self.direct, self.indirect);
        raw.seal();
        raw
    }

    /// Whether writes and deletion are permitted.
    pub fn is_writable(&self) -> bool {
        self.kind == FileKind::ReadWrite
    }

    /// Resolves a logical byte offset to `(physical block, intra-block
    /// offset)`.
    ///
    /// Returns `Ok(None)` when the covering indirect slot is unmapped,
    /// which readers surface as end-of-file. Offsets beyond the indirect
    /// table cannot arise for sizes up to
    /// [`MAX_FILE_SIZE`](crate::disk_layout::MAX_FILE_SIZE), but are
    /// reported as corruption rather than let through.
    pub fn resolve(
        &self,
        dev: &mut BlockDevice,
        offset: u32,
    ) -> Result<Option<(BlockIndex, usize)>> {
        let (chunk, intra) = Chunk::locate(offset);
        match chunk {
            Chunk::Direct(i) => Ok(Some((self.direct[i], intra))),
            Chunk::Indirect(slot) => {
                if slot >= disk_layout::MAX_INDIRECT_POINTERS {
                    return Err(FsError::FilesystemCorrupted("offset beyond indirect table"));
                }
                let table = IndirectBlock::load(dev, self.indirect)?;
                match table[slot] {
                    b if b.is_valid() => Ok(Some((b, intra))),
                    _ => Ok(None),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk_layout::MAX_FILE_SIZE;

    #[test]
    fn locate_dispatches_by_depth() {
        assert_eq!(Chunk::locate(0), (Chunk::Direct(0), 0));
        assert_eq!(Chunk::locate(253), (Chunk::Direct(0), 253));
        assert_eq!(Chunk::locate(254), (Chunk::Direct(1), 0));
        assert_eq!(Chunk::locate(507), (Chunk::Direct(1), 253));
        assert_eq!(Chunk::locate(508), (Chunk::Indirect(0), 0));
        assert_eq!(Chunk::locate(761), (Chunk::Indirect(0), 253));
        assert_eq!(Chunk::locate(762), (Chunk::Indirect(1), 0));
        // Final byte of a maximum-size file lands in the last slot.
        assert_eq!(
            Chunk::locate(MAX_FILE_SIZE as u32 - 1),
            (Chunk::Indirect(62), 253)
        );
    }

    #[test]
    fn disk_round_trip_preserves_fields_and_seals() {
        let inode = Inode {
            kind: FileKind::ReadOnly,
            size: 1234,
            direct: [BlockIndex::new(6), BlockIndex::new(7)],
            indirect: BlockIndex::new(8),
        };
        let raw = inode.to_disk();
        assert!(raw.verify());
        assert_eq!(Inode::from_disk(&raw).unwrap(), inode);
    }

    #[test]
    fn from_disk_rejects_unknown_kind() {
        let mut raw = Inode::new([BlockIndex::new(4), BlockIndex::new(5)], BlockIndex::new(6))
            .to_disk();
        raw.kind = 0x7F;
        assert!(matches!(
            Inode::from_disk(&raw),
            Err(FsError::FilesystemCorrupted(_))
        ));
    }
}
