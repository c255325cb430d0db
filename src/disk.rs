//! Block-level access to a host-backed disk image.
//!
//! A [`BlockDevice`] emulates a disk: a host file whose length is a
//! multiple of [`BLOCK_SIZE`], read and written one whole block at a time
//! by block index. Partial transfers are errors, and indices outside the
//! image are rejected before touching the host file.

use crate::{BlockIndex, FsError, Result};
use log::error;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// The fixed size of one block in bytes.
pub const BLOCK_SIZE: usize = 256;

/// A fixed-size byte container backed by a host file.
#[derive(Debug)]
pub struct BlockDevice {
    file: File,
    block_count: usize,
}

impl BlockDevice {
    /// Opens a disk image.
    ///
    /// With `n_bytes > 0` the file is created (or truncated) to exactly
    /// that length; `n_bytes` must be a multiple of [`BLOCK_SIZE`]. With
    /// `n_bytes == 0` an existing image is opened, and its length must be
    /// a nonzero multiple of [`BLOCK_SIZE`].
    pub fn open(path: &Path, n_bytes: u64) -> Result<Self> {
        if n_bytes % BLOCK_SIZE as u64 != 0 {
            error!("disk size {n_bytes} is not block-aligned");
            return Err(FsError::OpenBadAlignment);
        }

        if n_bytes > 0 {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(path)
                .map_err(|e| {
                    error!("failed to open {}: {e}", path.display());
                    FsError::SystemError
                })?;
            file.set_len(n_bytes).map_err(|e| {
                error!("failed to size {}: {e}", path.display());
                FsError::SystemError
            })?;
            Ok(Self {
                file,
                block_count: (n_bytes / BLOCK_SIZE as u64) as usize,
            })
        } else {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .map_err(|e| {
                    error!("failed to open {}: {e}", path.display());
                    FsError::SystemError
                })?;
            let len = file
                .metadata()
                .map_err(|e| {
                    error!("failed to stat {}: {e}", path.display());
                    FsError::SystemError
                })?
                .len();
            if len == 0 || len % BLOCK_SIZE as u64 != 0 {
                error!("{} is not a block-aligned disk image", path.display());
                return Err(FsError::OpenBadAlignment);
            }
            Ok(Self {
                file,
                block_count: (len / BLOCK_SIZE as u64) as usize,
            })
        }
    }

    /// Number of blocks in the image.
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    fn seek_to(&mut self, index: BlockIndex) -> Result<()> {
        if !index.is_valid() || index.into_usize() >= self.block_count {
            error!("block {index:?} is outside of the block space");
            return Err(FsError::DiskAccessDenied);
        }
        self.file
            .seek(SeekFrom::Start(index.into_u32() as u64 * BLOCK_SIZE as u64))
            .map_err(|e| {
                error!("seek to block {index:?} failed: {e}");
                FsError::DiskAccessFailed
            })?;
        Ok(())
    }

    /// Reads the block at `index` into `buf`.
    pub fn read_block(&mut self, index: BlockIndex, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
        self.seek_to(index)?;
        self.file.read_exact(buf).map_err(|e| {
            error!("read of block {index:?} fell short: {e}");
            FsError::DiskAccessFailed
        })
    }

    /// Writes `buf` to the block at `index`.
    pub fn write_block(&mut self, index: BlockIndex, buf: &[u8; BLOCK_SIZE]) -> Result<()> {
        self.seek_to(index)?;
        self.file.write_all(buf).map_err(|e| {
            error!("write of block {index:?} fell short: {e}");
            FsError::DiskAccessFailed
        })
    }

    /// Flushes outstanding writes and closes the image.
    pub fn close(self) -> Result<()> {
        self.file.sync_all().map_err(|e| {
            error!("failed to sync disk image: {e}");
            FsError::SystemError
        })
    }
}
