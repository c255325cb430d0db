//! # TinyFS
//!
//! A tiny block-structured file system stored inside a fixed-size disk
//! image on the host. The volume holds a single flat directory of small
//! files; each file is described by an inode with two direct block
//! pointers and one single-indirect block. The superblock, every inode,
//! and every data block carry a 16-bit truncated CRC-32 so that corruption
//! of the image is detectable.
//!
//! The disk layout, by block index:
//!
//! ```text
//!        +─────────────────────+
//!   0    │ Superblock          │  magic, bitmap/root pointers, volume size
//!        +─────────────────────+
//!   1    │ Allocation bitmap   │  one bit per block, LSB-first
//!        +─────────────────────+
//!   2    │ Root inode          │  direct[0] = 3
//!        +─────────────────────+
//!   3    │ Root directory      │  21 fixed (name, inode) entries
//!        +─────────────────────+
//!   4..  │ Inodes, data blocks │  allocated on demand
//!        │ ...                 │
//!        +─────────────────────+
//! ```
//!
//! All blocks are 256 bytes. A file stores its first 254-byte chunk in
//! `direct[0]`, the second in `direct[1]`, and up to 63 further chunks
//! through the indirect block, bounding a file at 16,510 bytes.
//!
//! The entry point is [`TinyFs`]: format a fresh image with
//! [`TinyFs::mkfs`], then [`TinyFs::mount`] it and operate on files
//! through descriptors handed out by [`TinyFs::open`].
//!
//! ```no_run
//! use tinyfs::TinyFs;
//!
//! TinyFs::mkfs("demo.disk", 10_240)?;
//! let mut fs = TinyFs::mount("demo.disk")?;
//! let fd = fs.open("alpha")?;
//! fs.write(fd, b"Hello tinyFS!")?;
//! fs.seek(fd, 0)?;
//! let first = fs.read_byte(fd)?;
//! assert_eq!(first, b'H');
//! fs.unmount()?;
//! # Ok::<(), tinyfs::FsError>(())
//! ```
//!
//! The implementation is single-threaded and synchronous: every call runs
//! to completion, and a call interrupted mid-sequence may leave the image
//! failing validation on the next mount. There is no journal.

pub mod crc;
pub mod disk;
pub mod disk_layout;
pub mod fs;
pub mod fs_objects;
pub mod inode;
pub mod types;

pub use disk::{BLOCK_SIZE, BlockDevice};
pub use fs::TinyFs;
pub use fs_objects::MAX_OPEN_FILES;
pub use types::{BlockIndex, FileKind};

/// Default size of a disk image in bytes (40 blocks).
pub const DEFAULT_DISK_SIZE: u64 = 10_240;

/// Default file name for a disk image.
pub const DEFAULT_DISK_NAME: &str = "tinyFSDisk";

/// Errors reported by the disk layer and the file system.
///
/// The error space is flat: every failure maps to exactly one variant, and
/// [`FsError::code`] assigns each variant a stable negative integer for
/// callers that speak the numeric convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FsError {
    // Disk layer.
    /// The requested image size, or an existing image's length, is not a
    /// nonzero multiple of the block size.
    #[error("disk size is not a nonzero multiple of the block size")]
    OpenBadAlignment,
    /// A block transfer moved fewer bytes than a full block.
    #[error("disk access failed")]
    DiskAccessFailed,
    /// A block index outside the disk image was addressed.
    #[error("disk access outside of block space")]
    DiskAccessDenied,
    /// The disk image has already been closed.
    #[error("disk is inactive")]
    DiskInactive,
    /// The host operating system refused an operation on the image file.
    #[error("host system error")]
    SystemError,

    // Volume manager.
    /// A volume is already mounted in this process.
    #[error("a file system is already mounted")]
    ExistingMountedFs,
    /// No volume is mounted.
    #[error("no file system is mounted")]
    NoFsMounted,
    /// The superblock magic byte is wrong.
    #[error("wrong file system type")]
    WrongFsType,
    /// The superblock checksum does not match its contents.
    #[error("superblock checksum mismatch")]
    SbChecksumFailed,
    /// The requested volume holds fewer than the four reserved blocks.
    #[error("insufficient file system size")]
    InsufficientFsSize,
    /// The requested volume exceeds the 2048 blocks the bitmap can track.
    #[error("volume exceeds bitmap capacity")]
    VolumeTooLarge,
    /// The superblock's bitmap or root-inode pointer is the invalid-block
    /// sentinel.
    #[error("mounted file system has an invalid superblock")]
    MountedFsInvalidSuperblock,
    /// The root inode is missing one of its three block pointers.
    #[error("mounted file system has an invalid root inode")]
    MountedFsInvalidRootDirInode,
    /// A root directory entry points outside the volume.
    #[error("mounted file system has an invalid root directory")]
    MountedFsInvalidRootDir,
    /// The bitmap does not mark the four reserved blocks as used.
    #[error("mounted file system has an invalid bitmap")]
    MountedFsInvalidBitmap,

    // Directory and file operations.
    /// A file name is empty, longer than seven bytes, or not ASCII.
    #[error("invalid file name")]
    InvalidFilename,
    /// No directory entry carries the requested name.
    #[error("file not found")]
    FileNotFound,
    /// All 21 directory slots are occupied.
    #[error("directory is full")]
    DirectoryFull,
    /// No free block is left in the allocation bitmap.
    #[error("bitmap is full")]
    BitmapFull,
    /// All open-file slots are occupied.
    #[error("open-file table is full")]
    FileTableFull,
    /// A descriptor outside the open-file table was used.
    #[error("descriptor outside of file table range")]
    OutOfFileTableRange,
    /// The descriptor's slot is not open.
    #[error("file is not open")]
    FileNotInUse,
    /// The operation would destroy the root inode.
    #[error("inode is protected")]
    ProtectedInode,
    /// The file is read-only.
    #[error("invalid file permission")]
    InvalidFilePermission,
    /// A whole-file write exceeds the maximum file size.
    #[error("invalid write size")]
    InvalidWriteSize,
    /// A seek or byte write addressed a position outside the file.
    #[error("invalid offset")]
    InvalidOffset,
    /// The read cursor reached the end of the file.
    #[error("end of file")]
    ReadEof,

    /// An on-disk structure is inconsistent with the volume invariants.
    #[error("file system corrupted: {0}")]
    FilesystemCorrupted(&'static str),
}

impl FsError {
    /// The flat negative error code of this variant.
    pub const fn code(self) -> i32 {
        match self {
            FsError::OpenBadAlignment => -1,
            FsError::DiskAccessFailed => -2,
            FsError::DiskAccessDenied => -3,
            FsError::DiskInactive => -4,
            FsError::SystemError => -5,
            FsError::ExistingMountedFs => -6,
            FsError::NoFsMounted => -7,
            FsError::WrongFsType => -8,
            FsError::SbChecksumFailed => -9,
            FsError::InsufficientFsSize => -10,
            FsError::VolumeTooLarge => -11,
            FsError::MountedFsInvalidSuperblock => -12,
            FsError::MountedFsInvalidRootDirInode => -13,
            FsError::MountedFsInvalidRootDir => -14,
            FsError::MountedFsInvalidBitmap => -15,
            FsError::InvalidFilename => -16,
            FsError::FileNotFound => -17,
            FsError::DirectoryFull => -18,
            FsError::BitmapFull => -19,
            FsError::FileTableFull => -20,
            FsError::OutOfFileTableRange => -21,
            FsError::FileNotInUse => -22,
            FsError::ProtectedInode => -23,
            FsError::InvalidFilePermission => -24,
            FsError::InvalidWriteSize => -25,
            FsError::InvalidOffset => -26,
            FsError::ReadEof => -27,
            FsError::FilesystemCorrupted(_) => -28,
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = core::result::Result<T, FsError>;
