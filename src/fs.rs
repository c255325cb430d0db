//! Volume management and file operations.
//!
//! [`TinyFs`] is the mounted-volume handle and the sole carrier of mutable
//! state: the open block device, the layout indices cached from the
//! superblock, and the open-file table. Formatting ([`TinyFs::mkfs`]) and
//! mounting ([`TinyFs::mount`]) are the only entry points; every file
//! operation takes the handle.
//!
//! A volume moves between two states:
//!
//! ```text
//!              mkfs
//!            ┌──────┐
//!            ▼      │
//!         Unmounted ─── mount ──► Mounted
//!            ▲                      │
//!            └────── unmount ───────┘
//! ```
//!
//! At most one volume may be mounted per process at a time; a second
//! `mount` (or a `mkfs` while mounted) fails with
//! [`FsError::ExistingMountedFs`] and no side effects. The implementation
//! is synchronous and single-threaded: calls must not be issued
//! concurrently, and a call interrupted mid-sequence may leave the image
//! inconsistent until the next format.

use crate::disk::{BLOCK_SIZE, BlockDevice};
use crate::disk_layout::{
    self, BITMAP_BLOCK, BITMAP_CAPACITY, BitmapBlock, BlockData, DATA_SIZE, DataBlock,
    DirectoryBlock, IndirectBlock, MAGIC, MAX_FILE_SIZE, ROOT_DIR_BLOCK, ROOT_INODE_BLOCK,
    SUPERBLOCK_BLOCK, SealedBlock, SuperBlock,
};
use crate::fs_objects::{Directory, FileName, FileTable};
use crate::inode::Inode;
use crate::types::{BlockIndex, FileKind};
use crate::{FsError, Result};
use bytemuck::Zeroable;
use log::{debug, info, warn};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether a volume is mounted somewhere in this process.
static VOLUME_MOUNTED: AtomicBool = AtomicBool::new(false);

/// Exclusive claim on the process-wide mounted-volume indicator.
///
/// Dropping the token releases the claim, so every early return on the
/// mount path rolls back to the unmounted state.
#[derive(Debug)]
struct MountToken;

impl MountToken {
    fn acquire() -> Result<Self> {
        if VOLUME_MOUNTED
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            warn!("a file system is already mounted");
            return Err(FsError::ExistingMountedFs);
        }
        Ok(MountToken)
    }
}

impl Drop for MountToken {
    fn drop(&mut self) {
        VOLUME_MOUNTED.store(false, Ordering::Release);
    }
}

/// A mounted volume.
#[derive(Debug)]
pub struct TinyFs {
    dev: BlockDevice,
    block_count: usize,
    bitmap_block: BlockIndex,
    root_inode: BlockIndex,
    root_dir_block: BlockIndex,
    table: FileTable,
    _token: MountToken,
}

impl TinyFs {
    /// Formats a fresh volume of `n_bytes` bytes at `path`.
    ///
    /// The image is created (or truncated) and fully zeroed, then the four
    /// reserved blocks are laid down: the allocation bitmap with blocks
    /// 0–3 marked used, the empty root directory, the root inode, and the
    /// sealed superblock. The root inode also receives a spare data block
    /// and an empty indirect block, which mounting validates.
    ///
    /// `n_bytes` must be a multiple of the block size, at least four
    /// blocks, and at most the 2048 blocks the bitmap can track. The
    /// volume is left unmounted.
    pub fn mkfs(path: impl AsRef<Path>, n_bytes: u64) -> Result<()> {
        let path = path.as_ref();
        let token = MountToken::acquire()?;
        let dev = BlockDevice::open(path, n_bytes)?;

        let block_count = n_bytes as usize / BLOCK_SIZE;
        if block_count <= 3 {
            warn!("{block_count} blocks cannot hold the four reserved blocks");
            return Err(FsError::InsufficientFsSize);
        }
        if block_count > BITMAP_CAPACITY {
            warn!("{block_count} blocks exceed the {BITMAP_CAPACITY}-bit bitmap");
            return Err(FsError::VolumeTooLarge);
        }

        let mut fs = TinyFs {
            dev,
            block_count,
            bitmap_block: BITMAP_BLOCK,
            root_inode: ROOT_INODE_BLOCK,
            root_dir_block: ROOT_DIR_BLOCK,
            table: FileTable::default(),
            _token: token,
        };

        // Wipe the whole image.
        for n in 0..block_count {
            fs.zero_block(BlockIndex::new(n as u32))?;
        }

        let mut bitmap = BitmapBlock::zeroed();
        for reserved in [
            SUPERBLOCK_BLOCK,
            BITMAP_BLOCK,
            ROOT_INODE_BLOCK,
            ROOT_DIR_BLOCK,
        ] {
            bitmap.mark_used(reserved.into_usize());
        }
        bitmap.store(&mut fs.dev, BITMAP_BLOCK)?;

        DirectoryBlock::empty().store(&mut fs.dev, ROOT_DIR_BLOCK)?;

        let mut sb = SuperBlock::new(n_bytes as u32);
        sb.seal_and_store(&mut fs.dev, SUPERBLOCK_BLOCK)?;

        // The root inode carries a second direct block and an indirect
        // block like any file inode; mount checks their presence.
        let spare = fs.find_free()?;
        fs.zero_block(spare)?;
        fs.mark_used(spare)?;

        let indirect = fs.find_free()?;
        fs.zero_block(indirect)?;
        IndirectBlock::empty().store(&mut fs.dev, indirect)?;
        fs.mark_used(indirect)?;

        let root = Inode::new([ROOT_DIR_BLOCK, spare], indirect);
        fs.store_inode(ROOT_INODE_BLOCK, &root)?;

        info!("formatted {}: {} blocks", path.display(), block_count);
        let TinyFs { dev, _token, .. } = fs;
        dev.close()
    }

    /// Mounts the volume stored at `path`.
    ///
    /// The image is opened without resizing and its structure validated:
    /// superblock magic, checksum and pointers, the root inode's three
    /// block pointers, the range of every root directory entry, and the
    /// bitmap bits of the four reserved blocks. On any failure the device
    /// is closed and nothing stays mounted.
    pub fn mount(path: impl AsRef<Path>) -> Result<TinyFs> {
        let path = path.as_ref();
        let token = MountToken::acquire()?;
        let mut dev = BlockDevice::open(path, 0)?;

        let sb = SuperBlock::load(&mut dev, SUPERBLOCK_BLOCK)?;
        if { sb.magic } != MAGIC {
            warn!("{} does not hold a tinyfs volume", path.display());
            return Err(FsError::WrongFsType);
        }
        if !sb.verify() {
            warn!("superblock checksum mismatch in {}", path.display());
            return Err(FsError::SbChecksumFailed);
        }
        let bitmap_block = { sb.bitmap_block };
        let root_inode = { sb.root_dir_inode };
        if !bitmap_block.is_valid() || !root_inode.is_valid() {
            warn!("superblock of {} is missing its pointers", path.display());
            return Err(FsError::MountedFsInvalidSuperblock);
        }
        let block_count = sb.block_count();

        let raw_root = disk_layout::Inode::load(&mut dev, root_inode)?;
        let root_direct = { raw_root.direct };
        let root_indirect = { raw_root.indirect };
        if !root_direct[0].is_valid() || !root_direct[1].is_valid() || !root_indirect.is_valid() {
            warn!("root inode of {} is missing block pointers", path.display());
            return Err(FsError::MountedFsInvalidRootDirInode);
        }
        let root_dir_block = root_direct[0];

        let directory = DirectoryBlock::load(&mut dev, root_dir_block)?;
        if directory
            .iter()
            .any(|e| !e.is_free() && e.inode_block.into_usize() >= block_count)
        {
            warn!("root directory of {} points outside the volume", path.display());
            return Err(FsError::MountedFsInvalidRootDir);
        }

        let bitmap = BitmapBlock::load(&mut dev, bitmap_block)?;
        if !(0..4).all(|n| bitmap.is_used(n)) {
            warn!("bitmap of {} does not reserve the metadata blocks", path.display());
            return Err(FsError::MountedFsInvalidBitmap);
        }

        info!(
            "mounted {}: {} blocks, root inode at {:?}",
            path.display(),
            block_count,
            root_inode
        );
        Ok(TinyFs {
            dev,
            block_count,
            bitmap_block,
            root_inode,
            root_dir_block,
            table: FileTable::default(),
            _token: token,
        })
    }

    /// Unmounts the volume, destroying every open descriptor and closing
    /// the device.
    pub fn unmount(self) -> Result<()> {
        info!("unmounting volume");
        let TinyFs { dev, _token, .. } = self;
        dev.close()
    }

    /// Number of blocks in the mounted volume.
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    // ---- Block allocator ------------------------------------------------

    fn read_bitmap(&mut self) -> Result<BitmapBlock> {
        BitmapBlock::load(&mut self.dev, self.bitmap_block)
    }

    /// First free block of the volume in ascending index order.
    fn find_free(&mut self) -> Result<BlockIndex> {
        let bitmap = self.read_bitmap()?;
        match bitmap.first_free(self.block_count) {
            Some(n) => Ok(BlockIndex::new(n as u32)),
            None => {
                warn!("no free block left in the bitmap");
                Err(FsError::BitmapFull)
            }
        }
    }

    fn mark_used(&mut self, block: BlockIndex) -> Result<()> {
        let mut bitmap = self.read_bitmap()?;
        bitmap.mark_used(block.into_usize());
        bitmap.store(&mut self.dev, self.bitmap_block)
    }

    fn mark_free(&mut self, block: BlockIndex) -> Result<()> {
        let mut bitmap = self.read_bitmap()?;
        bitmap.mark_free(block.into_usize());
        bitmap.store(&mut self.dev, self.bitmap_block)
    }

    /// Claims the first free block: `find_free` plus the bitmap update.
    fn allocate_block(&mut self) -> Result<BlockIndex> {
        let block = self.find_free()?;
        self.mark_used(block)?;
        Ok(block)
    }

    fn zero_block(&mut self, block: BlockIndex) -> Result<()> {
        self.dev.write_block(block, &[0u8; BLOCK_SIZE])
    }

    // ---- Inode and directory helpers ------------------------------------

    fn load_inode(&mut self, block: BlockIndex) -> Result<Inode> {
        let raw = disk_layout::Inode::load(&mut self.dev, block)?;
        Inode::from_disk(&raw)
    }

    fn store_inode(&mut self, block: BlockIndex, inode: &Inode) -> Result<()> {
        inode.to_disk().store(&mut self.dev, block)
    }

    fn load_directory(&mut self) -> Result<Directory> {
        Directory::load(&mut self.dev, self.root_dir_block)
    }

    // ---- File operations -------------------------------------------------

    /// Opens `name`, creating it when absent, and returns a descriptor.
    ///
    /// A created file receives an inode block, its two direct data blocks,
    /// and an empty indirect block, all claimed from the allocator. The
    /// descriptor's cursor starts at zero.
    pub fn open(&mut self, name: &str) -> Result<usize> {
        let name = FileName::new(name)?;
        let mut directory = self.load_directory()?;

        if let Some(slot) = directory.find(&name) {
            let inode_block = directory.entry(slot).inode_block;
            self.load_inode(inode_block)?;
            return self.table.acquire(inode_block);
        }

        if !directory.has_free_slot() {
            warn!("directory is full, cannot create {name:?}");
            return Err(FsError::DirectoryFull);
        }

        let inode_block = self.allocate_block()?;
        let direct = [self.allocate_block()?, self.allocate_block()?];
        let indirect = self.allocate_block()?;
        for block in [inode_block, direct[0], direct[1], indirect] {
            self.zero_block(block)?;
        }
        IndirectBlock::empty().store(&mut self.dev, indirect)?;

        let inode = Inode::new(direct, indirect);
        self.store_inode(inode_block, &inode)?;

        directory.insert(&name, inode_block)?;
        directory.store(&mut self.dev)?;
        debug!("created {name:?} at inode block {inode_block:?}");

        self.table.acquire(inode_block)
    }

    /// Releases descriptor `fd` without touching the disk.
    pub fn close(&mut self, fd: usize) -> Result<()> {
        self.table.get(fd)?;
        self.table.release(fd);
        Ok(())
    }

    /// Replaces the whole content of the open file with `buf`.
    ///
    /// Data blocks previously reachable only through the indirect table
    /// are zeroed and returned to the allocator before the new mapping is
    /// built, so successive writes never leak bitmap bits. The cursor is
    /// reset to zero.
    pub fn write(&mut self, fd: usize, buf: &[u8]) -> Result<()> {
        let slot = *self.table.get(fd)?;
        if buf.len() > MAX_FILE_SIZE {
            return Err(FsError::InvalidWriteSize);
        }
        let mut inode = self.load_inode(slot.inode_block)?;
        if !inode.is_writable() {
            return Err(FsError::InvalidFilePermission);
        }

        let old_table = IndirectBlock::load(&mut self.dev, inode.indirect)?;
        for block in old_table.iter().copied().filter(|b| b.is_valid()) {
            self.zero_block(block)?;
            self.mark_free(block)?;
        }

        // The first two chunks land in the direct blocks, zero-padded.
        for (i, &block) in inode.direct.iter().enumerate() {
            let mut data = DataBlock::zeroed();
            let start = i * DATA_SIZE;
            if start < buf.len() {
                let chunk = &buf[start..buf.len().min(start + DATA_SIZE)];
                data.data[..chunk.len()].copy_from_slice(chunk);
            }
            data.seal_and_store(&mut self.dev, block)?;
        }

        // The remainder goes to fresh blocks recorded in the indirect
        // table, in chunk order.
        let mut table = IndirectBlock::empty();
        if buf.len() > 2 * DATA_SIZE {
            for (slot_idx, chunk) in buf[2 * DATA_SIZE..].chunks(DATA_SIZE).enumerate() {
                let block = self.find_free()?;
                self.zero_block(block)?;
                let mut data = DataBlock::zeroed();
                data.data[..chunk.len()].copy_from_slice(chunk);
                data.seal_and_store(&mut self.dev, block)?;
                self.mark_used(block)?;
                table[slot_idx] = block;
            }
        }
        table.seal_and_store(&mut self.dev, inode.indirect)?;

        inode.size = buf.len() as u32;
        self.store_inode(slot.inode_block, &inode)?;
        self.table.get_mut(fd)?.cursor = 0;
        Ok(())
    }

    /// Deletes the open file and releases its descriptor.
    ///
    /// Every block reachable from the inode is zeroed and returned to the
    /// allocator, the inode block itself included, and the directory entry
    /// is freed. The root inode is protected.
    pub fn delete(&mut self, fd: usize) -> Result<()> {
        let slot = *self.table.get(fd)?;
        if slot.inode_block == self.root_inode {
            return Err(FsError::ProtectedInode);
        }
        let inode = self.load_inode(slot.inode_block)?;
        if !inode.is_writable() {
            return Err(FsError::InvalidFilePermission);
        }

        for block in inode.direct {
            self.zero_block(block)?;
            self.mark_free(block)?;
        }
        let table = IndirectBlock::load(&mut self.dev, inode.indirect)?;
        for block in table.iter().copied().filter(|b| b.is_valid()) {
            self.zero_block(block)?;
            self.mark_free(block)?;
        }
        self.zero_block(inode.indirect)?;
        self.mark_free(inode.indirect)?;
        self.zero_block(slot.inode_block)?;
        self.mark_free(slot.inode_block)?;

        let mut directory = self.load_directory()?;
        if let Some(entry_slot) = directory.find_by_inode(slot.inode_block) {
            directory.remove(entry_slot);
            directory.store(&mut self.dev)?;
        }
        self.table.release(fd);
        debug!("deleted inode block {:?}", slot.inode_block);
        Ok(())
    }

    /// Reads the byte under the cursor and advances it by one.
    pub fn read_byte(&mut self, fd: usize) -> Result<u8> {
        let slot = *self.table.get(fd)?;
        let inode = self.load_inode(slot.inode_block)?;
        if slot.cursor >= inode.size {
            return Err(FsError::ReadEof);
        }
        let (block, intra) = inode
            .resolve(&mut self.dev, slot.cursor)?
            .ok_or(FsError::ReadEof)?;
        let data = DataBlock::load(&mut self.dev, block)?;
        let byte = data.data[intra];
        self.table.get_mut(fd)?.cursor += 1;
        Ok(byte)
    }

    /// Overwrites one byte at `offset` within the open file.
    ///
    /// The containing block is read, patched, resealed, and written back.
    /// The cursor does not move.
    pub fn write_byte(&mut self, fd: usize, offset: u32, byte: u8) -> Result<()> {
        let slot = *self.table.get(fd)?;
        let inode = self.load_inode(slot.inode_block)?;
        if !inode.is_writable() {
            return Err(FsError::InvalidFilePermission);
        }
        if offset >= inode.size {
            return Err(FsError::InvalidOffset);
        }
        let (block, intra) = inode
            .resolve(&mut self.dev, offset)?
            .ok_or(FsError::ReadEof)?;
        let mut data = DataBlock::load(&mut self.dev, block)?;
        data.data[intra] = byte;
        data.seal_and_store(&mut self.dev, block)
    }

    /// Moves the cursor to `offset`.
    ///
    /// Only positions strictly inside the file are seekable; the
    /// end-of-file position is not.
    pub fn seek(&mut self, fd: usize, offset: u32) -> Result<()> {
        let slot = *self.table.get(fd)?;
        let inode = self.load_inode(slot.inode_block)?;
        if offset >= inode.size {
            return Err(FsError::InvalidOffset);
        }
        self.table.get_mut(fd)?.cursor = offset;
        Ok(())
    }

    /// Marks `name` read-only.
    pub fn make_read_only(&mut self, name: &str) -> Result<()> {
        self.set_kind(name, FileKind::ReadOnly)
    }

    /// Marks `name` read-write.
    pub fn make_read_write(&mut self, name: &str) -> Result<()> {
        self.set_kind(name, FileKind::ReadWrite)
    }

    fn set_kind(&mut self, name: &str, kind: FileKind) -> Result<()> {
        let name = FileName::new(name)?;
        let directory = self.load_directory()?;
        let slot = directory.find(&name).ok_or(FsError::FileNotFound)?;
        let inode_block = directory.entry(slot).inode_block;
        let mut inode = self.load_inode(inode_block)?;
        inode.kind = kind;
        self.store_inode(inode_block, &inode)
    }

    /// Renames `old` to `new` in place; the file keeps its slot, inode,
    /// and content.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        let old = FileName::new(old)?;
        let new = FileName::new(new)?;
        let mut directory = self.load_directory()?;
        let slot = directory.find(&old).ok_or(FsError::FileNotFound)?;
        directory.rename(slot, &new);
        directory.store(&mut self.dev)
    }

    /// Enumerates the directory in slot order as `(inode block, name)`
    /// pairs.
    pub fn list(&mut self) -> Result<Vec<(BlockIndex, String)>> {
        let directory = self.load_directory()?;
        Ok(directory
            .entries()
            .map(|e| (e.inode_block, e.name().unwrap_or_default().to_string()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk_layout::MAX_INDIRECT_POINTERS;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    /// Mounting is exclusive per process, so tests touching the mount
    /// state take this lock.
    static MOUNT_SERIAL: Mutex<()> = Mutex::new(());

    fn serial() -> MutexGuard<'static, ()> {
        MOUNT_SERIAL
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn image(dir: &tempfile::TempDir) -> std::path::PathBuf {
        dir.path().join("tinyfs.img")
    }

    #[test]
    fn mkfs_rejects_bad_sizes() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            TinyFs::mkfs(image(&dir), 768).unwrap_err(),
            FsError::InsufficientFsSize
        );
        assert_eq!(
            TinyFs::mkfs(image(&dir), 1000).unwrap_err(),
            FsError::OpenBadAlignment
        );
        assert_eq!(
            TinyFs::mkfs(image(&dir), 2049 * BLOCK_SIZE as u64).unwrap_err(),
            FsError::VolumeTooLarge
        );
    }

    #[test]
    fn mkfs_needs_room_for_the_root_inode_blocks() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        // Four or five blocks mount-validate but leave nothing for the
        // root inode's spare and indirect blocks.
        assert_eq!(
            TinyFs::mkfs(image(&dir), 4 * BLOCK_SIZE as u64).unwrap_err(),
            FsError::BitmapFull
        );
        assert_eq!(
            TinyFs::mkfs(image(&dir), 5 * BLOCK_SIZE as u64).unwrap_err(),
            FsError::BitmapFull
        );
        TinyFs::mkfs(image(&dir), 6 * BLOCK_SIZE as u64).unwrap();
    }

    #[test]
    fn mkfs_writes_the_reserved_layout() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        TinyFs::mkfs(image(&dir), crate::DEFAULT_DISK_SIZE).unwrap();

        let mut dev = BlockDevice::open(&image(&dir), 0).unwrap();
        assert_eq!(dev.block_count(), 40);

        let sb = SuperBlock::load(&mut dev, SUPERBLOCK_BLOCK).unwrap();
        assert_eq!({ sb.magic }, MAGIC);
        assert!(sb.verify());
        assert_eq!({ sb.bitmap_block }, BITMAP_BLOCK);
        assert_eq!({ sb.root_dir_inode }, ROOT_INODE_BLOCK);
        assert_eq!(sb.block_count(), 40);

        // Reserved blocks plus the root inode's spare and indirect blocks.
        let bitmap = BitmapBlock::load(&mut dev, BITMAP_BLOCK).unwrap();
        for n in 0..6 {
            assert!(bitmap.is_used(n), "block {n} must be reserved");
        }
        assert!(!bitmap.is_used(6));

        let root = disk_layout::Inode::load(&mut dev, ROOT_INODE_BLOCK).unwrap();
        assert!(root.verify());
        assert_eq!({ root.direct }, [ROOT_DIR_BLOCK, BlockIndex::new(4)]);
        assert_eq!({ root.indirect }, BlockIndex::new(5));
        assert_eq!({ root.kind }, u8::from(FileKind::ReadWrite));
        assert_eq!({ root.size }, 0);

        let dir_block = DirectoryBlock::load(&mut dev, ROOT_DIR_BLOCK).unwrap();
        assert!(dir_block.verify());
        assert!(dir_block.iter().all(|e| e.is_free()));

        let indirect = IndirectBlock::load(&mut dev, BlockIndex::new(5)).unwrap();
        assert!(indirect.verify());
        assert!(indirect.iter().all(|b| !b.is_valid()));
    }

    #[test]
    fn mount_is_exclusive() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        TinyFs::mkfs(image(&dir), crate::DEFAULT_DISK_SIZE).unwrap();

        let fs = TinyFs::mount(image(&dir)).unwrap();
        assert_eq!(
            TinyFs::mount(image(&dir)).unwrap_err(),
            FsError::ExistingMountedFs
        );
        assert_eq!(
            TinyFs::mkfs(image(&dir), crate::DEFAULT_DISK_SIZE).unwrap_err(),
            FsError::ExistingMountedFs
        );
        fs.unmount().unwrap();

        // Unmounting releases the claim.
        let fs = TinyFs::mount(image(&dir)).unwrap();
        fs.unmount().unwrap();
    }

    #[test]
    fn open_allocates_a_full_file_skeleton() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        TinyFs::mkfs(image(&dir), crate::DEFAULT_DISK_SIZE).unwrap();
        let mut fs = TinyFs::mount(image(&dir)).unwrap();

        let fd = fs.open("alpha").unwrap();
        assert_eq!(fd, 0);

        // Inode at 6, direct blocks 7 and 8, indirect block 9.
        let bitmap = fs.read_bitmap().unwrap();
        for n in 6..10 {
            assert!(bitmap.is_used(n), "block {n} must be allocated");
        }
        assert_eq!(fs.find_free().unwrap(), BlockIndex::new(10));

        let inode = fs.load_inode(BlockIndex::new(6)).unwrap();
        assert_eq!(inode.kind, FileKind::ReadWrite);
        assert_eq!(inode.size, 0);
        assert_eq!(inode.direct, [BlockIndex::new(7), BlockIndex::new(8)]);
        assert_eq!(inode.indirect, BlockIndex::new(9));

        let listing = fs.list().unwrap();
        assert_eq!(listing, vec![(BlockIndex::new(6), "alpha".to_string())]);

        // Reopening the same name references the same inode.
        let fd2 = fs.open("alpha").unwrap();
        assert_ne!(fd, fd2);
        assert_eq!(fs.table.get(fd2).unwrap().inode_block, BlockIndex::new(6));

        fs.unmount().unwrap();
    }

    #[test]
    fn write_rebuilds_the_indirect_mapping_without_leaks() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        TinyFs::mkfs(image(&dir), 128 * BLOCK_SIZE as u64).unwrap();
        let mut fs = TinyFs::mount(image(&dir)).unwrap();
        let fd = fs.open("bulk").unwrap();

        // Three chunks past the directs.
        let big = vec![0x5Au8; 2 * DATA_SIZE + 3 * DATA_SIZE];
        fs.write(fd, &big).unwrap();
        let after_big = fs.find_free().unwrap();

        // Shrinking the file must return the indirect data blocks.
        fs.write(fd, b"small").unwrap();
        let after_small = fs.find_free().unwrap();
        assert!(after_small < after_big);

        // Growing again reuses the same blocks, so the frontier returns.
        fs.write(fd, &big).unwrap();
        assert_eq!(fs.find_free().unwrap(), after_big);

        let inode = fs.load_inode(BlockIndex::new(6)).unwrap();
        assert_eq!(inode.size as usize, big.len());
        let table = IndirectBlock::load(&mut fs.dev, inode.indirect).unwrap();
        assert_eq!(table.iter().filter(|b| b.is_valid()).count(), 3);
        assert!(table.verify());

        fs.unmount().unwrap();
    }

    #[test]
    fn max_size_write_fills_every_indirect_slot() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        TinyFs::mkfs(image(&dir), 128 * BLOCK_SIZE as u64).unwrap();
        let mut fs = TinyFs::mount(image(&dir)).unwrap();
        let fd = fs.open("huge").unwrap();

        let content: Vec<u8> = (0..MAX_FILE_SIZE).map(|i| (i % 251) as u8).collect();
        fs.write(fd, &content).unwrap();

        let inode = fs.load_inode(BlockIndex::new(6)).unwrap();
        assert_eq!(inode.size as usize, MAX_FILE_SIZE);
        let table = IndirectBlock::load(&mut fs.dev, inode.indirect).unwrap();
        assert_eq!(
            table.iter().filter(|b| b.is_valid()).count(),
            MAX_INDIRECT_POINTERS
        );

        assert_eq!(
            fs.write(fd, &vec![0u8; MAX_FILE_SIZE + 1]).unwrap_err(),
            FsError::InvalidWriteSize
        );
        fs.unmount().unwrap();
    }
}
