//! Open file and directory handles.
//!
//! A [`File`] is plain state: which entry it came from, where its chain
//! starts and where the cursor is. It never borrows the volume, so every
//! operation takes the `&mut Volume` it runs against. Keeping a handle used
//! with the volume it was opened on is the caller's job.

use core::ops::BitOr;

use sdcard::BlockDevice;

use crate::{error::FatError, layout::DirEntry, volume::Volume};

mod dir;
mod io;
mod open;


#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FileKind {
    #[default]
    Closed,
    Normal,
    /// Fixed root directory of FAT12 and FAT16 volumes.
    Root16,
    /// Cluster-chained root directory of FAT32 volumes.
    Root32,
    Subdir,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenMode(u8);

impl OpenMode {
    pub const READ: Self = Self(0x01);
    pub const WRITE: Self = Self(0x02);
    pub const RDWR: Self = Self(0x03);
    /// Every write lands at the end of the file.
    pub const APPEND: Self = Self(0x04);
    /// Sync after each write.
    pub const SYNC: Self = Self(0x08);
    pub const CREAT: Self = Self(0x10);
    /// With `CREAT`, fail if the entry already exists.
    pub const EXCL: Self = Self(0x20);
    pub const TRUNC: Self = Self(0x40);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for OpenMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Which timestamps [`File::set_timestamp`] updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timestamps(u8);

impl Timestamps {
    pub const ACCESS: Self = Self(0x01);
    pub const CREATE: Self = Self(0x02);
    pub const WRITE: Self = Self(0x04);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Timestamps {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

const F_MODE_MASK: u8 = 0x0F;
const F_UNBUFFERED_READ: u8 = 0x40;
const F_DIR_DIRTY: u8 = 0x80;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct File {
    kind: FileKind,
    flags: u8,
    first_cluster: u32,
    /// Cluster holding byte `position - 1`; 0 while `position` is 0.
    cur_cluster: u32,
    /// False after a seek until the next data access walks the chain.
    cluster_valid: bool,
    position: u32,
    size: u32,
    dir_block: u32,
    dir_index: u8,
}

impl File {
    pub const fn new() -> Self {
        Self {
            kind: FileKind::Closed,
            flags: 0,
            first_cluster: 0,
            cur_cluster: 0,
            cluster_valid: false,
            position: 0,
            size: 0,
            dir_block: 0,
            dir_index: 0,
        }
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn is_open(&self) -> bool {
        self.kind != FileKind::Closed
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::Normal
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, FileKind::Root16 | FileKind::Root32 | FileKind::Subdir)
    }

    pub fn is_subdir(&self) -> bool {
        self.kind == FileKind::Subdir
    }

    pub fn is_root(&self) -> bool {
        matches!(self.kind, FileKind::Root16 | FileKind::Root32)
    }

    pub fn first_cluster(&self) -> u32 {
        self.first_cluster
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn file_size(&self) -> u32 {
        self.size
    }

    pub fn dir_location(&self) -> (u32, u8) {
        (self.dir_block, self.dir_index)
    }

    pub fn is_unbuffered_read(&self) -> bool {
        self.flags & F_UNBUFFERED_READ != 0
    }

    /// Reads of blocks not already cached go straight to the device, even
    /// partial ones. Only regular files honor it.
    pub fn set_unbuffered_read(&mut self) {
        if self.is_file() {
            self.flags |= F_UNBUFFERED_READ;
        }
    }

    pub fn clear_unbuffered_read(&mut self) {
        self.flags &= !F_UNBUFFERED_READ;
    }

    pub fn rewind(&mut self) {
        self.position = 0;
        self.cur_cluster = 0;
        self.cluster_valid = true;
    }

    /// Moves the cursor to `pos`. The cluster under the cursor is found again
    /// at the next read or write.
    pub fn seek_set(&mut self, pos: u32) -> Result<(), FatError> {
        if !self.is_open() || pos > self.size {
            return Err(FatError::InvalidOperation);
        }
        if pos == 0 {
            self.rewind();
            return Ok(());
        }
        self.position = pos;
        self.cluster_valid = self.kind == FileKind::Root16;
        Ok(())
    }

    pub fn seek_cur(&mut self, offset: i64) -> Result<(), FatError> {
        self.seek_set(offset_from(self.position, offset)?)
    }

    pub fn seek_end(&mut self, offset: i64) -> Result<(), FatError> {
        self.seek_set(offset_from(self.size, offset)?)
    }

    pub fn sync<D: BlockDevice>(&mut self, vol: &mut Volume<D>) -> Result<(), FatError> {
        if !self.is_open() {
            return Err(FatError::InvalidOperation);
        }
        if self.flags & F_DIR_DIRTY != 0 && !self.is_root() {
            let now = vol.now();
            let index = self.dir_index as usize;
            let data = vol.cache_write(self.dir_block)?;
            let mut entry = DirEntry::read_at(data, index);
            if self.kind != FileKind::Subdir {
                entry.file_size = self.size;
            }
            entry.first_cluster = self.first_cluster;
            if let Some(now) = now {
                entry.write_date = now.fat_date();
                entry.write_time = now.fat_time();
                entry.access_date = entry.write_date;
            }
            entry.store_at(data, index);
            self.flags &= !F_DIR_DIRTY;
        }
        vol.flush()
    }

    /// Syncs and closes. Closing a closed handle does nothing; a failed sync
    /// leaves the handle open.
    pub fn close<D: BlockDevice>(&mut self, vol: &mut Volume<D>) -> Result<(), FatError> {
        if !self.is_open() {
            return Ok(());
        }
        self.sync(vol)?;
        self.kind = FileKind::Closed;
        Ok(())
    }

    fn resolve_cluster<D: BlockDevice>(&mut self, vol: &mut Volume<D>) -> Result<(), FatError> {
        if self.cluster_valid {
            return Ok(());
        }
        let mut cluster = 0;
        if self.position != 0 {
            cluster = self.first_cluster;
            let hops = (self.position - 1) >> (vol.cluster_size_shift() as u32 + 9);
            for _ in 0..hops {
                cluster = vol.fat_get(cluster)?;
            }
            vol.check_cluster(cluster)?;
        }
        self.cur_cluster = cluster;
        self.cluster_valid = true;
        Ok(())
    }

    /// Block holding byte `position`, stepping to the next cluster at a
    /// cluster boundary. The caller must advance `position` afterwards.
    fn current_block<D: BlockDevice>(&mut self, vol: &mut Volume<D>) -> Result<u32, FatError> {
        if self.kind == FileKind::Root16 {
            return Ok(vol.root_dir_start() + (self.position >> 9));
        }
        self.resolve_cluster(vol)?;
        let block_of_cluster = vol.block_of_cluster(self.position);
        if self.position & 0x1FF == 0 && block_of_cluster == 0 {
            self.cur_cluster = if self.position == 0 {
                self.first_cluster
            } else {
                vol.fat_get(self.cur_cluster)?
            };
        }
        vol.check_cluster(self.cur_cluster)?;
        Ok(vol.cluster_start_block(self.cur_cluster) + block_of_cluster)
    }
}

fn offset_from(base: u32, offset: i64) -> Result<u32, FatError> {
    (base as i64)
        .checked_add(offset)
        .and_then(|pos| u32::try_from(pos).ok())
        .ok_or(FatError::InvalidOperation)
}
