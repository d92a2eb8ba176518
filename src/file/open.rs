use sdcard::BlockDevice;

use super::{File, FileKind, OpenMode, F_MODE_MASK};
use crate::{
    datetime::DateTime,
    error::FatError,
    layout::{DirEntry, DIR_ENTRY_SIZE},
    name::encode_short_name,
    volume::{FatType, Volume},
};

impl File {
    pub fn open_root<D: BlockDevice>(&mut self, vol: &mut Volume<D>) -> Result<(), FatError> {
        if self.is_open() {
            return Err(FatError::InvalidOperation);
        }
        match vol.fat_type() {
            FatType::Fat12 | FatType::Fat16 => {
                self.kind = FileKind::Root16;
                self.first_cluster = 0;
                self.size = DIR_ENTRY_SIZE as u32 * vol.root_dir_entry_count() as u32;
            }
            FatType::Fat32 => {
                self.size = vol.chain_size(vol.root_dir_start())?;
                self.first_cluster = vol.root_dir_start();
                self.kind = FileKind::Root32;
            }
        }
        self.flags = OpenMode::READ.bits();
        self.dir_block = 0;
        self.dir_index = 0;
        self.rewind();
        Ok(())
    }

    /// Opens or creates the 8.3 entry `name` inside `dir`.
    ///
    /// A missing entry is created only when `mode` holds both `CREAT` and
    /// `WRITE`. It takes the first free or deleted slot, or a fresh cluster
    /// appended to `dir`. The fixed FAT12/16 root cannot grow.
    pub fn open<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
        dir: &mut File,
        name: &str,
        mode: OpenMode,
    ) -> Result<(), FatError> {
        if self.is_open() || !dir.is_dir() {
            return Err(FatError::InvalidOperation);
        }
        let short = encode_short_name(name)?;

        dir.rewind();
        let mut empty_slot = None;
        while let Some((block, index)) = dir.next_dir_slot(vol)? {
            let entry = DirEntry::read_at(vol.cache_read(block)?, index);
            if entry.is_end() || entry.is_deleted() {
                empty_slot.get_or_insert((block, index));
                if entry.is_end() {
                    break;
                }
            } else if entry.name == short {
                if mode.contains(OpenMode::CREAT | OpenMode::EXCL) {
                    return Err(FatError::AlreadyExists);
                }
                self.dir_block = block;
                self.dir_index = index as u8;
                return self.open_cached_entry(vol, &entry, mode);
            }
        }
        if !mode.contains(OpenMode::CREAT | OpenMode::WRITE) {
            return Err(FatError::NotFound);
        }

        let (block, index) = match empty_slot {
            Some(slot) => slot,
            None => {
                if dir.kind == FileKind::Root16 {
                    log::debug!("spisd: root_dir_full");
                    return Err(FatError::CapacityExceeded);
                }
                (dir.add_dir_cluster(vol)?, 0)
            }
        };

        let now = vol.now().unwrap_or(DateTime::DEFAULT);
        let entry = DirEntry {
            name: short,
            creation_tenths: now.fat_time_tenths(),
            creation_time: now.fat_time(),
            creation_date: now.fat_date(),
            access_date: now.fat_date(),
            write_time: now.fat_time(),
            write_date: now.fat_date(),
            ..DirEntry::default()
        };
        entry.store_at(vol.cache_write(block)?, index);
        vol.flush()?;

        self.dir_block = block;
        self.dir_index = index as u8;
        self.open_cached_entry(vol, &entry, mode)
    }

    pub fn open_index<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
        dir: &mut File,
        index: u16,
        mode: OpenMode,
    ) -> Result<(), FatError> {
        if self.is_open() || !dir.is_dir() || mode.contains(OpenMode::EXCL) {
            return Err(FatError::InvalidOperation);
        }
        dir.seek_set(DIR_ENTRY_SIZE as u32 * index as u32)?;
        let (block, slot) = dir.next_dir_slot(vol)?.ok_or(FatError::NotFound)?;
        let entry = DirEntry::read_at(vol.cache_read(block)?, slot);
        if entry.is_end() || entry.is_deleted() || entry.is_dot() {
            return Err(FatError::NotFound);
        }
        self.dir_block = block;
        self.dir_index = slot as u8;
        self.open_cached_entry(vol, &entry, mode)
    }

    fn open_cached_entry<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
        entry: &DirEntry,
        mode: OpenMode,
    ) -> Result<(), FatError> {
        if (entry.is_read_only() || entry.is_subdir()) && mode.intersects(OpenMode::WRITE | OpenMode::TRUNC) {
            return Err(FatError::InvalidOperation);
        }

        let (kind, size) = if entry.is_file() {
            (FileKind::Normal, entry.file_size)
        } else if entry.is_subdir() {
            (FileKind::Subdir, vol.chain_size(entry.first_cluster)?)
        } else {
            return Err(FatError::InvalidOperation);
        };

        self.kind = kind;
        self.size = size;
        self.first_cluster = entry.first_cluster;
        self.flags = mode.bits() & F_MODE_MASK;
        self.rewind();

        if mode.contains(OpenMode::TRUNC) {
            if let Err(err) = self.truncate(vol, 0) {
                self.kind = FileKind::Closed;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Next 32-byte slot of a directory as `(block, index)`, or `None` at the
    /// end of the directory.
    pub(super) fn next_dir_slot<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
    ) -> Result<Option<(u32, usize)>, FatError> {
        if self.position >= self.size {
            return Ok(None);
        }
        let index = ((self.position >> 5) & 0x0F) as usize;
        let block = self.current_block(vol)?;
        self.position += DIR_ENTRY_SIZE as u32;
        Ok(Some((block, index)))
    }

    /// Next file or subdirectory entry, skipping deleted slots, `.`/`..` and
    /// volume labels. `None` once the end of the directory is reached.
    pub fn read_dir<D: BlockDevice>(&mut self, vol: &mut Volume<D>) -> Result<Option<DirEntry>, FatError> {
        if !self.is_dir() || self.position & 0x1F != 0 {
            return Err(FatError::InvalidOperation);
        }
        while let Some((block, index)) = self.next_dir_slot(vol)? {
            let entry = DirEntry::read_at(vol.cache_read(block)?, index);
            if entry.is_end() {
                // Stay on the end marker so later calls keep reporting it.
                self.seek_set(self.position - DIR_ENTRY_SIZE as u32)?;
                return Ok(None);
            }
            if entry.is_deleted() || entry.is_dot() || !entry.is_file_or_subdir() {
                continue;
            }
            return Ok(Some(entry));
        }
        Ok(None)
    }
}
