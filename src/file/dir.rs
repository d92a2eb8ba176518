use sdcard::BlockDevice;

use super::{File, FileKind, OpenMode, Timestamps, F_DIR_DIRTY};
use crate::{
    datetime::DateTime,
    error::FatError,
    layout::{DirEntry, ATTR_DIRECTORY, DIR_ENTRY_SIZE, DIR_NAME_DELETED},
    name::{short_name_to_text, NameString, DOT_DOT_NAME, DOT_NAME},
    volume::Volume,
};

impl File {
    /// Appends one zeroed cluster to a directory and returns its first block.
    pub(super) fn add_dir_cluster<D: BlockDevice>(&mut self, vol: &mut Volume<D>) -> Result<u32, FatError> {
        self.resolve_cluster(vol)?;
        self.add_cluster(vol)?;
        // The cursor no longer matches the cluster we just appended.
        self.cluster_valid = false;

        let first_block = vol.cluster_start_block(self.cur_cluster);
        for block in (first_block..first_block + vol.blocks_per_cluster() as u32).rev() {
            vol.cache_zeroed(block)?;
        }
        self.size += vol.bytes_per_cluster();
        Ok(first_block)
    }

    /// Creates subdirectory `name` in `parent` and leaves it open.
    pub fn make_dir<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
        parent: &mut File,
        name: &str,
    ) -> Result<(), FatError> {
        self.open(vol, parent, name, OpenMode::CREAT | OpenMode::EXCL | OpenMode::RDWR)?;
        self.flags = OpenMode::READ.bits();
        self.kind = FileKind::Subdir;
        self.add_dir_cluster(vol)?;
        self.sync(vol)?;

        let index = self.dir_index as usize;
        let data = vol.cache_write(self.dir_block)?;
        let mut entry = DirEntry::read_at(data, index);
        entry.attributes = ATTR_DIRECTORY;
        entry.store_at(data, index);

        let dot = DirEntry {
            name: DOT_NAME,
            ..entry
        };
        let dot_dot = DirEntry {
            name: DOT_DOT_NAME,
            first_cluster: if parent.is_root() { 0 } else { parent.first_cluster },
            ..entry
        };
        let data = vol.cache_write(vol.cluster_start_block(self.first_cluster))?;
        dot.store_at(data, 0);
        dot_dot.store_at(data, 1);

        self.cur_cluster = self.first_cluster;
        self.cluster_valid = true;
        self.position = 2 * DIR_ENTRY_SIZE as u32;
        vol.flush()
    }

    /// Deletes the open file: frees its clusters and marks its entry deleted.
    /// The handle is closed afterwards.
    pub fn remove<D: BlockDevice>(&mut self, vol: &mut Volume<D>) -> Result<(), FatError> {
        self.truncate(vol, 0)?;
        let offset = self.dir_index as usize * DIR_ENTRY_SIZE;
        vol.cache_write(self.dir_block)?[offset] = DIR_NAME_DELETED;
        self.kind = FileKind::Closed;
        vol.flush()
    }

    pub fn remove_in<D: BlockDevice>(vol: &mut Volume<D>, dir: &mut File, name: &str) -> Result<(), FatError> {
        let mut file = File::new();
        file.open(vol, dir, name, OpenMode::WRITE)?;
        file.remove(vol)
    }

    pub fn rm_dir<D: BlockDevice>(&mut self, vol: &mut Volume<D>) -> Result<(), FatError> {
        if self.kind != FileKind::Subdir {
            return Err(FatError::InvalidOperation);
        }
        self.rewind();
        while let Some((block, index)) = self.next_dir_slot(vol)? {
            let entry = DirEntry::read_at(vol.cache_read(block)?, index);
            if entry.is_end() {
                break;
            }
            if entry.is_deleted() || entry.is_dot() {
                continue;
            }
            if entry.is_file_or_subdir() {
                return Err(FatError::NotEmpty);
            }
        }
        self.kind = FileKind::Normal;
        self.flags |= OpenMode::WRITE.bits();
        self.remove(vol)
    }

    /// Deletes every file and subdirectory below this directory, read-only
    /// entries included, then the directory itself unless it is a root.
    /// Each pass descends along the first remaining subdirectory and empties
    /// the deepest one, so at most two handles are open at a time.
    pub fn rm_rf_star<D: BlockDevice>(&mut self, vol: &mut Volume<D>) -> Result<(), FatError> {
        if !self.is_dir() {
            return Err(FatError::InvalidOperation);
        }
        loop {
            let mut deepest: Option<File> = None;
            loop {
                let dir = match deepest.as_mut() {
                    Some(dir) => dir,
                    None => &mut *self,
                };
                let Some(index) = dir.first_child(vol)? else {
                    break;
                };
                let mut child = File::new();
                child.open_index(vol, dir, index, OpenMode::READ)?;
                if child.is_subdir() {
                    if let Some(mut parent) = deepest.replace(child) {
                        parent.close(vol)?;
                    }
                } else {
                    child.flags |= OpenMode::WRITE.bits();
                    child.remove(vol)?;
                }
            }
            match deepest {
                Some(mut empty) => empty.rm_dir(vol)?,
                None => break,
            }
        }
        if self.is_root() {
            self.rewind();
            return vol.flush();
        }
        self.rm_dir(vol)
    }

    /// Slot index of the first file or subdirectory entry.
    fn first_child<D: BlockDevice>(&mut self, vol: &mut Volume<D>) -> Result<Option<u16>, FatError> {
        self.rewind();
        while let Some((block, index)) = self.next_dir_slot(vol)? {
            let entry = DirEntry::read_at(vol.cache_read(block)?, index);
            if entry.is_end() {
                break;
            }
            if entry.is_deleted() || entry.is_dot() || !entry.is_file_or_subdir() {
                continue;
            }
            return Ok(Some((self.position / DIR_ENTRY_SIZE as u32 - 1) as u16));
        }
        Ok(None)
    }

    /// Creates file `name` in `dir` backed by one run of consecutive
    /// clusters covering `size` bytes.
    pub fn create_contiguous<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
        dir: &mut File,
        name: &str,
        size: u32,
    ) -> Result<(), FatError> {
        if size == 0 {
            return Err(FatError::InvalidOperation);
        }
        self.open(vol, dir, name, OpenMode::CREAT | OpenMode::EXCL | OpenMode::RDWR)?;

        let count = ((size - 1) >> (vol.cluster_size_shift() as u32 + 9)) + 1;
        match vol.alloc_contiguous(count, 0) {
            Ok(first) => self.first_cluster = first,
            Err(err) => {
                if let Err(cleanup) = self.remove(vol) {
                    log::warn!("spisd: create_contiguous_cleanup_failed err={cleanup}");
                }
                return Err(err);
            }
        }
        self.size = size;
        self.flags |= F_DIR_DIRTY;
        self.sync(vol)
    }

    /// First and last block of the file when its chain is one run of
    /// consecutive clusters.
    pub fn contiguous_range<D: BlockDevice>(&self, vol: &mut Volume<D>) -> Result<(u32, u32), FatError> {
        if self.first_cluster == 0 {
            return Err(FatError::InvalidOperation);
        }
        let mut cluster = self.first_cluster;
        for _ in 0..vol.cluster_count() {
            let next = vol.fat_get(cluster)?;
            if vol.is_eoc(next) {
                let last = vol.cluster_start_block(cluster) + vol.blocks_per_cluster() as u32 - 1;
                return Ok((vol.cluster_start_block(self.first_cluster), last));
            }
            if next != cluster + 1 {
                return Err(FatError::InvalidOperation);
            }
            cluster = next;
        }
        Err(FatError::BadCluster(cluster))
    }

    /// Overwrites the selected timestamps of the backing entry.
    pub fn set_timestamp<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
        which: Timestamps,
        when: DateTime,
    ) -> Result<(), FatError> {
        if !self.is_open() || self.is_root() {
            return Err(FatError::InvalidOperation);
        }
        let index = self.dir_index as usize;
        let data = vol.cache_write(self.dir_block)?;
        let mut entry = DirEntry::read_at(data, index);
        if which.contains(Timestamps::ACCESS) {
            entry.access_date = when.fat_date();
        }
        if which.contains(Timestamps::CREATE) {
            entry.creation_date = when.fat_date();
            entry.creation_time = when.fat_time();
            entry.creation_tenths = when.fat_time_tenths();
        }
        if which.contains(Timestamps::WRITE) {
            entry.write_date = when.fat_date();
            entry.write_time = when.fat_time();
        }
        entry.store_at(data, index);
        vol.flush()
    }

    /// Syncs, then returns a copy of the backing directory entry.
    pub fn dir_entry<D: BlockDevice>(&mut self, vol: &mut Volume<D>) -> Result<DirEntry, FatError> {
        if self.is_root() {
            return Err(FatError::InvalidOperation);
        }
        self.sync(vol)?;
        let data = vol.cache_read(self.dir_block)?;
        Ok(DirEntry::read_at(data, self.dir_index as usize))
    }

    /// `NAME.EXT` form of an entry's short name.
    pub fn dir_name(entry: &DirEntry) -> NameString {
        short_name_to_text(&entry.name)
    }
}
