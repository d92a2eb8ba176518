use sdcard::{Block, BlockDevice, BLOCK_SIZE};

use crate::{
    cache::BlockCache,
    datetime::{DateTime, DateTimeSource},
    error::FatError,
};

mod alloc;
mod fat_table;
mod mount;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FatType {
    Fat12,
    Fat16,
    Fat32,
}

/// Layout of a mounted volume, derived once from its boot sector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub fat_type: FatType,
    pub blocks_per_cluster: u8,
    pub cluster_size_shift: u8,
    pub blocks_per_fat: u32,
    pub fat_count: u8,
    pub fat_start_block: u32,
    pub data_start_block: u32,
    /// First block of the fixed root directory, or the root cluster on FAT32.
    pub root_dir_start: u32,
    pub root_dir_entry_count: u16,
    pub cluster_count: u32,
}

/// A mounted FAT12/16/32 volume: geometry, the block cache and the
/// allocation hint, all owned by one value.
pub struct Volume<D> {
    device: D,
    cache: BlockCache,
    geometry: Geometry,
    alloc_search_start: u32,
    date_time: Option<DateTimeSource>,
}

impl<D: BlockDevice> Volume<D> {
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn fat_type(&self) -> FatType {
        self.geometry.fat_type
    }

    pub fn blocks_per_cluster(&self) -> u8 {
        self.geometry.blocks_per_cluster
    }

    pub fn cluster_size_shift(&self) -> u8 {
        self.geometry.cluster_size_shift
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        (BLOCK_SIZE as u32) << self.geometry.cluster_size_shift
    }

    pub fn cluster_count(&self) -> u32 {
        self.geometry.cluster_count
    }

    pub fn root_dir_start(&self) -> u32 {
        self.geometry.root_dir_start
    }

    pub fn root_dir_entry_count(&self) -> u16 {
        self.geometry.root_dir_entry_count
    }

    pub fn alloc_search_start(&self) -> u32 {
        self.alloc_search_start
    }

    pub fn cluster_start_block(&self, cluster: u32) -> u32 {
        self.geometry
            .data_start_block
            .wrapping_add(cluster.wrapping_sub(2) << self.geometry.cluster_size_shift)
    }

    pub fn block_of_cluster(&self, position: u32) -> u32 {
        (position >> 9) & (self.geometry.blocks_per_cluster as u32 - 1)
    }

    pub fn set_date_time_callback(&mut self, source: Option<DateTimeSource>) {
        self.date_time = source;
    }

    pub fn has_date_time(&self) -> bool {
        self.date_time.is_some()
    }

    pub(crate) fn now(&self) -> Option<DateTime> {
        self.date_time.map(|source| source())
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_device(mut self) -> Result<D, FatError> {
        self.flush()?;
        Ok(self.device)
    }

    pub fn flush(&mut self) -> Result<(), FatError> {
        self.cache.flush(&mut self.device)
    }

    pub fn cached_block(&self) -> Option<u32> {
        self.cache.cached_block()
    }

    pub(crate) fn cache_read(&mut self, block: u32) -> Result<&Block, FatError> {
        self.cache.read(&mut self.device, block)
    }

    pub(crate) fn cache_write(&mut self, block: u32) -> Result<&mut Block, FatError> {
        self.cache.write(&mut self.device, block)
    }

    pub(crate) fn cache_zeroed(&mut self, block: u32) -> Result<&mut Block, FatError> {
        self.cache.zeroed(&mut self.device, block)
    }

    /// Reads straight from the device, bypassing the cache.
    pub(crate) fn read_data(&mut self, block: u32, offset: usize, dst: &mut [u8]) -> Result<(), FatError> {
        self.device.read_partial(block, offset, dst)?;
        Ok(())
    }

    /// Writes a whole block straight to the device, dropping a stale cached copy.
    pub(crate) fn write_data(&mut self, block: u32, src: &Block) -> Result<(), FatError> {
        if self.cache.cached_block() == Some(block) {
            self.cache.invalidate();
        }
        self.device.write_block(block, src)?;
        Ok(())
    }
}
