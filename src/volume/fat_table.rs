use sdcard::BlockDevice;

use super::{FatType, Volume};
use crate::error::FatError;

const FAT12_EOC_MIN: u32 = 0xFF8;
const FAT16_EOC_MIN: u32 = 0xFFF8;
const FAT32_EOC_MIN: u32 = 0x0FFF_FFF8;
const FAT12_EOC: u32 = 0xFFF;
const FAT16_EOC: u32 = 0xFFFF;
const FAT32_EOC: u32 = 0x0FFF_FFFF;
const FAT32_MASK: u32 = 0x0FFF_FFFF;

impl<D: BlockDevice> Volume<D> {
    pub fn fat_get(&mut self, cluster: u32) -> Result<u32, FatError> {
        self.check_cluster(cluster)?;
        let fat_start = self.geometry.fat_start_block;
        match self.geometry.fat_type {
            FatType::Fat12 => {
                // 1.5 bytes per entry; the pair may straddle two blocks.
                let index = cluster + (cluster >> 1);
                let mut block = fat_start + (index >> 9);
                let mut offset = (index & 0x1FF) as usize;
                let lo = self.cache_read(block)?[offset] as u32;
                offset += 1;
                if offset == 512 {
                    block += 1;
                    offset = 0;
                }
                let hi = self.cache_read(block)?[offset] as u32;
                let pair = lo | (hi << 8);
                Ok(if cluster & 1 != 0 { pair >> 4 } else { pair & 0xFFF })
            }
            FatType::Fat16 => {
                let data = self.cache_read(fat_start + (cluster >> 8))?;
                let offset = ((cluster & 0xFF) << 1) as usize;
                Ok(u16::from_le_bytes([data[offset], data[offset + 1]]) as u32)
            }
            FatType::Fat32 => {
                let data = self.cache_read(fat_start + (cluster >> 7))?;
                let offset = ((cluster & 0x7F) << 2) as usize;
                let raw = u32::from_le_bytes([
                    data[offset],
                    data[offset + 1],
                    data[offset + 2],
                    data[offset + 3],
                ]);
                Ok(raw & FAT32_MASK)
            }
        }
    }

    /// Stores `value` in the FAT entry of `cluster`. Every FAT copy receives
    /// the change when the block is written back.
    pub fn fat_put(&mut self, cluster: u32, value: u32) -> Result<(), FatError> {
        self.check_cluster(cluster)?;
        let fat_start = self.geometry.fat_start_block;
        match self.geometry.fat_type {
            FatType::Fat12 => {
                let odd = cluster & 1 != 0;
                let index = cluster + (cluster >> 1);
                let mut block = fat_start + (index >> 9);
                let mut offset = (index & 0x1FF) as usize;

                let data = self.cache_write(block)?;
                data[offset] = if odd {
                    (data[offset] & 0x0F) | ((value << 4) as u8)
                } else {
                    value as u8
                };
                offset += 1;
                if offset == 512 {
                    block += 1;
                    offset = 0;
                }
                let data = self.cache_write(block)?;
                data[offset] = if odd {
                    (value >> 4) as u8
                } else {
                    (data[offset] & 0xF0) | ((value >> 8) & 0x0F) as u8
                };
            }
            FatType::Fat16 => {
                let data = self.cache_write(fat_start + (cluster >> 8))?;
                let offset = ((cluster & 0xFF) << 1) as usize;
                data[offset..offset + 2].copy_from_slice(&(value as u16).to_le_bytes());
            }
            FatType::Fat32 => {
                let data = self.cache_write(fat_start + (cluster >> 7))?;
                let offset = ((cluster & 0x7F) << 2) as usize;
                let old = u32::from_le_bytes([
                    data[offset],
                    data[offset + 1],
                    data[offset + 2],
                    data[offset + 3],
                ]);
                let new = (old & !FAT32_MASK) | (value & FAT32_MASK);
                data[offset..offset + 4].copy_from_slice(&new.to_le_bytes());
            }
        }
        Ok(())
    }

    pub fn fat_put_eoc(&mut self, cluster: u32) -> Result<(), FatError> {
        let eoc = match self.geometry.fat_type {
            FatType::Fat12 => FAT12_EOC,
            FatType::Fat16 => FAT16_EOC,
            FatType::Fat32 => FAT32_EOC,
        };
        self.fat_put(cluster, eoc)
    }

    pub fn is_eoc(&self, value: u32) -> bool {
        match self.geometry.fat_type {
            FatType::Fat12 => value >= FAT12_EOC_MIN,
            FatType::Fat16 => value >= FAT16_EOC_MIN,
            FatType::Fat32 => (value & FAT32_MASK) >= FAT32_EOC_MIN,
        }
    }

    /// Bytes covered by the chain starting at `first`.
    pub fn chain_size(&mut self, first: u32) -> Result<u32, FatError> {
        let mut cluster = first;
        let mut size = 0u32;
        let mut steps = 0u32;
        loop {
            steps += 1;
            if steps > self.geometry.cluster_count {
                return Err(FatError::BadCluster(cluster));
            }
            cluster = self.fat_get(cluster)?;
            size = size.saturating_add(self.bytes_per_cluster());
            if self.is_eoc(cluster) {
                return Ok(size);
            }
        }
    }

    pub(crate) fn check_cluster(&self, cluster: u32) -> Result<(), FatError> {
        if cluster < 2 || cluster > self.geometry.cluster_count + 1 {
            return Err(FatError::BadCluster(cluster));
        }
        Ok(())
    }
}
