//! Blank FAT images for unit tests.

use std::vec::Vec;

use sdcard::{Block, BLOCK_SIZE};

use crate::{
    layout::{BiosParams, PartitionEntry, DIR_ENTRY_SIZE},
    volume::FatType,
};

#[derive(Clone, Copy, Debug)]
pub(crate) struct ImageLayout {
    pub total_blocks: u32,
    pub blocks_per_cluster: u8,
    pub reserved: u16,
    pub fat_count: u8,
    pub root_entries: u16,
    pub fat_type: FatType,
    pub partition_start: u32,
}

impl ImageLayout {
    /// 509 clusters of 2 KiB.
    pub const FAT12: Self = Self {
        total_blocks: 2048,
        blocks_per_cluster: 4,
        reserved: 1,
        fat_count: 2,
        root_entries: 64,
        fat_type: FatType::Fat12,
        partition_start: 0,
    };

    /// 8095 clusters of one block.
    pub const FAT16: Self = Self {
        total_blocks: 8192,
        blocks_per_cluster: 1,
        reserved: 1,
        fat_count: 2,
        root_entries: 512,
        fat_type: FatType::Fat16,
        partition_start: 0,
    };

    /// 66922 clusters of one block, root directory in cluster 2.
    pub const FAT32: Self = Self {
        total_blocks: 68000,
        blocks_per_cluster: 1,
        reserved: 32,
        fat_count: 2,
        root_entries: 0,
        fat_type: FatType::Fat32,
        partition_start: 0,
    };

    pub fn in_partition(self, start: u32) -> Self {
        Self {
            partition_start: start,
            ..self
        }
    }

    fn root_blocks(&self) -> u32 {
        (self.root_entries as u32 * DIR_ENTRY_SIZE as u32).div_ceil(BLOCK_SIZE as u32)
    }

    fn clusters_for(&self, blocks_per_fat: u32) -> u32 {
        let overhead = self.reserved as u32 + self.fat_count as u32 * blocks_per_fat + self.root_blocks();
        (self.total_blocks - overhead) / self.blocks_per_cluster as u32
    }

    fn fat_bytes(&self, clusters: u32) -> u32 {
        let entries = clusters + 2;
        match self.fat_type {
            FatType::Fat12 => (entries * 3).div_ceil(2),
            FatType::Fat16 => entries * 2,
            FatType::Fat32 => entries * 4,
        }
    }

    pub fn blocks_per_fat(&self) -> u32 {
        let mut blocks_per_fat = 0;
        loop {
            let needed = self.fat_bytes(self.clusters_for(blocks_per_fat)).div_ceil(BLOCK_SIZE as u32);
            if needed == blocks_per_fat {
                return blocks_per_fat;
            }
            blocks_per_fat = needed;
        }
    }

    pub fn cluster_count(&self) -> u32 {
        self.clusters_for(self.blocks_per_fat())
    }
}

/// Builds a freshly formatted image: boot sector, empty FATs and an empty
/// root directory. With a partition start, block 0 holds an MBR.
pub(crate) fn format(layout: ImageLayout) -> Vec<Block> {
    let start = layout.partition_start;
    let mut image = std::vec![[0u8; BLOCK_SIZE]; (start + layout.total_blocks) as usize];
    let blocks_per_fat = layout.blocks_per_fat();

    if start != 0 {
        PartitionEntry {
            boot: 0x80,
            kind: 0x06,
            first_sector: start,
            total_sectors: layout.total_blocks,
        }
        .write_to(&mut image[0], 0);
    }

    let fat32 = layout.fat_type == FatType::Fat32;
    let small = layout.total_blocks <= u16::MAX as u32;
    let bpb = BiosParams {
        bytes_per_sector: BLOCK_SIZE as u16,
        sectors_per_cluster: layout.blocks_per_cluster,
        reserved_sectors: layout.reserved,
        fat_count: layout.fat_count,
        root_dir_entry_count: layout.root_entries,
        total_sectors16: if small && !fat32 { layout.total_blocks as u16 } else { 0 },
        media: 0xF8,
        sectors_per_fat16: if fat32 { 0 } else { blocks_per_fat as u16 },
        hidden_sectors: start,
        total_sectors32: if small && !fat32 { 0 } else { layout.total_blocks },
        sectors_per_fat32: if fat32 { blocks_per_fat } else { 0 },
        root_cluster: if fat32 { 2 } else { 0 },
    };
    bpb.write_to(&mut image[start as usize]);

    let reserved_head: &[u8] = match layout.fat_type {
        FatType::Fat12 => &[0xF8, 0xFF, 0xFF],
        FatType::Fat16 => &[0xF8, 0xFF, 0xFF, 0xFF],
        // Entries 0 and 1, then end of chain for the root cluster.
        FatType::Fat32 => &[
            0xF8, 0xFF, 0xFF, 0x0F, 0xFF, 0xFF, 0xFF, 0x0F, 0xFF, 0xFF, 0xFF, 0x0F,
        ],
    };
    for copy in 0..layout.fat_count as u32 {
        let block = start + layout.reserved as u32 + copy * blocks_per_fat;
        image[block as usize][..reserved_head.len()].copy_from_slice(reserved_head);
    }
    image
}
