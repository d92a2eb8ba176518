//! Byte layouts of the MBR, the FAT boot sector and 32-byte directory entries.
//!
//! Everything is parsed out of, and serialized back into, plain 512-byte
//! blocks held by the volume cache.

use sdcard::{Block, BLOCK_SIZE};

use crate::name::ShortName;

pub const DIR_ENTRY_SIZE: usize = 32;
pub const DIR_ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DIR_ENTRY_SIZE;

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
pub const ATTR_LONG_NAME: u8 = 0x0F;
const ATTR_FILE_TYPE_MASK: u8 = ATTR_VOLUME_ID | ATTR_DIRECTORY;

/// First name byte of a never-used slot; no used slots follow it.
pub const DIR_NAME_FREE: u8 = 0x00;
pub const DIR_NAME_DELETED: u8 = 0xE5;

const BOOT_SIGNATURE_OFFSET: usize = 510;
const PARTITION_TABLE_OFFSET: usize = 446;
const PARTITION_ENTRY_SIZE: usize = 16;

pub fn has_boot_signature(block: &Block) -> bool {
    block[BOOT_SIGNATURE_OFFSET] == 0x55 && block[BOOT_SIGNATURE_OFFSET + 1] == 0xAA
}

fn le16(block: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([block[offset], block[offset + 1]])
}

fn le32(block: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        block[offset],
        block[offset + 1],
        block[offset + 2],
        block[offset + 3],
    ])
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartitionEntry {
    pub boot: u8,
    pub kind: u8,
    pub first_sector: u32,
    pub total_sectors: u32,
}

impl PartitionEntry {
    /// Reads primary partition `index` (0..4) of an MBR block.
    pub fn parse(mbr: &Block, index: usize) -> Self {
        let base = PARTITION_TABLE_OFFSET + index * PARTITION_ENTRY_SIZE;
        Self {
            boot: mbr[base],
            kind: mbr[base + 4],
            first_sector: le32(mbr, base + 8),
            total_sectors: le32(mbr, base + 12),
        }
    }

    pub fn is_usable(&self) -> bool {
        (self.boot & 0x7F) == 0 && self.total_sectors >= 100 && self.first_sector != 0
    }

    pub fn write_to(&self, mbr: &mut Block, index: usize) {
        let base = PARTITION_TABLE_OFFSET + index * PARTITION_ENTRY_SIZE;
        mbr[base] = self.boot;
        mbr[base + 4] = self.kind;
        mbr[base + 8..base + 12].copy_from_slice(&self.first_sector.to_le_bytes());
        mbr[base + 12..base + 16].copy_from_slice(&self.total_sectors.to_le_bytes());
        mbr[BOOT_SIGNATURE_OFFSET] = 0x55;
        mbr[BOOT_SIGNATURE_OFFSET + 1] = 0xAA;
    }
}

/// BIOS parameter block of a FAT boot sector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BiosParams {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    pub root_dir_entry_count: u16,
    pub total_sectors16: u16,
    pub media: u8,
    pub sectors_per_fat16: u16,
    pub hidden_sectors: u32,
    pub total_sectors32: u32,
    pub sectors_per_fat32: u32,
    pub root_cluster: u32,
}

impl BiosParams {
    pub fn parse(boot: &Block) -> Self {
        Self {
            bytes_per_sector: le16(boot, 11),
            sectors_per_cluster: boot[13],
            reserved_sectors: le16(boot, 14),
            fat_count: boot[16],
            root_dir_entry_count: le16(boot, 17),
            total_sectors16: le16(boot, 19),
            media: boot[21],
            sectors_per_fat16: le16(boot, 22),
            hidden_sectors: le32(boot, 28),
            total_sectors32: le32(boot, 32),
            sectors_per_fat32: le32(boot, 36),
            root_cluster: le32(boot, 44),
        }
    }

    /// Writes the fields back, with a jump stub and the boot signature.
    pub fn write_to(&self, boot: &mut Block) {
        boot[0..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
        boot[3..11].copy_from_slice(b"SPISD   ");
        boot[11..13].copy_from_slice(&self.bytes_per_sector.to_le_bytes());
        boot[13] = self.sectors_per_cluster;
        boot[14..16].copy_from_slice(&self.reserved_sectors.to_le_bytes());
        boot[16] = self.fat_count;
        boot[17..19].copy_from_slice(&self.root_dir_entry_count.to_le_bytes());
        boot[19..21].copy_from_slice(&self.total_sectors16.to_le_bytes());
        boot[21] = self.media;
        boot[22..24].copy_from_slice(&self.sectors_per_fat16.to_le_bytes());
        boot[28..32].copy_from_slice(&self.hidden_sectors.to_le_bytes());
        boot[32..36].copy_from_slice(&self.total_sectors32.to_le_bytes());
        boot[36..40].copy_from_slice(&self.sectors_per_fat32.to_le_bytes());
        boot[44..48].copy_from_slice(&self.root_cluster.to_le_bytes());
        boot[BOOT_SIGNATURE_OFFSET] = 0x55;
        boot[BOOT_SIGNATURE_OFFSET + 1] = 0xAA;
    }

    pub fn sectors_per_fat(&self) -> u32 {
        if self.sectors_per_fat16 != 0 {
            self.sectors_per_fat16 as u32
        } else {
            self.sectors_per_fat32
        }
    }

    pub fn total_sectors(&self) -> u32 {
        if self.total_sectors16 != 0 {
            self.total_sectors16 as u32
        } else {
            self.total_sectors32
        }
    }
}

/// One 32-byte short-name directory entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirEntry {
    pub name: ShortName,
    pub attributes: u8,
    pub creation_tenths: u8,
    pub creation_time: u16,
    pub creation_date: u16,
    pub access_date: u16,
    pub first_cluster: u32,
    pub write_time: u16,
    pub write_date: u16,
    pub file_size: u32,
}

impl DirEntry {
    pub fn parse(raw: &[u8]) -> Self {
        let mut name = [0u8; 11];
        name.copy_from_slice(&raw[0..11]);
        Self {
            name,
            attributes: raw[11],
            creation_tenths: raw[13],
            creation_time: le16(raw, 14),
            creation_date: le16(raw, 16),
            access_date: le16(raw, 18),
            first_cluster: ((le16(raw, 20) as u32) << 16) | le16(raw, 26) as u32,
            write_time: le16(raw, 22),
            write_date: le16(raw, 24),
            file_size: le32(raw, 28),
        }
    }

    pub fn write_to(&self, raw: &mut [u8]) {
        raw[0..11].copy_from_slice(&self.name);
        raw[11] = self.attributes;
        raw[12] = 0;
        raw[13] = self.creation_tenths;
        raw[14..16].copy_from_slice(&self.creation_time.to_le_bytes());
        raw[16..18].copy_from_slice(&self.creation_date.to_le_bytes());
        raw[18..20].copy_from_slice(&self.access_date.to_le_bytes());
        raw[20..22].copy_from_slice(&((self.first_cluster >> 16) as u16).to_le_bytes());
        raw[22..24].copy_from_slice(&self.write_time.to_le_bytes());
        raw[24..26].copy_from_slice(&self.write_date.to_le_bytes());
        raw[26..28].copy_from_slice(&(self.first_cluster as u16).to_le_bytes());
        raw[28..32].copy_from_slice(&self.file_size.to_le_bytes());
    }

    pub fn read_at(block: &Block, index: usize) -> Self {
        let base = index * DIR_ENTRY_SIZE;
        Self::parse(&block[base..base + DIR_ENTRY_SIZE])
    }

    pub fn store_at(&self, block: &mut Block, index: usize) {
        let base = index * DIR_ENTRY_SIZE;
        self.write_to(&mut block[base..base + DIR_ENTRY_SIZE]);
    }

    pub fn is_end(&self) -> bool {
        self.name[0] == DIR_NAME_FREE
    }

    pub fn is_deleted(&self) -> bool {
        self.name[0] == DIR_NAME_DELETED
    }

    /// `.` and `..`.
    pub fn is_dot(&self) -> bool {
        self.name[0] == b'.'
    }

    pub fn is_file(&self) -> bool {
        (self.attributes & ATTR_FILE_TYPE_MASK) == 0
    }

    pub fn is_subdir(&self) -> bool {
        (self.attributes & ATTR_FILE_TYPE_MASK) == ATTR_DIRECTORY
    }

    /// Excludes volume labels and long-name fragments.
    pub fn is_file_or_subdir(&self) -> bool {
        (self.attributes & ATTR_VOLUME_ID) == 0
    }

    pub fn is_read_only(&self) -> bool {
        (self.attributes & ATTR_READ_ONLY) != 0
    }
}
