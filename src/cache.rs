use sdcard::{Block, BlockDevice, BLOCK_SIZE};

use crate::error::FatError;


/// Copies of the first FAT that receive every FAT block written back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FatMirror {
    fat_start: u32,
    blocks_per_fat: u32,
    fat_count: u8,
}

/// Single-slot write-back block cache. Touching a different block writes the
/// dirty one back first.
pub struct BlockCache {
    block: Option<u32>,
    dirty: bool,
    data: Block,
    mirror: Option<FatMirror>,
}

impl Default for BlockCache {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockCache {
    pub const fn new() -> Self {
        Self {
            block: None,
            dirty: false,
            data: [0; BLOCK_SIZE],
            mirror: None,
        }
    }

    /// Dirty blocks inside the first FAT are also written to the other
    /// `fat_count - 1` copies on write-back.
    pub fn set_mirror(&mut self, fat_start: u32, blocks_per_fat: u32, fat_count: u8) {
        self.mirror = (fat_count > 1).then_some(FatMirror {
            fat_start,
            blocks_per_fat,
            fat_count,
        });
    }

    pub fn cached_block(&self) -> Option<u32> {
        self.block
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn read<D: BlockDevice>(&mut self, dev: &mut D, block: u32) -> Result<&Block, FatError> {
        self.load(dev, block, true)?;
        Ok(&self.data)
    }

    pub fn write<D: BlockDevice>(&mut self, dev: &mut D, block: u32) -> Result<&mut Block, FatError> {
        self.load(dev, block, true)?;
        self.dirty = true;
        Ok(&mut self.data)
    }

    /// Claims `block` without reading it; the buffer comes back zero-filled
    /// and dirty.
    pub fn zeroed<D: BlockDevice>(&mut self, dev: &mut D, block: u32) -> Result<&mut Block, FatError> {
        self.load(dev, block, false)?;
        self.data.fill(0);
        self.dirty = true;
        Ok(&mut self.data)
    }

    pub fn flush<D: BlockDevice>(&mut self, dev: &mut D) -> Result<(), FatError> {
        if !self.dirty {
            return Ok(());
        }
        self.write_back(dev)?;
        self.dirty = false;
        Ok(())
    }

    pub fn invalidate(&mut self) {
        self.block = None;
        self.dirty = false;
    }

    fn load<D: BlockDevice>(&mut self, dev: &mut D, block: u32, read: bool) -> Result<(), FatError> {
        if self.block == Some(block) {
            return Ok(());
        }
        if self.dirty {
            let written = self.write_back(dev);
            self.dirty = false;
            if let Err(err) = written {
                log::warn!("spisd: cache_write_back_failed block={:?} err={}", self.block, err);
                self.block = None;
                return Err(err);
            }
        }
        self.block = None;
        if read {
            dev.read_block(block, &mut self.data)?;
        }
        self.block = Some(block);
        Ok(())
    }

    fn write_back<D: BlockDevice>(&mut self, dev: &mut D) -> Result<(), FatError> {
        let Some(block) = self.block else {
            return Ok(());
        };
        dev.write_block(block, &self.data)?;

        if let Some(mirror) = self.mirror {
            let fat_end = mirror.fat_start.saturating_add(mirror.blocks_per_fat);
            if (mirror.fat_start..fat_end).contains(&block) {
                for copy in 1..mirror.fat_count as u32 {
                    let target = block.saturating_add(copy.saturating_mul(mirror.blocks_per_fat));
                    dev.write_block(target, &self.data)?;
                }
            }
        }
        Ok(())
    }
}
