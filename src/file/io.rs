use core::cmp;

use sdcard::{Block, BlockDevice, BLOCK_SIZE};

use super::{File, FileKind, OpenMode, F_DIR_DIRTY, F_UNBUFFERED_READ};
use crate::{error::FatError, volume::Volume};

impl File {
    pub fn read<D: BlockDevice>(&mut self, vol: &mut Volume<D>, buf: &mut [u8]) -> Result<usize, FatError> {
        if !self.is_open() || self.flags & OpenMode::READ.bits() == 0 {
            return Err(FatError::InvalidOperation);
        }
        let len = cmp::min(buf.len(), self.size.saturating_sub(self.position) as usize);
        let result = self.read_blocks(vol, &mut buf[..len]);
        if result.is_err() {
            self.cluster_valid = false;
        }
        result.map(|()| len)
    }

    fn read_blocks<D: BlockDevice>(&mut self, vol: &mut Volume<D>, buf: &mut [u8]) -> Result<(), FatError> {
        let mut done = 0;
        while done < buf.len() {
            let offset = (self.position & 0x1FF) as usize;
            let block = self.current_block(vol)?;
            let n = cmp::min(BLOCK_SIZE - offset, buf.len() - done);
            let dst = &mut buf[done..done + n];

            let direct = self.flags & F_UNBUFFERED_READ != 0 || n == BLOCK_SIZE;
            if direct && vol.cached_block() != Some(block) {
                vol.read_data(block, offset, dst)?;
            } else {
                dst.copy_from_slice(&vol.cache_read(block)?[offset..offset + n]);
            }
            self.position += n as u32;
            done += n;
        }
        Ok(())
    }

    /// Writes `buf` at the cursor, growing the file as needed.
    ///
    /// Running out of clusters after part of `buf` was written returns the
    /// count written; the file size covers those bytes.
    pub fn write<D: BlockDevice>(&mut self, vol: &mut Volume<D>, buf: &[u8]) -> Result<usize, FatError> {
        if self.kind != FileKind::Normal || self.flags & OpenMode::WRITE.bits() == 0 {
            return Err(FatError::InvalidOperation);
        }
        if self.flags & OpenMode::APPEND.bits() != 0 && self.position != self.size {
            self.seek_end(0)?;
        }

        let mut done = 0;
        let result = self.write_blocks(vol, buf, &mut done);
        if result.is_err() {
            self.cluster_valid = false;
        }

        if self.position > self.size {
            self.size = self.position;
            self.flags |= F_DIR_DIRTY;
        } else if vol.has_date_time() && done > 0 {
            self.flags |= F_DIR_DIRTY;
        }

        match result {
            Ok(()) => {}
            Err(FatError::CapacityExceeded) if done > 0 => {
                log::debug!("spisd: write_short written={done} requested={}", buf.len());
                return Ok(done);
            }
            Err(err) => return Err(err),
        }
        if self.flags & OpenMode::SYNC.bits() != 0 {
            self.sync(vol)?;
        }
        Ok(done)
    }

    fn write_blocks<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
        buf: &[u8],
        done: &mut usize,
    ) -> Result<(), FatError> {
        self.resolve_cluster(vol)?;
        while *done < buf.len() {
            let block_of_cluster = vol.block_of_cluster(self.position);
            let offset = (self.position & 0x1FF) as usize;
            if block_of_cluster == 0 && offset == 0 {
                if self.cur_cluster == 0 {
                    if self.first_cluster == 0 {
                        self.add_cluster(vol)?;
                    } else {
                        self.cur_cluster = self.first_cluster;
                    }
                } else {
                    let next = vol.fat_get(self.cur_cluster)?;
                    if vol.is_eoc(next) {
                        self.add_cluster(vol)?;
                    } else {
                        self.cur_cluster = next;
                    }
                }
                vol.check_cluster(self.cur_cluster)?;
            }

            let n = cmp::min(BLOCK_SIZE - offset, buf.len() - *done);
            let block = vol.cluster_start_block(self.cur_cluster) + block_of_cluster;
            let src = &buf[*done..*done + n];
            if n == BLOCK_SIZE {
                let whole: &Block = src.try_into().map_err(|_| FatError::InvalidOperation)?;
                vol.write_data(block, whole)?;
            } else {
                let data = if offset == 0 && self.position >= self.size {
                    vol.cache_zeroed(block)?
                } else {
                    vol.cache_write(block)?
                };
                data[offset..offset + n].copy_from_slice(src);
            }
            self.position += n as u32;
            *done += n;
        }
        Ok(())
    }

    /// Shrinks the file to `length` bytes, releasing clusters it no longer
    /// needs. The cursor is kept, clamped to the new size.
    pub fn truncate<D: BlockDevice>(&mut self, vol: &mut Volume<D>, length: u32) -> Result<(), FatError> {
        if self.kind != FileKind::Normal || self.flags & OpenMode::WRITE.bits() == 0 {
            return Err(FatError::InvalidOperation);
        }
        if length > self.size {
            return Err(FatError::InvalidOperation);
        }
        if self.size == 0 {
            return Ok(());
        }
        let saved = self.position;

        self.seek_set(length)?;
        self.resolve_cluster(vol)?;
        if length == 0 {
            vol.free_chain(self.first_cluster)?;
            self.first_cluster = 0;
        } else {
            let next = vol.fat_get(self.cur_cluster)?;
            if !vol.is_eoc(next) {
                vol.fat_put_eoc(self.cur_cluster)?;
                vol.free_chain(next)?;
            }
        }
        self.size = length;
        self.flags |= F_DIR_DIRTY;
        self.sync(vol)?;

        self.seek_set(cmp::min(saved, length))
    }

    pub(super) fn add_cluster<D: BlockDevice>(&mut self, vol: &mut Volume<D>) -> Result<(), FatError> {
        self.cur_cluster = vol.alloc_contiguous(1, self.cur_cluster)?;
        if self.first_cluster == 0 {
            self.first_cluster = self.cur_cluster;
            self.flags |= F_DIR_DIRTY;
        }
        Ok(())
    }
}
