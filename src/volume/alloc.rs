use sdcard::BlockDevice;

use super::Volume;
use crate::error::FatError;

impl<D: BlockDevice> Volume<D> {
    /// Allocates `count` consecutive free clusters, marks them as one chain
    /// and links it after `tail` (0 starts a new chain). Returns the first
    /// cluster of the run.
    pub fn alloc_contiguous(&mut self, count: u32, tail: u32) -> Result<u32, FatError> {
        if count == 0 {
            return Err(FatError::InvalidOperation);
        }
        let (mut begin, set_start) = if tail != 0 {
            (tail + 1, false)
        } else {
            (self.alloc_search_start, count == 1)
        };

        let last_cluster = self.geometry.cluster_count + 1;
        let mut end = begin;
        let mut scanned = 0u32;
        loop {
            if scanned >= self.geometry.cluster_count {
                log::debug!("spisd: alloc_failed count={count} tail={tail}");
                return Err(FatError::CapacityExceeded);
            }
            if end > last_cluster {
                begin = 2;
                end = 2;
            }
            if self.fat_get(end)? != 0 {
                begin = end + 1;
            } else if end - begin + 1 == count {
                break;
            }
            scanned += 1;
            end += 1;
        }

        self.fat_put_eoc(end)?;
        while end > begin {
            self.fat_put(end - 1, end)?;
            end -= 1;
        }
        if tail != 0 {
            self.fat_put(tail, begin)?;
        }
        if set_start {
            self.alloc_search_start = begin + 1;
        }
        Ok(begin)
    }

    /// Marks every cluster of the chain at `first` free. A failure part way
    /// leaves the rest of the chain allocated.
    pub fn free_chain(&mut self, first: u32) -> Result<(), FatError> {
        let mut cluster = first;
        let mut steps = 0u32;
        loop {
            steps += 1;
            if steps > self.geometry.cluster_count {
                return Err(FatError::BadCluster(cluster));
            }
            let next = self.fat_get(cluster)?;
            self.fat_put(cluster, 0)?;
            if cluster < self.alloc_search_start {
                self.alloc_search_start = cluster;
            }
            if self.is_eoc(next) {
                return Ok(());
            }
            cluster = next;
        }
    }
}
