use crate::block::{Block, BlockDevice, BlockError, BLOCK_SIZE};

/// Block device over caller-provided memory, with access counters.
///
/// Used for host-side testing of the FAT layer and for RAM disks.
pub struct RamBlockDevice<'a> {
    blocks: &'a mut [Block],
    failing_block: Option<u32>,
    reads: u32,
    partial_reads: u32,
    writes: u32,
    erases: u32,
}

impl<'a> RamBlockDevice<'a> {
    pub fn new(blocks: &'a mut [Block]) -> Self {
        Self {
            blocks,
            failing_block: None,
            reads: 0,
            partial_reads: 0,
            writes: 0,
            erases: 0,
        }
    }

    pub fn reads(&self) -> u32 {
        self.reads
    }

    pub fn partial_reads(&self) -> u32 {
        self.partial_reads
    }

    pub fn writes(&self) -> u32 {
        self.writes
    }

    pub fn erases(&self) -> u32 {
        self.erases
    }

    pub fn reset_counters(&mut self) {
        self.reads = 0;
        self.partial_reads = 0;
        self.writes = 0;
        self.erases = 0;
    }

    /// Makes every access to `block` fail with `BlockError::Io`.
    pub fn fail_block(&mut self, block: Option<u32>) {
        self.failing_block = block;
    }

    pub fn blocks(&self) -> &[Block] {
        self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [Block] {
        self.blocks
    }

    fn slot(&mut self, block: u32) -> Result<&mut Block, BlockError> {
        if self.failing_block == Some(block) {
            return Err(BlockError::Io);
        }
        self.blocks
            .get_mut(block as usize)
            .ok_or(BlockError::OutOfRange)
    }
}

impl BlockDevice for RamBlockDevice<'_> {
    fn read_block(&mut self, block: u32, dst: &mut Block) -> Result<(), BlockError> {
        self.reads += 1;
        dst.copy_from_slice(self.slot(block)?);
        Ok(())
    }

    fn write_block(&mut self, block: u32, src: &Block) -> Result<(), BlockError> {
        self.writes += 1;
        self.slot(block)?.copy_from_slice(src);
        Ok(())
    }

    fn erase(&mut self, first_block: u32, last_block: u32) -> Result<(), BlockError> {
        if last_block < first_block || last_block as usize >= self.blocks.len() {
            return Err(BlockError::OutOfRange);
        }
        self.erases += 1;
        for block in first_block..=last_block {
            self.slot(block)?.fill(0);
        }
        Ok(())
    }

    fn block_count(&mut self) -> Result<u32, BlockError> {
        Ok(self.blocks.len() as u32)
    }

    fn read_partial(&mut self, block: u32, offset: usize, dst: &mut [u8]) -> Result<(), BlockError> {
        if offset + dst.len() > BLOCK_SIZE {
            return Err(BlockError::OutOfRange);
        }
        self.partial_reads += 1;
        let src = self.slot(block)?;
        dst.copy_from_slice(&src[offset..offset + dst.len()]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accesses_and_injects_failures() {
        let mut storage = std::vec![[0u8; BLOCK_SIZE]; 4];
        let mut dev = RamBlockDevice::new(&mut storage);
        let mut buf = [0xA5u8; BLOCK_SIZE];
        dev.write_block(2, &buf).unwrap();
        buf.fill(0);
        dev.read_block(2, &mut buf).unwrap();
        assert_eq!(buf[17], 0xA5);
        assert_eq!((dev.reads(), dev.writes()), (1, 1));

        dev.fail_block(Some(3));
        assert_eq!(dev.read_block(3, &mut buf), Err(BlockError::Io));
        assert_eq!(dev.read_block(9, &mut buf), Err(BlockError::OutOfRange));
    }

    #[test]
    fn default_multi_block_write_walks_consecutive_blocks() {
        let mut storage = std::vec![[0u8; BLOCK_SIZE]; 4];
        let mut dev = RamBlockDevice::new(&mut storage);
        let mut session = dev.write_multiple_start(1, 2).unwrap();
        dev.write_multiple_data(&mut session, &[1u8; BLOCK_SIZE]).unwrap();
        dev.write_multiple_data(&mut session, &[2u8; BLOCK_SIZE]).unwrap();
        assert_eq!(
            dev.write_multiple_data(&mut session, &[3u8; BLOCK_SIZE]),
            Err(BlockError::OutOfRange)
        );
        dev.write_multiple_stop(session).unwrap();
        assert_eq!(dev.blocks()[1][0], 1);
        assert_eq!(dev.blocks()[2][511], 2);
        assert_eq!(dev.blocks()[3][0], 0);
    }

    #[test]
    fn partial_read_copies_window() {
        let mut storage = std::vec![[0u8; BLOCK_SIZE]; 1];
        for (i, byte) in storage[0].iter_mut().enumerate() {
            *byte = i as u8;
        }
        let mut dev = RamBlockDevice::new(&mut storage);
        let mut out = [0u8; 4];
        dev.read_partial(0, 10, &mut out).unwrap();
        assert_eq!(out, [10, 11, 12, 13]);
        assert_eq!(dev.partial_reads(), 1);
        assert_eq!(dev.reads(), 0);
        assert_eq!(
            dev.read_partial(0, 510, &mut out),
            Err(BlockError::OutOfRange)
        );
    }
}
