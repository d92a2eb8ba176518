use core::fmt;

pub const BLOCK_SIZE: usize = 512;

pub type Block = [u8; BLOCK_SIZE];

/// Failure classes reported by a block device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockError {
    /// The device did not answer within its bounded wait.
    Timeout,
    /// Unexpected response token, rejected data or a CRC mismatch.
    Protocol,
    /// Bus or pin failure below the command protocol.
    Io,
    /// Block number outside the device.
    OutOfRange,
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("device timeout"),
            Self::Protocol => f.write_str("device protocol error"),
            Self::Io => f.write_str("device i/o error"),
            Self::OutOfRange => f.write_str("block out of range"),
        }
    }
}

impl core::error::Error for BlockError {}

/// 512-byte block storage as seen by the FAT layer.
///
/// Multi-block writes default to one `write_block` per block; devices with a
/// streaming write command override all three methods together.
pub trait BlockDevice {
    fn read_block(&mut self, block: u32, dst: &mut Block) -> Result<(), BlockError>;

    fn write_block(&mut self, block: u32, src: &Block) -> Result<(), BlockError>;

    fn erase(&mut self, first_block: u32, last_block: u32) -> Result<(), BlockError>;

    fn block_count(&mut self) -> Result<u32, BlockError>;

    /// Copies `dst.len()` bytes starting at `offset` inside `block`.
    fn read_partial(&mut self, block: u32, offset: usize, dst: &mut [u8]) -> Result<(), BlockError> {
        if offset + dst.len() > BLOCK_SIZE {
            return Err(BlockError::OutOfRange);
        }
        let mut buf = [0u8; BLOCK_SIZE];
        self.read_block(block, &mut buf)?;
        dst.copy_from_slice(&buf[offset..offset + dst.len()]);
        Ok(())
    }

    fn write_multiple_start(&mut self, block: u32, count: u32) -> Result<MultiWrite, BlockError> {
        Ok(MultiWrite::new(block, count))
    }

    fn write_multiple_data(&mut self, session: &mut MultiWrite, src: &Block) -> Result<(), BlockError> {
        let block = session.next_block()?;
        self.write_block(block, src)
    }

    fn write_multiple_stop(&mut self, session: MultiWrite) -> Result<(), BlockError> {
        let _ = session;
        Ok(())
    }
}

/// Cursor of an in-progress multi-block write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MultiWrite {
    next: u32,
    remaining: u32,
}

impl MultiWrite {
    pub const fn new(first_block: u32, count: u32) -> Self {
        Self {
            next: first_block,
            remaining: count,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn next_block(&mut self) -> Result<u32, BlockError> {
        if self.remaining == 0 {
            return Err(BlockError::OutOfRange);
        }
        let block = self.next;
        self.next = self.next.saturating_add(1);
        self.remaining -= 1;
        Ok(block)
    }
}

impl<T: BlockDevice + ?Sized> BlockDevice for &mut T {
    fn read_block(&mut self, block: u32, dst: &mut Block) -> Result<(), BlockError> {
        (**self).read_block(block, dst)
    }

    fn write_block(&mut self, block: u32, src: &Block) -> Result<(), BlockError> {
        (**self).write_block(block, src)
    }

    fn erase(&mut self, first_block: u32, last_block: u32) -> Result<(), BlockError> {
        (**self).erase(first_block, last_block)
    }

    fn block_count(&mut self) -> Result<u32, BlockError> {
        (**self).block_count()
    }

    fn read_partial(&mut self, block: u32, offset: usize, dst: &mut [u8]) -> Result<(), BlockError> {
        (**self).read_partial(block, offset, dst)
    }

    fn write_multiple_start(&mut self, block: u32, count: u32) -> Result<MultiWrite, BlockError> {
        (**self).write_multiple_start(block, count)
    }

    fn write_multiple_data(&mut self, session: &mut MultiWrite, src: &Block) -> Result<(), BlockError> {
        (**self).write_multiple_data(session, src)
    }

    fn write_multiple_stop(&mut self, session: MultiWrite) -> Result<(), BlockError> {
        (**self).write_multiple_stop(session)
    }
}
