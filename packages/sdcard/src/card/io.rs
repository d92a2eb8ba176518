use embassy_time::{Duration, Instant};
use embedded_hal::{digital::OutputPin, spi::SpiBus};

use super::{
    helpers::erase_sector_mask,
    types::{
        CardType, SdCard, SdCardError, SdErrorCode, DATA_RES_ACCEPTED, DATA_RES_MASK,
        DATA_START_BLOCK, R1_READY_STATE, SD_ACMD23, SD_CMD0, SD_CMD13, SD_CMD17, SD_CMD24,
        SD_CMD25, SD_CMD32, SD_CMD33, SD_CMD38, SD_CMD55, SD_CMD8, SD_ERASE_TIMEOUT,
        SD_READ_TIMEOUT, SD_WRITE_TIMEOUT, STOP_TRAN_TOKEN, WRITE_MULTIPLE_TOKEN,
    },
};
use crate::block::{Block, BlockDevice, BlockError, MultiWrite, BLOCK_SIZE};

impl<SPI, CS> SdCard<SPI, CS>
where
    SPI: SpiBus,
    CS: OutputPin,
{
    pub fn read_block(&mut self, block: u32, dst: &mut Block) -> Result<(), SdCardError> {
        self.read_data(block, 0, dst)
    }

    /// Reads `dst.len()` bytes at `offset` of `block`, clocking out and
    /// discarding the rest of the block.
    pub fn read_data(&mut self, block: u32, offset: usize, dst: &mut [u8]) -> Result<(), SdCardError> {
        if dst.is_empty() {
            return Ok(());
        }
        if offset + dst.len() > BLOCK_SIZE {
            return Err(self.fail(SdErrorCode::Read));
        }
        let card_type = self.require_type()?;
        if self.card_command(SD_CMD17, card_type.address(block))? != R1_READY_STATE {
            return Err(self.fail(SdErrorCode::Cmd17));
        }
        self.wait_start_block()?;

        for _ in 0..offset {
            self.spi_transfer(0xFF)?;
        }
        for slot in dst.iter_mut() {
            *slot = self.spi_transfer(0xFF)?;
        }
        // Rest of the block plus the data CRC16.
        for _ in offset + dst.len()..BLOCK_SIZE + 2 {
            self.spi_transfer(0xFF)?;
        }
        self.chip_select_high();
        Ok(())
    }

    pub fn write_block(&mut self, block: u32, src: &Block) -> Result<(), SdCardError> {
        if block == 0 && self.protect_block_zero {
            return Err(self.fail(SdErrorCode::WriteBlockZero));
        }
        let card_type = self.require_type()?;
        if self.card_command(SD_CMD24, card_type.address(block))? != R1_READY_STATE {
            return Err(self.fail(SdErrorCode::Cmd24));
        }
        self.write_data(DATA_START_BLOCK, src)?;

        if !self.wait_not_busy(SD_WRITE_TIMEOUT)? {
            return Err(self.fail(SdErrorCode::WriteTimeout));
        }
        // CMD13 answers with R2: both bytes must be zero.
        if self.card_command(SD_CMD13, 0)? != R1_READY_STATE || self.spi_transfer(0xFF)? != 0 {
            return Err(self.fail(SdErrorCode::WriteProgramming));
        }
        self.chip_select_high();
        Ok(())
    }

    /// Starts a CMD25 stream, pre-erasing `count` blocks.
    pub fn write_start(&mut self, block: u32, count: u32) -> Result<(), SdCardError> {
        if block == 0 && self.protect_block_zero {
            return Err(self.fail(SdErrorCode::WriteBlockZero));
        }
        let card_type = self.require_type()?;
        if self.card_acmd(SD_ACMD23, count)? != R1_READY_STATE {
            return Err(self.fail(SdErrorCode::Acmd23));
        }
        if self.card_command(SD_CMD25, card_type.address(block))? != R1_READY_STATE {
            return Err(self.fail(SdErrorCode::Cmd25));
        }
        Ok(())
    }

    pub fn write_multiple_block(&mut self, src: &Block) -> Result<(), SdCardError> {
        if !self.wait_not_busy(SD_WRITE_TIMEOUT)? {
            return Err(self.fail(SdErrorCode::WriteMultiple));
        }
        self.write_data(WRITE_MULTIPLE_TOKEN, src)
    }

    pub fn write_stop(&mut self) -> Result<(), SdCardError> {
        if !self.wait_not_busy(SD_WRITE_TIMEOUT)? {
            return Err(self.fail(SdErrorCode::StopTran));
        }
        self.spi_transfer(STOP_TRAN_TOKEN)?;
        if !self.wait_not_busy(SD_WRITE_TIMEOUT)? {
            return Err(self.fail(SdErrorCode::StopTran));
        }
        self.chip_select_high();
        Ok(())
    }

    pub fn erase(&mut self, first_block: u32, last_block: u32) -> Result<(), SdCardError> {
        let csd = self.read_csd()?;
        if let Some(mask) = erase_sector_mask(&csd) {
            if (first_block & mask) != 0 || (last_block.wrapping_add(1) & mask) != 0 {
                return Err(self.fail(SdErrorCode::EraseBlkEn));
            }
        }
        let card_type = self.require_type()?;
        if self.card_command(SD_CMD32, card_type.address(first_block))? != R1_READY_STATE
            || self.card_command(SD_CMD33, card_type.address(last_block))? != R1_READY_STATE
            || self.card_command(SD_CMD38, 0)? != R1_READY_STATE
        {
            return Err(self.fail(SdErrorCode::Erase));
        }
        if !self.wait_not_busy(SD_ERASE_TIMEOUT)? {
            return Err(self.fail(SdErrorCode::EraseTimeout));
        }
        self.chip_select_high();
        Ok(())
    }

    pub(crate) fn read_register(&mut self, cmd: u8) -> Result<[u8; 16], SdCardError> {
        if self.card_command(cmd, 0)? != R1_READY_STATE {
            return Err(self.fail(SdErrorCode::ReadReg));
        }
        self.wait_start_block()?;
        let mut reg = [0u8; 16];
        for slot in &mut reg {
            *slot = self.spi_transfer(0xFF)?;
        }
        // Discard CRC16.
        self.spi_transfer(0xFF)?;
        self.spi_transfer(0xFF)?;
        self.chip_select_high();
        Ok(reg)
    }

    pub(crate) fn card_command(&mut self, cmd: u8, arg: u32) -> Result<u8, SdCardError> {
        self.chip_select_low()?;
        let _ = self.wait_not_busy(SD_READ_TIMEOUT)?;

        let crc = match cmd {
            SD_CMD0 => 0x95,
            SD_CMD8 => 0x87,
            _ => 0xFF,
        };
        let frame = [
            0x40 | cmd,
            (arg >> 24) as u8,
            (arg >> 16) as u8,
            (arg >> 8) as u8,
            arg as u8,
            crc,
        ];
        for byte in frame {
            self.spi_transfer(byte)?;
        }

        self.status = 0xFF;
        for _ in 0..0xFF {
            self.status = self.spi_transfer(0xFF)?;
            if (self.status & 0x80) == 0 {
                break;
            }
        }
        Ok(self.status)
    }

    pub(crate) fn card_acmd(&mut self, cmd: u8, arg: u32) -> Result<u8, SdCardError> {
        self.card_command(SD_CMD55, 0)?;
        self.card_command(cmd, arg)
    }

    pub(crate) fn wait_not_busy(&mut self, timeout: Duration) -> Result<bool, SdCardError> {
        let start = Instant::now();
        loop {
            if self.spi_transfer(0xFF)? == 0xFF {
                return Ok(true);
            }
            if start.elapsed() >= timeout {
                return Ok(false);
            }
        }
    }

    fn wait_start_block(&mut self) -> Result<(), SdCardError> {
        let start = Instant::now();
        loop {
            self.status = self.spi_transfer(0xFF)?;
            if self.status != 0xFF {
                break;
            }
            if start.elapsed() > SD_READ_TIMEOUT {
                return Err(self.fail(SdErrorCode::ReadTimeout));
            }
        }
        if self.status != DATA_START_BLOCK {
            return Err(self.fail(SdErrorCode::Read));
        }
        Ok(())
    }

    fn write_data(&mut self, token: u8, src: &Block) -> Result<(), SdCardError> {
        self.spi_transfer(token)?;
        for &byte in src.iter() {
            self.spi_transfer(byte)?;
        }
        // Data CRC16 is ignored in SPI mode unless CRC is explicitly enabled.
        self.spi_transfer(0xFF)?;
        self.spi_transfer(0xFF)?;

        self.status = self.spi_transfer(0xFF)?;
        if (self.status & DATA_RES_MASK) != DATA_RES_ACCEPTED {
            return Err(self.fail(SdErrorCode::Write));
        }
        Ok(())
    }

    fn require_type(&mut self) -> Result<CardType, SdCardError> {
        match self.card_type {
            Some(card_type) => Ok(card_type),
            None => Err(self.fail(SdErrorCode::NotInitialized)),
        }
    }

    pub(crate) fn spi_transfer(&mut self, byte: u8) -> Result<u8, SdCardError> {
        let mut frame = [byte];
        if self.spi.transfer_in_place(&mut frame).is_err() {
            return Err(self.fail(SdErrorCode::Bus));
        }
        Ok(frame[0])
    }

    pub(crate) fn chip_select_low(&mut self) -> Result<(), SdCardError> {
        if self.cs.set_low().is_err() {
            return Err(self.fail(SdErrorCode::Bus));
        }
        Ok(())
    }

    pub(crate) fn chip_select_high(&mut self) {
        let _ = self.cs.set_high();
        let mut frame = [0xFF];
        let _ = self.spi.transfer_in_place(&mut frame);
    }

    /// Records the error before releasing the card.
    pub(crate) fn fail(&mut self, code: SdErrorCode) -> SdCardError {
        self.error_code = code;
        self.error_data = self.status;
        self.chip_select_high();
        log::debug!("sdcard: error code={:?} data=0x{:02x}", code, self.status);
        SdCardError {
            code,
            data: self.status,
        }
    }
}

impl<SPI, CS> BlockDevice for SdCard<SPI, CS>
where
    SPI: SpiBus,
    CS: OutputPin,
{
    fn read_block(&mut self, block: u32, dst: &mut Block) -> Result<(), BlockError> {
        SdCard::read_block(self, block, dst).map_err(BlockError::from)
    }

    fn write_block(&mut self, block: u32, src: &Block) -> Result<(), BlockError> {
        SdCard::write_block(self, block, src).map_err(BlockError::from)
    }

    fn erase(&mut self, first_block: u32, last_block: u32) -> Result<(), BlockError> {
        SdCard::erase(self, first_block, last_block).map_err(BlockError::from)
    }

    fn block_count(&mut self) -> Result<u32, BlockError> {
        self.card_size().map_err(BlockError::from)
    }

    fn read_partial(&mut self, block: u32, offset: usize, dst: &mut [u8]) -> Result<(), BlockError> {
        self.read_data(block, offset, dst).map_err(BlockError::from)
    }

    fn write_multiple_start(&mut self, block: u32, count: u32) -> Result<MultiWrite, BlockError> {
        self.write_start(block, count)?;
        Ok(MultiWrite::new(block, count))
    }

    fn write_multiple_data(&mut self, session: &mut MultiWrite, src: &Block) -> Result<(), BlockError> {
        session.next_block()?;
        self.write_multiple_block(src).map_err(BlockError::from)
    }

    fn write_multiple_stop(&mut self, session: MultiWrite) -> Result<(), BlockError> {
        let _ = session;
        self.write_stop().map_err(BlockError::from)
    }
}
