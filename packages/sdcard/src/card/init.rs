use embassy_time::Instant;
use embedded_hal::{digital::OutputPin, spi::SpiBus};

use super::{
    helpers::{decode_capacity_blocks, decode_cid},
    types::{
        CardType, Cid, SdCard, SdCardError, SdErrorCode, SpiSpeed, R1_IDLE_STATE,
        R1_ILLEGAL_COMMAND, R1_READY_STATE, SD_ACMD41, SD_CMD0, SD_CMD10, SD_CMD58, SD_CMD8,
        SD_CMD9, SD_INIT_SPI_RATE_KHZ, SD_INIT_TIMEOUT, SD_MAX_SCK_RATE, SD_MAX_SPI_RATE_KHZ,
    },
};

impl<SPI, CS> SdCard<SPI, CS>
where
    SPI: SpiBus,
    CS: OutputPin,
{
    /// Brings the card from power-up into SPI transfer state at the
    /// initialization clock, then switches to the clock for `speed`.
    pub fn init(&mut self, speed: SpiSpeed) -> Result<CardType, SdCardError> {
        self.card_type = None;
        self.error_code = SdErrorCode::None;
        self.error_data = 0;
        self.status = 0;
        self.apply_clock(SD_INIT_SPI_RATE_KHZ);
        let start = Instant::now();

        // At least 74 clocks with CS high before the first command.
        let _ = self.cs.set_high();
        for _ in 0..10 {
            self.spi_transfer(0xFF)?;
        }
        self.chip_select_low()?;

        loop {
            self.status = self.card_command(SD_CMD0, 0)?;
            if self.status == R1_IDLE_STATE {
                break;
            }
            if start.elapsed() > SD_INIT_TIMEOUT {
                return Err(self.fail(SdErrorCode::Cmd0));
            }
        }

        let mut card_type = if (self.card_command(SD_CMD8, 0x1AA)? & R1_ILLEGAL_COMMAND) != 0 {
            CardType::Sd1
        } else {
            // R7 trailer; the last byte echoes the check pattern.
            for _ in 0..4 {
                self.status = self.spi_transfer(0xFF)?;
            }
            if self.status != 0xAA {
                return Err(self.fail(SdErrorCode::Cmd8));
            }
            CardType::Sd2
        };

        let acmd41_arg = if card_type == CardType::Sd2 { 0x4000_0000 } else { 0 };
        loop {
            self.status = self.card_acmd(SD_ACMD41, acmd41_arg)?;
            if self.status == R1_READY_STATE {
                break;
            }
            if start.elapsed() > SD_INIT_TIMEOUT {
                return Err(self.fail(SdErrorCode::Acmd41));
            }
        }

        if card_type == CardType::Sd2 {
            if self.card_command(SD_CMD58, 0)? != R1_READY_STATE {
                return Err(self.fail(SdErrorCode::Cmd58));
            }
            // OCR bit 30 (CCS) marks a block-addressed card.
            if (self.spi_transfer(0xFF)? & 0xC0) == 0xC0 {
                card_type = CardType::Sdhc;
            }
            for _ in 0..3 {
                self.spi_transfer(0xFF)?;
            }
        }
        self.chip_select_high();
        self.card_type = Some(card_type);

        self.set_sck_rate(speed.sck_rate())?;
        log::info!(
            "sdcard: init_ok type={:?} sck_rate={} elapsed_ms={}",
            card_type,
            self.sck_rate,
            start.elapsed().as_millis()
        );
        Ok(card_type)
    }

    /// Sets the transfer clock to `24 MHz >> rate`.
    pub fn set_sck_rate(&mut self, rate: u8) -> Result<(), SdCardError> {
        if rate > SD_MAX_SCK_RATE {
            return Err(self.fail(SdErrorCode::SckRate));
        }
        self.sck_rate = rate;
        self.apply_clock(SD_MAX_SPI_RATE_KHZ >> rate);
        Ok(())
    }

    pub fn read_csd(&mut self) -> Result<[u8; 16], SdCardError> {
        self.read_register(SD_CMD9)
    }

    pub fn read_cid(&mut self) -> Result<Cid, SdCardError> {
        let raw = self.read_register(SD_CMD10)?;
        Ok(decode_cid(&raw))
    }

    /// Capacity in 512-byte blocks, decoded from the CSD.
    pub fn card_size(&mut self) -> Result<u32, SdCardError> {
        let csd = self.read_csd()?;
        match decode_capacity_blocks(&csd) {
            Some(blocks) => Ok(blocks),
            None => Err(self.fail(SdErrorCode::BadCsd)),
        }
    }

    fn apply_clock(&mut self, khz: u32) {
        if let Some(hook) = self.clock {
            hook(&mut self.spi, khz);
        }
    }
}
