use core::fmt;

use embassy_time::Duration;

use crate::block::BlockError;

pub(crate) const SD_CMD0: u8 = 0;
pub(crate) const SD_CMD8: u8 = 8;
pub(crate) const SD_CMD9: u8 = 9;
pub(crate) const SD_CMD10: u8 = 10;
pub(crate) const SD_CMD13: u8 = 13;
pub(crate) const SD_CMD17: u8 = 17;
pub(crate) const SD_CMD24: u8 = 24;
pub(crate) const SD_CMD25: u8 = 25;
pub(crate) const SD_CMD32: u8 = 32;
pub(crate) const SD_CMD33: u8 = 33;
pub(crate) const SD_CMD38: u8 = 38;
pub(crate) const SD_CMD55: u8 = 55;
pub(crate) const SD_CMD58: u8 = 58;
pub(crate) const SD_ACMD23: u8 = 23;
pub(crate) const SD_ACMD41: u8 = 41;

pub(crate) const R1_READY_STATE: u8 = 0x00;
pub(crate) const R1_IDLE_STATE: u8 = 0x01;
pub(crate) const R1_ILLEGAL_COMMAND: u8 = 0x04;
pub(crate) const DATA_START_BLOCK: u8 = 0xFE;
pub(crate) const STOP_TRAN_TOKEN: u8 = 0xFD;
pub(crate) const WRITE_MULTIPLE_TOKEN: u8 = 0xFC;
pub(crate) const DATA_RES_MASK: u8 = 0x1F;
pub(crate) const DATA_RES_ACCEPTED: u8 = 0x05;

pub const SD_INIT_TIMEOUT: Duration = Duration::from_millis(2_000);
pub const SD_ERASE_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const SD_READ_TIMEOUT: Duration = Duration::from_millis(300);
pub const SD_WRITE_TIMEOUT: Duration = Duration::from_millis(600);

pub const SD_INIT_SPI_RATE_KHZ: u32 = 400;
pub const SD_MAX_SPI_RATE_KHZ: u32 = 24_000;
pub const SD_MAX_SCK_RATE: u8 = 6;

/// Called with the SPI bus and the requested clock in kHz.
pub type ClockHook<SPI> = fn(&mut SPI, u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CardType {
    Sd1,
    Sd2,
    Sdhc,
}

impl CardType {
    /// SDSC cards take byte addresses, SDHC takes block numbers.
    pub(crate) fn address(self, block: u32) -> u32 {
        match self {
            Self::Sdhc => block,
            Self::Sd1 | Self::Sd2 => block << 9,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpiSpeed {
    Full,
    Half,
    Quarter,
}

impl SpiSpeed {
    pub fn sck_rate(self) -> u8 {
        match self {
            Self::Full => 0,
            Self::Half => 1,
            Self::Quarter => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SdErrorCode {
    None = 0x00,
    Cmd0 = 0x01,
    Cmd8 = 0x02,
    Cmd17 = 0x03,
    Cmd24 = 0x04,
    Cmd25 = 0x05,
    Cmd58 = 0x06,
    Acmd23 = 0x07,
    Acmd41 = 0x08,
    BadCsd = 0x09,
    Erase = 0x0A,
    EraseBlkEn = 0x0B,
    EraseTimeout = 0x0C,
    Read = 0x0D,
    ReadReg = 0x0E,
    ReadTimeout = 0x0F,
    StopTran = 0x10,
    Write = 0x11,
    WriteBlockZero = 0x12,
    WriteMultiple = 0x13,
    WriteProgramming = 0x14,
    WriteTimeout = 0x15,
    SckRate = 0x16,
    Bus = 0x17,
    NotInitialized = 0x18,
}

impl SdErrorCode {
    pub fn block_error(self) -> BlockError {
        match self {
            Self::Cmd0
            | Self::Acmd41
            | Self::EraseTimeout
            | Self::ReadTimeout
            | Self::WriteTimeout
            | Self::WriteMultiple
            | Self::StopTran => BlockError::Timeout,
            Self::Bus | Self::NotInitialized => BlockError::Io,
            _ => BlockError::Protocol,
        }
    }
}

/// Error code plus the last status byte seen from the card.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SdCardError {
    pub code: SdErrorCode,
    pub data: u8,
}

impl fmt::Display for SdCardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sd card error {:?} data=0x{:02x}", self.code, self.data)
    }
}

impl core::error::Error for SdCardError {}

impl From<SdCardError> for BlockError {
    fn from(value: SdCardError) -> Self {
        value.code.block_error()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cid {
    pub manufacturer_id: u8,
    pub oem_id: [u8; 2],
    pub product_name: heapless::String<5>,
    pub product_revision: u8,
    pub serial_number: u32,
    pub manufacturing_year: u16,
    pub manufacturing_month: u8,
}

/// SPI-mode SD/SDHC card driver.
///
/// Every operation blocks until the card answers or its timeout elapses.
/// The last failure is kept in `error_code`/`error_data` until the next one.
pub struct SdCard<SPI, CS> {
    pub(crate) spi: SPI,
    pub(crate) cs: CS,
    pub(crate) clock: Option<ClockHook<SPI>>,
    pub(crate) card_type: Option<CardType>,
    pub(crate) status: u8,
    pub(crate) error_code: SdErrorCode,
    pub(crate) error_data: u8,
    pub(crate) sck_rate: u8,
    pub(crate) protect_block_zero: bool,
}

impl<SPI, CS> SdCard<SPI, CS> {
    pub fn new(spi: SPI, cs: CS) -> Self {
        Self {
            spi,
            cs,
            clock: None,
            card_type: None,
            status: 0,
            error_code: SdErrorCode::None,
            error_data: 0,
            sck_rate: 0,
            protect_block_zero: true,
        }
    }

    pub fn with_clock_hook(mut self, hook: ClockHook<SPI>) -> Self {
        self.clock = Some(hook);
        self
    }

    pub fn card_type(&self) -> Option<CardType> {
        self.card_type
    }

    pub fn is_initialized(&self) -> bool {
        self.card_type.is_some()
    }

    pub fn error_code(&self) -> SdErrorCode {
        self.error_code
    }

    pub fn error_data(&self) -> u8 {
        self.error_data
    }

    pub fn sck_rate(&self) -> u8 {
        self.sck_rate
    }

    /// Block 0 holds the MBR; writes to it are refused unless allowed here.
    pub fn allow_block_zero_writes(&mut self, allow: bool) {
        self.protect_block_zero = !allow;
    }

    pub fn invalidate(&mut self) {
        self.card_type = None;
    }

    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }
}
