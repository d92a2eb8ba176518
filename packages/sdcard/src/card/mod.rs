mod helpers;
mod init;
mod io;
mod types;

#[cfg(test)]
mod sim;
#[cfg(test)]
mod tests;

pub use types::{
    CardType, Cid, ClockHook, SdCard, SdCardError, SdErrorCode, SpiSpeed, SD_ERASE_TIMEOUT,
    SD_INIT_SPI_RATE_KHZ, SD_INIT_TIMEOUT, SD_MAX_SCK_RATE, SD_MAX_SPI_RATE_KHZ,
    SD_READ_TIMEOUT, SD_WRITE_TIMEOUT,
};
