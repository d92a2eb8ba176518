#![cfg_attr(not(test), no_std)]

pub mod block;
pub mod card;
pub mod ram;

pub use block::{Block, BlockDevice, BlockError, MultiWrite, BLOCK_SIZE};
pub use card::{CardType, Cid, ClockHook, SdCard, SdCardError, SdErrorCode, SpiSpeed};
pub use ram::RamBlockDevice;
