//! FAT12/16/32 filesystem over SPI-attached SD cards.
//!
//! [`SdFs`] mounts a volume and works with paths. [`File`] and [`Volume`]
//! expose the handle-level API underneath it.

#![cfg_attr(not(test), no_std)]

mod cache;
pub mod datetime;
pub mod error;
pub mod file;
pub mod fs;
pub mod layout;
pub mod name;
pub mod stream;
pub mod volume;
pub mod walker;

#[cfg(test)]
mod test_support;

pub use datetime::{DateTime, DateTimeSource};
pub use error::FatError;
pub use file::{File, FileKind, OpenMode, Timestamps};
pub use fs::{SdFs, FILE_READ, FILE_WRITE};
pub use name::NameString;
pub use sdcard;
pub use stream::{EntryInfo, SdFile};
pub use volume::{FatType, Geometry, Volume};
