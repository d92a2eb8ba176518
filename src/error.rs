use core::fmt;

use sdcard::{BlockError, SdCardError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FatError {
    Device(BlockError),
    /// Neither the partition nor block 0 holds a usable FAT boot sector.
    BadGeometry,
    /// FAT16 root directory full, or no free cluster left.
    CapacityExceeded,
    NotFound,
    AlreadyExists,
    /// Operation not valid for the handle's kind, state or open mode.
    InvalidOperation,
    /// Name is not a valid 8.3 name or a path component is too long.
    InvalidPath,
    NotEmpty,
    BadCluster(u32),
}

impl From<BlockError> for FatError {
    fn from(value: BlockError) -> Self {
        Self::Device(value)
    }
}

impl From<SdCardError> for FatError {
    fn from(value: SdCardError) -> Self {
        Self::Device(value.into())
    }
}

impl fmt::Display for FatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(err) => write!(f, "device error: {err}"),
            Self::BadGeometry => f.write_str("no FAT volume found"),
            Self::CapacityExceeded => f.write_str("no space left"),
            Self::NotFound => f.write_str("not found"),
            Self::AlreadyExists => f.write_str("already exists"),
            Self::InvalidOperation => f.write_str("invalid operation"),
            Self::InvalidPath => f.write_str("invalid path"),
            Self::NotEmpty => f.write_str("directory not empty"),
            Self::BadCluster(cluster) => write!(f, "bad cluster {cluster}"),
        }
    }
}

impl core::error::Error for FatError {}

impl embedded_io::Error for FatError {
    fn kind(&self) -> embedded_io::ErrorKind {
        use embedded_io::ErrorKind;

        match self {
            Self::Device(BlockError::Timeout) => ErrorKind::TimedOut,
            Self::Device(_) => ErrorKind::Other,
            Self::BadGeometry | Self::BadCluster(_) => ErrorKind::InvalidData,
            Self::CapacityExceeded => ErrorKind::OutOfMemory,
            Self::NotFound => ErrorKind::NotFound,
            Self::AlreadyExists => ErrorKind::AlreadyExists,
            Self::InvalidOperation => ErrorKind::Unsupported,
            Self::InvalidPath | Self::NotEmpty => ErrorKind::InvalidInput,
        }
    }
}
