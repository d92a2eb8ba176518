//! Byte stream over an open file, borrowing the volume it lives on.

use embedded_io::{ErrorType, Read, ReadReady, Seek, SeekFrom, Write};
use sdcard::BlockDevice;

use crate::{
    error::FatError,
    file::{File, OpenMode},
    layout::DIR_ENTRY_SIZE,
    name::NameString,
    volume::Volume,
};


/// Cap on what [`SdFile::available`] reports.
pub const AVAILABLE_MAX: u32 = 0x7FFF;

/// One directory entry returned by [`SdFile::next_entry`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: NameString,
    pub is_dir: bool,
    pub size: u32,
}

/// An open file or directory plus the name it was opened under. Dropping it
/// closes the handle.
pub struct SdFile<'a, D: BlockDevice> {
    volume: &'a mut Volume<D>,
    file: File,
    name: NameString,
}

impl<'a, D: BlockDevice> SdFile<'a, D> {
    pub fn new(volume: &'a mut Volume<D>, file: File, name: NameString) -> Self {
        Self { volume, file, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn is_open(&self) -> bool {
        self.file.is_open()
    }

    pub fn is_directory(&self) -> bool {
        self.file.is_dir()
    }

    pub fn position(&self) -> u32 {
        self.file.position()
    }

    pub fn size(&self) -> u32 {
        self.file.file_size()
    }

    /// Bytes left before the end of the file, capped at [`AVAILABLE_MAX`].
    pub fn available(&self) -> u32 {
        self.size().saturating_sub(self.position()).min(AVAILABLE_MAX)
    }

    /// Next byte, or `None` at the end of the file.
    pub fn read_byte(&mut self) -> Result<Option<u8>, FatError> {
        let mut byte = [0u8; 1];
        let n = self.file.read(self.volume, &mut byte)?;
        Ok((n == 1).then_some(byte[0]))
    }

    pub fn peek(&mut self) -> Result<Option<u8>, FatError> {
        let byte = self.read_byte()?;
        if byte.is_some() {
            self.file.seek_cur(-1)?;
        }
        Ok(byte)
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, FatError> {
        self.file.read(self.volume, buf)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize, FatError> {
        self.file.write(self.volume, buf)
    }

    pub fn flush(&mut self) -> Result<(), FatError> {
        self.file.sync(self.volume)
    }

    pub fn seek(&mut self, pos: u32) -> Result<(), FatError> {
        self.file.seek_set(pos)
    }

    /// Syncs and closes. Later calls do nothing.
    pub fn close(&mut self) -> Result<(), FatError> {
        self.file.close(self.volume)
    }

    pub fn next_entry(&mut self) -> Result<Option<EntryInfo>, FatError> {
        let Some(entry) = self.file.read_dir(self.volume)? else {
            return Ok(None);
        };
        Ok(Some(EntryInfo {
            name: File::dir_name(&entry),
            is_dir: entry.is_subdir(),
            size: entry.file_size,
        }))
    }

    /// Opens the next file or subdirectory of this directory with `mode`.
    ///
    /// The returned handle outlives this stream; drive it through
    /// [`File`] with the same volume and close it there.
    pub fn open_next(&mut self, mode: OpenMode) -> Result<Option<File>, FatError> {
        if self.file.read_dir(self.volume)?.is_none() {
            return Ok(None);
        }
        let index = self.file.position() / DIR_ENTRY_SIZE as u32 - 1;
        let mut child = File::new();
        child.open_index(self.volume, &mut self.file, index as u16, mode)?;
        Ok(Some(child))
    }

    pub fn rewind_directory(&mut self) {
        if self.file.is_dir() {
            self.file.rewind();
        }
    }
}

impl<D: BlockDevice> Drop for SdFile<'_, D> {
    fn drop(&mut self) {
        if let Err(err) = self.file.close(self.volume) {
            log::warn!("spisd: drop_close_failed name={} err={err}", self.name);
        }
    }
}

impl<D: BlockDevice> ErrorType for SdFile<'_, D> {
    type Error = FatError;
}

impl<D: BlockDevice> Read for SdFile<'_, D> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.file.read(self.volume, buf)
    }
}

impl<D: BlockDevice> ReadReady for SdFile<'_, D> {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.file.position() < self.file.file_size())
    }
}

impl<D: BlockDevice> Write for SdFile<'_, D> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.file.write(self.volume, buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.file.sync(self.volume)
    }
}

impl<D: BlockDevice> Seek for SdFile<'_, D> {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, Self::Error> {
        match pos {
            SeekFrom::Start(offset) => {
                let offset = u32::try_from(offset).map_err(|_| FatError::InvalidOperation)?;
                self.file.seek_set(offset)?;
            }
            SeekFrom::End(offset) => self.file.seek_end(offset)?,
            SeekFrom::Current(offset) => self.file.seek_cur(offset)?,
        }
        Ok(self.file.position() as u64)
    }
}
