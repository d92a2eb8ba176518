//! Path-based entry point: mount a card, then open, create and remove by path.

use embedded_hal::{digital::OutputPin, spi::SpiBus};
use sdcard::{BlockDevice, ClockHook, SdCard, SpiSpeed};

use crate::{
    error::FatError,
    file::{File, OpenMode},
    name::{NameString, NAME_MAX},
    stream::SdFile,
    volume::Volume,
    walker::{make_dir_path, path_exists, release, remove_last, rmdir_last, walk_path},
};


pub const FILE_READ: OpenMode = OpenMode::READ;
/// Read and write, creating the file if needed. The cursor starts at the end.
pub const FILE_WRITE: OpenMode = OpenMode::RDWR.union(OpenMode::CREAT);

/// A mounted volume together with its open root directory.
pub struct SdFs<D> {
    volume: Volume<D>,
    root: File,
}

impl<D: BlockDevice> SdFs<D> {
    /// Mounts the first usable FAT volume on `device` and opens its root.
    pub fn begin(device: D) -> Result<Self, FatError> {
        let mut volume = Volume::init(device)?;
        let mut root = File::new();
        root.open_root(&mut volume)?;
        Ok(Self { volume, root })
    }

    pub fn root(&self) -> &File {
        &self.root
    }

    pub fn volume(&self) -> &Volume<D> {
        &self.volume
    }

    pub fn volume_mut(&mut self) -> &mut Volume<D> {
        &mut self.volume
    }

    pub fn into_volume(mut self) -> Result<Volume<D>, FatError> {
        self.volume.flush()?;
        Ok(self.volume)
    }

    /// Opens `path` with `mode`.
    ///
    /// A path ending in `/` (or empty) yields the directory itself, named
    /// `/`. With `WRITE` or `APPEND` the cursor starts at the end of the file.
    pub fn open(&mut self, path: &str, mode: OpenMode) -> Result<SdFile<'_, D>, FatError> {
        let (parent, last) = self.parent_dir(path)?;
        let mut file = File::new();
        match parent {
            None if last.is_empty() => {
                return Ok(SdFile::new(&mut self.volume, self.root.clone(), name_from("/")));
            }
            None => file.open(&mut self.volume, &mut self.root, last, mode)?,
            Some(parent) if last.is_empty() => {
                return Ok(SdFile::new(&mut self.volume, parent, name_from("/")));
            }
            Some(mut parent) => {
                let opened = file.open(&mut self.volume, &mut parent, last, mode);
                release(&mut self.volume, &mut parent);
                opened?;
            }
        }

        if mode.intersects(OpenMode::WRITE | OpenMode::APPEND) {
            file.seek_end(0)?;
        }
        Ok(SdFile::new(&mut self.volume, file, name_from(last)))
    }

    pub fn exists(&mut self, path: &str) -> bool {
        walk_path(&mut self.volume, &mut self.root, path, path_exists)
    }

    /// Creates every missing directory along `path`.
    pub fn mkdir(&mut self, path: &str) -> bool {
        walk_path(&mut self.volume, &mut self.root, path, make_dir_path)
    }

    pub fn remove(&mut self, path: &str) -> bool {
        walk_path(&mut self.volume, &mut self.root, path, remove_last)
    }

    pub fn rmdir(&mut self, path: &str) -> bool {
        walk_path(&mut self.volume, &mut self.root, path, rmdir_last)
    }

    /// Opens every directory component of `path` in turn and returns the
    /// last one, `None` for the root, with the final component left
    /// unresolved. Components are cut to [`NAME_MAX`] characters.
    fn parent_dir<'p>(&mut self, path: &'p str) -> Result<(Option<File>, &'p str), FatError> {
        let mut parent: Option<File> = None;
        let mut rest = path;

        loop {
            rest = rest.trim_start_matches('/');
            let Some(end) = rest.find('/') else {
                break;
            };
            let component = truncate(&rest[..end]);
            rest = &rest[end..];

            let mut child = File::new();
            let opened = match parent.as_mut() {
                Some(dir) => {
                    let opened = child.open(&mut self.volume, dir, component, OpenMode::READ);
                    release(&mut self.volume, dir);
                    opened
                }
                // Growth of a FAT32 root must land in `self.root`.
                None => child.open(&mut self.volume, &mut self.root, component, OpenMode::READ),
            };
            if let Err(err) = opened {
                log::debug!("spisd: open_missing_dir component={component} err={err}");
                return Err(err);
            }
            parent = Some(child);
        }
        Ok((parent, rest))
    }
}

impl<SPI, CS> SdFs<SdCard<SPI, CS>>
where
    SPI: SpiBus,
    CS: OutputPin,
{
    pub fn begin_spi(spi: SPI, cs: CS, speed: SpiSpeed) -> Result<Self, FatError> {
        let mut card = SdCard::new(spi, cs);
        card.init(speed)?;
        Self::begin(card)
    }

    /// Like [`SdFs::begin_spi`] with a clock hook, then switches the data
    /// clock to `24 MHz >> sck_rate` before mounting.
    pub fn begin_spi_with_clock(
        spi: SPI,
        cs: CS,
        hook: ClockHook<SPI>,
        sck_rate: u8,
    ) -> Result<Self, FatError> {
        let mut card = SdCard::new(spi, cs).with_clock_hook(hook);
        card.init(SpiSpeed::Half)?;
        card.set_sck_rate(sck_rate)?;
        Self::begin(card)
    }
}

fn truncate(component: &str) -> &str {
    match component.char_indices().nth(NAME_MAX) {
        Some((end, _)) => &component[..end],
        None => component,
    }
}

pub(crate) fn name_from(text: &str) -> NameString {
    let mut name = NameString::new();
    for ch in text.chars() {
        if name.push(ch).is_err() {
            break;
        }
    }
    name
}
