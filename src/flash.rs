//! Implementation of [Flash] for MTD block devices and image files

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    ops::Range,
    path::{Path, PathBuf},
};

use anyhow::Context;
use envstore::Flash;

/// A flash partition as listed by the kernel in `/sys/class/mtd`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MtdRegion {
    pub index: u32,
    pub name: String,
    pub size: usize,
    pub erase_size: usize,
}

impl MtdRegion {
    /// Lists all `mtdN` entries below `sysfs_root`, ordered by index.
    /// The read-only `mtdNro` aliases are skipped.
    pub fn enumerate(sysfs_root: &Path) -> anyhow::Result<Vec<Self>> {
        let entries = fs::read_dir(sysfs_root)
            .with_context(|| format!("failed to list MTD devices in {}", sysfs_root.display()))?;

        let mut regions = Vec::new();
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(index) = file_name
                .to_str()
                .and_then(|name| name.strip_prefix("mtd"))
                .and_then(|index| index.parse::<u32>().ok())
            else {
                continue;
            };

            regions.push(Self::read(&entry.path(), index)?);
        }

        regions.sort_by_key(|region| region.index);
        Ok(regions)
    }

    fn read(dir: &Path, index: u32) -> anyhow::Result<Self> {
        let attribute = |name: &str| -> anyhow::Result<String> {
            let path = dir.join(name);
            let value = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok(value.trim().to_owned())
        };
        let number = |name: &str| -> anyhow::Result<usize> {
            let value = attribute(name)?;
            parse_int::parse(&value)
                .with_context(|| format!("mtd{index}/{name} is not a number: {value:?}"))
        };

        Ok(Self {
            index,
            name: attribute("name")?,
            size: number("size")?,
            erase_size: number("erasesize")?,
        })
    }

    /// The block device node of this region
    pub fn block_device(&self, dev_root: &Path) -> PathBuf {
        dev_root.join(format!("mtdblock{}", self.index))
    }
}

/// Flash backed by a file, either an MTD block device or a plain image.
///
/// The whole file is read into memory when opened. Erase and program go through the
/// file and are mirrored into that copy, so reads always see what was written.
#[derive(Debug)]
pub struct FileFlash {
    path: PathBuf,
    file: File,
    data: Vec<u8>,
    erase_size: usize,
}

impl FileFlash {
    /// Opens `path`, for writing too if `writable` is set
    pub fn open(path: &Path, erase_size: usize, writable: bool) -> io::Result<Self> {
        let mut file = OpenOptions::new().read(true).write(writable).open(path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        tracing::debug!(
            "Opened {} ({:#x} bytes, erase size {:#x})",
            path.display(),
            data.len(),
            erase_size
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            data,
            erase_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The contents as read from the file
    pub fn image(&self) -> &[u8] {
        &self.data
    }

    fn write_through(&mut self, offset: usize, data: &[u8]) -> io::Result<()> {
        let range = offset..offset + data.len();
        if range.end > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{:#x?} is outside {}", range, self.path.display()),
            ));
        }

        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.write_all(data)?;
        self.file.sync_data()?;
        self.data[range].copy_from_slice(data);
        Ok(())
    }
}

impl Flash for FileFlash {
    fn erase_size(&self) -> usize {
        self.erase_size
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn read(&self, range: Range<usize>) -> io::Result<&[u8]> {
        self.data.get(range.clone()).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{:#x?} is outside {}", range, self.path.display()),
            )
        })
    }

    fn erase(&mut self, offset: usize) -> io::Result<()> {
        if self.erase_size == 0 || offset % self.erase_size != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("erase address {:#x} is not unit aligned", offset),
            ));
        }
        tracing::trace!("Erasing {:#x} in {}", offset, self.path.display());
        self.write_through(offset, &vec![0xFF; self.erase_size])
    }

    fn program(&mut self, offset: usize, data: &[u8]) -> io::Result<()> {
        tracing::trace!(
            "Programming {:#x} bytes at {:#x} in {}",
            data.len(),
            offset,
            self.path.display()
        );
        self.write_through(offset, data)
    }
}
