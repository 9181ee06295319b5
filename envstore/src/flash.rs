//! Writing blocks back to flash
//!
//! Flash can only be erased in whole units and programming can only clear bits, so a
//! block is never written on its own: the erase units around it are read, patched,
//! erased and programmed again as a whole.

use std::{io, ops::Range};

/// A trait defining the common flash operations
pub trait Flash {
    /// The size of the smallest erasable unit in bytes
    fn erase_size(&self) -> usize;

    /// The size of the flash in bytes
    fn len(&self) -> usize;

    /// Returns `true` if the flash has no bytes at all
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the flash in the given address range
    fn read(&self, range: Range<usize>) -> io::Result<&[u8]>;

    /// Erase the unit starting at `offset`, which must be aligned to [Self::erase_size]
    fn erase(&mut self, offset: usize) -> io::Result<()>;

    /// Program `data` at `offset`. The range must have been erased before.
    fn program(&mut self, offset: usize, data: &[u8]) -> io::Result<()>;
}

/// Writes `data` at `offset`, erasing and reprogramming every erase unit the range
/// touches. Bytes of those units outside the range keep their contents.
///
/// Nothing is erased when the flash already holds `data`.
pub fn write_aligned<F: Flash + ?Sized>(
    flash: &mut F,
    offset: usize,
    data: &[u8],
) -> io::Result<()> {
    let erase_size = flash.erase_size();
    if erase_size == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "flash reports an erase size of 0",
        ));
    }

    let end = offset
        .checked_add(data.len())
        .filter(|&end| end <= flash.len())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "write of {} bytes at {:#x} exceeds flash size {:#x}",
                    data.len(),
                    offset,
                    flash.len()
                ),
            )
        })?;

    if data.is_empty() {
        return Ok(());
    }

    let span = offset / erase_size * erase_size..end.div_ceil(erase_size) * erase_size;
    if span.end > flash.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "erase unit {:#x?} runs past the end of the flash ({:#x})",
                span,
                flash.len()
            ),
        ));
    }

    let current = flash.read(span.clone())?;
    let patch = offset - span.start..end - span.start;
    if current[patch.clone()] == *data {
        tracing::debug!("Flash already holds the data at {:#x}, skipping write", offset);
        return Ok(());
    }

    let mut buffer = current.to_vec();
    buffer[patch].copy_from_slice(data);

    tracing::debug!(
        "Writing {:#x} bytes at {:#x} as erase span {:#010x?} (unit {:#x})",
        data.len(),
        offset,
        span,
        erase_size
    );

    for unit in span.clone().step_by(erase_size) {
        flash.erase(unit)?;
    }
    flash.program(span.start, &buffer)
}

/// Flash kept in memory.
///
/// Behaves like NOR flash: erasing sets a unit to `0xFF` and programming may only
/// clear bits. Every erase and program is logged so the write pattern can be
/// inspected.
#[derive(Debug, Clone)]
pub struct MemoryFlash {
    data: Vec<u8>,
    erase_size: usize,
    erase_log: Vec<usize>,
    program_log: Vec<Range<usize>>,
    fail_writes: bool,
}

impl MemoryFlash {
    /// Wraps an existing image
    pub fn new(data: Vec<u8>, erase_size: usize) -> Self {
        Self {
            data,
            erase_size,
            erase_log: Vec::new(),
            program_log: Vec::new(),
            fail_writes: false,
        }
    }

    /// Fully erased flash of `len` bytes
    pub fn erased(len: usize, erase_size: usize) -> Self {
        Self::new(vec![0xFF; len], erase_size)
    }

    /// The current contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Offsets of all erased units, in order
    pub fn erase_log(&self) -> &[usize] {
        &self.erase_log
    }

    /// Ranges of all program operations, in order
    pub fn program_log(&self) -> &[Range<usize>] {
        &self.program_log
    }

    /// When set, every erase and program fails
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    fn check_writable(&self, range: &Range<usize>) -> io::Result<()> {
        if self.fail_writes {
            return Err(io::Error::other("flash write failure"));
        }
        if range.end > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{:#x?} is outside the flash", range),
            ));
        }
        Ok(())
    }
}

impl Flash for MemoryFlash {
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
                format!("{:#x?} is outside the flash", range),
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
        let range = offset..offset + self.erase_size;
        self.check_writable(&range)?;

        self.data[range].fill(0xFF);
        self.erase_log.push(offset);
        Ok(())
    }

    fn program(&mut self, offset: usize, data: &[u8]) -> io::Result<()> {
        let range = offset..offset + data.len();
        self.check_writable(&range)?;

        // Programming can only turn ones into zeros
        if let Some(position) = self.data[range.clone()]
            .iter()
            .zip(data)
            .position(|(old, new)| new & !old != 0)
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("programming {:#x} needs an erase first", offset + position),
            ));
        }

        self.data[range.clone()].copy_from_slice(data);
        self.program_log.push(range);
        Ok(())
    }
}
