//! Implementation of the environment context
//!
//! An [Environment] is a private copy of one located block. All reads and edits go to
//! that copy; the flash is only touched by an explicit [Environment::persist].

use std::{borrow::Cow, fmt, ops::Range};

use crate::{
    crc,
    flash::{self, Flash},
    locate,
    record::{self, Record, Records},
    EnvError, BLOCK_SIZE, CRC_SIZE,
};

/// What a modification did to the block
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SetOutcome {
    /// The block already had the requested contents. Nothing needs persisting.
    Unchanged,
    /// The value had the same length and was overwritten where it was
    InPlace,
    /// All records were encoded again
    Rewritten,
}

impl SetOutcome {
    /// Returns `true` if the block was modified and should be persisted
    pub fn is_changed(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

enum Change {
    None,
    InPlace(Range<usize>),
    Rewrite,
}

/// One environment block copied out of flash
pub struct Environment {
    offset: usize,
    block: Box<[u8]>,
}

impl Environment {
    /// Searches `image` for a block of `block_size` bytes and copies the first one found
    pub fn locate(image: &[u8], block_size: usize) -> Result<Self, EnvError> {
        let offset = locate::locate(image, block_size).ok_or(EnvError::NotFound)?;
        let block = image[offset..offset + block_size].into();
        Ok(Self { offset, block })
    }

    /// Takes a block that is already known to live at `offset`.
    /// Fails if its checksum doesn't match.
    pub fn from_block(offset: usize, block: impl Into<Box<[u8]>>) -> Result<Self, EnvError> {
        let block = block.into();
        if block.len() <= CRC_SIZE || !locate::is_valid_block(&block) {
            return Err(EnvError::InvalidBlock { offset });
        }
        Ok(Self { offset, block })
    }

    /// Where the block was found in its image
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The size of the block, checksum included
    pub fn block_size(&self) -> usize {
        self.block.len()
    }

    /// The whole block as it would be written to flash
    pub fn as_bytes(&self) -> &[u8] {
        &self.block
    }

    /// The records area after the checksum
    pub fn payload(&self) -> &[u8] {
        &self.block[CRC_SIZE..]
    }

    fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.block[CRC_SIZE..]
    }

    /// The checksum word at the start of the block
    pub fn stored_checksum(&self) -> u32 {
        u32::from_le_bytes([self.block[0], self.block[1], self.block[2], self.block[3]])
    }

    /// Tests if the stored checksum matches the payload
    pub fn is_valid(&self) -> bool {
        locate::is_valid_block(&self.block)
    }

    fn update_checksum(&mut self) {
        let crc = crc::checksum(self.payload());
        self.block[..CRC_SIZE].copy_from_slice(&crc.to_le_bytes());
    }

    /// Walks the records in stored order
    pub fn records(&self) -> Records<'_> {
        Records::new(self.payload())
    }

    /// The record named `key`
    pub fn record(&self, key: &str) -> Result<Option<Record<'_>>, EnvError> {
        record::lookup(self.payload(), key.as_bytes())
    }

    /// The value of `key`, or `None` if there is no such variable
    pub fn get(&self, key: &str) -> Result<Option<Cow<'_, str>>, EnvError> {
        Ok(self.record(key)?.map(|record| record.value_str()))
    }

    /// Sets `key` to `value` in the held copy.
    ///
    /// A value of the same length is overwritten where it is. Anything else (a new
    /// length or a new variable) encodes all records again; if they no longer fit the
    /// block, [EnvError::UnsupportedResize] is returned and the copy stays untouched.
    /// The checksum is updated whenever the contents change.
    pub fn set(&mut self, key: &str, value: &str) -> Result<SetOutcome, EnvError> {
        record::validate_key(key)?;
        record::validate_value(key, value)?;

        let change = match self.record(key)? {
            Some(old) if old.value() == value.as_bytes() => Change::None,
            Some(old) if old.value().len() == value.len() => Change::InPlace(old.value_range()),
            _ => Change::Rewrite,
        };

        match change {
            Change::None => {
                tracing::debug!("{} is already set to {:?}", key, value);
                Ok(SetOutcome::Unchanged)
            }
            Change::InPlace(range) => {
                tracing::debug!("Overwriting {} in place at payload {:#x?}", key, range);
                self.payload_mut()[range].copy_from_slice(value.as_bytes());
                self.update_checksum();
                Ok(SetOutcome::InPlace)
            }
            Change::Rewrite => {
                self.rewrite(key, Some(value))?;
                Ok(SetOutcome::Rewritten)
            }
        }
    }

    /// Deletes `key` from the held copy
    pub fn remove(&mut self, key: &str) -> Result<SetOutcome, EnvError> {
        record::validate_key(key)?;

        if self.record(key)?.is_none() {
            tracing::debug!("{} is not set, nothing to remove", key);
            return Ok(SetOutcome::Unchanged);
        }

        self.rewrite(key, None)?;
        Ok(SetOutcome::Rewritten)
    }

    /// Encodes all records again with `key` replaced, appended or (for `None`) dropped
    fn rewrite(&mut self, key: &str, value: Option<&str>) -> Result<(), EnvError> {
        let mut scratch = vec![0u8; self.payload().len()];

        {
            let mut records = record::parse(self.payload())?;
            let existing = records.iter().position(|r| r.key() == key.as_bytes());

            match (existing, value) {
                (Some(index), Some(value)) => {
                    records[index] = Record::new(key.as_bytes(), value.as_bytes())
                }
                (Some(index), None) => {
                    records.remove(index);
                }
                (None, Some(value)) => records.push(Record::new(key.as_bytes(), value.as_bytes())),
                (None, None) => return Ok(()),
            }

            let used = record::serialize(&records, &mut scratch).map_err(|err| match err {
                EnvError::WouldNotFit { need, capacity } => EnvError::UnsupportedResize {
                    key: key.to_owned(),
                    need,
                    capacity,
                },
                err => err,
            })?;

            tracing::debug!(
                "Rewrote {} records, {} of {} payload bytes used",
                records.len(),
                used,
                scratch.len()
            );
        }

        self.payload_mut().copy_from_slice(&scratch);
        self.update_checksum();
        Ok(())
    }

    /// Writes the whole block back to where it was found
    pub fn persist<F: Flash + ?Sized>(&self, flash: &mut F) -> Result<(), EnvError> {
        debug_assert!(self.is_valid());

        tracing::info!(
            "Persisting environment at {:#x} (crc {:#010x})",
            self.offset,
            self.stored_checksum()
        );

        flash::write_aligned(flash, self.offset, &self.block).map_err(|source| {
            EnvError::PersistFailure {
                offset: self.offset,
                source,
            }
        })
    }

    /// [Self::set] followed by [Self::persist] when something changed
    pub fn set_and_persist<F: Flash + ?Sized>(
        &mut self,
        key: &str,
        value: &str,
        flash: &mut F,
    ) -> Result<SetOutcome, EnvError> {
        let outcome = self.set(key, value)?;
        if outcome.is_changed() {
            self.persist(flash)?;
        }
        Ok(outcome)
    }

    /// [Self::remove] followed by [Self::persist] when something changed
    pub fn remove_and_persist<F: Flash + ?Sized>(
        &mut self,
        key: &str,
        flash: &mut F,
    ) -> Result<SetOutcome, EnvError> {
        let outcome = self.remove(key)?;
        if outcome.is_changed() {
            self.persist(flash)?;
        }
        Ok(outcome)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("offset", &format_args!("{:#x}", self.offset))
            .field("block_size", &format_args!("{:#x}", self.block.len()))
            .field("crc", &format_args!("{:#010x}", self.stored_checksum()))
            .finish()
    }
}

/// Holds at most one [Environment] at a time.
///
/// Loading a new block drops the one held before; a failed load leaves the context
/// empty. Every accessor returns [EnvError::NotLoaded] while it is empty.
#[derive(Debug)]
pub struct EnvContext {
    block_size: usize,
    env: Option<Environment>,
}

impl EnvContext {
    /// An empty context for blocks of [BLOCK_SIZE]
    pub fn new() -> Self {
        Self::with_block_size(BLOCK_SIZE)
    }

    /// An empty context for blocks of `block_size`
    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            block_size,
            env: None,
        }
    }

    /// The block size used when locating
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Locates a block in `image` and takes a copy of it
    pub fn load(&mut self, image: &[u8]) -> Result<&mut Environment, EnvError> {
        self.env = None;
        let env = Environment::locate(image, self.block_size)?;
        Ok(self.env.insert(env))
    }

    /// Returns `true` while a block is held
    pub fn is_loaded(&self) -> bool {
        self.env.is_some()
    }

    /// The held block
    pub fn environment(&self) -> Result<&Environment, EnvError> {
        self.env.as_ref().ok_or(EnvError::NotLoaded)
    }

    /// The held block, mutably
    pub fn environment_mut(&mut self) -> Result<&mut Environment, EnvError> {
        self.env.as_mut().ok_or(EnvError::NotLoaded)
    }

    /// Drops the held block and hands it back
    pub fn release(&mut self) -> Option<Environment> {
        self.env.take()
    }

    /// See [Environment::get]
    pub fn get(&self, key: &str) -> Result<Option<Cow<'_, str>>, EnvError> {
        self.environment()?.get(key)
    }

    /// See [Environment::set]
    pub fn set(&mut self, key: &str, value: &str) -> Result<SetOutcome, EnvError> {
        self.environment_mut()?.set(key, value)
    }

    /// See [Environment::remove]
    pub fn remove(&mut self, key: &str) -> Result<SetOutcome, EnvError> {
        self.environment_mut()?.remove(key)
    }

    /// See [Environment::persist]
    pub fn persist<F: Flash + ?Sized>(&self, flash: &mut F) -> Result<(), EnvError> {
        self.environment()?.persist(flash)
    }

    /// See [Environment::set_and_persist]
    pub fn set_and_persist<F: Flash + ?Sized>(
        &mut self,
        key: &str,
        value: &str,
        flash: &mut F,
    ) -> Result<SetOutcome, EnvError> {
        self.environment_mut()?.set_and_persist(key, value, flash)
    }
}

impl Default for EnvContext {
    fn default() -> Self {
        Self::new()
    }
}
