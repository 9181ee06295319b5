#![doc = include_str!("../../README.md")]
#![warn(missing_docs)]

pub mod crc;
pub mod env;
mod error;
pub mod flash;
pub mod locate;
pub mod record;

pub use env::{EnvContext, Environment, SetOutcome};
pub use error::EnvError;
pub use flash::{write_aligned, Flash, MemoryFlash};
pub use locate::locate;

/// The size of an environment block in bytes, as used by the reference deployment
pub const BLOCK_SIZE: usize = 0x0001_0000;

/// The number of bytes at the start of a block holding the little-endian checksum
pub const CRC_SIZE: usize = 4;
