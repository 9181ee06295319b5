//! CRC-32 as used by U-Boot for the environment checksum.
//!
//! This is the common CRC-32/ISO-HDLC variant (reflected polynomial `0xEDB88320`,
//! register preset and final XOR `0xFFFFFFFF`), the same value zlib's `crc32()`
//! returns when started from 0.

use ::crc::{Crc, Digest, CRC_32_ISO_HDLC};

/// The reflected CRC-32 polynomial
pub const POLYNOMIAL: u32 = 0xEDB8_8320;

/// Lookup table built at compile time, read-only afterwards
static CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Calculates the CRC-32 of `bytes`.
pub fn checksum(bytes: &[u8]) -> u32 {
    CRC.checksum(bytes)
}

/// A running CRC-32 over data that arrives in pieces.
pub struct Crc32 {
    digest: Digest<'static, u32>,
}

impl Crc32 {
    /// Starts a new checksum
    pub fn new() -> Self {
        Self {
            digest: CRC.digest(),
        }
    }

    /// Feeds `bytes` into the checksum
    pub fn update(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }

    /// The checksum of everything fed so far
    pub fn finalize(self) -> u32 {
        self.digest.finalize()
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}
