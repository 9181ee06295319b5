//! Finding the environment block inside a flash image
//!
//! The image is walked in strides of one block size. A stride holds the environment
//! when the little-endian word at its start equals the checksum of the rest of the
//! stride. Nothing else marks a block, so erased flash and unrelated data are told
//! apart from the environment by that checksum alone. A checksum collision on
//! foreign data would be accepted as well; the on-flash format leaves no way to
//! rule that out.

use crate::{crc, CRC_SIZE};

/// Reads the checksum stored at the start of `block`
pub fn stored_checksum(block: &[u8]) -> Option<u32> {
    let word = block.get(..CRC_SIZE)?;
    Some(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
}

/// Tests if `block` is an environment block by comparing the stored checksum against
/// the checksum of everything after it
pub fn is_valid_block(block: &[u8]) -> bool {
    match stored_checksum(block) {
        Some(stored) => stored == crc::checksum(&block[CRC_SIZE..]),
        None => false,
    }
}

/// Returns the offset of the first stride of `image` that holds a valid block of
/// `block_size` bytes.
///
/// Only whole strides are considered: an image shorter than one block is never
/// searched. Later copies of the environment (redundant or backup blocks) are not
/// looked at once a match is found.
pub fn locate(image: &[u8], block_size: usize) -> Option<usize> {
    if block_size <= CRC_SIZE {
        return None;
    }

    let found = image
        .chunks_exact(block_size)
        .enumerate()
        .map(|(index, block)| (index * block_size, block))
        .find(|(offset, block)| {
            let valid = is_valid_block(block);
            tracing::trace!(
                "Probing {:#010x}: stored crc {:#010x?}, valid: {}",
                offset,
                stored_checksum(block),
                valid
            );
            valid
        })
        .map(|(offset, _)| offset);

    match found {
        Some(offset) => tracing::debug!("Found environment at {:#x}", offset),
        None => tracing::debug!(
            "No environment in {} bytes ({} strides of {:#x})",
            image.len(),
            image.len() / block_size,
            block_size
        ),
    }

    found
}
