use std::io;

/// Errors that can occur while reading or modifying an environment block.
#[derive(thiserror::Error, Debug)]
pub enum EnvError {
    /// No stride of the image holds a block whose checksum matches its payload.
    #[error("no environment block found")]
    NotFound,

    /// The context does not hold a block.
    #[error("no environment block is loaded")]
    NotLoaded,

    /// A block handed in directly did not pass the checksum check.
    #[error("block at offset {offset:#x} is not a valid environment block")]
    InvalidBlock {
        /// Where the block was taken from
        offset: usize,
    },

    /// A record without a `=` separator.
    #[error("malformed record at payload offset {offset:#x}: missing '='")]
    MalformedRecord {
        /// Start of the offending record within the payload
        offset: usize,
    },

    /// Keys must be non-empty and may contain neither `=` nor NUL.
    #[error("invalid variable name {0:?}")]
    InvalidKey(String),

    /// Values may not contain NUL.
    #[error("value of {0:?} contains a NUL byte")]
    InvalidValue(String),

    /// The encoded records do not fit the fixed payload length.
    #[error("records need {need} bytes but the payload only holds {capacity}")]
    WouldNotFit {
        /// Bytes needed including the terminator
        need: usize,
        /// Bytes available
        capacity: usize,
    },

    /// Changing the length of `key` would overflow the block.
    #[error("cannot resize {key:?}: environment would need {need} bytes, {capacity} available")]
    UnsupportedResize {
        /// The variable being changed
        key: String,
        /// Bytes the rewritten records would take
        need: usize,
        /// Bytes available in the payload
        capacity: usize,
    },

    /// The flash refused the write-back. The in-memory block keeps the change.
    #[error("failed to persist environment at offset {offset:#x}")]
    PersistFailure {
        /// Offset of the block on the flash
        offset: usize,
        /// What the flash reported
        #[source]
        source: io::Error,
    },
}
