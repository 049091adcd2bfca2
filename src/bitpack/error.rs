//! Bitpacking errors.

use thiserror::Error;

/// Errors that can occur when packing or unpacking bits.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum BitpackError {
    /// Fields are limited to widths of 0 up to 32 bits.
    #[error("bit width {0} is out of range, supported widths are 0 to 32 bits")]
    InvalidWidth(usize),
    /// A copy requested more bits than the source buffer holds.
    #[error("tried to copy {bits} bits out of a source buffer holding {available} bits")]
    SourceExhausted {
        /// Number of bits requested.
        bits: usize,
        /// Number of bits the source buffer holds.
        available: usize,
    },
    /// The read cursor moved past the end of the buffer. The state is
    /// sticky: every following read fails the same way.
    #[error("read past the end of the buffer")]
    Overread,
}
