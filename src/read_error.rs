//! Bitstream read errors.

use thiserror::Error;

/// Errors that can occur when reading OGG bitstreams.
///
/// Recoverable stream conditions (incomplete data, lost pages, skipped
/// garbage) are not errors; they are reported through the status
/// returns of the sync engine and the stream decoder.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum ReadError {
    /// Reader only supports bitstreams of version `0`.
    #[error("reader only supports bitstreams of version `0`, found version {0}")]
    UnhandledBitstreamVersion(u8),
    /// The page belongs to a different logical bitstream.
    #[error("page carries bitstream serial number {found}, decoder expects {expected}")]
    BitstreamSerialNumberMismatch {
        /// Serial number the decoder was set up with.
        expected: u32,
        /// Serial number found in the page header.
        found: u32,
    },
    /// More bytes were committed than were reserved beforehand.
    #[error("{wrote} bytes were committed but only {reserved} were reserved")]
    BufferOverrun {
        /// Number of bytes committed.
        wrote: usize,
        /// Number of bytes the buffer had reserved.
        reserved: usize,
    },
}
