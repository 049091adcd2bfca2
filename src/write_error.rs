//! Bitstream write errors.

use thiserror::Error;

/// Errors that can occur when writing OGG bitstreams.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum WriteError {
    /// A packet was pushed after the end-of-stream packet.
    #[error("logical bitstream already ended, no packet can follow end of stream")]
    StreamEnded,
}
