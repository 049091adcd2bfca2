#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::as_conversions)]
#![deny(clippy::panic)]
#![deny(clippy::unwrap_used)]
//! OGG bitstream framing: packet segmentation, page assembly and
//! page-level synchronization.
//!
//! The crate multiplexes logical streams of packets into OGG pages and
//! back. It performs no I/O of its own: the [`StreamEncoder`] turns
//! packets into page buffers ready for concatenation, the [`SyncState`]
//! consumes raw byte chunks and yields validated [`Page`]s, and the
//! [`StreamDecoder`] reassembles packets from pages, joining packets
//! that span page boundaries. Packet payloads are opaque; parsing them
//! is the business of the hosted codec.
//!
//! A two-dialect bitpacking library ([`BitWriter`] / [`BitReader`]) is
//! included for codecs that need to assemble or pick apart packet
//! bodies bit by bit.

#[cfg(feature = "encoder")]
use std::hash::{Hash, Hasher};
use std::ops::Range;

pub use bitpack::{BitOrder, BitReader, BitWriter, BitpackError, Lsb, Msb};
pub use page::Page;

#[cfg(feature = "decoder")]
pub use decoder::{Packet, PacketOut, StreamDecoder};
#[cfg(feature = "decoder")]
pub use read_error::ReadError;
#[cfg(feature = "decoder")]
pub use sync::{PageSeek, SyncState};
#[cfg(feature = "encoder")]
pub use encoder::StreamEncoder;
#[cfg(feature = "encoder")]
pub use write_error::WriteError;

pub mod bitpack;
pub(crate) mod crc32;
mod page;

#[cfg(feature = "decoder")]
mod decoder;
#[cfg(feature = "decoder")]
mod read_error;
#[cfg(feature = "decoder")]
mod sync;

#[cfg(feature = "encoder")]
mod encoder;
#[cfg(feature = "encoder")]
mod write_error;

pub(crate) const CONTINUATION_VALUE: u8 = 0x1;
pub(crate) const BOS_VALUE: u8 = 0x2;
pub(crate) const EOS_VALUE: u8 = 0x4;
pub(crate) const MAX_SEGMENT_COUNT: usize = 255;
pub(crate) const MAX_PAGE_HEADER_SIZE: usize = 27 + MAX_SEGMENT_COUNT;
pub(crate) const MAX_PAGE_DATA_SIZE: usize = 65_025;
pub(crate) const MAX_PAGE_SIZE: usize = MAX_PAGE_HEADER_SIZE + MAX_PAGE_DATA_SIZE;
pub(crate) const PAGE_MARKER: [u8; 4] = [0x4F, 0x67, 0x67, 0x53];
pub(crate) const VERSION_INDEX: usize = 4;
pub(crate) const HEADER_TYPE_INDEX: usize = 5;
pub(crate) const SEGMENT_COUNT_INDEX: usize = 26;
pub(crate) const SEGMENT_TABLE_INDEX: usize = 27;
pub(crate) const PAGE_MARKER_RANGE: Range<usize> = Range { start: 0, end: 4 };
pub(crate) const GRANULE_POSITION_RANGE: Range<usize> = Range { start: 6, end: 14 };
pub(crate) const BITSTREAM_SERIAL_NUMBER_RANGE: Range<usize> = Range { start: 14, end: 18 };
pub(crate) const PAGE_SEQUENCE_NUMBER_RANGE: Range<usize> = Range { start: 18, end: 22 };
pub(crate) const CRC32_RANGE: Range<usize> = Range { start: 22, end: 26 };

#[inline]
pub(crate) fn parse_u32_le(bytes: &[u8]) -> u32 {
    let mut word = [0_u8; 4];
    word.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(word)
}

#[inline]
pub(crate) fn parse_i64_le(bytes: &[u8]) -> i64 {
    let mut word = [0_u8; 8];
    word.copy_from_slice(&bytes[..8]);
    i64::from_le_bytes(word)
}

/// Picks a serial number for a new logical bitstream.
///
/// The wall clock run through the standard library's default hasher,
/// folded down to 32 bits. Nowhere near real randomness, but serial
/// numbers only have to tell apart the handful of logical streams
/// multiplexed into one physical bitstream.
#[cfg(feature = "encoder")]
#[allow(clippy::as_conversions)]
pub fn generate_bitstream_serial_number() -> u32 {
    use std::collections::hash_map::DefaultHasher;

    let mut hasher = DefaultHasher::new();
    std::time::SystemTime::now().hash(&mut hasher);

    let hash = hasher.finish();
    ((hash >> 32) ^ hash) as u32
}
