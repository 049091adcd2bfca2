use crate::crc32::{crc32, crc32_update};
use crate::{
    parse_i64_le, parse_u32_le, BITSTREAM_SERIAL_NUMBER_RANGE, BOS_VALUE, CONTINUATION_VALUE,
    CRC32_RANGE, EOS_VALUE, GRANULE_POSITION_RANGE, HEADER_TYPE_INDEX, PAGE_SEQUENCE_NUMBER_RANGE,
    SEGMENT_COUNT_INDEX, SEGMENT_TABLE_INDEX, VERSION_INDEX,
};

/// A single page of an OGG bitstream.
///
/// A page view borrows the buffer of the engine that produced it and
/// stays valid until the next mutating call on that engine. The header
/// slice covers the fixed 27 bytes plus the segment table; the body
/// slice covers the packet data the segment table describes.
#[derive(Clone, Copy, Debug)]
pub struct Page<'a> {
    header: &'a [u8],
    body: &'a [u8],
}

impl<'a> Page<'a> {
    pub(crate) fn new(header: &'a [u8], body: &'a [u8]) -> Self {
        Self { header, body }
    }

    /// The header bytes, including the segment table.
    pub fn header(&self) -> &'a [u8] {
        self.header
    }

    /// The body bytes.
    pub fn body(&self) -> &'a [u8] {
        self.body
    }

    /// The stream structure version. Only version `0` exists.
    pub fn version(&self) -> u8 {
        self.header[VERSION_INDEX]
    }

    /// True if the first segment continues a packet started on the
    /// previous page.
    pub fn is_continuation(&self) -> bool {
        self.header[HEADER_TYPE_INDEX] & CONTINUATION_VALUE != 0
    }

    /// True if this is the first page of the logical bitstream.
    pub fn is_bos(&self) -> bool {
        self.header[HEADER_TYPE_INDEX] & BOS_VALUE != 0
    }

    /// True if this is the last page of the logical bitstream.
    pub fn is_eos(&self) -> bool {
        self.header[HEADER_TYPE_INDEX] & EOS_VALUE != 0
    }

    /// The granule position of the last packet completed on this page,
    /// or `-1` if no packet completes here. The value is codec defined
    /// and carried verbatim.
    pub fn granule_position(&self) -> i64 {
        parse_i64_le(&self.header[GRANULE_POSITION_RANGE])
    }

    /// Unique serial ID of the logical bitstream this page belongs to.
    pub fn bitstream_serial_number(&self) -> u32 {
        parse_u32_le(&self.header[BITSTREAM_SERIAL_NUMBER_RANGE])
    }

    /// Sequential number of the page within the logical bitstream.
    pub fn page_sequence_number(&self) -> u32 {
        parse_u32_le(&self.header[PAGE_SEQUENCE_NUMBER_RANGE])
    }

    /// Number of packets that complete on this page.
    ///
    /// A trailing segment of 255 belongs to a packet that continues on
    /// the next page and is not counted.
    pub fn packet_count(&self) -> usize {
        self.segment_table().iter().filter(|lace| **lace < 255).count()
    }

    /// True if the stored checksum matches the page contents.
    pub fn checksum_valid(&self) -> bool {
        let stored = parse_u32_le(&self.header[CRC32_RANGE]);
        checksum(self.header, self.body) == stored
    }

    pub(crate) fn segment_table(&self) -> &'a [u8] {
        let count = usize::from(self.header[SEGMENT_COUNT_INDEX]);
        &self.header[SEGMENT_TABLE_INDEX..SEGMENT_TABLE_INDEX + count]
    }
}

/// Checksum over a split page with the CRC field taken as zero.
pub(crate) fn checksum(header: &[u8], body: &[u8]) -> u32 {
    let mut crc = crc32(&header[..CRC32_RANGE.start]);
    crc = crc32_update(crc, &[0, 0, 0, 0]);
    crc = crc32_update(crc, &header[CRC32_RANGE.end..]);
    crc32_update(crc, body)
}

/// Computes the checksum of an assembled page and patches it into the
/// CRC field. The buffer holds the header directly followed by the
/// body, with the CRC field already zeroed.
#[cfg(feature = "encoder")]
pub(crate) fn checksum_set(page: &mut [u8]) {
    let crc = crc32(page);
    page[CRC32_RANGE].copy_from_slice(&crc.to_le_bytes());
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use super::*;

    static OPUS_HEAD_PAGE: [u8; 47] = [
        0x4F, 0x67, 0x67, 0x53, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x4A,
        0xC9, 0x09, 0xB6, 0x00, 0x00, 0x00, 0x00, 0xF9, 0x20, 0x89, 0xF8, 0x01, 0x13, 0x4F, 0x70,
        0x75, 0x73, 0x48, 0x65, 0x61, 0x64, 0x01, 0x02, 0x38, 0x01, 0x80, 0xBB, 0x00, 0x00, 0x00,
        0x00, 0x00,
    ];

    #[test]
    fn test_accessors() {
        let page = Page::new(&OPUS_HEAD_PAGE[..28], &OPUS_HEAD_PAGE[28..]);

        assert_eq!(page.version(), 0);
        assert!(!page.is_continuation());
        assert!(page.is_bos());
        assert!(!page.is_eos());
        assert_eq!(page.granule_position(), 0);
        assert_eq!(page.bitstream_serial_number(), 0xB609_C94A);
        assert_eq!(page.page_sequence_number(), 0);
        assert_eq!(page.packet_count(), 1);
        assert!(page.checksum_valid());
    }

    #[test]
    fn test_checksum_rejects_corruption() {
        let mut corrupted = OPUS_HEAD_PAGE;
        corrupted[30] ^= 0x01;

        let page = Page::new(&corrupted[..28], &corrupted[28..]);
        assert!(!page.checksum_valid());
    }

    #[cfg(feature = "encoder")]
    #[test]
    fn test_checksum_set() {
        let mut page = OPUS_HEAD_PAGE;
        page[CRC32_RANGE].iter_mut().for_each(|x| *x = 0);

        checksum_set(&mut page);
        assert_eq!(page, OPUS_HEAD_PAGE);
    }

    #[test]
    fn test_packet_count_ignores_continued_tail() {
        // Two complete packets and the head of a spanning one.
        let mut header = vec![0_u8; 27 + 4];
        header[0..4].copy_from_slice(&crate::PAGE_MARKER);
        header[SEGMENT_COUNT_INDEX] = 4;
        header[SEGMENT_TABLE_INDEX..].copy_from_slice(&[10, 255, 3, 255]);

        let body = vec![0_u8; 10 + 255 + 3 + 255];
        let page = Page::new(&header, &body);

        assert_eq!(page.packet_count(), 2);
    }
}
