use crate::page::{self, Page};
use crate::{
    WriteError, BITSTREAM_SERIAL_NUMBER_RANGE, BOS_VALUE, CONTINUATION_VALUE, CRC32_RANGE,
    EOS_VALUE, GRANULE_POSITION_RANGE, HEADER_TYPE_INDEX, MAX_PAGE_SIZE, MAX_SEGMENT_COUNT,
    PAGE_MARKER, PAGE_MARKER_RANGE, PAGE_SEQUENCE_NUMBER_RANGE, SEGMENT_COUNT_INDEX,
    SEGMENT_TABLE_INDEX,
};

/// Body bytes a page accumulates before the opportunistic modes emit
/// it.
const DEFAULT_PAGE_FILL: usize = 4096;

#[derive(Clone, Copy, Debug)]
struct LacingEntry {
    value: u8,
    granule_position: i64,
    begins_packet: bool,
}

/// Accumulates the packets of one logical bitstream and emits pages.
///
/// Packets enter through [`push_packet`](Self::push_packet), are cut
/// into lacing segments and queued. Pages come out either
/// opportunistically once enough data has accumulated
/// ([`page_out`](Self::page_out)) or on demand
/// ([`flush`](Self::flush)), as views into encoder scratch that stay
/// valid until the next call. Emitted pages carry the capture pattern,
/// flags, granule position and checksum; their byte concatenation is
/// the logical bitstream.
#[derive(Clone, Debug)]
pub struct StreamEncoder {
    bitstream_serial_number: u32,
    page_sequence_number: u32,
    packet_number: u64,
    body: Vec<u8>,
    body_returned: usize,
    lacing: Vec<LacingEntry>,
    lacing_returned: usize,
    bos_written: bool,
    eos: bool,
    page_scratch: Box<[u8]>,
    scratch_header_len: usize,
    scratch_body_len: usize,
}

impl StreamEncoder {
    /// Creates an encoder for the logical bitstream with the given
    /// serial number.
    pub fn new(bitstream_serial_number: u32) -> Self {
        let mut page_scratch = vec![0_u8; MAX_PAGE_SIZE];
        page_scratch[PAGE_MARKER_RANGE].copy_from_slice(&PAGE_MARKER);

        Self {
            bitstream_serial_number,
            page_sequence_number: 0,
            packet_number: 0,
            body: Vec::new(),
            body_returned: 0,
            lacing: Vec::new(),
            lacing_returned: 0,
            bos_written: false,
            eos: false,
            page_scratch: page_scratch.into_boxed_slice(),
            scratch_header_len: 0,
            scratch_body_len: 0,
        }
    }

    /// Unique serial ID of the logical bitstream.
    pub fn serial_number(&self) -> u32 {
        self.bitstream_serial_number
    }

    /// True once the end-of-stream packet has been queued.
    pub fn is_end_of_stream(&self) -> bool {
        self.eos
    }

    /// Number of packets submitted so far.
    pub fn packets_submitted(&self) -> u64 {
        self.packet_number
    }

    /// Queues a packet for the logical bitstream.
    ///
    /// `granule_position` is the codec-defined position after the last
    /// whole unit in the packet and lands in the header of the page
    /// the packet completes on. A packet with `end_of_stream` closes
    /// the stream: nothing can be pushed afterwards.
    pub fn push_packet(
        &mut self,
        packet_data: &[u8],
        granule_position: i64,
        end_of_stream: bool,
    ) -> Result<(), WriteError> {
        self.push_packet_vectored(&[packet_data], granule_position, end_of_stream)
    }

    /// Queues a packet given as a list of chunks, avoiding an upfront
    /// copy into one contiguous buffer.
    #[allow(clippy::as_conversions)]
    pub fn push_packet_vectored(
        &mut self,
        chunks: &[&[u8]],
        granule_position: i64,
        end_of_stream: bool,
    ) -> Result<(), WriteError> {
        if self.eos {
            return Err(WriteError::StreamEnded);
        }

        // Space already emitted as pages can be reclaimed now, no page
        // view is alive while `self` is borrowed mutably.
        if self.body_returned != 0 {
            self.body.drain(..self.body_returned);
            self.body_returned = 0;
        }
        if self.lacing_returned != 0 {
            self.lacing.drain(..self.lacing_returned);
            self.lacing_returned = 0;
        }

        let bytes: usize = chunks.iter().map(|chunk| chunk.len()).sum();
        for chunk in chunks {
            self.body.extend_from_slice(chunk);
        }

        let full_segments = bytes / 255;
        for i in 0..full_segments {
            self.lacing.push(LacingEntry {
                value: 255,
                granule_position: -1,
                begins_packet: i == 0,
            });
        }
        // A packet of a multiple of 255 bytes ends in a zero-length
        // terminal segment.
        self.lacing.push(LacingEntry {
            value: (bytes % 255) as u8,
            granule_position,
            begins_packet: full_segments == 0,
        });

        if end_of_stream {
            self.eos = true;
        }
        self.packet_number += 1;

        Ok(())
    }

    /// Emits a page if enough data has accumulated.
    ///
    /// A page is produced once at least 255 segments or more than 4096
    /// body bytes are queued, when end of stream is pending, or when
    /// the opening page has not gone out yet. Otherwise `None` is
    /// returned and the packets stay queued.
    pub fn page_out(&mut self) -> Option<Page<'_>> {
        self.page_out_fill(DEFAULT_PAGE_FILL)
    }

    /// [`page_out`](Self::page_out) with a caller-chosen body-size
    /// threshold instead of the default 4096 bytes.
    pub fn page_out_fill(&mut self, nfill: usize) -> Option<Page<'_>> {
        let lacing_avail = self.lacing.len() - self.lacing_returned;
        let body_avail = self.body.len() - self.body_returned;

        let ready = (self.eos && lacing_avail > 0)
            || body_avail > nfill
            || lacing_avail >= MAX_SEGMENT_COUNT
            || (lacing_avail > 0 && !self.bos_written);
        if !ready || !self.emit_page(nfill) {
            return None;
        }

        Some(self.page_view())
    }

    /// Emits a page from whatever is queued, regardless of fullness.
    ///
    /// Bounds the latency of the stream at the cost of smaller pages.
    /// Returns `None` only when nothing is buffered.
    pub fn flush(&mut self) -> Option<Page<'_>> {
        self.flush_fill(DEFAULT_PAGE_FILL)
    }

    /// [`flush`](Self::flush) with a caller-chosen body-size threshold;
    /// large backlogs are cut into pages of roughly `nfill` body bytes.
    pub fn flush_fill(&mut self, nfill: usize) -> Option<Page<'_>> {
        if !self.emit_page(nfill) {
            return None;
        }

        Some(self.page_view())
    }

    /// Rewinds the encoder to a fresh stream with the same serial
    /// number.
    pub fn reset(&mut self) {
        self.page_sequence_number = 0;
        self.packet_number = 0;
        self.body.clear();
        self.body_returned = 0;
        self.lacing.clear();
        self.lacing_returned = 0;
        self.bos_written = false;
        self.eos = false;
        self.scratch_header_len = 0;
        self.scratch_body_len = 0;
    }

    /// Assembles the next page into scratch. Returns false when no
    /// segments are queued.
    #[allow(clippy::as_conversions)]
    fn emit_page(&mut self, nfill: usize) -> bool {
        let queue = &self.lacing[self.lacing_returned..];
        if queue.is_empty() {
            return false;
        }

        let max_segments = queue.len().min(MAX_SEGMENT_COUNT);
        let mut segments = 0;
        let mut body_len = 0_usize;

        if !self.bos_written {
            // The opening page carries exactly the first packet.
            while segments < max_segments {
                let entry = queue[segments];
                body_len += usize::from(entry.value);
                segments += 1;
                if entry.value < 255 {
                    break;
                }
            }
        } else {
            while segments < max_segments {
                // Stop at a packet boundary once the page is full.
                if segments > 0 && body_len > nfill && queue[segments - 1].value < 255 {
                    break;
                }
                body_len += usize::from(queue[segments].value);
                segments += 1;
            }
        }

        let mut header_type = 0_u8;
        if !queue[0].begins_packet {
            header_type |= CONTINUATION_VALUE;
        }
        if !self.bos_written {
            header_type |= BOS_VALUE;
        }
        let drains_queue = segments == queue.len();
        if self.eos && drains_queue {
            header_type |= EOS_VALUE;
        }

        let mut granule_position = -1_i64;
        for entry in queue[..segments].iter().rev() {
            if entry.value < 255 {
                granule_position = entry.granule_position;
                break;
            }
        }

        let header_len = SEGMENT_TABLE_INDEX + segments;
        let scratch = &mut self.page_scratch;
        scratch[HEADER_TYPE_INDEX] = header_type;
        scratch[GRANULE_POSITION_RANGE].copy_from_slice(&granule_position.to_le_bytes());
        scratch[BITSTREAM_SERIAL_NUMBER_RANGE]
            .copy_from_slice(&self.bitstream_serial_number.to_le_bytes());
        scratch[PAGE_SEQUENCE_NUMBER_RANGE]
            .copy_from_slice(&self.page_sequence_number.to_le_bytes());
        scratch[CRC32_RANGE].copy_from_slice(&[0, 0, 0, 0]);
        scratch[SEGMENT_COUNT_INDEX] = segments as u8;
        for (i, entry) in queue[..segments].iter().enumerate() {
            scratch[SEGMENT_TABLE_INDEX + i] = entry.value;
        }

        let body_start = self.body_returned;
        scratch[header_len..header_len + body_len]
            .copy_from_slice(&self.body[body_start..body_start + body_len]);

        page::checksum_set(&mut scratch[..header_len + body_len]);

        self.lacing_returned += segments;
        self.body_returned += body_len;
        self.page_sequence_number += 1;
        self.bos_written = true;
        self.scratch_header_len = header_len;
        self.scratch_body_len = body_len;

        true
    }

    fn page_view(&self) -> Page<'_> {
        Page::new(
            &self.page_scratch[..self.scratch_header_len],
            &self.page_scratch
                [self.scratch_header_len..self.scratch_header_len + self.scratch_body_len],
        )
    }
}
