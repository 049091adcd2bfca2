use log::debug;

use crate::page::Page;
use crate::ReadError;

#[derive(Clone, Copy, Debug)]
enum Lace {
    /// Marks a discontinuity: pages were lost between the segments
    /// before and after.
    Gap,
    Segment { value: u8, granule_position: i64 },
}

/// A packet reassembled from the pages of one logical bitstream.
///
/// The view borrows the decoder and stays valid until the next
/// mutating call on it.
#[derive(Clone, Copy, Debug)]
pub struct Packet<'a> {
    data: &'a [u8],
    bitstream_serial_number: u32,
    granule_position: i64,
    packet_number: u64,
    is_bos: bool,
    is_eos: bool,
}

impl<'a> Packet<'a> {
    /// The payload of the packet.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Unique serial ID of the logical bitstream this packet belongs
    /// to.
    pub fn bitstream_serial_number(&self) -> u32 {
        self.bitstream_serial_number
    }

    /// The granule position of the page this packet completed on, or
    /// `-1` if the packet was not the last one completing on its page.
    pub fn granule_position(&self) -> i64 {
        self.granule_position
    }

    /// Sequential number of the packet within the logical bitstream.
    /// Lost packets reported as gaps consume a number as well.
    pub fn packet_number(&self) -> u64 {
        self.packet_number
    }

    /// Packet is the first packet of the logical bitstream.
    pub fn is_bos(&self) -> bool {
        self.is_bos
    }

    /// Packet is the last packet of the logical bitstream.
    pub fn is_eos(&self) -> bool {
        self.is_eos
    }
}

/// Result of a single [`StreamDecoder::packet_out`] or
/// [`StreamDecoder::packet_peek`] call.
#[derive(Debug)]
pub enum PacketOut<'a> {
    /// A complete packet.
    Packet(Packet<'a>),
    /// The buffered pages do not hold a complete packet yet.
    NeedData,
    /// Pages were lost or corrupted; the data stream resumes with the
    /// next packet. Reported once per discontinuity.
    Gap,
}

/// Reassembles the packets of one logical bitstream from its pages.
///
/// Validated pages enter through [`page_in`](Self::page_in); packets
/// come out of [`packet_out`](Self::packet_out) in order, with packets
/// spanning page boundaries joined back together. Lost pages surface
/// as a single [`PacketOut::Gap`] before delivery resumes.
#[derive(Clone, Debug)]
pub struct StreamDecoder {
    bitstream_serial_number: u32,
    expected_page_sequence: Option<u32>,
    body: Vec<u8>,
    body_returned: usize,
    lacing: Vec<Lace>,
    lacing_returned: usize,
    packet_number: u64,
    bos_pending: bool,
    eos: bool,
}

impl StreamDecoder {
    /// Creates a decoder for the logical bitstream with the given
    /// serial number.
    pub fn new(bitstream_serial_number: u32) -> Self {
        Self {
            bitstream_serial_number,
            expected_page_sequence: None,
            body: Vec::new(),
            body_returned: 0,
            lacing: Vec::new(),
            lacing_returned: 0,
            packet_number: 0,
            bos_pending: false,
            eos: false,
        }
    }

    /// Unique serial ID of the logical bitstream.
    pub fn serial_number(&self) -> u32 {
        self.bitstream_serial_number
    }

    /// True once a page carrying the end-of-stream flag was consumed.
    pub fn is_end_of_stream(&self) -> bool {
        self.eos
    }

    /// Consumes a page of this logical bitstream.
    ///
    /// Pages of a different bitstream or with an unknown version are
    /// rejected without changing any state; a multiplexed physical
    /// stream is routed by checking [`Page::bitstream_serial_number`]
    /// against the decoders at hand.
    pub fn page_in(&mut self, page: &Page<'_>) -> Result<(), ReadError> {
        if page.version() != 0 {
            return Err(ReadError::UnhandledBitstreamVersion(page.version()));
        }
        let serial = page.bitstream_serial_number();
        if serial != self.bitstream_serial_number {
            return Err(ReadError::BitstreamSerialNumberMismatch {
                expected: self.bitstream_serial_number,
                found: serial,
            });
        }

        // Space already returned as packets can be reclaimed now, no
        // packet view is alive while `self` is borrowed mutably.
        if self.body_returned != 0 {
            self.body.drain(..self.body_returned);
            self.body_returned = 0;
        }
        if self.lacing_returned != 0 {
            self.lacing.drain(..self.lacing_returned);
            self.lacing_returned = 0;
        }

        let sequence = page.page_sequence_number();
        let mut segments = page.segment_table();
        let mut body = page.body();

        if let Some(expected) = self.expected_page_sequence {
            if expected != sequence {
                debug!("page sequence gap: expected {}, got {}", expected, sequence);
                self.drop_partial_packet();
                self.lacing.push(Lace::Gap);
            }
        }

        let mid_packet = matches!(
            self.lacing.last(),
            Some(Lace::Segment { value: 255, .. })
        );

        if page.is_continuation() && !mid_packet {
            // The tail of a packet whose head was never seen; skip up
            // to and including its terminal segment.
            let mut skip = 0;
            let mut skipped_bytes = 0;
            for lace in segments {
                skip += 1;
                skipped_bytes += usize::from(*lace);
                if *lace < 255 {
                    break;
                }
            }
            segments = &segments[skip..];
            body = &body[skipped_bytes..];
        } else if !page.is_continuation() && mid_packet {
            // The continuation never arrived.
            debug!("unfinished packet abandoned, page is not a continuation");
            self.drop_partial_packet();
            self.lacing.push(Lace::Gap);
        }

        let appended_from = self.lacing.len();
        for lace in segments {
            self.lacing.push(Lace::Segment {
                value: *lace,
                granule_position: -1,
            });
        }
        self.body.extend_from_slice(body);

        // The page granule belongs to the last packet completing on
        // this page.
        for lace in self.lacing[appended_from..].iter_mut().rev() {
            if let Lace::Segment {
                value,
                granule_position,
            } = lace
            {
                if *value < 255 {
                    *granule_position = page.granule_position();
                    break;
                }
            }
        }

        if page.is_bos() {
            self.bos_pending = true;
        }
        if page.is_eos() {
            self.eos = true;
        }
        self.expected_page_sequence = Some(sequence.wrapping_add(1));

        Ok(())
    }

    /// Takes the next complete packet out of the decoder.
    pub fn packet_out(&mut self) -> PacketOut<'_> {
        self.next_packet(true)
    }

    /// Like [`packet_out`](Self::packet_out), but leaves the packet
    /// buffered.
    pub fn packet_peek(&mut self) -> PacketOut<'_> {
        self.next_packet(false)
    }

    /// Rewinds the decoder to a fresh stream with the same serial
    /// number.
    pub fn reset(&mut self) {
        self.expected_page_sequence = None;
        self.body.clear();
        self.body_returned = 0;
        self.lacing.clear();
        self.lacing_returned = 0;
        self.packet_number = 0;
        self.bos_pending = false;
        self.eos = false;
    }

    /// Rewinds the decoder and switches it to another logical
    /// bitstream.
    pub fn reset_serial_number(&mut self, bitstream_serial_number: u32) {
        self.reset();
        self.bitstream_serial_number = bitstream_serial_number;
    }

    fn next_packet(&mut self, advance: bool) -> PacketOut<'_> {
        let queue = &self.lacing[self.lacing_returned..];

        match queue.first() {
            None => return PacketOut::NeedData,
            Some(Lace::Gap) => {
                if advance {
                    self.lacing_returned += 1;
                    self.packet_number += 1;
                }
                return PacketOut::Gap;
            }
            Some(Lace::Segment { .. }) => {}
        }

        let mut length = 0_usize;
        let mut count = 0_usize;
        let mut granule = -1_i64;
        let mut complete = false;

        for lace in queue {
            match *lace {
                Lace::Gap => break,
                Lace::Segment {
                    value,
                    granule_position,
                } => {
                    length += usize::from(value);
                    count += 1;
                    if value < 255 {
                        granule = granule_position;
                        complete = true;
                        break;
                    }
                }
            }
        }

        if !complete {
            return PacketOut::NeedData;
        }

        let start = self.body_returned;
        let drains_queue = self.lacing_returned + count == self.lacing.len();
        let packet_number = self.packet_number;
        let is_bos = self.bos_pending;
        let is_eos = self.eos && drains_queue;

        if advance {
            self.lacing_returned += count;
            self.body_returned += length;
            self.packet_number += 1;
            self.bos_pending = false;
        }

        PacketOut::Packet(Packet {
            data: &self.body[start..start + length],
            bitstream_serial_number: self.bitstream_serial_number,
            granule_position: granule,
            packet_number,
            is_bos,
            is_eos,
        })
    }

    fn drop_partial_packet(&mut self) {
        let mut dropped = 0_usize;
        while matches!(
            self.lacing.last(),
            Some(Lace::Segment { value: 255, .. })
        ) {
            self.lacing.pop();
            dropped += 255;
        }
        self.body.truncate(self.body.len() - dropped);
    }
}
