use log::{debug, warn};

use crate::page::{self, Page};
use crate::{
    parse_u32_le, ReadError, CRC32_RANGE, PAGE_MARKER, SEGMENT_COUNT_INDEX, SEGMENT_TABLE_INDEX,
    VERSION_INDEX,
};

/// Result of a single [`SyncState::page_seek`] call.
#[derive(Debug)]
pub enum PageSeek<'a> {
    /// A validated page was extracted from the head of the buffer.
    Page(Page<'a>),
    /// The buffered bytes do not hold a complete page yet.
    NeedData,
    /// The given number of bytes could not be part of a page and were
    /// discarded while scanning for a page boundary.
    Skipped(usize),
}

#[derive(Clone, Copy, Debug)]
enum Scan {
    Page {
        start: usize,
        header_len: usize,
        body_len: usize,
    },
    NeedData,
    Skipped(usize),
}

/// Synchronizes a raw byte stream on page boundaries.
///
/// Bytes enter through [`buffer`](Self::buffer) / [`wrote`](Self::wrote)
/// in chunks of any size; validated pages come out of
/// [`page_out`](Self::page_out) or [`page_seek`](Self::page_seek).
/// Corrupted or truncated input never gets stuck: the engine discards
/// bytes until the next plausible page boundary and reports how much
/// was lost.
#[derive(Clone, Debug, Default)]
pub struct SyncState {
    data: Vec<u8>,
    fill: usize,
    returned: usize,
    unsynced: bool,
    header_bytes: usize,
    body_bytes: usize,
}

impl SyncState {
    /// Creates a new `SyncState`.
    pub fn new() -> Self {
        Default::default()
    }

    /// Exposes at least `size` writable bytes at the buffer tail.
    ///
    /// Bytes already returned as pages are compacted away first; the
    /// buffer grows when the remaining space is still too small. The
    /// write must be committed with [`wrote`](Self::wrote) before it
    /// becomes visible.
    pub fn buffer(&mut self, size: usize) -> &mut [u8] {
        if self.returned != 0 {
            self.data.copy_within(self.returned..self.fill, 0);
            self.fill -= self.returned;
            self.returned = 0;
        }

        if self.data.len() < self.fill + size {
            // An extra page of slack so steady feeding settles into a
            // stable allocation.
            let new_size = self.fill + size + 4096;
            debug!("grow sync buffer to {} bytes", new_size);
            self.data.resize(new_size, 0);
        }

        &mut self.data[self.fill..]
    }

    /// Commits `bytes` bytes written into the slice handed out by
    /// [`buffer`](Self::buffer).
    pub fn wrote(&mut self, bytes: usize) -> Result<(), ReadError> {
        let reserved = self.data.len() - self.fill;
        if bytes > reserved {
            return Err(ReadError::BufferOverrun {
                wrote: bytes,
                reserved,
            });
        }

        self.fill += bytes;
        Ok(())
    }

    /// Tries to extract the page at the head of the buffer.
    ///
    /// Unlike [`page_out`](Self::page_out) this surfaces every skipped
    /// byte, so callers can report stream discontinuities.
    pub fn page_seek(&mut self) -> PageSeek<'_> {
        match self.scan_page() {
            Scan::Page {
                start,
                header_len,
                body_len,
            } => PageSeek::Page(self.page_view(start, header_len, body_len)),
            Scan::NeedData => PageSeek::NeedData,
            Scan::Skipped(skipped) => PageSeek::Skipped(skipped),
        }
    }

    /// Extracts the next validated page, silently skipping over any
    /// bytes that cannot be part of one.
    ///
    /// Returns `None` when more input is needed.
    pub fn page_out(&mut self) -> Option<Page<'_>> {
        loop {
            match self.scan_page() {
                Scan::Page {
                    start,
                    header_len,
                    body_len,
                } => return Some(self.page_view(start, header_len, body_len)),
                Scan::NeedData => return None,
                Scan::Skipped(_) => {}
            }
        }
    }

    /// Drops all buffered bytes and synchronization state, keeping the
    /// allocation.
    pub fn reset(&mut self) {
        self.fill = 0;
        self.returned = 0;
        self.unsynced = false;
        self.header_bytes = 0;
        self.body_bytes = 0;
    }

    /// Drops all state and releases the buffer storage.
    pub fn clear(&mut self) {
        self.reset();
        self.data = Vec::new();
    }

    fn page_view(&self, start: usize, header_len: usize, body_len: usize) -> Page<'_> {
        let body_start = start + header_len;
        Page::new(
            &self.data[start..body_start],
            &self.data[body_start..body_start + body_len],
        )
    }

    fn scan_page(&mut self) -> Scan {
        loop {
            if self.unsynced {
                let span = &self.data[self.returned..self.fill];
                match find_marker(span) {
                    Some(0) => self.unsynced = false,
                    Some(offset) => {
                        self.returned += offset;
                        return Scan::Skipped(offset);
                    }
                    None => {
                        // Up to 3 bytes at the tail may be the start of
                        // a capture pattern split across chunks.
                        let skip = span.len().saturating_sub(3);
                        if skip == 0 {
                            return Scan::NeedData;
                        }
                        self.returned += skip;
                        return Scan::Skipped(skip);
                    }
                }
            }

            let head = self.returned;
            let available = self.fill - head;

            if self.header_bytes == 0 {
                if available < 27 {
                    return Scan::NeedData;
                }

                if self.data[head..head + 4] != PAGE_MARKER[..] {
                    debug!("lost capture, scanning for the next page boundary");
                    self.unsynced = true;
                    continue;
                }

                if self.data[head + VERSION_INDEX] != 0 {
                    return self.lose_sync();
                }

                let segments = usize::from(self.data[head + SEGMENT_COUNT_INDEX]);
                if available < 27 + segments {
                    return Scan::NeedData;
                }

                let table = &self.data[head + SEGMENT_TABLE_INDEX..head + 27 + segments];
                self.body_bytes = table.iter().map(|lace| usize::from(*lace)).sum();
                self.header_bytes = 27 + segments;
            }

            if available < self.header_bytes + self.body_bytes {
                return Scan::NeedData;
            }

            let header_len = self.header_bytes;
            let body_len = self.body_bytes;
            let header = &self.data[head..head + header_len];
            let body = &self.data[head + header_len..head + header_len + body_len];

            let stored = parse_u32_le(&header[CRC32_RANGE]);
            let computed = page::checksum(header, body);
            if computed != stored {
                warn!(
                    "page checksum mismatch: expected {:#010x}, got {:#010x}",
                    stored, computed
                );
                return self.lose_sync();
            }

            self.header_bytes = 0;
            self.body_bytes = 0;
            self.returned += header_len + body_len;

            return Scan::Page {
                start: head,
                header_len,
                body_len,
            };
        }
    }

    /// A header that cannot be a page at the buffer head: give up on
    /// this position and rescan one byte further.
    fn lose_sync(&mut self) -> Scan {
        self.header_bytes = 0;
        self.body_bytes = 0;
        self.unsynced = true;
        self.returned += 1;
        Scan::Skipped(1)
    }
}

fn find_marker(span: &[u8]) -> Option<usize> {
    span.windows(4).position(|window| window == &PAGE_MARKER)
}
