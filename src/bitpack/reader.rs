use std::marker::PhantomData;

use crate::bitpack::{BitOrder, BitpackError};

/// Reads variable-width fields back out of a packed byte buffer.
///
/// Reading or advancing past the end of the buffer puts the reader
/// into a sticky overread state: every following read fails with
/// [`BitpackError::Overread`]. Peeking with [`look`](Self::look) never
/// trips the state.
#[derive(Clone, Debug)]
pub struct BitReader<'a, O: BitOrder> {
    buffer: &'a [u8],
    cursor: usize,
    overread: bool,
    _order: PhantomData<O>,
}

impl<'a, O: BitOrder> BitReader<'a, O> {
    /// Creates a `BitReader` over the given buffer.
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            cursor: 0,
            overread: false,
            _order: PhantomData,
        }
    }

    /// Peeks at the next `bits` bits without advancing, `bits` in
    /// `0..=32`.
    pub fn look(&self, bits: usize) -> Result<u32, BitpackError> {
        if bits > 32 {
            return Err(BitpackError::InvalidWidth(bits));
        }
        if self.overread || self.cursor + bits > 8 * self.buffer.len() {
            return Err(BitpackError::Overread);
        }

        Ok(O::unpack(self.buffer, self.cursor, bits))
    }

    /// Reads the next `bits` bits, `bits` in `0..=32`.
    pub fn read(&mut self, bits: usize) -> Result<u32, BitpackError> {
        match self.look(bits) {
            Ok(value) => {
                self.cursor += bits;
                Ok(value)
            }
            Err(BitpackError::Overread) => {
                self.overread = true;
                Err(BitpackError::Overread)
            }
            Err(err) => Err(err),
        }
    }

    /// Advances the cursor by `bits` bits without reading them.
    ///
    /// Advancing past the end of the buffer trips the sticky overread
    /// state.
    pub fn advance(&mut self, bits: usize) {
        self.cursor += bits;
        if self.cursor > 8 * self.buffer.len() {
            self.overread = true;
        }
    }

    /// Number of bytes consumed so far, rounded up.
    pub fn bytes(&self) -> usize {
        (self.cursor + 7) / 8
    }

    /// Number of bits consumed so far.
    pub fn bits(&self) -> usize {
        self.cursor
    }
}
