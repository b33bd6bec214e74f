//! Bit-level cursors for the fixed-size unit buffers of the opcode stream.
//!
//! Values are packed most-significant-bit first within each byte, and buffers
//! are consumed byte by byte. Unit buffer sizes are always precomputed from
//! the header bit widths, so running a cursor past the end of its buffer is a
//! caller contract violation and panics rather than returning an error.

/// Writes fixed-width unsigned integers into a unit buffer, high bit first.
///
/// The buffer is created at its final size; any bits not written stay zero,
/// which is what pads the tail of a unit out to its byte boundary.
pub struct BitPacker {
    buf: Vec<u8>,
    bit: usize,
}

impl BitPacker {
    /// Creates a packer over a zeroed unit buffer of exactly `len` bytes.
    pub fn new(len: usize) -> Self {
        BitPacker {
            buf: vec![0; len],
            bit: 0,
        }
    }

    /// Packs the low `n_bits` bits of `value`, most significant first.
    ///
    /// # Panics
    ///
    /// Panics if `n_bits` is outside 1-32 or the buffer has fewer than
    /// `n_bits` bits of room left.
    pub fn pack(&mut self, value: u32, n_bits: u32) {
        assert!((1..=32).contains(&n_bits), "bit count {} outside 1-32", n_bits);
        assert!(
            self.bit + n_bits as usize <= self.buf.len() * 8,
            "unit buffer overflow"
        );
        for i in (0..n_bits).rev() {
            if (value >> i) & 1 != 0 {
                self.buf[self.bit / 8] |= 1 << (7 - self.bit % 8);
            }
            self.bit += 1;
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads fixed-width unsigned integers out of a unit buffer, high bit first.
pub struct BitUnpacker<'a> {
    buf: &'a [u8],
    bit: usize,
}

impl<'a> BitUnpacker<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        BitUnpacker { buf, bit: 0 }
    }

    /// Reads the next `n_bits` bits, advancing the cursor.
    ///
    /// # Panics
    ///
    /// Panics if `n_bits` is outside 1-32 or the buffer has fewer than
    /// `n_bits` bits remaining.
    pub fn unpack(&mut self, n_bits: u32) -> u32 {
        assert!((1..=32).contains(&n_bits), "bit count {} outside 1-32", n_bits);
        assert!(
            self.bit + n_bits as usize <= self.buf.len() * 8,
            "unit buffer overrun"
        );
        let mut value = 0u32;
        for _ in 0..n_bits {
            let b = (self.buf[self.bit / 8] >> (7 - self.bit % 8)) & 1;
            value = (value << 1) | b as u32;
            self.bit += 1;
        }
        value
    }
}
