//! Stream header: spec version plus the three bit widths that size every
//! opcode-stream unit for the lifetime of the stream.

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// Version tag of the wire format. Streams with any other version are
/// rejected before decoding begins.
pub const SPEC_VERSION: u8 = 1;

/// Width of the opcode at the start of every node/use unit.
pub const OP_BITS: u32 = 2;

/// Opcode for a node declaration or a list terminator.
pub const OP_NODE: u32 = 0;
/// Opcode for a shared-instance back-reference.
pub const OP_USE: u32 = 1;

/// Bytes needed to buffer a value of the given declared bit width.
///
/// Widths above 32 bits are a hard header error; nothing on the wire is wider
/// than a u32.
pub fn byte_width(bits: u8) -> Result<usize> {
    match bits {
        1..=8 => Ok(1),
        9..=16 => Ok(2),
        17..=24 => Ok(3),
        25..=32 => Ok(4),
        _ => Err(Error::BadHeader(format!(
            "bit width {} outside the allowed 1-32 range",
            bits
        ))),
    }
}

fn unit_bytes(bits: u32) -> usize {
    (bits as usize + 7) / 8
}

/// The three bit widths declared in a stream header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// Bits per node-type index.
    pub node_bits: u8,
    /// Bits per shared-name index.
    pub shared_bits: u8,
    /// Bits per field slot.
    pub field_bits: u8,
}

impl Header {
    pub fn new(node_bits: u8, shared_bits: u8, field_bits: u8) -> Result<Self> {
        byte_width(node_bits)?;
        byte_width(shared_bits)?;
        byte_width(field_bits)?;
        Ok(Header {
            node_bits,
            shared_bits,
            field_bits,
        })
    }

    pub fn read(r: &mut impl Read) -> Result<Self> {
        let version = r.read_u8().map_err(|e| Error::at_step(e, "header"))?;
        if version != SPEC_VERSION {
            return Err(Error::BadHeader(format!(
                "spec version {} not supported (expected {})",
                version, SPEC_VERSION
            )));
        }
        let node_bits = r.read_u8().map_err(|e| Error::at_step(e, "header"))?;
        let shared_bits = r.read_u8().map_err(|e| Error::at_step(e, "header"))?;
        let field_bits = r.read_u8().map_err(|e| Error::at_step(e, "header"))?;
        Header::new(node_bits, shared_bits, field_bits)
    }

    pub fn write(&self, w: &mut impl Write) -> Result<()> {
        w.write_u8(SPEC_VERSION)?;
        w.write_u8(self.node_bits)?;
        w.write_u8(self.shared_bits)?;
        w.write_u8(self.field_bits)?;
        Ok(())
    }

    /// Byte sizes of the fixed unit buffers derived from these widths.
    ///
    /// Node and USE units share one size (a USE is padded out to the node
    /// unit), so the decoder never needs pushback after reading an opcode.
    pub fn unit_sizes(&self) -> UnitSizes {
        UnitSizes {
            node_unit: unit_bytes(OP_BITS + self.node_bits as u32 + self.shared_bits as u32),
            field_unit: unit_bytes(self.field_bits as u32),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnitSizes {
    pub node_unit: usize,
    pub field_unit: usize,
}
