//! Symbol dictionaries: the node-type and shared-name string tables, and the
//! per-node-type field-name table.
//!
//! All three are populated exactly once per stream, right after the header.
//! Indices on the wire are 1-based; index 0 is never populated and stands for
//! "none" (anonymous instance) or "list terminator" depending on the caller.

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// Upper bound on dictionary entry counts, to keep a corrupt count field from
/// driving a huge allocation before any entry fails to parse.
const MAX_DICT_ENTRIES: u32 = 1 << 20;

pub(crate) fn read_utf(r: &mut (impl Read + ?Sized), step: &'static str) -> Result<String> {
    let len = r
        .read_u16::<BigEndian>()
        .map_err(|e| Error::at_step(e, step))? as usize;
    let mut buf = vec![0; len];
    r.read_exact(&mut buf).map_err(|e| Error::at_step(e, step))?;
    String::from_utf8(buf)
        .map_err(|_| Error::MalformedStream(format!("invalid UTF-8 in {}", step)))
}

pub(crate) fn write_utf(w: &mut (impl Write + ?Sized), s: &str) -> Result<()> {
    if s.len() > u16::MAX as usize {
        return Err(Error::BadEncode(format!(
            "string of {} bytes exceeds the u16 length prefix",
            s.len()
        )));
    }
    w.write_u16::<BigEndian>(s.len() as u16)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn read_count(r: &mut impl Read, step: &'static str) -> Result<u32> {
    let count = r
        .read_u32::<BigEndian>()
        .map_err(|e| Error::at_step(e, step))?;
    if count > MAX_DICT_ENTRIES {
        return Err(Error::MalformedStream(format!(
            "{} declares {} entries, above the {} limit",
            step, count, MAX_DICT_ENTRIES
        )));
    }
    Ok(count)
}

/// A 1-indexed string table. Index 0 is reserved and always resolves to
/// `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NameTable {
    names: Vec<String>,
}

impl NameTable {
    pub fn new() -> Self {
        NameTable::default()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Appends a name, returning its 1-based wire index.
    pub fn push(&mut self, name: &str) -> u32 {
        self.names.push(name.to_string());
        self.names.len() as u32
    }

    /// Resolves a wire index. Index 0 is `None`; an index past the populated
    /// range is a corrupt dictionary.
    pub fn get(&self, table: &'static str, index: u32) -> Result<Option<&str>> {
        if index == 0 {
            return Ok(None);
        }
        match self.names.get(index as usize - 1) {
            Some(s) => Ok(Some(s)),
            None => Err(Error::DictCorrupt {
                table,
                index,
                len: self.names.len(),
            }),
        }
    }

    /// Like [`get`](NameTable::get), for call sites where index 0 is already
    /// ruled out and the entry must exist.
    pub fn require(&self, table: &'static str, index: u32) -> Result<&str> {
        self.get(table, index)?.ok_or(Error::DictCorrupt {
            table,
            index,
            len: self.names.len(),
        })
    }

    pub fn read(r: &mut impl Read, step: &'static str) -> Result<Self> {
        let count = read_count(r, step)?;
        let mut names = Vec::with_capacity(count as usize);
        for _ in 0..count {
            names.push(read_utf(r, step)?);
        }
        Ok(NameTable { names })
    }

    pub fn write(&self, w: &mut impl Write) -> Result<()> {
        w.write_u32::<BigEndian>(self.names.len() as u32)?;
        for name in &self.names {
            write_utf(w, name)?;
        }
        Ok(())
    }
}

/// Field-name lists per node type, indexed by the 1-based node-type index.
/// Slot numbers are 1-based on the wire and 0-based in the stored lists.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldTable {
    by_type: Vec<Vec<String>>,
}

impl FieldTable {
    pub fn new() -> Self {
        FieldTable::default()
    }

    /// Appends the field list for the next node-type index.
    pub fn push_type(&mut self, fields: Vec<String>) {
        self.by_type.push(fields);
    }

    /// Resolves a wire field slot for the given open node type. Both indices
    /// are 1-based; 0 for either is out of range here (the slot-0 sentinel is
    /// handled before lookup).
    pub fn name(&self, node_type: u32, slot: u32) -> Result<&str> {
        let fields = (node_type as usize)
            .checked_sub(1)
            .and_then(|i| self.by_type.get(i))
            .ok_or(Error::DictCorrupt {
                table: "field-name dictionary",
                index: node_type,
                len: self.by_type.len(),
            })?;
        (slot as usize)
            .checked_sub(1)
            .and_then(|i| fields.get(i))
            .map(|s| s.as_str())
            .ok_or(Error::DictCorrupt {
                table: "field-name list",
                index: slot,
                len: fields.len(),
            })
    }

    pub fn read(r: &mut impl Read) -> Result<Self> {
        let step = "field-name dictionary";
        let count = read_count(r, step)?;
        let mut by_type = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let fields = r.read_u8().map_err(|e| Error::at_step(e, step))?;
            let mut names = Vec::with_capacity(fields as usize);
            for _ in 0..fields {
                names.push(read_utf(r, step)?);
            }
            by_type.push(names);
        }
        Ok(FieldTable { by_type })
    }

    pub fn write(&self, w: &mut impl Write) -> Result<()> {
        w.write_u32::<BigEndian>(self.by_type.len() as u32)?;
        for fields in &self.by_type {
            if fields.len() > u8::MAX as usize {
                return Err(Error::BadEncode(format!(
                    "node type declares {} fields, above the 255 limit",
                    fields.len()
                )));
            }
            w.write_u8(fields.len() as u8)?;
            for name in fields {
                write_utf(w, name)?;
            }
        }
        Ok(())
    }
}
