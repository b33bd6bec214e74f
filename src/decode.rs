//! Decoding: header, symbol dictionaries, then the recursive opcode walk
//! that rebuilds the node graph.

use std::collections::HashMap;
use std::io::{self, Read};
use std::rc::Rc;

use log::{debug, trace};

use crate::bits::BitUnpacker;
use crate::compress::NodeCompressorRegistry;
use crate::dict::{FieldTable, NameTable};
use crate::error::{Error, Result};
use crate::field::{FieldType, FieldValue};
use crate::fieldcodec::FieldCodecRegistry;
use crate::header::{Header, UnitSizes, OP_BITS, OP_NODE, OP_USE};
use crate::node::{NodeRef, NodeRegistry};

/// Decodes a complete stream with the default field codecs and no node-level
/// compressors.
pub fn decode_stream<R: Read>(r: R, registry: &dyn NodeRegistry) -> Result<Vec<NodeRef>> {
    Decoder::new(r, registry).decode()
}

/// A configurable stream decoder.
///
/// All decode state (cursor position, dictionaries, shared-instance table,
/// parse context) is owned by the session; independent decoders may run
/// concurrently as long as the node registry tolerates concurrent reads.
pub struct Decoder<'a, R: Read> {
    r: R,
    registry: &'a dyn NodeRegistry,
    codecs: FieldCodecRegistry,
    compressors: NodeCompressorRegistry,
    method: u8,
}

impl<'a, R: Read> Decoder<'a, R> {
    pub fn new(r: R, registry: &'a dyn NodeRegistry) -> Self {
        Decoder {
            r,
            registry,
            codecs: FieldCodecRegistry::default(),
            compressors: NodeCompressorRegistry::new(),
            method: 0,
        }
    }

    /// Replaces the default field codec bindings.
    pub fn with_field_codecs(mut self, codecs: FieldCodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    /// Enables node-level compressors under the given active method. The
    /// method and registrations must match what the encoder used.
    pub fn with_node_compressors(
        mut self,
        compressors: NodeCompressorRegistry,
        method: u8,
    ) -> Self {
        self.compressors = compressors;
        self.method = method;
        self
    }

    /// Runs the decode to completion, returning the top-level node list.
    ///
    /// Any error aborts the decode; no partial graph is returned.
    pub fn decode(self) -> Result<Vec<NodeRef>> {
        let Decoder {
            mut r,
            registry,
            codecs,
            compressors,
            method,
        } = self;
        let header = Header::read(&mut r)?;
        let sizes = header.unit_sizes();
        let node_names = NameTable::read(&mut r, "node-type dictionary")?;
        let shared_names = NameTable::read(&mut r, "shared-name dictionary")?;
        let fields = FieldTable::read(&mut r)?;
        debug!(
            "stream header: {} node types, {} shared names, widths {}/{}/{}",
            node_names.len(),
            shared_names.len(),
            header.node_bits,
            header.shared_bits,
            header.field_bits
        );
        let mut session = Session {
            r,
            registry,
            codecs: &codecs,
            compressors: &compressors,
            method,
            header,
            sizes,
            node_names,
            shared_names,
            fields,
            shared: HashMap::new(),
            context: Vec::new(),
        };
        session.run()
    }
}

/// Fills `buf` from the stream. A clean end-of-stream before the first byte
/// is `Ok(false)` when `allow_eof` is set; ending anywhere else inside the
/// buffer is a truncated stream.
fn fill(
    r: &mut impl Read,
    buf: &mut [u8],
    step: &'static str,
    allow_eof: bool,
) -> Result<bool> {
    let mut n = 0;
    while n < buf.len() {
        match r.read(&mut buf[n..]) {
            Ok(0) => {
                return if n == 0 && allow_eof {
                    Ok(false)
                } else {
                    Err(Error::Truncated { step })
                }
            }
            Ok(got) => n += got,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(true)
}

struct Session<'a, R: Read> {
    r: R,
    registry: &'a dyn NodeRegistry,
    codecs: &'a FieldCodecRegistry,
    compressors: &'a NodeCompressorRegistry,
    method: u8,
    header: Header,
    sizes: UnitSizes,
    node_names: NameTable,
    shared_names: NameTable,
    fields: FieldTable,
    /// Most recent define per shared-name index; later defines shadow.
    shared: HashMap<u32, NodeRef>,
    /// Node-type indices of the currently open nodes, innermost last.
    context: Vec<u32>,
}

impl<'a, R: Read> Session<'a, R> {
    fn run(&mut self) -> Result<Vec<NodeRef>> {
        let mut roots = Vec::new();
        loop {
            let mut buf = vec![0u8; self.sizes.node_unit];
            if !fill(&mut self.r, &mut buf, "node unit", true)? {
                break;
            }
            let mut bits = BitUnpacker::new(&buf);
            match bits.unpack(OP_BITS) {
                OP_NODE => match self.read_node(&mut bits)? {
                    Some(node) => roots.push(node),
                    None => break,
                },
                OP_USE => {
                    return Err(Error::MalformedStream(
                        "USE opcode at top level".to_string(),
                    ))
                }
                op => {
                    return Err(Error::MalformedStream(format!(
                        "reserved opcode {} at top level",
                        op
                    )))
                }
            }
        }
        Ok(roots)
    }

    /// Decodes one node from an already-filled node unit. `None` is the list
    /// terminator (node-type index 0).
    fn read_node(&mut self, bits: &mut BitUnpacker) -> Result<Option<NodeRef>> {
        let type_index = bits.unpack(self.header.node_bits as u32);
        if type_index == 0 {
            return Ok(None);
        }
        let shared_index = bits.unpack(self.header.shared_bits as u32);
        let type_name = self
            .node_names
            .require("node-type dictionary", type_index)?
            .to_string();
        let mut node = self
            .registry
            .instantiate(&type_name)
            .ok_or_else(|| Error::UnknownNodeType(type_name.clone()))?;
        if shared_index != 0 {
            let def_name = self
                .shared_names
                .require("shared-name dictionary", shared_index)?;
            if !def_name.is_empty() {
                node.name = Some(def_name.to_string());
            }
        }
        trace!(
            "node {} (type index {}, shared index {})",
            type_name,
            type_index,
            shared_index
        );
        self.context.push(type_index);
        let compressors = self.compressors;
        let result = if let Some(c) = compressors.get(type_index, self.method) {
            c.decode(&mut self.r, &mut node)
        } else {
            self.read_fields(&mut node)
        };
        self.context.pop();
        result?;
        let node = Rc::new(node);
        if shared_index != 0 {
            self.shared.insert(shared_index, node.clone());
        }
        Ok(Some(node))
    }

    /// Decodes field units until the slot-0 sentinel closes the node.
    fn read_fields(&mut self, node: &mut crate::Node) -> Result<()> {
        let type_index = match self.context.last() {
            Some(i) => *i,
            None => {
                return Err(Error::MalformedStream(
                    "field unit outside any open node".to_string(),
                ))
            }
        };
        loop {
            let mut buf = vec![0u8; self.sizes.field_unit];
            fill(&mut self.r, &mut buf, "field unit", false)?;
            let slot = BitUnpacker::new(&buf).unpack(self.header.field_bits as u32);
            if slot == 0 {
                return Ok(());
            }
            let field_name = self.fields.name(type_index, slot)?.to_string();
            let ty = self
                .registry
                .field_type(&node.type_name, &field_name)
                .ok_or_else(|| Error::UnknownField {
                    node_type: node.type_name.clone(),
                    field: field_name.clone(),
                })?;
            trace!("field {} ({})", field_name, ty);
            let value = match ty {
                FieldType::Node => FieldValue::Node(self.read_child()?),
                FieldType::NodeArray => {
                    let mut children = Vec::new();
                    while let Some(child) = self.read_child_or_end()? {
                        children.push(child);
                    }
                    FieldValue::NodeArray(children)
                }
                _ => {
                    let codecs = self.codecs;
                    codecs.decode(&mut self.r, ty)?
                }
            };
            node.fields.push((field_name, value));
        }
    }

    /// One child in a single-child field: a nested node or a USE.
    fn read_child(&mut self) -> Result<NodeRef> {
        let mut buf = vec![0u8; self.sizes.node_unit];
        fill(&mut self.r, &mut buf, "child node unit", false)?;
        let mut bits = BitUnpacker::new(&buf);
        match bits.unpack(OP_BITS) {
            OP_USE => self.resolve_use(&mut bits),
            OP_NODE => self.read_node(&mut bits)?.ok_or_else(|| {
                Error::MalformedStream("list terminator in a single-child field".to_string())
            }),
            op => Err(Error::MalformedStream(format!(
                "opcode {} while expecting a child node",
                op
            ))),
        }
    }

    /// One element of a multi-child field; `None` is the list terminator.
    fn read_child_or_end(&mut self) -> Result<Option<NodeRef>> {
        let mut buf = vec![0u8; self.sizes.node_unit];
        fill(&mut self.r, &mut buf, "child node unit", false)?;
        let mut bits = BitUnpacker::new(&buf);
        match bits.unpack(OP_BITS) {
            OP_USE => self.resolve_use(&mut bits).map(Some),
            OP_NODE => self.read_node(&mut bits),
            op => Err(Error::MalformedStream(format!(
                "opcode {} while expecting a child node",
                op
            ))),
        }
    }

    fn resolve_use(&mut self, bits: &mut BitUnpacker) -> Result<NodeRef> {
        let shared_index = bits.unpack(self.header.shared_bits as u32);
        trace!("use shared index {}", shared_index);
        self.shared
            .get(&shared_index)
            .cloned()
            .ok_or(Error::DanglingUse(shared_index))
    }
}
