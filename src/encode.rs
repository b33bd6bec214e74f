//! Encoding: a symbol-collection walk over the graph, then header,
//! dictionaries, and the opcode stream.
//!
//! Symbol indices are assigned on first occurrence in traversal order, so
//! the dictionaries are fully known before any opcode is emitted and a
//! define always precedes every use of the same shared instance.

use std::collections::{HashMap, HashSet};
use std::io::Write;

use log::debug;

use crate::bits::BitPacker;
use crate::compress::{EncodeOptions, NodeCompressorRegistry};
use crate::dict::{FieldTable, NameTable};
use crate::error::{Error, Result};
use crate::field::FieldValue;
use crate::fieldcodec::FieldCodecRegistry;
use crate::header::{Header, UnitSizes, OP_BITS, OP_NODE, OP_USE};
use crate::node::{Node, NodeRef, NodeRegistry};
use crate::visitor::{self, GraphVisitor};

/// Encodes a graph with default options, codecs, and no node-level
/// compressors.
pub fn encode_stream<W: Write>(
    w: W,
    roots: &[NodeRef],
    registry: &dyn NodeRegistry,
) -> Result<()> {
    Encoder::new(w, registry).encode(roots)
}

/// Convenience wrapper producing the encoded stream as a byte vector.
pub fn encode_to_vec(roots: &[NodeRef], registry: &dyn NodeRegistry) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_stream(&mut buf, roots, registry)?;
    Ok(buf)
}

/// A configurable stream encoder, the mirror of [`crate::Decoder`].
pub struct Encoder<'a, W: Write> {
    w: W,
    registry: &'a dyn NodeRegistry,
    codecs: FieldCodecRegistry,
    compressors: NodeCompressorRegistry,
    options: EncodeOptions,
}

impl<'a, W: Write> Encoder<'a, W> {
    pub fn new(w: W, registry: &'a dyn NodeRegistry) -> Self {
        Encoder {
            w,
            registry,
            codecs: FieldCodecRegistry::default(),
            compressors: NodeCompressorRegistry::new(),
            options: EncodeOptions::default(),
        }
    }

    pub fn with_field_codecs(mut self, codecs: FieldCodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn with_node_compressors(mut self, compressors: NodeCompressorRegistry) -> Self {
        self.compressors = compressors;
        self
    }

    pub fn with_options(mut self, options: EncodeOptions) -> Self {
        self.options = options;
        self
    }

    /// Walks the graph, writes the header and dictionaries, then the opcode
    /// stream, ending with a top-level list terminator.
    pub fn encode(self, roots: &[NodeRef]) -> Result<()> {
        let Encoder {
            mut w,
            registry,
            codecs,
            compressors,
            options,
        } = self;

        let mut syms = Symbols::default();
        visitor::walk(roots, &mut syms);
        let header = Header::new(
            bits_for(syms.node_types.len()).max(options.min_node_bits),
            bits_for(syms.shared_names.len()).max(options.min_shared_bits),
            bits_for(syms.max_field_count()).max(options.min_field_bits),
        )?;
        let sizes = header.unit_sizes();
        debug!(
            "encoding {} roots: {} node types, {} shared names, widths {}/{}/{}",
            roots.len(),
            syms.node_types.len(),
            syms.shared_names.len(),
            header.node_bits,
            header.shared_bits,
            header.field_bits
        );

        header.write(&mut w)?;
        syms.node_types.write(&mut w)?;
        syms.shared_names.write(&mut w)?;
        let mut field_table = FieldTable::new();
        for fields in &syms.fields_by_type {
            field_table.push_type(fields.clone());
        }
        field_table.write(&mut w)?;

        let mut session = Session {
            w,
            registry,
            codecs: &codecs,
            compressors: &compressors,
            method: options.method,
            header,
            sizes,
            syms,
            emitted: HashSet::new(),
        };
        for root in roots {
            session.emit_node(root, true)?;
        }
        session.emit_terminator()
    }
}

/// Bits needed to hold a 1-based index up to `count`, with index 0 reserved.
fn bits_for(count: usize) -> u8 {
    (32 - (count as u32).leading_zeros()).max(1) as u8
}

/// Pass 1: interns node-type, shared-instance and field names in traversal
/// order and maps shared instances (named, or reachable from more than one
/// parent) to shared-name indices.
#[derive(Default)]
struct Symbols {
    node_types: NameTable,
    type_index: HashMap<String, u32>,
    shared_names: NameTable,
    def_by_ptr: HashMap<*const Node, u32>,
    fields_by_type: Vec<Vec<String>>,
    slot_by_type: Vec<HashMap<String, u32>>,
    type_stack: Vec<u32>,
}

impl Symbols {
    fn max_field_count(&self) -> usize {
        self.fields_by_type.iter().map(Vec::len).max().unwrap_or(0)
    }

    fn define(&mut self, node: &NodeRef) {
        let ptr = NodeRef::as_ptr(node);
        if self.def_by_ptr.contains_key(&ptr) {
            return;
        }
        // Unnamed shared instances get an empty dictionary entry, which
        // decodes back to an anonymous node.
        let index = self.shared_names.push(node.name.as_deref().unwrap_or(""));
        self.def_by_ptr.insert(ptr, index);
    }

    fn intern_field(&mut self, name: &str) {
        let t = match self.type_stack.last() {
            Some(t) => (*t - 1) as usize,
            None => return,
        };
        let slots = &mut self.slot_by_type[t];
        if !slots.contains_key(name) {
            let list = &mut self.fields_by_type[t];
            list.push(name.to_string());
            slots.insert(name.to_string(), list.len() as u32);
        }
    }

    fn slot(&self, type_index: u32, name: &str) -> Option<u32> {
        self.slot_by_type
            .get((type_index - 1) as usize)?
            .get(name)
            .copied()
    }
}

impl GraphVisitor for Symbols {
    fn enter_node(&mut self, node: &NodeRef) {
        let index = match self.type_index.get(&node.type_name) {
            Some(i) => *i,
            None => {
                let i = self.node_types.push(&node.type_name);
                self.type_index.insert(node.type_name.clone(), i);
                self.fields_by_type.push(Vec::new());
                self.slot_by_type.push(HashMap::new());
                i
            }
        };
        self.type_stack.push(index);
        if node.name.is_some() {
            self.define(node);
        }
    }

    fn field(&mut self, name: &str, _value: &FieldValue) {
        self.intern_field(name);
    }

    fn enter_field(&mut self, name: &str) {
        self.intern_field(name);
    }

    fn use_shared(&mut self, node: &NodeRef) {
        self.define(node);
    }

    fn exit_node(&mut self, _node: &NodeRef) {
        self.type_stack.pop();
    }
}

/// Pass 2: the opcode emitter.
struct Session<'a, W: Write> {
    w: W,
    registry: &'a dyn NodeRegistry,
    codecs: &'a FieldCodecRegistry,
    compressors: &'a NodeCompressorRegistry,
    method: u8,
    header: Header,
    sizes: UnitSizes,
    syms: Symbols,
    emitted: HashSet<*const Node>,
}

impl<'a, W: Write> Session<'a, W> {
    fn emit_node(&mut self, node: &NodeRef, top: bool) -> Result<()> {
        let ptr = NodeRef::as_ptr(node);
        if !self.emitted.insert(ptr) {
            if top {
                return Err(Error::BadEncode(
                    "a shared instance cannot repeat at top level".to_string(),
                ));
            }
            let def = self
                .syms
                .def_by_ptr
                .get(&ptr)
                .copied()
                .ok_or_else(|| Error::BadEncode("graph changed between passes".to_string()))?;
            let mut p = BitPacker::new(self.sizes.node_unit);
            p.pack(OP_USE, OP_BITS);
            p.pack(def, self.header.shared_bits as u32);
            self.w.write_all(&p.into_bytes())?;
            return Ok(());
        }

        if self.registry.instantiate(&node.type_name).is_none() {
            return Err(Error::UnknownNodeType(node.type_name.clone()));
        }
        let type_index = self
            .syms
            .type_index
            .get(&node.type_name)
            .copied()
            .ok_or_else(|| Error::BadEncode("graph changed between passes".to_string()))?;
        let def = self.syms.def_by_ptr.get(&ptr).copied().unwrap_or(0);
        let mut p = BitPacker::new(self.sizes.node_unit);
        p.pack(OP_NODE, OP_BITS);
        p.pack(type_index, self.header.node_bits as u32);
        p.pack(def, self.header.shared_bits as u32);
        self.w.write_all(&p.into_bytes())?;

        let compressors = self.compressors;
        if let Some(c) = compressors.get(type_index, self.method) {
            // Whole-node delegate: no field framing, no sentinel.
            return c.encode(&mut self.w, node);
        }

        for (name, value) in &node.fields {
            match self.registry.field_type(&node.type_name, name) {
                Some(declared) if declared == value.field_type() => {}
                Some(declared) => {
                    return Err(Error::BadEncode(format!(
                        "field \"{}\" on \"{}\" holds {} but is declared {}",
                        name,
                        node.type_name,
                        value.field_type(),
                        declared
                    )))
                }
                None => {
                    return Err(Error::UnknownField {
                        node_type: node.type_name.clone(),
                        field: name.clone(),
                    })
                }
            }
            let slot = self
                .syms
                .slot(type_index, name)
                .ok_or_else(|| Error::BadEncode("graph changed between passes".to_string()))?;
            let mut p = BitPacker::new(self.sizes.field_unit);
            p.pack(slot, self.header.field_bits as u32);
            self.w.write_all(&p.into_bytes())?;
            match value {
                FieldValue::Node(child) => self.emit_node(child, false)?,
                FieldValue::NodeArray(children) => {
                    for child in children {
                        self.emit_node(child, false)?;
                    }
                    self.emit_terminator()?;
                }
                _ => {
                    let codecs = self.codecs;
                    codecs.encode(&mut self.w, value)?;
                }
            }
        }
        // End-of-fields sentinel: slot 0.
        self.w.write_all(&vec![0u8; self.sizes.field_unit])?;
        Ok(())
    }

    /// A node unit with type index 0: ends a child list or the stream.
    fn emit_terminator(&mut self) -> Result<()> {
        self.w.write_all(&vec![0u8; self.sizes.node_unit])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{decode_stream, Decoder};
    use crate::field::FieldType;
    use crate::node::BasicRegistry;

    fn scene_registry() -> BasicRegistry {
        let mut reg = BasicRegistry::new();
        reg.register_type(
            "Transform",
            &[
                ("translation", FieldType::Vec3),
                ("rotation", FieldType::Rotation),
                ("children", FieldType::NodeArray),
            ],
        );
        reg.register_type(
            "Shape",
            &[
                ("geometry", FieldType::Node),
                ("visible", FieldType::Bool),
            ],
        );
        reg.register_type(
            "Mesh",
            &[
                ("points", FieldType::Vec3Array),
                ("indices", FieldType::Int32Array),
                ("label", FieldType::String),
            ],
        );
        reg
    }

    fn mesh() -> NodeRef {
        Node::new("Mesh")
            .with_field(
                "points",
                FieldValue::Vec3Array(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]),
            )
            .with_field("indices", FieldValue::Int32Array(vec![0, 1, 2]))
            .with_field("label", "tri")
            .into_ref()
    }

    #[test]
    fn round_trip_tree() {
        let reg = scene_registry();
        let shape = Node::new("Shape")
            .with_field("geometry", FieldValue::Node(mesh()))
            .with_field("visible", true)
            .into_ref();
        let root = Node::new("Transform")
            .with_field("translation", [1.0f32, 2.0, 3.0])
            .with_field("rotation", FieldValue::Rotation([0.0, 1.0, 0.0, 0.5]))
            .with_field("children", FieldValue::NodeArray(vec![shape]))
            .into_ref();
        let bytes = encode_to_vec(&[root.clone()], &reg).unwrap();
        let decoded = decode_stream(&bytes[..], &reg).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(*decoded[0], *root);
    }

    #[test]
    fn round_trip_empty_graph() {
        let reg = scene_registry();
        let bytes = encode_to_vec(&[], &reg).unwrap();
        assert!(decode_stream(&bytes[..], &reg).unwrap().is_empty());
    }

    #[test]
    fn round_trip_empty_arrays() {
        let reg = scene_registry();
        let root = Node::new("Mesh")
            .with_field("points", FieldValue::Vec3Array(vec![]))
            .with_field("indices", FieldValue::Int32Array(vec![]))
            .into_ref();
        let bytes = encode_to_vec(&[root.clone()], &reg).unwrap();
        let decoded = decode_stream(&bytes[..], &reg).unwrap();
        assert_eq!(*decoded[0], *root);
    }

    #[test]
    fn shared_child_decodes_to_one_instance() {
        let reg = scene_registry();
        let geom = mesh();
        let a = Node::new("Shape")
            .with_field("geometry", FieldValue::Node(geom.clone()))
            .into_ref();
        let b = Node::new("Shape")
            .with_field("geometry", FieldValue::Node(geom))
            .into_ref();
        let root = Node::new("Transform")
            .with_field("children", FieldValue::NodeArray(vec![a, b]))
            .into_ref();
        let bytes = encode_to_vec(&[root], &reg).unwrap();
        let decoded = decode_stream(&bytes[..], &reg).unwrap();
        let children = match decoded[0].field("children") {
            Some(FieldValue::NodeArray(c)) => c,
            other => panic!("unexpected children field: {:?}", other),
        };
        let geom_a = match children[0].field("geometry") {
            Some(FieldValue::Node(g)) => g,
            other => panic!("unexpected geometry field: {:?}", other),
        };
        let geom_b = match children[1].field("geometry") {
            Some(FieldValue::Node(g)) => g,
            other => panic!("unexpected geometry field: {:?}", other),
        };
        assert!(NodeRef::ptr_eq(geom_a, geom_b));
        // The shared instance was unnamed and stays unnamed.
        assert_eq!(geom_a.name, None);
    }

    #[test]
    fn named_node_keeps_name() {
        let reg = scene_registry();
        let root = Node::new("Transform")
            .with_name("root")
            .with_field("translation", [0.0f32, 0.0, 0.0])
            .into_ref();
        let bytes = encode_to_vec(&[root], &reg).unwrap();
        let decoded = decode_stream(&bytes[..], &reg).unwrap();
        assert_eq!(decoded[0].name.as_deref(), Some("root"));
    }

    #[test]
    fn scenario_stream_bytes() {
        // With widths padded to 4 bits, the encoder must produce exactly the
        // reference stream for one Transform with translation (1,2,3).
        let mut small = BasicRegistry::new();
        small.register_type("Transform", &[("translation", FieldType::Vec3)]);
        let root = Node::new("Transform")
            .with_field("translation", [1.0f32, 2.0, 3.0])
            .into_ref();
        let mut buf = Vec::new();
        Encoder::new(&mut buf, &small)
            .with_options(EncodeOptions {
                min_node_bits: 4,
                min_shared_bits: 4,
                min_field_bits: 4,
                ..EncodeOptions::default()
            })
            .encode(&[root])
            .unwrap();

        let mut expect = vec![1u8, 4, 4, 4];
        expect.extend_from_slice(&[0, 0, 0, 1]);
        expect.extend_from_slice(&[0, 9]);
        expect.extend_from_slice(b"Transform");
        expect.extend_from_slice(&[0, 0, 0, 0]);
        expect.extend_from_slice(&[0, 0, 0, 1]);
        expect.push(1);
        expect.extend_from_slice(&[0, 11]);
        expect.extend_from_slice(b"translation");
        expect.extend_from_slice(&[0x04, 0x00]);
        expect.push(0x10);
        for f in [1.0f32, 2.0, 3.0] {
            expect.extend_from_slice(&f.to_be_bytes());
        }
        expect.push(0x00);
        expect.extend_from_slice(&[0x00, 0x00]);
        assert_eq!(buf, expect);
    }

    #[test]
    fn dangling_use_is_detected() {
        // Encode a valid shared graph, then flip the USE index to an
        // undefined shared-name slot.
        let reg = scene_registry();
        let geom = mesh();
        let root = Node::new("Shape")
            .with_field("geometry", FieldValue::Node(geom.clone()))
            .into_ref();
        let second = Node::new("Shape")
            .with_field("geometry", FieldValue::Node(geom))
            .into_ref();
        let group = Node::new("Transform")
            .with_field("children", FieldValue::NodeArray(vec![root, second]))
            .into_ref();
        let mut bytes = encode_to_vec(&[group], &reg).unwrap();
        // The single USE unit is 1 byte (2+2+1 bits): opcode 01, index 1.
        let use_unit = bytes
            .iter()
            .position(|b| *b == 0b0110_0000)
            .expect("use unit present");
        bytes[use_unit] = 0b0100_0000; // USE(0), never defined
        let err = decode_stream(&bytes[..], &reg);
        assert!(matches!(err, Err(Error::DanglingUse(0))));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let reg = scene_registry();
        let root = Node::new("Transform")
            .with_field("translation", 1.5f32) // declared Vec3
            .into_ref();
        assert!(matches!(
            encode_to_vec(&[root], &reg),
            Err(Error::BadEncode(_))
        ));
    }

    #[test]
    fn undeclared_field_is_rejected() {
        let reg = scene_registry();
        let root = Node::new("Transform")
            .with_field("scale", [1.0f32, 1.0, 1.0])
            .into_ref();
        assert!(matches!(
            encode_to_vec(&[root], &reg),
            Err(Error::UnknownField { .. })
        ));
    }

    #[test]
    fn repeated_root_is_rejected() {
        let reg = scene_registry();
        let root = Node::new("Transform").into_ref();
        assert!(matches!(
            encode_to_vec(&[root.clone(), root], &reg),
            Err(Error::BadEncode(_))
        ));
    }

    #[test]
    fn minimal_widths_grow_with_dictionaries() {
        let reg = scene_registry();
        let root = Node::new("Transform")
            .with_field(
                "children",
                FieldValue::NodeArray(vec![
                    Node::new("Shape").with_field("visible", true).into_ref(),
                    Node::new("Mesh").with_field("label", "x").into_ref(),
                ]),
            )
            .into_ref();
        let bytes = encode_to_vec(&[root.clone()], &reg).unwrap();
        // 3 node types -> 2 bits, no shared names and at most one used
        // field per type -> 1 bit each.
        assert_eq!(&bytes[1..4], &[2, 1, 1]);
        let decoded = decode_stream(&bytes[..], &reg).unwrap();
        assert_eq!(*decoded[0], *root);
    }

    #[test]
    fn random_value_round_trips() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(0xf1e1d);
        let reg = scene_registry();
        for _ in 0..50 {
            let n = rng.gen_range(0..20);
            let points: Vec<[f32; 3]> = (0..n)
                .map(|_| [rng.gen(), rng.gen(), rng.gen()])
                .collect();
            let indices: Vec<i32> = (0..rng.gen_range(0..30)).map(|_| rng.gen()).collect();
            let root = Node::new("Mesh")
                .with_field("points", FieldValue::Vec3Array(points))
                .with_field("indices", FieldValue::Int32Array(indices))
                .into_ref();
            let bytes = encode_to_vec(&[root.clone()], &reg).unwrap();
            let decoded = decode_stream(&bytes[..], &reg).unwrap();
            assert_eq!(*decoded[0], *root);
        }
    }

    #[test]
    fn node_compressor_round_trip() {
        use crate::compress::NodeCompressor;
        use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
        use std::io::Read;
        use std::rc::Rc;

        /// Packs a Transform's translation jointly, skipping field framing.
        struct PackedTransform;
        impl NodeCompressor for PackedTransform {
            fn supports(&self, _node_index: u32, method: u8) -> bool {
                method == 1
            }
            fn encode(&self, w: &mut dyn Write, node: &Node) -> Result<()> {
                let t = match node.field("translation") {
                    Some(FieldValue::Vec3(t)) => *t,
                    _ => [0.0; 3],
                };
                for v in t {
                    w.write_f32::<BigEndian>(v)?;
                }
                Ok(())
            }
            fn decode(&self, r: &mut dyn Read, node: &mut Node) -> Result<()> {
                let mut t = [0.0f32; 3];
                for v in &mut t {
                    *v = r
                        .read_f32::<BigEndian>()
                        .map_err(|e| Error::at_step(e, "packed transform"))?;
                }
                node.fields
                    .push(("translation".to_string(), FieldValue::Vec3(t)));
                Ok(())
            }
        }

        let reg = scene_registry();
        let root = Node::new("Transform")
            .with_field("translation", [4.0f32, 5.0, 6.0])
            .into_ref();

        let mut encode_comp = NodeCompressorRegistry::new();
        encode_comp.register(1, 1, Rc::new(PackedTransform));
        let mut bytes = Vec::new();
        Encoder::new(&mut bytes, &reg)
            .with_node_compressors(encode_comp)
            .with_options(EncodeOptions::with_method(1))
            .encode(&[root.clone()])
            .unwrap();

        let mut decode_comp = NodeCompressorRegistry::new();
        decode_comp.register(1, 1, Rc::new(PackedTransform));
        let decoded = Decoder::new(&bytes[..], &reg)
            .with_node_compressors(decode_comp, 1)
            .decode()
            .unwrap();
        assert_eq!(*decoded[0], *root);
    }
}
