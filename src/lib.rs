//! scene-pack compresses a hierarchical scene graph - a tree of typed nodes
//! with named, strongly-typed fields - into a compact binary stream, and
//! reconstructs it. The wire form is a bit-packed opcode stream preceded by
//! three symbol dictionaries: node-type names, shared-instance names, and
//! per-node-type field names.
//!
//! The codec does not interpret field semantics; it only moves typed values
//! between the in-memory graph model and the byte stream. It provides:
//!
//! - A cursor ([`bits`]) reading and writing fixed-width unsigned integers at
//!   arbitrary bit offsets, most-significant-bit first.
//! - Symbol dictionaries built once per stream, with index 0 reserved as the
//!   "none / list terminator" sentinel throughout.
//! - A pluggable per-field-type compression layer ([`FieldCodecRegistry`]):
//!   strategies declare which (type, method) pairs they support, and the
//!   default method-0 strategy covers every scalar, tuple, string and array
//!   field type with straight big-endian IEEE encoding.
//! - A recursive node codec that resolves shared instances: a node written
//!   with a shared name (DEF) is registered during decode, and later USE
//!   back-references bind the *same* instance rather than a copy.
//! - An optional whole-node compression extension point
//!   ([`NodeCompressorRegistry`]) for modes that encode several fields of a
//!   node type jointly.
//!
//! Node vocabulary is external: the codec instantiates nodes and resolves
//! declared field types through the [`NodeRegistry`] trait. A decoded graph
//! can be fed to any consumer of the [`visitor::GraphVisitor`] callback
//! sequence, e.g. a tag/attribute printer.
//!
//! # Example
//!
//! ```
//! use scene_pack::{
//!     decode_stream, encode_to_vec, BasicRegistry, FieldType, FieldValue, Node,
//! };
//!
//! let mut registry = BasicRegistry::new();
//! registry.register_type("Transform", &[("translation", FieldType::Vec3)]);
//!
//! let root = Node::new("Transform")
//!     .with_field("translation", [1.0f32, 2.0, 3.0])
//!     .into_ref();
//! let bytes = encode_to_vec(&[root.clone()], &registry).unwrap();
//! let decoded = decode_stream(&bytes[..], &registry).unwrap();
//! assert_eq!(*decoded[0], *root);
//! ```
//!
//! Decoding is single-pass and stateful; every piece of session state (bit
//! cursor, dictionaries, shared-instance table, parse context) is owned per
//! decode, so independent streams may be decoded concurrently. A failed
//! decode returns no partial graph.

pub mod bits;
pub mod visitor;

mod compress;
mod decode;
mod dict;
mod encode;
mod error;
mod field;
mod fieldcodec;
mod header;
mod node;

pub use self::compress::{EncodeOptions, NodeCompressor, NodeCompressorRegistry};
pub use self::decode::{decode_stream, Decoder};
pub use self::dict::{FieldTable, NameTable};
pub use self::encode::{encode_stream, encode_to_vec, Encoder};
pub use self::error::{Error, Result};
pub use self::field::{FieldType, FieldValue};
pub use self::fieldcodec::{FieldCodec, FieldCodecRegistry, IeeeCodec};
pub use self::header::{byte_width, Header, SPEC_VERSION};
pub use self::node::{BasicRegistry, Node, NodeRef, NodeRegistry};
