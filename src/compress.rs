//! Node-level compression extension point and encoder settings.
//!
//! A [`NodeCompressor`] takes over the whole field section of one node type,
//! letting aggressive or lossy modes encode several fields jointly. The
//! generic per-field path stays the default; a compressor only runs when the
//! active method is nonzero and a binding exists for the node's type index.
//! Both sides of a stream must agree on the method and registered
//! compressors out of band.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::rc::Rc;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::node::Node;

/// A whole-node compression strategy.
pub trait NodeCompressor {
    /// Whether this strategy can handle the given (node-type index, method)
    /// pair.
    fn supports(&self, node_index: u32, method: u8) -> bool;

    /// Encodes the complete field section of `node`. The generic field-slot
    /// framing (including the end-of-fields sentinel) is not written around
    /// this payload; the strategy owns the layout.
    fn encode(&self, w: &mut dyn Write, node: &Node) -> Result<()>;

    /// Decodes the complete field section into `node`, which arrives with
    /// its type and shared name already set and no fields.
    fn decode(&self, r: &mut dyn Read, node: &mut Node) -> Result<()>;
}

/// Bindings of node-type index to compression strategy, gated the same way
/// as field codec registrations.
#[derive(Default)]
pub struct NodeCompressorRegistry {
    bindings: HashMap<u32, (u8, Rc<dyn NodeCompressor>)>,
}

impl NodeCompressorRegistry {
    pub fn new() -> Self {
        NodeCompressorRegistry::default()
    }

    /// Binds `compressor` for the node type at `node_index` under `method`.
    /// An unsupported pair is reported and ignored.
    pub fn register(&mut self, node_index: u32, method: u8, compressor: Rc<dyn NodeCompressor>) {
        if !compressor.supports(node_index, method) {
            warn!(
                "node compressor rejected registration for node {}/{}, keeping prior binding",
                node_index, method
            );
            return;
        }
        self.bindings.insert(node_index, (method, compressor));
    }

    /// The strategy to use for a node type under the active method, if any.
    pub fn get(&self, node_index: u32, method: u8) -> Option<&dyn NodeCompressor> {
        match self.bindings.get(&node_index) {
            Some((m, c)) if *m == method && method != 0 => Some(c.as_ref()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Encoder settings.
///
/// The minimum widths let a writer pad the header bit widths above what the
/// collected symbol counts require, e.g. to keep streams from different
/// exports unit-compatible for diffing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncodeOptions {
    /// Active compression method. 0 selects the generic per-field path for
    /// every node.
    pub method: u8,
    pub min_node_bits: u8,
    pub min_shared_bits: u8,
    pub min_field_bits: u8,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions {
            method: 0,
            min_node_bits: 1,
            min_shared_bits: 1,
            min_field_bits: 1,
        }
    }
}

impl EncodeOptions {
    pub fn with_method(method: u8) -> Self {
        EncodeOptions {
            method,
            ..EncodeOptions::default()
        }
    }
}
