//! Event-driven traversal of a node graph.
//!
//! The visitor callback sequence (enter-node, fields, exit-node, with shared
//! back-references reported as `use_shared`) is the interface the binary
//! encoder and any external tag/attribute printer consume identically. A node
//! reached through more than one parent is entered once, at its first
//! occurrence in traversal order; every later occurrence is a `use_shared`.

use std::collections::HashSet;

use crate::field::FieldValue;
use crate::node::{Node, NodeRef};

#[allow(unused_variables)]
pub trait GraphVisitor {
    fn enter_node(&mut self, node: &NodeRef) {}

    /// A field holding a plain (non-node) value.
    fn field(&mut self, name: &str, value: &FieldValue) {}

    /// Opens a node-valued field; the children arrive as nested
    /// `enter_node`/`use_shared` events before the matching `exit_field`.
    fn enter_field(&mut self, name: &str) {}

    fn exit_field(&mut self, name: &str) {}

    /// A back-reference to a node already entered earlier in the walk.
    fn use_shared(&mut self, node: &NodeRef) {}

    fn exit_node(&mut self, node: &NodeRef) {}
}

/// Walks the roots in order, firing visitor events depth-first.
pub fn walk(roots: &[NodeRef], visitor: &mut dyn GraphVisitor) {
    let mut seen: HashSet<*const Node> = HashSet::new();
    for root in roots {
        walk_node(root, &mut seen, visitor);
    }
}

fn walk_node(node: &NodeRef, seen: &mut HashSet<*const Node>, visitor: &mut dyn GraphVisitor) {
    if !seen.insert(NodeRef::as_ptr(node)) {
        visitor.use_shared(node);
        return;
    }
    visitor.enter_node(node);
    for (name, value) in &node.fields {
        match value {
            FieldValue::Node(child) => {
                visitor.enter_field(name);
                walk_node(child, seen, visitor);
                visitor.exit_field(name);
            }
            FieldValue::NodeArray(children) => {
                visitor.enter_field(name);
                for child in children {
                    walk_node(child, seen, visitor);
                }
                visitor.exit_field(name);
            }
            _ => visitor.field(name, value),
        }
    }
    visitor.exit_node(node);
}
