//! The in-memory node-graph model and the external node-type registry
//! interface the codec instantiates nodes through.

use std::collections::HashMap;
use std::rc::Rc;

use crate::field::{FieldType, FieldValue};

/// A shared handle to a node. One node instance may be reachable from several
/// parents; the instance is dropped when its last owner releases it.
pub type NodeRef = Rc<Node>;

/// One scene-graph node: a type name, an optional shared-instance (DEF) name,
/// and an ordered list of named field values.
///
/// Field order is significant: the encoder assigns wire slots in the order
/// fields appear here.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Node {
    pub type_name: String,
    pub name: Option<String>,
    pub fields: Vec<(String, FieldValue)>,
}

impl Node {
    pub fn new(type_name: impl Into<String>) -> Self {
        Node {
            type_name: type_name.into(),
            name: None,
            fields: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn into_ref(self) -> NodeRef {
        Rc::new(self)
    }
}

/// The node-type / field-metadata registry the codec consumes as a black box.
///
/// Implementations must be read-only for the duration of a decode and must
/// tolerate concurrent reads from independent decodes.
pub trait NodeRegistry {
    /// Creates an empty node of the named type, or `None` when the type is
    /// unknown.
    fn instantiate(&self, type_name: &str) -> Option<Node>;

    /// Declared type of a field, or `None` when the field is not declared on
    /// that node type.
    fn field_type(&self, type_name: &str, field_name: &str) -> Option<FieldType>;

    /// Declared position of a field within its node type.
    fn field_index(&self, type_name: &str, field_name: &str) -> Option<usize>;
}

/// A plain `HashMap`-backed registry, sufficient for hosts that declare their
/// node vocabulary up front.
#[derive(Clone, Debug, Default)]
pub struct BasicRegistry {
    types: HashMap<String, Vec<(String, FieldType)>>,
}

impl BasicRegistry {
    pub fn new() -> Self {
        BasicRegistry::default()
    }

    /// Declares a node type and its field set. Redeclaring a type replaces
    /// the earlier declaration.
    pub fn register_type(&mut self, type_name: &str, fields: &[(&str, FieldType)]) {
        self.types.insert(
            type_name.to_string(),
            fields
                .iter()
                .map(|(n, t)| (n.to_string(), *t))
                .collect(),
        );
    }
}

impl NodeRegistry for BasicRegistry {
    fn instantiate(&self, type_name: &str) -> Option<Node> {
        if self.types.contains_key(type_name) {
            Some(Node::new(type_name))
        } else {
            None
        }
    }

    fn field_type(&self, type_name: &str, field_name: &str) -> Option<FieldType> {
        self.types
            .get(type_name)?
            .iter()
            .find(|(n, _)| n == field_name)
            .map(|(_, t)| *t)
    }

    fn field_index(&self, type_name: &str, field_name: &str) -> Option<usize> {
        self.types
            .get(type_name)?
            .iter()
            .position(|(n, _)| n == field_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> BasicRegistry {
        let mut reg = BasicRegistry::new();
        reg.register_type(
            "Transform",
            &[
                ("translation", FieldType::Vec3),
                ("children", FieldType::NodeArray),
            ],
        );
        reg
    }

    #[test]
    fn instantiate_known_type() {
        let reg = registry();
        let node = reg.instantiate("Transform").unwrap();
        assert_eq!(node.type_name, "Transform");
        assert!(node.fields.is_empty());
        assert!(reg.instantiate("Bogus").is_none());
    }

    #[test]
    fn field_lookup() {
        let reg = registry();
        assert_eq!(
            reg.field_type("Transform", "translation"),
            Some(FieldType::Vec3)
        );
        assert_eq!(reg.field_index("Transform", "children"), Some(1));
        assert_eq!(reg.field_type("Transform", "scale"), None);
    }

    #[test]
    fn builder_keeps_field_order() {
        let node = Node::new("Transform")
            .with_name("root")
            .with_field("translation", [1.0f32, 2.0, 3.0])
            .with_field("visible", true);
        assert_eq!(node.fields[0].0, "translation");
        assert_eq!(node.fields[1].0, "visible");
        assert_eq!(node.field("visible"), Some(&FieldValue::Bool(true)));
    }
}
