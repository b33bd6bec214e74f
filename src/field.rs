//! Field type tags and the tagged union of field values.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::node::NodeRef;

/// The closed set of field value shapes the codec moves across the wire.
///
/// Tuple types fix their per-element arity (2, 3 or 4 floats); the array
/// variant of a tuple type counts tuples, not scalars. `Node` and `NodeArray`
/// fields hold nested child nodes and are walked by the node codec rather
/// than dispatched to a field strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Bool,
    Int32,
    Float,
    Double,
    Time,
    String,
    Vec2,
    Vec3,
    Color,
    ColorRgba,
    Rotation,
    BoolArray,
    Int32Array,
    FloatArray,
    DoubleArray,
    TimeArray,
    StringArray,
    Vec2Array,
    Vec3Array,
    ColorArray,
    ColorRgbaArray,
    RotationArray,
    Node,
    NodeArray,
}

impl FieldType {
    pub const ALL: [FieldType; 24] = [
        FieldType::Bool,
        FieldType::Int32,
        FieldType::Float,
        FieldType::Double,
        FieldType::Time,
        FieldType::String,
        FieldType::Vec2,
        FieldType::Vec3,
        FieldType::Color,
        FieldType::ColorRgba,
        FieldType::Rotation,
        FieldType::BoolArray,
        FieldType::Int32Array,
        FieldType::FloatArray,
        FieldType::DoubleArray,
        FieldType::TimeArray,
        FieldType::StringArray,
        FieldType::Vec2Array,
        FieldType::Vec3Array,
        FieldType::ColorArray,
        FieldType::ColorRgbaArray,
        FieldType::RotationArray,
        FieldType::Node,
        FieldType::NodeArray,
    ];

    /// True for the "multiple value" variants, whose wire form carries an
    /// explicit element count before the payload.
    pub fn is_array(self) -> bool {
        matches!(
            self,
            FieldType::BoolArray
                | FieldType::Int32Array
                | FieldType::FloatArray
                | FieldType::DoubleArray
                | FieldType::TimeArray
                | FieldType::StringArray
                | FieldType::Vec2Array
                | FieldType::Vec3Array
                | FieldType::ColorArray
                | FieldType::ColorRgbaArray
                | FieldType::RotationArray
                | FieldType::NodeArray
        )
    }

    /// Per-element float count for the tuple families.
    pub fn tuple_arity(self) -> Option<usize> {
        match self {
            FieldType::Vec2 | FieldType::Vec2Array => Some(2),
            FieldType::Vec3
            | FieldType::Color
            | FieldType::Vec3Array
            | FieldType::ColorArray => Some(3),
            FieldType::ColorRgba
            | FieldType::Rotation
            | FieldType::ColorRgbaArray
            | FieldType::RotationArray => Some(4),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FieldType::Bool => "Bool",
            FieldType::Int32 => "Int32",
            FieldType::Float => "Float",
            FieldType::Double => "Double",
            FieldType::Time => "Time",
            FieldType::String => "String",
            FieldType::Vec2 => "Vec2",
            FieldType::Vec3 => "Vec3",
            FieldType::Color => "Color",
            FieldType::ColorRgba => "ColorRgba",
            FieldType::Rotation => "Rotation",
            FieldType::BoolArray => "BoolArray",
            FieldType::Int32Array => "Int32Array",
            FieldType::FloatArray => "FloatArray",
            FieldType::DoubleArray => "DoubleArray",
            FieldType::TimeArray => "TimeArray",
            FieldType::StringArray => "StringArray",
            FieldType::Vec2Array => "Vec2Array",
            FieldType::Vec3Array => "Vec3Array",
            FieldType::ColorArray => "ColorArray",
            FieldType::ColorRgbaArray => "ColorRgbaArray",
            FieldType::RotationArray => "RotationArray",
            FieldType::Node => "Node",
            FieldType::NodeArray => "NodeArray",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded field value. Every variant corresponds 1:1 with a [`FieldType`]
/// tag.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Int32(i32),
    Float(f32),
    Double(f64),
    Time(f64),
    String(String),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Color([f32; 3]),
    ColorRgba([f32; 4]),
    Rotation([f32; 4]),
    BoolArray(Vec<bool>),
    Int32Array(Vec<i32>),
    FloatArray(Vec<f32>),
    DoubleArray(Vec<f64>),
    TimeArray(Vec<f64>),
    StringArray(Vec<String>),
    Vec2Array(Vec<[f32; 2]>),
    Vec3Array(Vec<[f32; 3]>),
    ColorArray(Vec<[f32; 3]>),
    ColorRgbaArray(Vec<[f32; 4]>),
    RotationArray(Vec<[f32; 4]>),
    Node(NodeRef),
    NodeArray(Vec<NodeRef>),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Bool(_) => FieldType::Bool,
            FieldValue::Int32(_) => FieldType::Int32,
            FieldValue::Float(_) => FieldType::Float,
            FieldValue::Double(_) => FieldType::Double,
            FieldValue::Time(_) => FieldType::Time,
            FieldValue::String(_) => FieldType::String,
            FieldValue::Vec2(_) => FieldType::Vec2,
            FieldValue::Vec3(_) => FieldType::Vec3,
            FieldValue::Color(_) => FieldType::Color,
            FieldValue::ColorRgba(_) => FieldType::ColorRgba,
            FieldValue::Rotation(_) => FieldType::Rotation,
            FieldValue::BoolArray(_) => FieldType::BoolArray,
            FieldValue::Int32Array(_) => FieldType::Int32Array,
            FieldValue::FloatArray(_) => FieldType::FloatArray,
            FieldValue::DoubleArray(_) => FieldType::DoubleArray,
            FieldValue::TimeArray(_) => FieldType::TimeArray,
            FieldValue::StringArray(_) => FieldType::StringArray,
            FieldValue::Vec2Array(_) => FieldType::Vec2Array,
            FieldValue::Vec3Array(_) => FieldType::Vec3Array,
            FieldValue::ColorArray(_) => FieldType::ColorArray,
            FieldValue::ColorRgbaArray(_) => FieldType::ColorRgbaArray,
            FieldValue::RotationArray(_) => FieldType::RotationArray,
            FieldValue::Node(_) => FieldType::Node,
            FieldValue::NodeArray(_) => FieldType::NodeArray,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int32(v)
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Double(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<[f32; 2]> for FieldValue {
    fn from(v: [f32; 2]) -> Self {
        FieldValue::Vec2(v)
    }
}

impl From<[f32; 3]> for FieldValue {
    fn from(v: [f32; 3]) -> Self {
        FieldValue::Vec3(v)
    }
}

impl From<NodeRef> for FieldValue {
    fn from(v: NodeRef) -> Self {
        FieldValue::Node(v)
    }
}
