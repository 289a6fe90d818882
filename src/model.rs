//! The decoded field tree.
//!
//! A [`FieldNode`] mirrors one [`FieldDescriptor`](crate::FieldDescriptor) of the template it was
//! decoded against: scalars hold a [`Value`], composites, groups and group items hold their
//! children in template order.

use crate::path::FieldPath;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The value held by a scalar node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    /// Signed integers (and enums over a signed base).
    Int(i64),
    /// Unsigned integers (and enums over an unsigned base).
    UInt(u64),
    Bool(bool),
    /// Raw string bytes, in the resource's text encoding (Mac Roman unless configured otherwise).
    Text(Vec<u8>),
}

impl Value {
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Int(v) => Some(i128::from(*v)),
            Value::UInt(v) => Some(i128::from(*v)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Text(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "signed integer",
            Value::UInt(_) => "unsigned integer",
            Value::Bool(_) => "boolean",
            Value::Text(_) => "string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Text(bytes) => write!(f, "{:?}", String::from_utf8_lossy(bytes)),
        }
    }
}

/// Parameterless type tag of a node, for the presentation layer to pick a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    FixedString,
    PString,
    Boolean,
    Enum,
    Composite,
    Group,
    /// One repetition of a group.
    Item,
}

impl TypeTag {
    pub fn is_scalar(self) -> bool {
        !matches!(self, TypeTag::Composite | TypeTag::Group | TypeTag::Item)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeTag::Int8 => "int8",
            TypeTag::UInt8 => "uint8",
            TypeTag::Int16 => "int16",
            TypeTag::UInt16 => "uint16",
            TypeTag::Int32 => "int32",
            TypeTag::UInt32 => "uint32",
            TypeTag::Int64 => "int64",
            TypeTag::UInt64 => "uint64",
            TypeTag::FixedString => "fixed_string",
            TypeTag::PString => "pstring",
            TypeTag::Boolean => "boolean",
            TypeTag::Enum => "enum",
            TypeTag::Composite => "composite",
            TypeTag::Group => "group",
            TypeTag::Item => "item",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeContent {
    Scalar {
        value: Value,
        /// Symbolic name of an enum value, when the template's name table has one.
        label: Option<String>,
        /// Original bit pattern of a decoded boolean. Cleared once the value is edited.
        raw: Option<u16>,
    },
    Children(Vec<FieldNode>),
}

/// A node of the decoded field tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldNode {
    pub(crate) name: String,
    pub(crate) tag: TypeTag,
    pub(crate) offset: usize,
    pub(crate) length: usize,
    pub(crate) content: NodeContent,
}

impl FieldNode {
    pub(crate) fn scalar(name: &str, tag: TypeTag, value: Value, label: Option<String>) -> Self {
        FieldNode {
            name: name.to_owned(),
            tag,
            offset: 0,
            length: 0,
            content: NodeContent::Scalar {
                value,
                label,
                raw: None,
            },
        }
    }

    pub(crate) fn branch(name: &str, tag: TypeTag, children: Vec<FieldNode>) -> Self {
        FieldNode {
            name: name.to_owned(),
            tag,
            offset: 0,
            length: 0,
            content: NodeContent::Children(children),
        }
    }

    pub(crate) fn at(mut self, offset: usize, length: usize) -> Self {
        self.offset = offset;
        self.length = length;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Byte offset of this node within the buffer it was decoded from (or would be encoded to,
    /// after edits).
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of bytes this node occupies when encoded.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn content(&self) -> &NodeContent {
        &self.content
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.content {
            NodeContent::Scalar { value, .. } => Some(value),
            NodeContent::Children(_) => None,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match &self.content {
            NodeContent::Scalar { label, .. } => label.as_deref(),
            NodeContent::Children(_) => None,
        }
    }

    pub fn children(&self) -> &[FieldNode] {
        match &self.content {
            NodeContent::Children(children) => children,
            NodeContent::Scalar { .. } => &[],
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<FieldNode>> {
        match &mut self.content {
            NodeContent::Children(children) => Some(children),
            NodeContent::Scalar { .. } => None,
        }
    }

    /// Finds a direct child by name.
    pub fn child(&self, name: &str) -> Option<&FieldNode> {
        self.children().iter().find(|c| c.name == name)
    }
}

/// The data-binding view of one node: what a presentation layer needs to render a control.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldView<'a> {
    pub path: FieldPath,
    pub tag: TypeTag,
    pub value: Option<&'a Value>,
    pub label: Option<&'a str>,
    pub offset: usize,
    pub length: usize,
}
