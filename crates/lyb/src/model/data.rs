//! Data tree types.
//!
//! A data tree is a list of top-level [`DataNode`]s. Schema-backed nodes
//! reference their [`NodeId`] in a [`Context`](crate::model::Context);
//! opaque nodes carry their own names.

use crate::model::{ModuleId, NodeId};

/// Format of an opaque value and of its prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueFormat {
    Xml = 0,
    Json = 1,
}

impl ValueFormat {
    /// Creates a ValueFormat from its wire representation.
    pub fn from_u8(v: u8) -> Option<ValueFormat> {
        match v {
            0 => Some(ValueFormat::Xml),
            1 => Some(ValueFormat::Json),
            _ => None,
        }
    }
}

/// Prefix to module namespace binding used by an opaque value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixMapping {
    pub prefix: String,
    pub module_ns: String,
}

/// Metadata annotation instance on a schema-backed node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Module defining the annotation.
    pub module: ModuleId,
    pub name: String,
    pub value: String,
}

/// Attribute on an opaque node. Never resolved against the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub prefix: String,
    pub module_ns: String,
    pub name: String,
    pub value: String,
    pub format: ValueFormat,
    pub value_prefixes: Vec<PrefixMapping>,
}

/// Leaf or leaf-list instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermNode {
    pub schema: NodeId,
    pub value: String,
    pub metadata: Vec<Metadata>,
}

/// Container, list, rpc, action or notification instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerNode {
    pub schema: NodeId,
    pub children: Vec<DataNode>,
    pub metadata: Vec<Metadata>,
}

/// Value of an anydata or anyxml node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyValue {
    /// Data tree; travels as a nested LYB document.
    Tree(Vec<DataNode>),
    String(String),
    Xml(String),
    Json(String),
    /// LYB document kept as raw bytes.
    Lyb(Vec<u8>),
}

/// Wire tag of an anydata value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AnyValueType {
    String = 1,
    Xml = 2,
    Json = 3,
    Lyb = 4,
}

impl AnyValueType {
    /// Creates an AnyValueType from its wire representation.
    pub fn from_u8(v: u8) -> Option<AnyValueType> {
        match v {
            1 => Some(AnyValueType::String),
            2 => Some(AnyValueType::Xml),
            3 => Some(AnyValueType::Json),
            4 => Some(AnyValueType::Lyb),
            _ => None,
        }
    }
}

impl AnyValue {
    /// Returns the wire tag. Trees are sent as LYB.
    pub fn value_type(&self) -> AnyValueType {
        match self {
            AnyValue::String(_) => AnyValueType::String,
            AnyValue::Xml(_) => AnyValueType::Xml,
            AnyValue::Json(_) => AnyValueType::Json,
            AnyValue::Tree(_) | AnyValue::Lyb(_) => AnyValueType::Lyb,
        }
    }
}

/// Anydata or anyxml instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnyNode {
    pub schema: NodeId,
    pub value: AnyValue,
    pub metadata: Vec<Metadata>,
}

/// Node without a resolved schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueNode {
    pub name: String,
    pub prefix: String,
    /// Module name (JSON) or namespace (XML).
    pub module_ns: String,
    pub value: String,
    pub format: ValueFormat,
    pub value_prefixes: Vec<PrefixMapping>,
    pub attributes: Vec<Attribute>,
    pub children: Vec<DataNode>,
}

impl OpaqueNode {
    /// Creates an opaque node with an empty value and no children.
    pub fn new(name: impl Into<String>, module_ns: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: String::new(),
            module_ns: module_ns.into(),
            value: String::new(),
            format: ValueFormat::Json,
            value_prefixes: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// A node of a data tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataNode {
    Term(TermNode),
    Inner(InnerNode),
    Any(AnyNode),
    Opaque(OpaqueNode),
}

impl DataNode {
    /// Returns the schema node, `None` for opaque nodes.
    pub fn schema(&self) -> Option<NodeId> {
        match self {
            DataNode::Term(n) => Some(n.schema),
            DataNode::Inner(n) => Some(n.schema),
            DataNode::Any(n) => Some(n.schema),
            DataNode::Opaque(_) => None,
        }
    }

    /// Returns the child nodes.
    pub fn children(&self) -> &[DataNode] {
        match self {
            DataNode::Inner(n) => &n.children,
            DataNode::Opaque(n) => &n.children,
            DataNode::Term(_) | DataNode::Any(_) => &[],
        }
    }

    /// Returns the metadata of a schema-backed node.
    pub fn metadata(&self) -> &[Metadata] {
        match self {
            DataNode::Term(n) => &n.metadata,
            DataNode::Inner(n) => &n.metadata,
            DataNode::Any(n) => &n.metadata,
            DataNode::Opaque(_) => &[],
        }
    }

    /// Returns the value of a term or opaque node.
    pub fn value(&self) -> Option<&str> {
        match self {
            DataNode::Term(n) => Some(&n.value),
            DataNode::Opaque(n) => Some(&n.value),
            DataNode::Inner(_) | DataNode::Any(_) => None,
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, DataNode::Opaque(_))
    }
}
