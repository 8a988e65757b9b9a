//! Data model types for LYB.
//!
//! This module contains the schema context the codec resolves against and
//! the data trees it encodes:
//! - Schema (modules, schema nodes, value types)
//! - Data nodes (term, inner, any, opaque)
//! - Builders (ergonomic construction)

pub mod builder;
pub mod data;
pub mod schema;

pub use builder::TreeBuilder;
pub use data::{
    AnyNode, AnyValue, AnyValueType, Attribute, DataNode, InnerNode, Metadata, OpaqueNode,
    PrefixMapping, TermNode, ValueFormat,
};
pub use schema::{
    Context, DataType, Module, ModuleId, NodeId, NodeKind, SchemaAnchor, SchemaNode, Stored,
};
