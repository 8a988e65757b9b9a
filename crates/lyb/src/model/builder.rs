//! Builder API for ergonomic data tree construction.
//!
//! Names are resolved against a [`Context`] while building. The first
//! failure is recorded and reported by [`TreeBuilder::build`].
//!
//! # Example
//!
//! ```rust
//! use lyb::model::{Context, DataType, TreeBuilder};
//!
//! let mut ctx = Context::new();
//! let m = ctx.add_module("example", None).unwrap();
//! let top = ctx.add_container(m, None, "top").unwrap();
//! ctx.add_leaf(m, Some(top), "name", DataType::String).unwrap();
//!
//! let tree = TreeBuilder::new(&ctx)
//!     .container("example", "top", |c| c
//!         .leaf("example", "name", "Alice")
//!     )
//!     .build()
//!     .unwrap();
//! assert_eq!(tree.len(), 1);
//! ```

use crate::error::SchemaError;
use crate::model::{
    AnyNode, AnyValue, Context, DataNode, InnerNode, Metadata, NodeId, NodeKind, OpaqueNode,
    SchemaAnchor, TermNode,
};

/// Builder for a list of sibling data nodes.
///
/// The same type builds the top level and, through closures, the children
/// of inner nodes.
#[derive(Debug, Clone)]
pub struct TreeBuilder<'c> {
    ctx: &'c Context,
    parent: Option<NodeId>,
    nodes: Vec<DataNode>,
    error: Option<SchemaError>,
}

impl<'c> TreeBuilder<'c> {
    /// Creates a builder for top-level nodes.
    pub fn new(ctx: &'c Context) -> Self {
        Self::under(ctx, None)
    }

    fn under(ctx: &'c Context, parent: Option<NodeId>) -> Self {
        Self {
            ctx,
            parent,
            nodes: Vec::new(),
            error: None,
        }
    }

    fn fail(&mut self, error: SchemaError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Resolves a schema node among the current siblings.
    fn resolve(&self, module: &str, name: &str, expected: &'static str, accept: fn(NodeKind) -> bool) -> Result<NodeId, SchemaError> {
        let module_id = self
            .ctx
            .find_module(module, None)
            .ok_or_else(|| SchemaError::UnknownModule {
                name: module.to_string(),
            })?;
        let anchor = match self.parent {
            Some(p) => SchemaAnchor::Node(p),
            None => SchemaAnchor::Module(module_id),
        };
        let id = self
            .ctx
            .find_child(anchor, module_id, name)
            .ok_or_else(|| SchemaError::UnknownNode {
                path: match self.parent {
                    Some(p) => format!("{}/{module}:{name}", self.ctx.node_path(p)),
                    None => format!("/{module}:{name}"),
                },
            })?;
        if !accept(self.ctx.node(id).kind()) {
            return Err(SchemaError::KindMismatch {
                node: self.ctx.node_path(id),
                expected,
            });
        }
        Ok(id)
    }

    fn term(mut self, module: &str, name: &str, value: String, kind: NodeKind) -> Self {
        if self.error.is_some() {
            return self;
        }
        let expected = kind.label();
        let accept: fn(NodeKind) -> bool = match kind {
            NodeKind::Leaf => |k| k == NodeKind::Leaf,
            _ => |k| k == NodeKind::LeafList,
        };
        let resolved = self
            .resolve(module, name, expected, accept)
            .and_then(|id| {
                let data_type = self.ctx.node(id).data_type().ok_or(SchemaError::KindMismatch {
                    node: self.ctx.node_path(id),
                    expected,
                })?;
                data_type
                    .store(&value)
                    .map_err(|reason| SchemaError::InvalidValue {
                        node: self.ctx.node_path(id),
                        value: value.clone(),
                        reason: reason.to_string(),
                    })?;
                Ok(id)
            });
        match resolved {
            Ok(schema) => self.nodes.push(DataNode::Term(TermNode {
                schema,
                value,
                metadata: Vec::new(),
            })),
            Err(e) => self.fail(e),
        }
        self
    }

    // =========================================================================
    // Terminal nodes
    // =========================================================================

    /// Adds a leaf with a value.
    pub fn leaf(self, module: &str, name: &str, value: impl Into<String>) -> Self {
        self.term(module, name, value.into(), NodeKind::Leaf)
    }

    /// Adds one leaf-list instance.
    pub fn leaf_list(self, module: &str, name: &str, value: impl Into<String>) -> Self {
        self.term(module, name, value.into(), NodeKind::LeafList)
    }

    /// Adds an anydata or anyxml node.
    pub fn any(mut self, module: &str, name: &str, value: AnyValue) -> Self {
        if self.error.is_some() {
            return self;
        }
        match self.resolve(module, name, "anydata", NodeKind::is_any) {
            Ok(schema) => self.nodes.push(DataNode::Any(AnyNode {
                schema,
                value,
                metadata: Vec::new(),
            })),
            Err(e) => self.fail(e),
        }
        self
    }

    // =========================================================================
    // Inner nodes
    // =========================================================================

    /// Adds a container whose children are built by `f`.
    pub fn container<F>(self, module: &str, name: &str, f: F) -> Self
    where
        F: FnOnce(TreeBuilder<'c>) -> TreeBuilder<'c>,
    {
        self.inner_kind(module, name, "container", |k| k == NodeKind::Container, f)
    }

    /// Adds one list instance whose children are built by `f`.
    pub fn list<F>(self, module: &str, name: &str, f: F) -> Self
    where
        F: FnOnce(TreeBuilder<'c>) -> TreeBuilder<'c>,
    {
        self.inner_kind(module, name, "list", |k| k == NodeKind::List, f)
    }

    /// Adds any inner node (including rpc, action and notification).
    pub fn inner<F>(self, module: &str, name: &str, f: F) -> Self
    where
        F: FnOnce(TreeBuilder<'c>) -> TreeBuilder<'c>,
    {
        self.inner_kind(module, name, "inner node", NodeKind::is_inner, f)
    }

    fn inner_kind<F>(mut self, module: &str, name: &str, expected: &'static str, accept: fn(NodeKind) -> bool, f: F) -> Self
    where
        F: FnOnce(TreeBuilder<'c>) -> TreeBuilder<'c>,
    {
        if self.error.is_some() {
            return self;
        }
        let schema = match self.resolve(module, name, expected, accept) {
            Ok(id) => id,
            Err(e) => {
                self.fail(e);
                return self;
            }
        };
        let child = f(TreeBuilder::under(self.ctx, Some(schema)));
        match child.error {
            Some(e) => self.fail(e),
            None => self.nodes.push(DataNode::Inner(InnerNode {
                schema,
                children: child.nodes,
                metadata: Vec::new(),
            })),
        }
        self
    }

    // =========================================================================
    // Opaque nodes and metadata
    // =========================================================================

    /// Adds an opaque node as is.
    pub fn opaque(mut self, node: OpaqueNode) -> Self {
        if self.error.is_none() {
            self.nodes.push(DataNode::Opaque(node));
        }
        self
    }

    /// Attaches a metadata annotation to the last added node.
    pub fn meta(mut self, module: &str, name: &str, value: impl Into<String>) -> Self {
        if self.error.is_some() {
            return self;
        }
        let Some(module_id) = self.ctx.find_module(module, None) else {
            self.fail(SchemaError::UnknownModule {
                name: module.to_string(),
            });
            return self;
        };
        if !self.ctx.module(module_id).has_annotation(name) {
            self.fail(SchemaError::UnknownAnnotation {
                module: module.to_string(),
                name: name.to_string(),
            });
            return self;
        }
        let entry = Metadata {
            module: module_id,
            name: name.to_string(),
            value: value.into(),
        };
        match self.nodes.last_mut() {
            Some(DataNode::Term(n)) => n.metadata.push(entry),
            Some(DataNode::Inner(n)) => n.metadata.push(entry),
            Some(DataNode::Any(n)) => n.metadata.push(entry),
            Some(DataNode::Opaque(_)) | None => self.fail(SchemaError::InvalidParent {
                parent: "no schema node".to_string(),
                kind: "metadata",
            }),
        }
        self
    }

    // =========================================================================
    // Build
    // =========================================================================

    /// Builds the node list, or returns the first error.
    pub fn build(self) -> Result<Vec<DataNode>, SchemaError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.nodes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DataType;

    fn context() -> Context {
        let mut ctx = Context::new();
        let m = ctx.add_module("m", None).unwrap();
        ctx.add_annotation(m, "origin").unwrap();
        let top = ctx.add_container(m, None, "top").unwrap();
        ctx.add_leaf(m, Some(top), "count", DataType::Uint8).unwrap();
        let item = ctx.add_list(m, Some(top), "item").unwrap();
        ctx.add_leaf(m, Some(item), "key", DataType::String).unwrap();
        ctx.add_leaf_list(m, None, "tags", DataType::String).unwrap();
        ctx.add_anydata(m, None, "blob").unwrap();
        ctx
    }

    #[test]
    fn test_nested_build() {
        let ctx = context();
        let tree = TreeBuilder::new(&ctx)
            .container("m", "top", |c| {
                c.leaf("m", "count", "3")
                    .meta("m", "origin", "learned")
                    .list("m", "item", |i| i.leaf("m", "key", "a"))
                    .list("m", "item", |i| i.leaf("m", "key", "b"))
            })
            .leaf_list("m", "tags", "x")
            .leaf_list("m", "tags", "y")
            .any("m", "blob", AnyValue::Json("{}".into()))
            .opaque(OpaqueNode::new("unknown", "other"))
            .build()
            .unwrap();

        assert_eq!(tree.len(), 5);
        let top = &tree[0];
        assert_eq!(top.children().len(), 3);
        assert_eq!(top.children()[0].metadata().len(), 1);
        assert_eq!(top.children()[2].children()[0].value(), Some("b"));
        assert!(tree[4].is_opaque());
    }

    #[test]
    fn test_first_error_is_kept() {
        let ctx = context();
        let result = TreeBuilder::new(&ctx)
            .leaf("m", "missing", "x")
            .leaf("nope", "top", "x")
            .build();
        assert!(matches!(result, Err(SchemaError::UnknownNode { .. })));
    }

    #[test]
    fn test_invalid_value_rejected() {
        let ctx = context();
        let result = TreeBuilder::new(&ctx)
            .container("m", "top", |c| c.leaf("m", "count", "300"))
            .build();
        assert!(matches!(result, Err(SchemaError::InvalidValue { .. })));
    }

    #[test]
    fn test_kind_mismatch() {
        let ctx = context();
        let result = TreeBuilder::new(&ctx).leaf("m", "top", "x").build();
        assert!(matches!(
            result,
            Err(SchemaError::KindMismatch { expected: "leaf", .. })
        ));
    }

    #[test]
    fn test_unknown_annotation() {
        let ctx = context();
        let result = TreeBuilder::new(&ctx)
            .leaf_list("m", "tags", "x")
            .meta("m", "nonexistent", "v")
            .build();
        assert!(matches!(result, Err(SchemaError::UnknownAnnotation { .. })));
    }
}
