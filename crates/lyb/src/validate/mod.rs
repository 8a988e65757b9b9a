//! Semantic validation for decoded data trees.
//!
//! Two kinds of checks live here:
//! - contextual legality of each node as it is decoded (state data, at
//!   most one operation per document);
//! - resolution of leafref and instance-identifier values, which needs the
//!   complete tree and therefore runs after decoding.

use crate::error::DecodeError;
use crate::model::{Context, DataNode, DataType, NodeId};

/// Per-document legality state.
#[derive(Debug)]
pub struct Legality<'c> {
    ctx: &'c Context,
    no_state: bool,
    operation: Option<NodeId>,
}

impl<'c> Legality<'c> {
    pub fn new(ctx: &'c Context, no_state: bool) -> Self {
        Self {
            ctx,
            no_state,
            operation: None,
        }
    }

    /// Checks whether a node of the given schema may appear in the document.
    pub fn check(&mut self, schema: NodeId) -> Result<(), DecodeError> {
        if self.no_state && !self.ctx.is_config(schema) {
            return Err(DecodeError::StateDataForbidden {
                node: self.ctx.node_path(schema),
            });
        }
        if self.ctx.node(schema).kind().is_operation() {
            if self.operation.is_some() {
                return Err(DecodeError::MultipleOperations {
                    node: self.ctx.node_path(schema),
                });
            }
            self.operation = Some(schema);
        }
        Ok(())
    }
}

/// A value whose resolution needs the complete tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredValue {
    pub schema: NodeId,
    pub value: String,
}

/// Returns the deferred values that do not resolve against `tree`.
pub fn unresolved_references(
    ctx: &Context,
    tree: &[DataNode],
    deferred: &[DeferredValue],
) -> Vec<DeferredValue> {
    deferred
        .iter()
        .filter(|d| !resolves(ctx, tree, d))
        .cloned()
        .collect()
}

fn resolves(ctx: &Context, tree: &[DataNode], deferred: &DeferredValue) -> bool {
    match ctx.node(deferred.schema).data_type() {
        Some(DataType::Leafref { target }) => {
            let mut found = false;
            walk(tree, &mut |node| {
                if matches!(node, DataNode::Term(t) if t.schema == *target && t.value == deferred.value) {
                    found = true;
                }
            });
            found
        }
        Some(DataType::InstanceIdentifier) => match parse_instance_identifier(&deferred.value) {
            Some(steps) => !select(ctx, tree, &steps, None).is_empty(),
            None => false,
        },
        _ => true,
    }
}

/// Visits every node of a tree in document order, skipping anydata content.
fn walk<'t>(nodes: &'t [DataNode], visit: &mut impl FnMut(&'t DataNode)) {
    for node in nodes {
        visit(node);
        walk(node.children(), visit);
    }
}

// =============================================================================
// INSTANCE IDENTIFIERS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    /// `[name='value']`
    Key { name: String, value: String },
    /// `[.='value']`
    Value(String),
    /// `[N]`, 1-based
    Position(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    module: Option<String>,
    name: String,
    predicates: Vec<Predicate>,
}

/// Parses `/mod:name[key='v']/name[.='v']/name[2]`.
fn parse_instance_identifier(path: &str) -> Option<Vec<Step>> {
    let mut chars = path.chars().peekable();
    let mut steps = Vec::new();
    while let Some(c) = chars.next() {
        if c != '/' {
            return None;
        }
        let mut qname = String::new();
        while let Some(&c) = chars.peek() {
            if c == '/' || c == '[' {
                break;
            }
            qname.push(c);
            chars.next();
        }
        let (module, name) = match qname.split_once(':') {
            Some((m, n)) => (Some(m.to_string()), n.to_string()),
            None => (None, qname),
        };
        if name.is_empty() {
            return None;
        }

        let mut predicates = Vec::new();
        while chars.peek() == Some(&'[') {
            chars.next();
            let mut key = String::new();
            while let Some(&c) = chars.peek() {
                if c == '=' || c == ']' {
                    break;
                }
                key.push(c);
                chars.next();
            }
            match chars.next()? {
                ']' => predicates.push(Predicate::Position(key.trim().parse().ok()?)),
                _ => {
                    let quote = chars.next().filter(|q| *q == '\'' || *q == '"')?;
                    let mut value = String::new();
                    loop {
                        let c = chars.next()?;
                        if c == quote {
                            break;
                        }
                        value.push(c);
                    }
                    if chars.next()? != ']' {
                        return None;
                    }
                    let key = key.trim();
                    if key == "." {
                        predicates.push(Predicate::Value(value));
                    } else {
                        let key = key.split_once(':').map_or(key, |(_, n)| n);
                        predicates.push(Predicate::Key {
                            name: key.to_string(),
                            value,
                        });
                    }
                }
            }
        }
        steps.push(Step {
            module,
            name,
            predicates,
        });
    }
    if steps.is_empty() { None } else { Some(steps) }
}

/// Returns the nodes addressed by `steps` below `nodes`.
fn select<'t>(
    ctx: &Context,
    nodes: &'t [DataNode],
    steps: &[Step],
    parent_module: Option<&str>,
) -> Vec<&'t DataNode> {
    let Some((step, rest)) = steps.split_first() else {
        return Vec::new();
    };
    let Some(module) = step.module.as_deref().or(parent_module) else {
        return Vec::new();
    };

    let mut matched = Vec::new();
    let mut position = 0;
    for node in nodes {
        let Some(schema) = node.schema() else {
            continue;
        };
        let s = ctx.node(schema);
        if s.name() != step.name || ctx.module(s.module()).name() != module {
            continue;
        }
        position += 1;
        let accepted = step.predicates.iter().all(|p| match p {
            Predicate::Key { name, value } => node.children().iter().any(|child| {
                child
                    .schema()
                    .is_some_and(|id| ctx.node(id).name() == name)
                    && child.value() == Some(value.as_str())
            }),
            Predicate::Value(value) => node.value() == Some(value.as_str()),
            Predicate::Position(n) => *n == position,
        });
        if !accepted {
            continue;
        }
        if rest.is_empty() {
            matched.push(node);
        } else {
            matched.extend(select(ctx, node.children(), rest, Some(module)));
        }
    }
    matched
}
