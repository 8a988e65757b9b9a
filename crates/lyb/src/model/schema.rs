//! In-memory schema context.
//!
//! The codec resolves every node against a [`Context`]: an arena of modules
//! and schema nodes addressed by [`ModuleId`] and [`NodeId`]. The context is
//! passed explicitly to every encode and decode call.

use std::fmt;

use crate::codec::hash::generate_hash;
use crate::error::SchemaError;
use crate::limits::HASH_CACHE_LEN;
use crate::util::Revision;

/// Index of a module in a [`Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(u32);

/// Index of a schema node in a [`Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl ModuleId {
    /// Returns the arena index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl NodeId {
    /// Returns the arena index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where a group of sibling schema nodes hangs: the top level of a module
/// or below a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaAnchor {
    Module(ModuleId),
    Node(NodeId),
}

/// Schema node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Container,
    List,
    Leaf,
    LeafList,
    AnyData,
    AnyXml,
    Rpc,
    Action,
    Notification,
}

impl NodeKind {
    /// Leaf or leaf-list.
    pub fn is_term(self) -> bool {
        matches!(self, NodeKind::Leaf | NodeKind::LeafList)
    }

    /// Node kinds that hold child nodes.
    pub fn is_inner(self) -> bool {
        matches!(
            self,
            NodeKind::Container
                | NodeKind::List
                | NodeKind::Rpc
                | NodeKind::Action
                | NodeKind::Notification
        )
    }

    /// Anydata or anyxml.
    pub fn is_any(self) -> bool {
        matches!(self, NodeKind::AnyData | NodeKind::AnyXml)
    }

    /// Rpc, action or notification.
    pub fn is_operation(self) -> bool {
        matches!(self, NodeKind::Rpc | NodeKind::Action | NodeKind::Notification)
    }

    /// Returns the keyword of the kind.
    pub fn label(self) -> &'static str {
        match self {
            NodeKind::Container => "container",
            NodeKind::List => "list",
            NodeKind::Leaf => "leaf",
            NodeKind::LeafList => "leaf-list",
            NodeKind::AnyData => "anydata",
            NodeKind::AnyXml => "anyxml",
            NodeKind::Rpc => "rpc",
            NodeKind::Action => "action",
            NodeKind::Notification => "notification",
        }
    }
}

/// Value types of leaves and leaf-lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    String,
    /// Base64 encoded bytes.
    Binary,
    Boolean,
    Empty,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Decimal64 { fraction_digits: u8 },
    Enumeration(Vec<String>),
    /// Value must equal the value of some instance of the target leaf.
    Leafref { target: NodeId },
    /// Path to an existing data node, `/module:name[key='value']/...`.
    InstanceIdentifier,
}

/// Outcome of storing a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stored {
    /// The value is fully validated.
    Resolved,
    /// The value is lexically valid but can only be resolved against the
    /// complete data tree.
    Deferred,
}

impl DataType {
    /// Validates the canonical string form of a value.
    pub fn store(&self, value: &str) -> Result<Stored, &'static str> {
        match self {
            DataType::String => Ok(Stored::Resolved),
            DataType::Binary => check_base64(value).map(|_| Stored::Resolved),
            DataType::Boolean => match value {
                "true" | "false" => Ok(Stored::Resolved),
                _ => Err("not a boolean"),
            },
            DataType::Empty => {
                if value.is_empty() {
                    Ok(Stored::Resolved)
                } else {
                    Err("empty type takes no value")
                }
            }
            DataType::Int8 => check_int::<i8>(value),
            DataType::Int16 => check_int::<i16>(value),
            DataType::Int32 => check_int::<i32>(value),
            DataType::Int64 => check_int::<i64>(value),
            DataType::Uint8 => check_int::<u8>(value),
            DataType::Uint16 => check_int::<u16>(value),
            DataType::Uint32 => check_int::<u32>(value),
            DataType::Uint64 => check_int::<u64>(value),
            DataType::Decimal64 { fraction_digits } => {
                check_decimal64(value, *fraction_digits).map(|_| Stored::Resolved)
            }
            DataType::Enumeration(names) => {
                if names.iter().any(|n| n == value) {
                    Ok(Stored::Resolved)
                } else {
                    Err("unknown enumeration value")
                }
            }
            DataType::Leafref { .. } => Ok(Stored::Deferred),
            DataType::InstanceIdentifier => {
                if value.starts_with('/') && value.len() > 1 {
                    Ok(Stored::Deferred)
                } else {
                    Err("instance-identifier must be an absolute path")
                }
            }
        }
    }
}

fn check_int<T: std::str::FromStr>(value: &str) -> Result<Stored, &'static str> {
    if value.starts_with('+') {
        return Err("integer is not in canonical form");
    }
    value
        .parse::<T>()
        .map(|_| Stored::Resolved)
        .map_err(|_| "integer out of range or malformed")
}

fn check_base64(value: &str) -> Result<(), &'static str> {
    let bytes = value.as_bytes();
    if bytes.len() % 4 != 0 {
        return Err("base64 length is not a multiple of 4");
    }
    let padding = bytes.iter().rev().take_while(|&&b| b == b'=').count();
    if padding > 2 {
        return Err("too much base64 padding");
    }
    let body = &bytes[..bytes.len() - padding];
    if body
        .iter()
        .all(|&b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
    {
        Ok(())
    } else {
        Err("invalid base64 character")
    }
}

fn check_decimal64(value: &str, fraction_digits: u8) -> Result<(), &'static str> {
    const MALFORMED: &str = "malformed decimal64";
    let (negative, unsigned) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) if !f.is_empty() => (i, f),
        Some(_) => return Err(MALFORMED),
        None => (unsigned, ""),
    };
    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MALFORMED);
    }
    if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MALFORMED);
    }
    if frac_part.len() > fraction_digits as usize {
        return Err("too many fraction digits");
    }

    let mut scaled: i128 = 0;
    let digits = int_part
        .bytes()
        .chain(frac_part.bytes())
        .chain(std::iter::repeat_n(b'0', fraction_digits as usize - frac_part.len()));
    for digit in digits {
        scaled = scaled
            .checked_mul(10)
            .and_then(|s| s.checked_add((digit - b'0') as i128))
            .ok_or("decimal64 out of range")?;
    }
    let limit = if negative {
        -(i64::MIN as i128)
    } else {
        i64::MAX as i128
    };
    if scaled > limit {
        return Err("decimal64 out of range");
    }
    Ok(())
}

/// A module of the schema context.
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    revision: Option<Revision>,
    implemented: bool,
    annotations: Vec<String>,
    top: Vec<NodeId>,
}

impl Module {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn revision(&self) -> Option<&Revision> {
        self.revision.as_ref()
    }

    pub fn is_implemented(&self) -> bool {
        self.implemented
    }

    /// Returns true if the module defines the metadata annotation.
    pub fn has_annotation(&self, name: &str) -> bool {
        self.annotations.iter().any(|a| a == name)
    }
}

/// A schema node with its cached hashes.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    module: ModuleId,
    name: String,
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data_type: Option<DataType>,
    config: bool,
    hashes: [u8; HASH_CACHE_LEN],
}

impl SchemaNode {
    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Value type of a leaf or leaf-list.
    pub fn data_type(&self) -> Option<&DataType> {
        self.data_type.as_ref()
    }

    /// Returns the cached hash of a collision level, if it is cached.
    pub fn cached_hash(&self, collision_id: u8) -> Option<u8> {
        self.hashes.get(collision_id as usize).copied()
    }
}

/// Arena of modules and schema nodes.
#[derive(Debug, Clone, Default)]
pub struct Context {
    modules: Vec<Module>,
    nodes: Vec<SchemaNode>,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Modules
    // =========================================================================

    /// Adds a module revision. The first revision of a name is implemented.
    pub fn add_module(&mut self, name: &str, revision: Option<&str>) -> Result<ModuleId, SchemaError> {
        let implemented = !self.modules.iter().any(|m| m.name == name && m.implemented);
        self.add_module_with(name, revision, implemented)
    }

    /// Adds a module revision. Implementing it unimplements other revisions.
    pub fn add_module_with(
        &mut self,
        name: &str,
        revision: Option<&str>,
        implemented: bool,
    ) -> Result<ModuleId, SchemaError> {
        let revision = match revision {
            Some(text) => {
                let rev: Revision = text.parse().map_err(|e: crate::util::RevisionParseError| {
                    SchemaError::InvalidRevision {
                        revision: text.to_string(),
                        reason: e.message,
                    }
                })?;
                if !rev.is_packable() {
                    return Err(SchemaError::InvalidRevision {
                        revision: text.to_string(),
                        reason: "year outside 2000..=2127".to_string(),
                    });
                }
                Some(rev)
            }
            None => None,
        };
        if self
            .modules
            .iter()
            .any(|m| m.name == name && m.revision == revision)
        {
            return Err(SchemaError::DuplicateModule {
                name: name.to_string(),
                revision: revision.map(|r| r.to_string()),
            });
        }
        if implemented {
            for module in self.modules.iter_mut().filter(|m| m.name == name) {
                module.implemented = false;
            }
        }

        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(Module {
            name: name.to_string(),
            revision,
            implemented,
            annotations: Vec::new(),
            top: Vec::new(),
        });
        Ok(id)
    }

    /// Declares a metadata annotation in a module.
    pub fn add_annotation(&mut self, module: ModuleId, name: &str) -> Result<(), SchemaError> {
        let m = self
            .modules
            .get_mut(module.index())
            .ok_or_else(|| unknown_module(module))?;
        if !m.annotations.iter().any(|a| a == name) {
            m.annotations.push(name.to_string());
        }
        Ok(())
    }

    /// Returns a module. Panics if the id is not from this context.
    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.index()]
    }

    /// Returns a module if the id is valid.
    pub fn get_module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id.index())
    }

    /// Iterates over all modules with their ids.
    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules
            .iter()
            .enumerate()
            .map(|(i, m)| (ModuleId(i as u32), m))
    }

    /// Resolves a module: the exact revision when given, else the
    /// implemented revision, else the latest one.
    pub fn find_module(&self, name: &str, revision: Option<&Revision>) -> Option<ModuleId> {
        let named: Vec<(ModuleId, &Module)> = self.modules().filter(|(_, m)| m.name == name).collect();
        let exact = revision.and_then(|rev| {
            named
                .iter()
                .find(|(_, m)| m.revision.as_ref() == Some(rev))
        });
        exact
            .or_else(|| named.iter().find(|(_, m)| m.implemented))
            .or_else(|| named.iter().max_by(|(_, a), (_, b)| a.revision.cmp(&b.revision)))
            .map(|(id, _)| *id)
    }

    // =========================================================================
    // Schema nodes
    // =========================================================================

    pub fn add_container(&mut self, module: ModuleId, parent: Option<NodeId>, name: &str) -> Result<NodeId, SchemaError> {
        self.add_node(module, parent, name, NodeKind::Container, None)
    }

    pub fn add_list(&mut self, module: ModuleId, parent: Option<NodeId>, name: &str) -> Result<NodeId, SchemaError> {
        self.add_node(module, parent, name, NodeKind::List, None)
    }

    pub fn add_leaf(
        &mut self,
        module: ModuleId,
        parent: Option<NodeId>,
        name: &str,
        data_type: DataType,
    ) -> Result<NodeId, SchemaError> {
        self.add_node(module, parent, name, NodeKind::Leaf, Some(data_type))
    }

    pub fn add_leaf_list(
        &mut self,
        module: ModuleId,
        parent: Option<NodeId>,
        name: &str,
        data_type: DataType,
    ) -> Result<NodeId, SchemaError> {
        self.add_node(module, parent, name, NodeKind::LeafList, Some(data_type))
    }

    pub fn add_anydata(&mut self, module: ModuleId, parent: Option<NodeId>, name: &str) -> Result<NodeId, SchemaError> {
        self.add_node(module, parent, name, NodeKind::AnyData, None)
    }

    pub fn add_anyxml(&mut self, module: ModuleId, parent: Option<NodeId>, name: &str) -> Result<NodeId, SchemaError> {
        self.add_node(module, parent, name, NodeKind::AnyXml, None)
    }

    /// Adds a top-level rpc.
    pub fn add_rpc(&mut self, module: ModuleId, name: &str) -> Result<NodeId, SchemaError> {
        self.add_node(module, None, name, NodeKind::Rpc, None)
    }

    /// Adds an action under a container or list.
    pub fn add_action(&mut self, module: ModuleId, parent: NodeId, name: &str) -> Result<NodeId, SchemaError> {
        self.add_node(module, Some(parent), name, NodeKind::Action, None)
    }

    pub fn add_notification(
        &mut self,
        module: ModuleId,
        parent: Option<NodeId>,
        name: &str,
    ) -> Result<NodeId, SchemaError> {
        self.add_node(module, parent, name, NodeKind::Notification, None)
    }

    fn add_node(
        &mut self,
        module: ModuleId,
        parent: Option<NodeId>,
        name: &str,
        kind: NodeKind,
        data_type: Option<DataType>,
    ) -> Result<NodeId, SchemaError> {
        let module_name = self
            .get_module(module)
            .ok_or_else(|| unknown_module(module))?
            .name
            .clone();

        let anchor = match parent {
            Some(p) => {
                let parent_node = self.get_node(p).ok_or_else(|| SchemaError::UnknownNode {
                    path: format!("#{}", p.index()),
                })?;
                let allowed = match kind {
                    NodeKind::Rpc => false,
                    NodeKind::Action => {
                        matches!(parent_node.kind, NodeKind::Container | NodeKind::List)
                    }
                    _ => parent_node.kind.is_inner(),
                };
                if !allowed {
                    return Err(SchemaError::InvalidParent {
                        parent: self.node_path(p),
                        kind: kind.label(),
                    });
                }
                SchemaAnchor::Node(p)
            }
            None => {
                if kind == NodeKind::Action {
                    return Err(SchemaError::InvalidParent {
                        parent: format!("/{module_name}"),
                        kind: kind.label(),
                    });
                }
                SchemaAnchor::Module(module)
            }
        };

        if self.find_child(anchor, module, name).is_some() {
            let prefix = match parent {
                Some(p) => self.node_path(p),
                None => String::new(),
            };
            return Err(SchemaError::DuplicateNode {
                path: format!("{prefix}/{module_name}:{name}"),
            });
        }

        let mut hashes = [0u8; HASH_CACHE_LEN];
        for (level, slot) in hashes.iter_mut().enumerate() {
            *slot = generate_hash(&module_name, name, level as u8);
        }

        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(SchemaNode {
            module,
            name: name.to_string(),
            kind,
            parent,
            children: Vec::new(),
            data_type,
            config: true,
            hashes,
        });
        match anchor {
            SchemaAnchor::Node(p) => self.nodes[p.index()].children.push(id),
            SchemaAnchor::Module(m) => self.modules[m.index()].top.push(id),
        }
        Ok(id)
    }

    /// Marks a node as configuration (`true`) or state data (`false`).
    /// Descendants inherit state.
    pub fn set_config(&mut self, node: NodeId, config: bool) -> Result<(), SchemaError> {
        let n = self
            .nodes
            .get_mut(node.index())
            .ok_or_else(|| SchemaError::UnknownNode {
                path: format!("#{}", node.index()),
            })?;
        n.config = config;
        Ok(())
    }

    /// Returns false if the node or any ancestor is state data.
    pub fn is_config(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            let n = self.node(id);
            if !n.config {
                return false;
            }
            current = n.parent;
        }
        true
    }

    /// Returns a node. Panics if the id is not from this context.
    pub fn node(&self, id: NodeId) -> &SchemaNode {
        &self.nodes[id.index()]
    }

    /// Returns a node if the id is valid.
    pub fn get_node(&self, id: NodeId) -> Option<&SchemaNode> {
        self.nodes.get(id.index())
    }

    /// Returns the anchor the node's siblings share.
    pub fn anchor_of(&self, node: NodeId) -> SchemaAnchor {
        let n = self.node(node);
        match n.parent {
            Some(p) => SchemaAnchor::Node(p),
            None => SchemaAnchor::Module(n.module),
        }
    }

    /// Returns sibling candidates under an anchor in declaration order.
    pub fn candidates(&self, anchor: SchemaAnchor) -> &[NodeId] {
        match anchor {
            SchemaAnchor::Module(m) => &self.module(m).top,
            SchemaAnchor::Node(n) => &self.node(n).children,
        }
    }

    /// Finds a child by module and name.
    pub fn find_child(&self, anchor: SchemaAnchor, module: ModuleId, name: &str) -> Option<NodeId> {
        self.candidates(anchor)
            .iter()
            .copied()
            .find(|&id| {
                let n = self.node(id);
                n.module == module && n.name == name
            })
    }

    /// Returns the data path of a node, e.g. `/mod:top/list/aug:leaf`.
    ///
    /// A module prefix is shown where the module changes.
    pub fn node_path(&self, node: NodeId) -> String {
        let mut chain = Vec::new();
        let mut current = self.get_node(node).map(|_| node);
        while let Some(id) = current {
            chain.push(id);
            current = self.node(id).parent;
        }
        if chain.is_empty() {
            return format!("#{}", node.index());
        }

        let mut path = String::new();
        let mut last_module = None;
        for &id in chain.iter().rev() {
            let n = self.node(id);
            path.push('/');
            if last_module != Some(n.module) {
                path.push_str(&self.module(n.module).name);
                path.push(':');
            }
            path.push_str(&n.name);
            last_module = Some(n.module);
        }
        path
    }
}

fn unknown_module(id: ModuleId) -> SchemaError {
    SchemaError::UnknownModule {
        name: format!("#{}", id.index()),
    }
}

impl fmt::Display for SchemaAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaAnchor::Module(m) => write!(f, "module #{}", m.index()),
            SchemaAnchor::Node(n) => write!(f, "node #{}", n.index()),
        }
    }
}
