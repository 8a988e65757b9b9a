//! Subtree encoding/decoding for LYB.
//!
//! Every data node is one chunk-framed subtree:
//!
//! ```text
//! meta [module] hash_seq annotations payload
//! ```
//!
//! The module reference is present only where there is no schema parent to
//! anchor the hash matcher: top-level nodes and children of opaque nodes.

use rustc_hash::FxHashSet;

use crate::codec::chunk::{LybReader, LybWriter};
use crate::codec::document::{DecodeOptions, decode_nested, encode_nested};
use crate::codec::hash::{HashSequence, HashSequencer};
use crate::codec::matcher::{match_sibling, read_hash_sequence};
use crate::error::{DecodeError, EncodeError};
use crate::limits::{MAX_DEPTH, MAX_METADATA, MAX_PREFIXES, NESTED_DOCUMENT_DEPTH};
use crate::model::{
    AnyNode, AnyValue, AnyValueType, Attribute, Context, DataNode, InnerNode, Metadata, ModuleId,
    NodeId, NodeKind, OpaqueNode, PrefixMapping, SchemaAnchor, Stored, TermNode, ValueFormat,
};
use crate::util::{Revision, pack_revision, unpack_revision};
use crate::validate::{DeferredValue, Legality};

/// Position of a subtree relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Parent {
    TopLevel,
    Schema(NodeId),
    Opaque,
}

impl Parent {
    /// True if subtrees at this position carry a module reference.
    fn carries_module(self) -> bool {
        !matches!(self, Parent::Schema(_))
    }
}

// =============================================================================
// ENCODING
// =============================================================================

/// Writes data nodes as subtrees of one document.
pub(crate) struct SubtreeEncoder<'c> {
    ctx: &'c Context,
    writer: LybWriter,
    sequencer: HashSequencer<'c>,
    /// Depth of the enclosing document, 0 for the outermost one.
    base_depth: usize,
    chunk_max: u16,
}

impl<'c> SubtreeEncoder<'c> {
    pub(crate) fn new(
        ctx: &'c Context,
        writer: LybWriter,
        modules: &[ModuleId],
        base_depth: usize,
        chunk_max: u16,
    ) -> Self {
        Self {
            ctx,
            writer,
            sequencer: HashSequencer::new(ctx, modules.iter().copied()),
            base_depth,
            chunk_max,
        }
    }

    pub(crate) fn into_writer(self) -> LybWriter {
        self.writer
    }

    /// Encodes a top-level node and its descendants.
    pub(crate) fn encode_top_level(&mut self, node: &DataNode) -> Result<(), EncodeError> {
        self.encode_node(node, Parent::TopLevel, self.base_depth + 1)
    }

    fn encode_node(&mut self, node: &DataNode, parent: Parent, depth: usize) -> Result<(), EncodeError> {
        if depth > MAX_DEPTH {
            return Err(EncodeError::DepthLimitExceeded { max: MAX_DEPTH });
        }
        match node {
            DataNode::Opaque(opaque) => self.encode_opaque(opaque, parent, depth),
            DataNode::Term(term) => {
                self.start_schema_node(term.schema, parent, NodeKind::is_term, &term.metadata)?;
                self.writer.write(term.value.as_bytes())?;
                self.writer.stop_subtree()
            }
            DataNode::Inner(inner) => {
                self.start_schema_node(inner.schema, parent, NodeKind::is_inner, &inner.metadata)?;
                for child in &inner.children {
                    self.encode_node(child, Parent::Schema(inner.schema), depth + 1)?;
                }
                self.writer.stop_subtree()
            }
            DataNode::Any(any) => {
                self.start_schema_node(any.schema, parent, NodeKind::is_any, &any.metadata)?;
                self.writer.write_byte(any.value.value_type() as u8)?;
                match &any.value {
                    AnyValue::Tree(tree) => {
                        let nested = encode_nested(self.ctx, tree, self.chunk_max, depth + NESTED_DOCUMENT_DEPTH)?;
                        self.writer.write(&nested)?;
                    }
                    AnyValue::Lyb(bytes) => self.writer.write(bytes)?,
                    AnyValue::String(s) | AnyValue::Xml(s) | AnyValue::Json(s) => {
                        self.writer.write(s.as_bytes())?
                    }
                }
                self.writer.stop_subtree()
            }
        }
    }

    /// Opens the subtree of a schema-backed node and writes everything up to
    /// its payload.
    fn start_schema_node(
        &mut self,
        schema: NodeId,
        parent: Parent,
        accept: fn(NodeKind) -> bool,
        metadata: &[Metadata],
    ) -> Result<(), EncodeError> {
        let node = self
            .ctx
            .get_node(schema)
            .ok_or(EncodeError::UnknownSchemaNode { id: schema.index() })?;
        if !accept(node.kind()) {
            return Err(self.mismatch(schema, "data node variant does not match the schema node kind"));
        }
        match parent {
            Parent::Schema(p) if node.parent() != Some(p) => {
                return Err(self.mismatch(schema, "schema node is not a child of the parent's schema node"));
            }
            Parent::TopLevel | Parent::Opaque if node.parent().is_some() => {
                return Err(self.mismatch(schema, "schema node is not top-level"));
            }
            _ => {}
        }
        let sequence = self.sequencer.sequence(schema)?;

        self.writer.start_subtree()?;
        if parent.carries_module() {
            self.write_module_ref(Some(node.module()))?;
        }
        self.write_hash_sequence(&sequence)?;
        self.write_metadata(schema, metadata)
    }

    fn mismatch(&self, schema: NodeId, reason: &'static str) -> EncodeError {
        EncodeError::SchemaMismatch {
            node: self.ctx.node_path(schema),
            reason,
        }
    }

    fn write_module_ref(&mut self, module: Option<ModuleId>) -> Result<(), EncodeError> {
        let ctx = self.ctx;
        match module.map(|m| ctx.module(m)) {
            Some(m) => {
                self.writer.write_string(m.name(), "module name")?;
                self.writer.write_u16(pack_revision(m.revision()))
            }
            None => {
                self.writer.write_string("", "module name")?;
                self.writer.write_u16(0)
            }
        }
    }

    fn write_hash_sequence(&mut self, sequence: &HashSequence) -> Result<(), EncodeError> {
        for byte in sequence.wire_bytes() {
            self.writer.write_byte(byte)?;
        }
        Ok(())
    }

    fn write_metadata(&mut self, schema: NodeId, metadata: &[Metadata]) -> Result<(), EncodeError> {
        if metadata.len() > MAX_METADATA {
            return Err(EncodeError::LengthExceedsLimit {
                field: "metadata",
                len: metadata.len(),
                max: MAX_METADATA,
            });
        }
        self.writer.write_byte(metadata.len() as u8)?;
        for meta in metadata {
            if self.ctx.get_module(meta.module).is_none() {
                return Err(self.mismatch(schema, "metadata module does not exist"));
            }
            self.writer.start_subtree()?;
            self.write_module_ref(Some(meta.module))?;
            self.writer.write_string(&meta.name, "metadata name")?;
            self.writer.write(meta.value.as_bytes())?;
            self.writer.stop_subtree()?;
        }
        Ok(())
    }

    fn write_prefix_table(&mut self, prefixes: &[PrefixMapping]) -> Result<(), EncodeError> {
        if prefixes.len() > MAX_PREFIXES {
            return Err(EncodeError::LengthExceedsLimit {
                field: "value prefixes",
                len: prefixes.len(),
                max: MAX_PREFIXES,
            });
        }
        self.writer.write_byte(prefixes.len() as u8)?;
        for mapping in prefixes {
            self.writer.write_string(&mapping.prefix, "value prefix")?;
            self.writer.write_string(&mapping.module_ns, "value prefix namespace")?;
        }
        Ok(())
    }

    fn encode_opaque(&mut self, node: &OpaqueNode, parent: Parent, depth: usize) -> Result<(), EncodeError> {
        if node.attributes.len() > MAX_METADATA {
            return Err(EncodeError::LengthExceedsLimit {
                field: "attributes",
                len: node.attributes.len(),
                max: MAX_METADATA,
            });
        }

        self.writer.start_subtree()?;
        if parent.carries_module() {
            self.write_module_ref(None)?;
        }
        // opaque marker
        self.writer.write_byte(0)?;

        self.writer.write_byte(node.attributes.len() as u8)?;
        for attr in &node.attributes {
            self.writer.start_subtree()?;
            self.writer.write_string(&attr.prefix, "attribute prefix")?;
            self.writer.write_string(&attr.module_ns, "attribute namespace")?;
            self.writer.write_string(&attr.name, "attribute name")?;
            self.write_prefix_table(&attr.value_prefixes)?;
            self.writer.write_byte(attr.format as u8)?;
            self.writer.write(attr.value.as_bytes())?;
            self.writer.stop_subtree()?;
        }

        self.writer.write_string(&node.prefix, "opaque prefix")?;
        self.writer.write_string(&node.module_ns, "opaque namespace")?;
        self.writer.write_string(&node.name, "opaque name")?;
        self.write_prefix_table(&node.value_prefixes)?;
        self.writer.write_byte(node.format as u8)?;
        self.writer.write_string(&node.value, "opaque value")?;
        for child in &node.children {
            self.encode_node(child, Parent::Opaque, depth + 1)?;
        }
        self.writer.stop_subtree()
    }
}

// =============================================================================
// DECODING
// =============================================================================

/// Reads the subtrees of one document.
pub(crate) struct SubtreeDecoder<'c, 'a> {
    ctx: &'c Context,
    reader: LybReader<'a>,
    options: DecodeOptions,
    /// Modules of the document's module table known to the context.
    modules: FxHashSet<ModuleId>,
    legality: Legality<'c>,
    deferred: Vec<DeferredValue>,
    /// Depth of the enclosing document, 0 for the outermost one.
    base_depth: usize,
    chunk_max: u16,
}

impl<'c, 'a> SubtreeDecoder<'c, 'a> {
    pub(crate) fn new(
        ctx: &'c Context,
        reader: LybReader<'a>,
        options: DecodeOptions,
        modules: FxHashSet<ModuleId>,
        base_depth: usize,
        chunk_max: u16,
    ) -> Self {
        Self {
            ctx,
            reader,
            options,
            modules,
            legality: Legality::new(ctx, options.no_state),
            deferred: Vec::new(),
            base_depth,
            chunk_max,
        }
    }

    pub(crate) fn reader_mut(&mut self) -> &mut LybReader<'a> {
        &mut self.reader
    }

    /// Returns the values queued for resolution against the complete tree.
    pub(crate) fn into_deferred(self) -> Vec<DeferredValue> {
        self.deferred
    }

    /// Decodes one top-level subtree.
    pub(crate) fn decode_top_level(&mut self) -> Result<DataNode, DecodeError> {
        self.decode_subtree(Parent::TopLevel, self.base_depth + 1)
    }

    fn decode_subtree(&mut self, parent: Parent, depth: usize) -> Result<DataNode, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::DepthLimitExceeded { max: MAX_DEPTH });
        }
        self.reader.push_frame()?;

        let mut module_name = String::new();
        let mut module = None;
        if parent.carries_module() {
            let (name, revision) = self.read_module_ref()?;
            if !name.is_empty() {
                module = self.resolve_module(&name, revision.as_ref())?;
            }
            module_name = name;
        }

        let Some(sequence) = read_hash_sequence(&mut self.reader)? else {
            let node = self.decode_opaque(depth)?;
            self.reader.pop_frame()?;
            return Ok(DataNode::Opaque(node));
        };

        let (anchor, filter) = match parent {
            Parent::Schema(p) => (Some(SchemaAnchor::Node(p)), Some(&self.modules)),
            Parent::TopLevel | Parent::Opaque => (module.map(SchemaAnchor::Module), None),
        };
        let schema = anchor.and_then(|a| match_sibling(self.ctx, a, filter, &sequence));
        let Some(schema) = schema else {
            let anchor = match anchor {
                Some(SchemaAnchor::Node(p)) => self.ctx.node_path(p),
                Some(SchemaAnchor::Module(m)) => format!("module \"{}\"", self.ctx.module(m).name()),
                None => format!("unknown module \"{module_name}\""),
            };
            if self.options.strict {
                return Err(DecodeError::UnresolvedHash {
                    anchor,
                    hashes: sequence.wire_bytes().collect(),
                });
            }
            tracing::debug!(%anchor, "no schema node matches, decoding as opaque");
            self.skip_schema_node(depth)?;
            self.reader.pop_frame()?;
            return Ok(DataNode::Opaque(OpaqueNode::new("", module_name)));
        };

        self.legality.check(schema)?;
        let metadata = self.read_metadata()?;
        let kind = self.ctx.node(schema).kind();
        let node = if kind.is_term() {
            let value = self.reader.read_bounded_string("term value")?;
            self.store_value(schema, &value)?;
            DataNode::Term(TermNode {
                schema,
                value,
                metadata,
            })
        } else if kind.is_any() {
            let value = self.read_any_value(depth)?;
            DataNode::Any(AnyNode {
                schema,
                value,
                metadata,
            })
        } else {
            let mut children = Vec::new();
            while !self.reader.top_exhausted() {
                children.push(self.decode_subtree(Parent::Schema(schema), depth + 1)?);
            }
            DataNode::Inner(InnerNode {
                schema,
                children,
                metadata,
            })
        };

        self.reader.pop_frame()?;
        Ok(node)
    }

    fn read_module_ref(&mut self) -> Result<(String, Option<Revision>), DecodeError> {
        let name = self.reader.read_string("module name")?;
        let packed = self.reader.read_u16("module revision")?;
        let revision = unpack_revision(packed).map_err(|_| DecodeError::InvalidRevision { packed })?;
        Ok((name, revision))
    }

    /// Resolves a node's module. Unknown modules are an error only in
    /// strict mode.
    fn resolve_module(&self, name: &str, revision: Option<&Revision>) -> Result<Option<ModuleId>, DecodeError> {
        match resolve_module(self.ctx, name, revision) {
            Some(id) => Ok(Some(id)),
            None if self.options.strict => Err(DecodeError::UnknownModule {
                name: name.to_string(),
                revision: revision.map(|r| r.to_string()),
            }),
            None => Ok(None),
        }
    }

    fn store_value(&mut self, schema: NodeId, value: &str) -> Result<(), DecodeError> {
        let data_type = self.ctx.node(schema).data_type().ok_or(DecodeError::Internal {
            context: "term schema node without a data type",
        })?;
        match data_type.store(value) {
            Ok(Stored::Resolved) => Ok(()),
            Ok(Stored::Deferred) => {
                self.deferred.push(DeferredValue {
                    schema,
                    value: value.to_string(),
                });
                Ok(())
            }
            Err(reason) => Err(DecodeError::InvalidValue {
                node: self.ctx.node_path(schema),
                value: value.to_string(),
                reason: reason.to_string(),
            }),
        }
    }

    fn read_metadata(&mut self) -> Result<Vec<Metadata>, DecodeError> {
        let count = self.reader.read_byte("metadata count")? as usize;
        let mut metadata = Vec::with_capacity(count);
        for _ in 0..count {
            self.reader.push_frame()?;
            let (module_name, revision) = self.read_module_ref()?;
            let name = self.reader.read_string("metadata name")?;
            let module = resolve_module(self.ctx, &module_name, revision.as_ref())
                .filter(|&m| self.ctx.module(m).has_annotation(&name));
            match module {
                Some(module) => {
                    let value = self.reader.read_bounded_string("metadata value")?;
                    metadata.push(Metadata {
                        module,
                        name,
                        value,
                    });
                }
                None => {
                    tracing::debug!(module = %module_name, %name, "skipping unknown metadata");
                    self.reader.skip_subtree()?;
                }
            }
            self.reader.pop_frame()?;
        }
        Ok(metadata)
    }

    fn read_any_value(&mut self, depth: usize) -> Result<AnyValue, DecodeError> {
        let tag = self.reader.read_byte("anydata value type")?;
        let value_type = AnyValueType::from_u8(tag).ok_or(DecodeError::InvalidAnyValueType { tag })?;
        Ok(match value_type {
            AnyValueType::String => AnyValue::String(self.reader.read_bounded_string("anydata value")?),
            AnyValueType::Xml => AnyValue::Xml(self.reader.read_bounded_string("anydata value")?),
            AnyValueType::Json => AnyValue::Json(self.reader.read_bounded_string("anydata value")?),
            AnyValueType::Lyb => {
                let bytes = self.reader.read_bounded("anydata value")?;
                let nested_depth = depth + NESTED_DOCUMENT_DEPTH;
                match decode_nested(self.ctx, &bytes, self.options, self.chunk_max, nested_depth) {
                    Ok(tree) => AnyValue::Tree(tree),
                    Err(error) => {
                        tracing::debug!(%error, len = bytes.len(), "keeping anydata LYB value undecoded");
                        AnyValue::Lyb(bytes)
                    }
                }
            }
        })
    }

    fn read_prefix_table(&mut self) -> Result<Vec<PrefixMapping>, DecodeError> {
        let count = self.reader.read_byte("value prefix count")? as usize;
        let mut prefixes = Vec::with_capacity(count);
        for _ in 0..count {
            let prefix = self.reader.read_string("value prefix")?;
            let module_ns = self.reader.read_string("value prefix namespace")?;
            prefixes.push(PrefixMapping { prefix, module_ns });
        }
        Ok(prefixes)
    }

    fn read_format(&mut self) -> Result<ValueFormat, DecodeError> {
        let format = self.reader.read_byte("value format")?;
        ValueFormat::from_u8(format).ok_or(DecodeError::InvalidValueFormat { format })
    }

    fn decode_opaque(&mut self, depth: usize) -> Result<OpaqueNode, DecodeError> {
        let count = self.reader.read_byte("attribute count")? as usize;
        let mut attributes = Vec::with_capacity(count);
        for _ in 0..count {
            self.reader.push_frame()?;
            let prefix = self.reader.read_string("attribute prefix")?;
            let module_ns = self.reader.read_string("attribute namespace")?;
            let name = self.reader.read_string("attribute name")?;
            let value_prefixes = self.read_prefix_table()?;
            let format = self.read_format()?;
            let value = self.reader.read_bounded_string("attribute value")?;
            self.reader.pop_frame()?;
            attributes.push(Attribute {
                prefix,
                module_ns,
                name,
                value,
                format,
                value_prefixes,
            });
        }

        let prefix = self.reader.read_string("opaque prefix")?;
        let module_ns = self.reader.read_string("opaque namespace")?;
        let name = self.reader.read_string("opaque name")?;
        let value_prefixes = self.read_prefix_table()?;
        let format = self.read_format()?;
        let value = self.reader.read_string("opaque value")?;

        let mut children = Vec::new();
        while !self.reader.top_exhausted() {
            children.push(self.decode_subtree(Parent::Opaque, depth + 1)?);
        }

        Ok(OpaqueNode {
            name,
            prefix,
            module_ns,
            value,
            format,
            value_prefixes,
            attributes,
            children,
        })
    }

    // =========================================================================
    // Skipping
    // =========================================================================
    //
    // A subtree without a schema node is walked field by field rather than
    // dropped with `LybReader::skip_subtree`. Its nested meta records are
    // then read where they lie, which stays in sync even when an enclosing
    // chunk boundary falls inside one of its chunks.

    /// Discards the rest of a schema node subtree, starting after its hash
    /// sequence.
    fn skip_schema_node(&mut self, depth: usize) -> Result<(), DecodeError> {
        let count = self.reader.read_byte("metadata count")?;
        for _ in 0..count {
            self.reader.push_frame()?;
            self.reader.skip_subtree()?;
            self.reader.pop_frame()?;
        }
        // only child subtrees leave meta records in the chunk after metadata
        if self.reader.top().is_some_and(|top| top.inner_chunks > 0) {
            self.skip_children(false, depth)
        } else {
            self.reader.skip_subtree()
        }
    }

    fn skip_opaque(&mut self, depth: usize) -> Result<(), DecodeError> {
        let count = self.reader.read_byte("attribute count")?;
        for _ in 0..count {
            self.reader.push_frame()?;
            self.reader.skip_subtree()?;
            self.reader.pop_frame()?;
        }
        self.reader.skip_string("opaque prefix")?;
        self.reader.skip_string("opaque namespace")?;
        self.reader.skip_string("opaque name")?;
        let prefixes = self.reader.read_byte("value prefix count")?;
        for _ in 0..prefixes {
            self.reader.skip_string("value prefix")?;
            self.reader.skip_string("value prefix namespace")?;
        }
        self.read_format()?;
        self.reader.skip_string("opaque value")?;
        self.skip_children(true, depth)
    }

    fn skip_children(&mut self, carry_module: bool, depth: usize) -> Result<(), DecodeError> {
        while !self.reader.top_exhausted() {
            self.skip_node(carry_module, depth + 1)?;
        }
        Ok(())
    }

    fn skip_node(&mut self, carry_module: bool, depth: usize) -> Result<(), DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::DepthLimitExceeded { max: MAX_DEPTH });
        }
        self.reader.push_frame()?;
        if carry_module {
            self.reader.skip_string("module name")?;
            self.reader.read_u16("module revision")?;
        }
        match read_hash_sequence(&mut self.reader)? {
            Some(_) => self.skip_schema_node(depth)?,
            None => self.skip_opaque(depth)?,
        }
        self.reader.pop_frame()
    }
}

/// Looks up a module by name and revision, falling back to the implemented
/// or latest revision.
pub(crate) fn resolve_module(ctx: &Context, name: &str, revision: Option<&Revision>) -> Option<ModuleId> {
    let id = ctx.find_module(name, revision)?;
    if revision.is_some() && ctx.module(id).revision() != revision {
        tracing::debug!(
            module = name,
            requested = ?revision.map(|r| r.to_string()),
            found = ?ctx.module(id).revision().map(|r| r.to_string()),
            "module revision fallback"
        );
    }
    Some(id)
}
