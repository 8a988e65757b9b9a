//! Document encoding/decoding for LYB.
//!
//! A document is the magic, a header byte, the module table, any number of
//! top-level subtrees and a single `0x00` terminator as its last byte.

use rustc_hash::FxHashSet;

use crate::codec::chunk::{LybReader, LybWriter};
use crate::codec::node::{SubtreeDecoder, SubtreeEncoder, resolve_module};
use crate::error::{DecodeError, EncodeError};
use crate::limits::{
    CHUNK_SIZE_MAX, FORMAT_VERSION, HEADER_HASH_ALG, HEADER_HASH_MASK, HEADER_VERSION_MASK, MAGIC,
    MAX_MODULES,
};
use crate::model::{Context, DataNode, ModuleId};
use crate::util::{pack_revision, unpack_revision};
use crate::validate::{DeferredValue, unresolved_references};

// =============================================================================
// DECODING
// =============================================================================

/// Options for decoding documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Fail on nodes and modules the context does not know.
    ///
    /// When disabled, such nodes are decoded as opaque placeholders and
    /// unknown modules of the module table are ignored.
    pub strict: bool,
    /// Reject state data (config false) nodes.
    pub no_state: bool,
    /// Check leafref and instance-identifier values against the decoded
    /// tree.
    pub resolve_references: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeOptions {
    /// Creates lenient decoding options.
    pub fn new() -> Self {
        Self {
            strict: false,
            no_state: false,
            resolve_references: true,
        }
    }

    /// Creates strict decoding options.
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::new()
        }
    }

    /// Sets whether state data is rejected.
    pub fn with_no_state(mut self, no_state: bool) -> Self {
        self.no_state = no_state;
        self
    }
}

/// Decodes a document with lenient options.
pub fn decode_data(ctx: &Context, input: &[u8]) -> Result<Vec<DataNode>, DecodeError> {
    decode_data_with_options(ctx, input, DecodeOptions::new())
}

/// Decodes a document.
///
/// Either the complete tree is returned or an error; nothing partial.
pub fn decode_data_with_options(
    ctx: &Context,
    input: &[u8],
    options: DecodeOptions,
) -> Result<Vec<DataNode>, DecodeError> {
    decode_document(ctx, input, options, CHUNK_SIZE_MAX, 0)
}

/// Decodes a document nested in an anydata value.
pub(crate) fn decode_nested(
    ctx: &Context,
    input: &[u8],
    options: DecodeOptions,
    chunk_max: u16,
    depth: usize,
) -> Result<Vec<DataNode>, DecodeError> {
    decode_document(ctx, input, options, chunk_max, depth)
}

pub(crate) fn decode_document(
    ctx: &Context,
    input: &[u8],
    options: DecodeOptions,
    chunk_max: u16,
    depth: usize,
) -> Result<Vec<DataNode>, DecodeError> {
    let mut reader = LybReader::with_chunk_max(input, chunk_max);
    read_header(&mut reader)?;
    let modules = read_module_table(ctx, &mut reader, options.strict)?;

    let mut decoder = SubtreeDecoder::new(ctx, reader, options, modules, depth, chunk_max);
    let mut tree = Vec::new();
    loop {
        let reader = decoder.reader_mut();
        // a lone trailing zero is the terminator, anything longer a subtree
        match (reader.remaining_len(), reader.peek_byte()) {
            (0, _) => return Err(DecodeError::UnexpectedEof { context: "document terminator" }),
            (1, Some(0)) => {
                reader.read_byte("document terminator")?;
                break;
            }
            _ => tree.push(decoder.decode_top_level()?),
        }
    }

    let deferred = decoder.into_deferred();
    resolve_deferred(ctx, &tree, &deferred, options)?;
    Ok(tree)
}

fn read_header(reader: &mut LybReader<'_>) -> Result<(), DecodeError> {
    let mut magic = [0u8; 3];
    reader.read_exact(&mut magic, "magic")?;
    if &magic != MAGIC {
        return Err(DecodeError::InvalidMagic { found: magic });
    }

    let header = reader.read_byte("header")?;
    let version = header & HEADER_VERSION_MASK;
    if version != FORMAT_VERSION {
        return Err(DecodeError::UnsupportedVersion { version });
    }
    let hash_alg = header & HEADER_HASH_MASK;
    if hash_alg != HEADER_HASH_ALG {
        tracing::debug!(hash_alg, "unexpected hash algorithm id in header");
    }
    Ok(())
}

/// Reads the module table and returns the modules the context knows.
fn read_module_table(
    ctx: &Context,
    reader: &mut LybReader<'_>,
    strict: bool,
) -> Result<FxHashSet<ModuleId>, DecodeError> {
    let count = reader.read_u16("module count")?;
    let mut modules = FxHashSet::default();
    for _ in 0..count {
        let name = reader.read_string("module name")?;
        let packed = reader.read_u16("module revision")?;
        let revision = unpack_revision(packed).map_err(|_| DecodeError::InvalidRevision { packed })?;
        match resolve_module(ctx, &name, revision.as_ref()) {
            Some(id) => {
                modules.insert(id);
            }
            None if strict => {
                return Err(DecodeError::UnknownModule {
                    name,
                    revision: revision.map(|r| r.to_string()),
                });
            }
            None => tracing::debug!(module = %name, "ignoring unknown module of the module table"),
        }
    }
    Ok(modules)
}

fn resolve_deferred(
    ctx: &Context,
    tree: &[DataNode],
    deferred: &[DeferredValue],
    options: DecodeOptions,
) -> Result<(), DecodeError> {
    if !options.resolve_references || deferred.is_empty() {
        return Ok(());
    }
    for value in unresolved_references(ctx, tree, deferred) {
        let node = ctx.node_path(value.schema);
        if options.strict {
            return Err(DecodeError::UnresolvedReference {
                node,
                value: value.value,
            });
        }
        tracing::debug!(%node, value = %value.value, "unresolved reference");
    }
    Ok(())
}

// =============================================================================
// ENCODING
// =============================================================================

/// Encodes a data tree as a LYB document.
pub fn encode_data(ctx: &Context, tree: &[DataNode]) -> Result<Vec<u8>, EncodeError> {
    encode_document(ctx, tree, CHUNK_SIZE_MAX, 0)
}

/// Encodes a tree nested in an anydata value.
pub(crate) fn encode_nested(
    ctx: &Context,
    tree: &[DataNode],
    chunk_max: u16,
    depth: usize,
) -> Result<Vec<u8>, EncodeError> {
    encode_document(ctx, tree, chunk_max, depth)
}

pub(crate) fn encode_document(
    ctx: &Context,
    tree: &[DataNode],
    chunk_max: u16,
    depth: usize,
) -> Result<Vec<u8>, EncodeError> {
    let modules = collect_modules(ctx, tree)?;
    if modules.len() > MAX_MODULES {
        return Err(EncodeError::LengthExceedsLimit {
            field: "module table",
            len: modules.len(),
            max: MAX_MODULES,
        });
    }

    let mut writer = LybWriter::with_chunk_max(chunk_max);
    writer.write(MAGIC)?;
    writer.write_byte(FORMAT_VERSION | HEADER_HASH_ALG)?;
    writer.write_u16(modules.len() as u16)?;
    for &id in &modules {
        let module = ctx.module(id);
        writer.write_string(module.name(), "module name")?;
        writer.write_u16(pack_revision(module.revision()))?;
    }

    let mut encoder = SubtreeEncoder::new(ctx, writer, &modules, depth, chunk_max);
    for node in tree {
        encoder.encode_top_level(node)?;
    }
    let mut writer = encoder.into_writer();
    writer.write_byte(0)?;
    writer.into_bytes()
}

/// Returns the modules used by a tree in order of first appearance.
///
/// Nested anydata trees are separate documents with their own table. The
/// walk keeps its own stack, so trees too deep to encode are still
/// reported by the encoder rather than overflowing here.
fn collect_modules(ctx: &Context, tree: &[DataNode]) -> Result<Vec<ModuleId>, EncodeError> {
    let mut seen = FxHashSet::default();
    let mut order = Vec::new();
    let mut stack = vec![tree.iter()];
    while let Some(level) = stack.last_mut() {
        let Some(node) = level.next() else {
            stack.pop();
            continue;
        };
        if let Some(schema) = node.schema() {
            let n = ctx
                .get_node(schema)
                .ok_or(EncodeError::UnknownSchemaNode { id: schema.index() })?;
            if seen.insert(n.module()) {
                order.push(n.module());
            }
        }
        for meta in node.metadata() {
            if ctx.get_module(meta.module).is_some() && seen.insert(meta.module) {
                order.push(meta.module);
            }
        }
        stack.push(node.children().iter());
    }
    Ok(order)
}
