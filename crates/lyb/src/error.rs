//! Error types for LYB encoding/decoding and schema construction.

use thiserror::Error;

/// Coarse classification of decode failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed wire data: bad magic/version, broken framing, truncated input.
    Malformed,
    /// Schema resolution failed (unknown module, unmatched hash, dangling reference).
    Reference,
    /// Allocation failure.
    Resource,
    /// Data is well-formed but not valid for its schema or decode mode.
    Validation,
    /// A library invariant was violated; not attributable to the input.
    Internal,
}

impl ErrorKind {
    /// Returns a short lowercase label (e.g., "malformed").
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Malformed => "malformed",
            ErrorKind::Reference => "reference",
            ErrorKind::Resource => "resource",
            ErrorKind::Validation => "validation",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Error during LYB decoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    // === Malformed ===
    #[error("invalid magic bytes: expected \"lyb\", found {found:?}")]
    InvalidMagic { found: [u8; 3] },

    #[error("unsupported LYB version: {version}")]
    UnsupportedVersion { version: u8 },

    #[error("unexpected end of input while reading {context}")]
    UnexpectedEof { context: &'static str },

    #[error("read of {requested} bytes overruns a terminal chunk with {available} bytes left")]
    ChunkOverrun { requested: usize, available: u16 },

    #[error("chunk closed with {remaining} unread bytes")]
    UnterminatedChunk { remaining: u16 },

    #[error("cannot skip chunk with {inner_chunks} nested meta records across an enclosing chunk boundary")]
    AmbiguousSkip { inner_chunks: u16 },

    #[error("hash byte {byte:#04x} does not carry collision id {expected}")]
    InvalidHashSequence { byte: u8, expected: u8 },

    #[error("invalid packed revision {packed:#06x}")]
    InvalidRevision { packed: u16 },

    #[error("invalid anydata value type: {tag}")]
    InvalidAnyValueType { tag: u8 },

    #[error("invalid opaque value format: {format}")]
    InvalidValueFormat { format: u8 },

    #[error("invalid UTF-8 in {field}")]
    InvalidUtf8 { field: &'static str },

    #[error("{field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("nesting depth exceeds maximum {max}")]
    DepthLimitExceeded { max: usize },

    // === Reference ===
    #[error("module \"{name}@{}\" not found in the context", revision.as_deref().unwrap_or("<none>"))]
    UnknownModule {
        name: String,
        revision: Option<String>,
    },

    #[error("no schema node under {anchor} matches hash sequence {hashes:02x?}")]
    UnresolvedHash { anchor: String, hashes: Vec<u8> },

    #[error("value \"{value}\" of {node} does not reference an existing instance")]
    UnresolvedReference { node: String, value: String },

    // === Resource ===
    #[error("memory allocation failed while reading {context}")]
    AllocationFailed { context: &'static str },

    // === Validation ===
    #[error("invalid value \"{value}\" of {node}: {reason}")]
    InvalidValue {
        node: String,
        value: String,
        reason: String,
    },

    #[error("state data node {node} is not allowed")]
    StateDataForbidden { node: String },

    #[error("unexpected second operation node {node}")]
    MultipleOperations { node: String },

    // === Internal ===
    #[error("internal error: {context}")]
    Internal { context: &'static str },
}

impl DecodeError {
    /// Returns the error classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::UnknownModule { .. }
            | DecodeError::UnresolvedHash { .. }
            | DecodeError::UnresolvedReference { .. } => ErrorKind::Reference,
            DecodeError::AllocationFailed { .. } => ErrorKind::Resource,
            DecodeError::InvalidValue { .. }
            | DecodeError::StateDataForbidden { .. }
            | DecodeError::MultipleOperations { .. } => ErrorKind::Validation,
            DecodeError::Internal { .. } => ErrorKind::Internal,
            _ => ErrorKind::Malformed,
        }
    }
}

/// Error during LYB encoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("{field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("too many nested meta records in one chunk")]
    TooManyInnerChunks,

    #[error("no collision-free hash sequence for {node}")]
    HashCollision { node: String },

    #[error("schema node id {id} does not exist in the context")]
    UnknownSchemaNode { id: usize },

    #[error("data node for {node} does not match its schema: {reason}")]
    SchemaMismatch { node: String, reason: &'static str },

    #[error("data tree nesting depth exceeds maximum {max}")]
    DepthLimitExceeded { max: usize },

    #[error("internal error: {context}")]
    Internal { context: &'static str },
}

/// Error while building a schema context or a data tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("module \"{name}\" revision {revision:?} already exists")]
    DuplicateModule {
        name: String,
        revision: Option<String>,
    },

    #[error("invalid revision \"{revision}\": {reason}")]
    InvalidRevision { revision: String, reason: String },

    #[error("module \"{name}\" not found")]
    UnknownModule { name: String },

    #[error("schema node {path} not found")]
    UnknownNode { path: String },

    #[error("schema node {path} already exists")]
    DuplicateNode { path: String },

    #[error("{kind} cannot be placed under {parent}")]
    InvalidParent { parent: String, kind: &'static str },

    #[error("annotation \"{name}\" is not defined by module \"{module}\"")]
    UnknownAnnotation { module: String, name: String },

    #[error("schema node {node} is not a {expected}")]
    KindMismatch { node: String, expected: &'static str },

    #[error("invalid value \"{value}\" of {node}: {reason}")]
    InvalidValue {
        node: String,
        value: String,
        reason: String,
    },
}
