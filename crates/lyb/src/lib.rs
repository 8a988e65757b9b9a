//! LYB: compact binary encoding for YANG-modeled data trees.
//!
//! This crate encodes data trees into LYB documents and decodes them back,
//! resolving every node against a schema [`Context`](model::Context).
//!
//! # Overview
//!
//! LYB replaces node names with short schema hashes:
//! - **Hashes, not names**: a node is identified among its schema siblings
//!   by 1 to 8 hash bytes
//! - **Chunked subtrees**: every subtree is length-framed, so a reader can
//!   skip what it does not understand
//! - **Lenient or strict**: unknown nodes either fail decoding or survive as
//!   opaque placeholders
//!
//! # Quick Start
//!
//! ```rust
//! use lyb::model::{Context, DataType, TreeBuilder};
//! use lyb::codec::{decode_data, encode_data};
//!
//! let mut ctx = Context::new();
//! let m = ctx.add_module("example", Some("2024-01-15")).unwrap();
//! let top = ctx.add_container(m, None, "top").unwrap();
//! ctx.add_leaf(m, Some(top), "name", DataType::String).unwrap();
//!
//! let tree = TreeBuilder::new(&ctx)
//!     .container("example", "top", |c| c.leaf("example", "name", "Alice"))
//!     .build()
//!     .unwrap();
//!
//! let bytes = encode_data(&ctx, &tree).unwrap();
//! let decoded = decode_data(&ctx, &bytes).unwrap();
//! assert_eq!(tree, decoded);
//! ```
//!
//! # Modules
//!
//! - [`model`]: Schema context, data trees and the tree builder
//! - [`codec`]: Binary encoding/decoding
//! - [`validate`]: Legality checks and reference resolution
//! - [`util`]: Revision dates
//! - [`error`]: Error types
//! - [`limits`]: Wire constants and decoding limits
//!
//! # Security
//!
//! Input is treated as untrusted:
//! - Buffer allocations sized by the input are fallible
//! - Nesting depth is bounded
//! - Reads never cross the end of a terminal chunk
//!
//! # Wire Format
//!
//! `lyb` magic + header byte + module table + chunk-framed subtrees + a
//! `0x00` terminator. All integers are little-endian.

pub mod codec;
pub mod error;
pub mod limits;
pub mod model;
pub mod util;
pub mod validate;

// Re-export commonly used types at crate root
pub use codec::{DecodeOptions, decode_data, decode_data_with_options, encode_data};
pub use error::{DecodeError, EncodeError, ErrorKind, SchemaError};
pub use model::{
    AnyValue, Context, DataNode, DataType, ModuleId, NodeId, NodeKind, OpaqueNode, TreeBuilder,
};
pub use util::Revision;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
