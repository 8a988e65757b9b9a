//! Binary encoding/decoding for LYB.
//!
//! Layers, bottom up: byte primitives, bit helpers, schema hashes, chunk
//! framing, subtrees and the document driver.

pub mod bits;
pub mod chunk;
pub mod document;
pub mod hash;
pub mod matcher;
pub(crate) mod node;
pub mod primitives;

pub use chunk::{ChunkFrame, LybReader, LybWriter};
pub use document::{DecodeOptions, decode_data, decode_data_with_options, encode_data};
pub use hash::{HashSequence, HashSequencer, generate_hash};
pub use primitives::{Reader, Writer};
