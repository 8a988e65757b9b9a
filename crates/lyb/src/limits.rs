//! Wire constants and decoding limits for the LYB format.

/// Magic bytes at the start of every LYB document.
pub const MAGIC: &[u8; 3] = b"lyb";

/// Current LYB format version, stored in the low 4 bits of the header byte.
pub const FORMAT_VERSION: u8 = 0x07;

/// Mask of the version bits in the header byte.
pub const HEADER_VERSION_MASK: u8 = 0x0F;

/// One-at-a-time schema hash algorithm id, stored in bits 4-5 of the header.
pub const HEADER_HASH_ALG: u8 = 0x10;

/// Mask of the hash algorithm bits in the header byte.
pub const HEADER_HASH_MASK: u8 = 0x30;

/// Size of a chunk meta record: 2-byte size + 2-byte inner chunk count.
pub const META_RECORD_SIZE: usize = 4;

/// Largest chunk size. A chunk declared with this size is followed by
/// another meta record of the same frame.
pub const CHUNK_SIZE_MAX: u16 = u16::MAX;

/// Largest number of nested meta records a single chunk can account for.
pub const INNER_CHUNKS_MAX: u16 = u16::MAX;

/// Number of bits of a single schema hash (collision id included).
pub const HASH_BITS: u8 = 8;

/// Mask of the content part of a collision id 0 hash.
pub const HASH_MASK: u8 = 0x7F;

/// Shifted right by the collision id to get its marker bit.
pub const HASH_COLLISION_ID: u8 = 0x80;

/// Highest collision id a hash byte can carry.
pub const MAX_COLLISION_ID: u8 = HASH_BITS - 1;

/// Number of collision levels cached on every schema node.
pub const HASH_CACHE_LEN: usize = 4;

/// Maximum metadata or attribute entries on one node (1-byte count).
pub const MAX_METADATA: usize = u8::MAX as usize;

/// Maximum prefix mappings in an opaque value prefix table (1-byte count).
pub const MAX_PREFIXES: usize = u8::MAX as usize;

/// Maximum length of a length-prefixed string (2-byte length).
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Maximum number of modules in a document module table.
pub const MAX_MODULES: usize = u16::MAX as usize;

/// Maximum nesting depth of subtrees, for both decoding and encoding.
///
/// Both directions recurse once per level, so this also bounds stack use.
/// It leaves room for a debug build on a 2 MiB thread.
pub const MAX_DEPTH: usize = 128;

/// Depth charged for entering a document nested in an anydata value.
pub const NESTED_DOCUMENT_DEPTH: usize = 8;

/// Revision years are stored as an offset from this year.
pub const REV_YEAR_OFFSET: u16 = 2000;

/// Bit widths of the packed revision fields, high to low.
pub const REV_YEAR_BITS: u8 = 7;
pub const REV_MONTH_BITS: u8 = 4;
pub const REV_DAY_BITS: u8 = 5;
