//! Utility modules for LYB.

pub mod revision;

pub use revision::{Revision, RevisionParseError, pack_revision, unpack_revision};
