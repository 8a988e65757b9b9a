//! Schema node hashing.
//!
//! Every schema node is identified on the wire by a short sequence of hash
//! bytes instead of its qualified name. A hash byte carries its collision id
//! as the position of its highest set bit: bit `0x80 >> id` is set and every
//! bit above it is clear. The remaining low bits hold a truncated
//! one-at-a-time hash of the module and node names.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::EncodeError;
use crate::limits::{HASH_COLLISION_ID, HASH_MASK, MAX_COLLISION_ID};
use crate::model::{Context, ModuleId, NodeId, SchemaAnchor};

/// Mixes `part` into a running one-at-a-time hash.
///
/// An empty `part` finalizes the hash.
pub fn multi_hash(mut hash: u32, part: &[u8]) -> u32 {
    if part.is_empty() {
        hash = hash.wrapping_add(hash << 3);
        hash ^= hash >> 11;
        hash = hash.wrapping_add(hash << 15);
    } else {
        for &byte in part {
            hash = hash.wrapping_add(byte as u32);
            hash = hash.wrapping_add(hash << 10);
            hash ^= hash >> 6;
        }
    }
    hash
}

/// Computes the hash byte of a node at the given collision level.
///
/// Each level past 0 mixes in one more leading byte of the module name, up
/// to its full length, and keeps one bit less of the resulting hash.
pub fn generate_hash(module_name: &str, node_name: &str, collision_id: u8) -> u8 {
    debug_assert!(collision_id <= MAX_COLLISION_ID);
    let module = module_name.as_bytes();

    let mut full = multi_hash(0, module);
    full = multi_hash(full, node_name.as_bytes());
    if collision_id > 0 {
        let ext_len = (collision_id as usize).min(module.len());
        full = multi_hash(full, &module[..ext_len]);
    }
    full = multi_hash(full, &[]);

    let short = (full as u8) & (HASH_MASK >> collision_id);
    short | (HASH_COLLISION_ID >> collision_id)
}

/// Returns the hash byte of a schema node, from its cache when possible.
pub fn get_hash(ctx: &Context, node: NodeId, collision_id: u8) -> u8 {
    let schema = ctx.node(node);
    match schema.cached_hash(collision_id) {
        Some(hash) => hash,
        None => generate_hash(ctx.module(schema.module()).name(), schema.name(), collision_id),
    }
}

/// Returns the collision id carried by a hash byte, or `None` for `0x00`.
#[inline]
pub fn collision_id(hash: u8) -> Option<u8> {
    if hash == 0 {
        None
    } else {
        Some(hash.leading_zeros() as u8)
    }
}

/// Hash bytes identifying one node among its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashSequence {
    hashes: [u8; MAX_COLLISION_ID as usize + 1],
    collision_id: u8,
}

impl HashSequence {
    /// Builds a sequence from hash bytes ordered by collision level.
    ///
    /// `levels` holds `hash[0]` first and must have 1 to 8 entries.
    pub fn from_levels(levels: &[u8]) -> Self {
        debug_assert!(!levels.is_empty() && levels.len() <= MAX_COLLISION_ID as usize + 1);
        let mut hashes = [0u8; MAX_COLLISION_ID as usize + 1];
        hashes[..levels.len()].copy_from_slice(levels);
        Self {
            hashes,
            collision_id: levels.len() as u8 - 1,
        }
    }

    /// Returns the highest collision id in the sequence.
    pub fn collision_id(&self) -> u8 {
        self.collision_id
    }

    /// Returns the hashes of levels `0..=collision_id`.
    pub fn levels(&self) -> &[u8] {
        &self.hashes[..=self.collision_id as usize]
    }

    /// Returns the hashes in wire order (highest level first).
    pub fn wire_bytes(&self) -> impl Iterator<Item = u8> + '_ {
        self.levels().iter().rev().copied()
    }

    /// Returns true if `node` produces this sequence.
    pub fn matches(&self, ctx: &Context, node: NodeId) -> bool {
        self.levels()
            .iter()
            .enumerate()
            .all(|(level, &hash)| get_hash(ctx, node, level as u8) == hash)
    }
}

/// Assigns each schema node the shortest hash sequence that tells it apart
/// from the siblings declared before it.
///
/// Candidates for a parent are limited to the modules of the document's
/// module table, in declaration order. The decoder scans them in the same
/// order and takes the first match, so each node only has to differ from
/// the earlier ones.
#[derive(Debug)]
pub struct HashSequencer<'c> {
    ctx: &'c Context,
    modules: FxHashSet<ModuleId>,
    collision_ids: FxHashMap<NodeId, Option<u8>>,
    done: FxHashSet<SchemaAnchor>,
}

impl<'c> HashSequencer<'c> {
    /// Creates a sequencer for a document using the given modules.
    pub fn new(ctx: &'c Context, modules: impl IntoIterator<Item = ModuleId>) -> Self {
        Self {
            ctx,
            modules: modules.into_iter().collect(),
            collision_ids: FxHashMap::default(),
            done: FxHashSet::default(),
        }
    }

    /// Returns the hash sequence to write for `node`.
    pub fn sequence(&mut self, node: NodeId) -> Result<HashSequence, EncodeError> {
        let anchor = self.ctx.anchor_of(node);
        if self.done.insert(anchor) {
            self.assign(anchor);
        }
        match self.collision_ids.get(&node) {
            Some(Some(id)) => {
                let levels: Vec<u8> = (0..=*id).map(|level| get_hash(self.ctx, node, level)).collect();
                Ok(HashSequence::from_levels(&levels))
            }
            Some(None) => Err(EncodeError::HashCollision {
                node: self.ctx.node_path(node),
            }),
            None => Err(EncodeError::SchemaMismatch {
                node: self.ctx.node_path(node),
                reason: "module is missing from the module table",
            }),
        }
    }

    fn assign(&mut self, anchor: SchemaAnchor) {
        let ctx = self.ctx;
        let candidates: Vec<NodeId> = ctx
            .candidates(anchor)
            .iter()
            .copied()
            .filter(|&id| self.modules.contains(&ctx.node(id).module()))
            .collect();

        for (k, &node) in candidates.iter().enumerate() {
            let earlier = &candidates[..k];
            let id = (0..=MAX_COLLISION_ID).find(|&level| {
                !earlier.iter().any(|&prev| {
                    (0..=level).all(|l| get_hash(ctx, prev, l) == get_hash(ctx, node, l))
                })
            });
            self.collision_ids.insert(node, id);
        }
        tracing::trace!(?anchor, candidates = candidates.len(), "assigned hash collision ids");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DataType;
    use proptest::prelude::*;

    #[test]
    fn test_multi_hash_known_values() {
        // one-at-a-time over "a" then finalize
        let mut h = multi_hash(0, b"a");
        assert_eq!(h, 0x0001_8270);
        h = multi_hash(h, &[]);
        assert_eq!(h, multi_hash(multi_hash(0, b"a"), b""));
        assert_ne!(h, 0);
    }

    #[test]
    fn test_collision_id() {
        assert_eq!(collision_id(0), None);
        assert_eq!(collision_id(0x80), Some(0));
        assert_eq!(collision_id(0xFF), Some(0));
        assert_eq!(collision_id(0x40), Some(1));
        assert_eq!(collision_id(0x01), Some(7));
    }

    #[test]
    fn test_cache_matches_generation() {
        let mut ctx = Context::new();
        let m = ctx.add_module("example", None).unwrap();
        let leaf = ctx.add_leaf(m, None, "name", DataType::String).unwrap();
        for level in 0..=MAX_COLLISION_ID {
            assert_eq!(get_hash(&ctx, leaf, level), generate_hash("example", "name", level));
        }
    }

    #[test]
    fn test_sequencer_resolves_collision() {
        let mut ctx = Context::new();
        let m = ctx.add_module("example", None).unwrap();
        // find two names colliding at level 0
        let mut names = Vec::new();
        let mut seen: FxHashMap<u8, String> = FxHashMap::default();
        for i in 0..200 {
            let name = format!("n{i}");
            let hash = generate_hash("example", &name, 0);
            if let Some(first) = seen.get(&hash) {
                names.push(first.clone());
                names.push(name);
                break;
            }
            seen.insert(hash, name);
        }
        let a = ctx.add_container(m, None, &names[0]).unwrap();
        let b = ctx.add_container(m, None, &names[1]).unwrap();

        let mut sequencer = HashSequencer::new(&ctx, [m]);
        let first = sequencer.sequence(a).unwrap();
        let second = sequencer.sequence(b).unwrap();
        assert_eq!(first.collision_id(), 0);
        assert!(second.collision_id() > 0);
        assert!(first.matches(&ctx, a));
        assert!(second.matches(&ctx, b));
        assert!(!second.matches(&ctx, a));
        // wire order starts with the highest level
        let wire: Vec<u8> = second.wire_bytes().collect();
        assert_eq!(collision_id(wire[0]), Some(second.collision_id()));
        assert_eq!(collision_id(*wire.last().unwrap()), Some(0));
    }

    #[test]
    fn test_sequencer_reports_exhausted_levels() {
        // with a one-byte module name every level past 1 hashes the same
        // input as level 1, so a collision at levels 0 and 1 cannot resolve
        let mut pair = None;
        let mut seen: FxHashMap<(u8, u8), String> = FxHashMap::default();
        for i in 0..20_000 {
            let name = format!("n{i}");
            let key = (generate_hash("m", &name, 0), generate_hash("m", &name, 1));
            if let Some(first) = seen.get(&key) {
                pair = Some((first.clone(), name));
                break;
            }
            seen.insert(key, name);
        }
        let (first, second) = pair.unwrap();

        let mut ctx = Context::new();
        let m = ctx.add_module("m", None).unwrap();
        let a = ctx.add_container(m, None, &first).unwrap();
        let b = ctx.add_container(m, None, &second).unwrap();
        for level in 0..=MAX_COLLISION_ID {
            assert_eq!(get_hash(&ctx, a, level), get_hash(&ctx, b, level));
        }

        let mut sequencer = HashSequencer::new(&ctx, [m]);
        assert_eq!(sequencer.sequence(a).unwrap().collision_id(), 0);
        assert!(matches!(
            sequencer.sequence(b),
            Err(EncodeError::HashCollision { node }) if node.ends_with(&second)
        ));
    }

    #[test]
    fn test_sequencer_rejects_module_outside_table() {
        let mut ctx = Context::new();
        let m = ctx.add_module("m", None).unwrap();
        let other = ctx.add_module("other", None).unwrap();
        let top = ctx.add_container(m, None, "top").unwrap();
        let aug = ctx.add_leaf(other, Some(top), "extra", DataType::String).unwrap();
        let mut sequencer = HashSequencer::new(&ctx, [m]);
        assert!(matches!(
            sequencer.sequence(aug),
            Err(EncodeError::SchemaMismatch { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_hash_carries_collision_id(
            module in "[a-z][a-z0-9-]{0,15}",
            node in "[a-z][a-z0-9-]{0,15}",
            level in 0u8..=7,
        ) {
            let hash = generate_hash(&module, &node, level);
            prop_assert_ne!(hash, 0);
            prop_assert_eq!(collision_id(hash), Some(level));
        }
    }
}
