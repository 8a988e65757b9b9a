//! Decode-side schema resolution from hash sequences.

use rustc_hash::FxHashSet;

use crate::codec::bits::left_bit_mask;
use crate::codec::chunk::LybReader;
use crate::codec::hash::{HashSequence, collision_id};
use crate::error::DecodeError;
use crate::limits::{HASH_COLLISION_ID, MAX_COLLISION_ID};
use crate::model::{Context, ModuleId, NodeId, SchemaAnchor};

/// Reads a hash sequence. Returns `None` for the opaque marker `0x00`.
pub fn read_hash_sequence(reader: &mut LybReader<'_>) -> Result<Option<HashSequence>, DecodeError> {
    let first = reader.read_byte("schema hash")?;
    let Some(id) = collision_id(first) else {
        return Ok(None);
    };

    let mut levels = [0u8; MAX_COLLISION_ID as usize + 1];
    levels[id as usize] = first;
    for level in (0..id).rev() {
        let byte = reader.read_byte("schema hash")?;
        if !carries_collision_id(byte, level) {
            return Err(DecodeError::InvalidHashSequence {
                byte,
                expected: level,
            });
        }
        levels[level as usize] = byte;
    }
    Ok(Some(HashSequence::from_levels(&levels[..=id as usize])))
}

/// True if `byte` has the marker bit of `level` set and every bit above it clear.
#[inline]
fn carries_collision_id(byte: u8, level: u8) -> bool {
    byte & left_bit_mask(level + 1) == HASH_COLLISION_ID >> level
}

/// Finds the first sibling under `anchor` that produces `sequence`.
///
/// With `modules` set, only siblings from those modules are candidates.
pub fn match_sibling(
    ctx: &Context,
    anchor: SchemaAnchor,
    modules: Option<&FxHashSet<ModuleId>>,
    sequence: &HashSequence,
) -> Option<NodeId> {
    ctx.candidates(anchor)
        .iter()
        .copied()
        .filter(|&id| modules.is_none_or(|set| set.contains(&ctx.node(id).module())))
        .find(|&id| sequence.matches(ctx, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::hash::HashSequencer;
    use crate::codec::hash::generate_hash;
    use crate::model::DataType;

    fn reader_over(bytes: &[u8]) -> Vec<u8> {
        // a single terminal chunk around the bytes
        let mut data = vec![bytes.len() as u8, 0, 0, 0];
        data.extend_from_slice(bytes);
        data
    }

    #[test]
    fn test_opaque_marker() {
        let data = reader_over(&[0x00]);
        let mut reader = LybReader::new(&data);
        reader.push_frame().unwrap();
        assert_eq!(read_hash_sequence(&mut reader).unwrap(), None);
    }

    #[test]
    fn test_reads_levels_high_to_low() {
        let data = reader_over(&[0x25, 0x51, 0x93]);
        let mut reader = LybReader::new(&data);
        reader.push_frame().unwrap();
        let seq = read_hash_sequence(&mut reader).unwrap().unwrap();
        assert_eq!(seq.collision_id(), 2);
        assert_eq!(seq.levels(), &[0x93, 0x51, 0x25]);
        assert!(reader.top_exhausted());
    }

    #[test]
    fn test_rejects_wrong_marker() {
        // level 1 byte expected after a level 2 byte, got a level 0 byte
        let data = reader_over(&[0x25, 0x93]);
        let mut reader = LybReader::new(&data);
        reader.push_frame().unwrap();
        assert_eq!(
            read_hash_sequence(&mut reader),
            Err(DecodeError::InvalidHashSequence {
                byte: 0x93,
                expected: 1
            })
        );
    }

    #[test]
    fn test_match_sibling_round_trip() {
        let mut ctx = Context::new();
        let m = ctx.add_module("example-module", None).unwrap();
        let top = ctx.add_container(m, None, "top").unwrap();
        let children: Vec<NodeId> = (0..100)
            .map(|i| {
                ctx.add_leaf(m, Some(top), &format!("leaf{i}"), DataType::String)
                    .unwrap()
            })
            .collect();

        let mut sequencer = HashSequencer::new(&ctx, [m]);
        for &child in &children {
            let seq = sequencer.sequence(child).unwrap();
            let found = match_sibling(&ctx, SchemaAnchor::Node(top), None, &seq);
            assert_eq!(found, Some(child));
        }
    }

    #[test]
    fn test_match_respects_module_filter() {
        let mut ctx = Context::new();
        let m = ctx.add_module("m", None).unwrap();
        let other = ctx.add_module("other", None).unwrap();
        let top = ctx.add_container(m, None, "top").unwrap();
        let aug = ctx.add_leaf(other, Some(top), "x", DataType::String).unwrap();
        let seq = HashSequence::from_levels(&[generate_hash("other", "x", 0)]);

        let only_m: FxHashSet<ModuleId> = [m].into_iter().collect();
        assert_eq!(match_sibling(&ctx, SchemaAnchor::Node(top), Some(&only_m), &seq), None);
        assert_eq!(match_sibling(&ctx, SchemaAnchor::Node(top), None, &seq), Some(aug));
    }
}
