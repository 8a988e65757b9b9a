//! Simple inspector for LYB files that needs no schema.
//!
//! Prints the header, the module table and one line per top-level subtree.

use std::fs;

use lyb::codec::LybReader;
use lyb::codec::matcher::read_hash_sequence;
use lyb::limits::{HEADER_HASH_MASK, HEADER_VERSION_MASK, MAGIC};
use lyb::util::unpack_revision;
use lyb::DecodeError;

fn format_revision(packed: u16) -> String {
    match unpack_revision(packed) {
        Ok(Some(rev)) => rev.to_string(),
        Ok(None) => "-".to_string(),
        Err(_) => format!("INVALID({:#06x})", packed),
    }
}

fn dump(data: &[u8]) -> Result<(), DecodeError> {
    let mut reader = LybReader::new(data);

    let mut magic = [0u8; 3];
    reader.read_exact(&mut magic, "magic")?;
    if &magic != MAGIC {
        return Err(DecodeError::InvalidMagic { found: magic });
    }
    let header = reader.read_byte("header")?;
    println!("\n=== Header ===");
    println!("Version: {}", header & HEADER_VERSION_MASK);
    println!("Hash algorithm: {:#04x}", header & HEADER_HASH_MASK);

    let count = reader.read_u16("module count")?;
    println!("\n=== Modules ({}) ===", count);
    for _ in 0..count {
        let name = reader.read_string("module name")?;
        let packed = reader.read_u16("module revision")?;
        println!("  - {}@{}", name, format_revision(packed));
    }

    println!("\n=== Top-level subtrees ===");
    let mut subtrees = 0;
    while reader.remaining_len() > 1 {
        let start = reader.position();
        reader.push_frame()?;
        let inner_chunks = reader.top().map_or(0, |f| f.inner_chunks);
        let module = reader.read_string("module name")?;
        let packed = reader.read_u16("module revision")?;
        let hashes = match read_hash_sequence(&mut reader)? {
            Some(seq) => seq.wire_bytes().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(" "),
            None => "opaque".to_string(),
        };
        reader.skip_subtree()?;
        reader.pop_frame()?;

        let module = if module.is_empty() { "-".to_string() } else { module };
        println!(
            "  [{}] {}@{} hash [{}] {} bytes, {} nested chunks",
            subtrees,
            module,
            format_revision(packed),
            hashes,
            reader.position() - start,
            inner_chunks
        );
        subtrees += 1;
    }
    let terminator = reader.read_byte("document terminator")?;
    println!("\nTerminator: {:#04x}", terminator);
    Ok(())
}

fn main() {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "data.lyb".to_string());

    println!("Reading: {}", path);

    let data = fs::read(&path).expect("Failed to read file");
    println!("File size: {} bytes", data.len());

    if let Err(e) = dump(&data) {
        eprintln!("Error ({}): {}", e.kind().label(), e);
        std::process::exit(1);
    }
}
