//! Benchmark for LYB serialization using flat record data.
//!
//! Loads a JSON array of records, or synthesizes them when no file is given,
//! and measures encoding and decoding of the resulting data tree.

use std::fs;
use std::path::Path;
use std::time::Instant;

use lyb::codec::{DecodeOptions, decode_data_with_options, encode_data};
use lyb::model::{AnyValue, Context, DataNode, DataType, TreeBuilder};
use serde::Deserialize;

const MODULE: &str = "bench-records";
const REVISION: &str = "2024-01-01";
const SYNTHETIC_RECORDS: usize = 50_000;
const DECODE_ITERS: u32 = 10;

// =============================================================================
// JSON DATA STRUCTURES
// =============================================================================

#[derive(Debug, Deserialize)]
struct Record {
    id: String,
    name: String,
    code: Option<String>,
    population: Option<u64>,
    #[serde(rename = "type")]
    record_type: Option<String>,
    tags: Option<Vec<String>>,
    extra: Option<serde_json::Value>,
}

fn synthesize(count: usize) -> Vec<Record> {
    const TYPES: [&str; 3] = ["city", "town", "village"];
    (0..count)
        .map(|i| Record {
            id: uuid::Uuid::new_v4().to_string(),
            name: format!("Record {}", i),
            code: (i % 3 == 0).then(|| format!("R{:05}", i)),
            population: (i % 2 == 0).then_some(i as u64 * 137),
            record_type: Some(TYPES[i % TYPES.len()].to_string()),
            tags: (i % 5 == 0).then(|| vec!["sample".to_string(), format!("batch-{}", i / 1000)]),
            extra: (i % 7 == 0).then(|| serde_json::json!({ "index": i })),
        })
        .collect()
}

// =============================================================================
// SCHEMA
// =============================================================================

// bench-records
//   +-- records
//         +-- record* [id]
//               +-- id (string)
//               +-- name (string)
//               +-- code (string)
//               +-- population (uint64)
//               +-- type (enumeration)
//               +-- tag* (string)
//               +-- extra (anydata)
fn build_context() -> Context {
    let mut ctx = Context::new();
    let m = ctx.add_module(MODULE, Some(REVISION)).expect("Failed to add module");
    let records = ctx.add_container(m, None, "records").expect("Failed to add container");
    let record = ctx.add_list(m, Some(records), "record").expect("Failed to add list");
    ctx.add_leaf(m, Some(record), "id", DataType::String).expect("Failed to add leaf");
    ctx.add_leaf(m, Some(record), "name", DataType::String).expect("Failed to add leaf");
    ctx.add_leaf(m, Some(record), "code", DataType::String).expect("Failed to add leaf");
    ctx.add_leaf(m, Some(record), "population", DataType::Uint64).expect("Failed to add leaf");
    ctx.add_leaf(
        m,
        Some(record),
        "type",
        DataType::Enumeration(vec!["city".into(), "town".into(), "village".into()]),
    )
    .expect("Failed to add leaf");
    ctx.add_leaf_list(m, Some(record), "tag", DataType::String).expect("Failed to add leaf-list");
    ctx.add_anydata(m, Some(record), "extra").expect("Failed to add anydata");
    ctx
}

fn build_tree(ctx: &Context, records: &[Record]) -> Vec<DataNode> {
    TreeBuilder::new(ctx)
        .container(MODULE, "records", |mut c| {
            for r in records {
                c = c.list(MODULE, "record", |mut e| {
                    e = e.leaf(MODULE, "id", r.id.as_str()).leaf(MODULE, "name", r.name.as_str());
                    if let Some(ref code) = r.code {
                        e = e.leaf(MODULE, "code", code.as_str());
                    }
                    if let Some(pop) = r.population {
                        e = e.leaf(MODULE, "population", pop.to_string());
                    }
                    if let Some(ref t) = r.record_type {
                        e = e.leaf(MODULE, "type", t.as_str());
                    }
                    for tag in r.tags.iter().flatten() {
                        e = e.leaf_list(MODULE, "tag", tag.as_str());
                    }
                    if let Some(ref extra) = r.extra {
                        e = e.any(MODULE, "extra", AnyValue::Json(extra.to_string()));
                    }
                    e
                });
            }
            c
        })
        .build()
        .expect("Failed to build tree")
}

fn count_nodes(nodes: &[DataNode]) -> usize {
    nodes.iter().map(|n| 1 + count_nodes(n.children())).sum()
}

fn main() {
    let data_path = std::env::args().nth(1);

    let (records, json_len) = match &data_path {
        Some(path) => {
            println!("Loading records from: {}", path);
            let json_data = fs::read_to_string(path).expect("Failed to read records file");
            let parse_start = Instant::now();
            let records: Vec<Record> = serde_json::from_str(&json_data).expect("Failed to parse JSON");
            println!("Loaded {} records in {:?}", records.len(), parse_start.elapsed());
            (records, Some(json_data.len()))
        }
        None => {
            println!("No input file, synthesizing {} records", SYNTHETIC_RECORDS);
            (synthesize(SYNTHETIC_RECORDS), None)
        }
    };

    let ctx = build_context();

    let convert_start = Instant::now();
    let tree = build_tree(&ctx, &records);
    let convert_time = convert_start.elapsed();
    println!(
        "Converted to {} data nodes in {:?}",
        count_nodes(&tree),
        convert_time
    );

    let encode_start = Instant::now();
    let encoded = encode_data(&ctx, &tree).expect("Failed to encode");
    let encode_time = encode_start.elapsed();

    println!("\nEncode: {} bytes in {:?}", encoded.len(), encode_time);
    println!(
        "  Throughput: {:.2} MB/s",
        (encoded.len() as f64 / 1_000_000.0) / encode_time.as_secs_f64()
    );

    for (label, options) in [
        ("lenient", DecodeOptions::new()),
        ("strict", DecodeOptions::strict()),
    ] {
        let decode_start = Instant::now();
        for _ in 0..DECODE_ITERS {
            let decoded = decode_data_with_options(&ctx, &encoded, options).expect("Failed to decode");
            std::hint::black_box(decoded);
        }
        let decode_time = decode_start.elapsed() / DECODE_ITERS;

        println!(
            "\nDecode ({}): {:?} (avg of {} iterations)",
            label, decode_time, DECODE_ITERS
        );
        println!(
            "  Throughput: {:.2} MB/s",
            (encoded.len() as f64 / 1_000_000.0) / decode_time.as_secs_f64()
        );
    }

    let decoded = decode_data_with_options(&ctx, &encoded, DecodeOptions::strict()).expect("Failed to decode");
    assert_eq!(decoded, tree, "Round trip should reproduce the tree");

    if let Some(path) = &data_path {
        let input_path = Path::new(path);
        let stem = input_path.file_stem().unwrap_or_default().to_string_lossy();
        let parent = input_path.parent().unwrap_or(Path::new("."));
        let output = parent.join(format!("{}.lyb", stem));
        fs::write(&output, &encoded).expect("Failed to write .lyb file");
        println!("\n=== Output File ===");
        println!("LYB: {}", output.display());
    }

    println!("\n=== Summary ===");
    println!("Records: {}", records.len());
    println!(
        "LYB: {} bytes ({:.1} MB)",
        encoded.len(),
        encoded.len() as f64 / 1_000_000.0
    );
    if let Some(json_len) = json_len {
        println!("JSON size: {} bytes ({:.1} MB)", json_len, json_len as f64 / 1_000_000.0);
        println!("Size vs JSON: {:.1}%", 100.0 * encoded.len() as f64 / json_len as f64);
    }
}
