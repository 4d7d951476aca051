#![allow(missing_docs)]

use std::collections::HashMap;

use cairn::{AttributeTable, TableOptions};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempfile::tempdir;

const ROWS: u64 = 400;
const OPS: usize = 2_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Default)]
struct ModelRow {
    visited: bool,
    area: i64,
    perimeter: i64,
    mean_b1: f64,
    mean_b2: f64,
    neighbours: Vec<u64>,
}

/// Randomized checkout/sync traffic against an in-memory model, verified
/// in full before and after a close/import cycle. Deterministic seed so a
/// failure is reproducible.
#[test]
fn randomized_traffic_matches_model() {
    init_tracing();
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("stress.cairn");
    // Small chunks and a small cache force heavy eviction traffic.
    let opts = TableOptions::new()
        .chunk_rows(16)
        .chunk_cache_entries(4)
        .initial_max_degree(4)
        .max_degree_limit(64);

    let mut rng = ChaCha8Rng::seed_from_u64(0xA77_7AB1E);
    let mut model: HashMap<u64, ModelRow> = HashMap::new();

    {
        let mut table = AttributeTable::create(ROWS, &path, opts.clone()).expect("create");
        table.add_bool_field("visited", false).expect("visited");
        table.add_int_field("area", 0).expect("area");
        table.add_int_field("perimeter", 0).expect("perimeter");
        table.add_float_field("mean_b1", 0.0).expect("mean_b1");
        table.add_float_field("mean_b2", 0.0).expect("mean_b2");

        for _ in 0..OPS {
            let fid = rng.gen_range(0..ROWS);
            let mut feature = table.checkout(fid).expect("checkout");

            let entry = model.entry(fid).or_default();
            match rng.gen_range(0..4) {
                0 => {
                    entry.visited = rng.gen_bool(0.5);
                    feature.bools[0] = entry.visited;
                }
                1 => {
                    entry.area = rng.gen_range(-1_000_000..1_000_000);
                    entry.perimeter = rng.gen_range(0..10_000);
                    feature.ints[0] = entry.area;
                    feature.ints[1] = entry.perimeter;
                }
                2 => {
                    entry.mean_b1 = rng.gen::<f64>() * 255.0;
                    entry.mean_b2 = rng.gen::<f64>() * 255.0;
                    feature.floats[0] = entry.mean_b1;
                    feature.floats[1] = entry.mean_b2;
                }
                _ => {
                    let degree = rng.gen_range(0..=12);
                    entry.neighbours = (0..degree)
                        .map(|_| rng.gen_range(0..ROWS))
                        .collect();
                    feature.neighbours = entry.neighbours.clone();
                }
            }
            table.return_feature(feature, true).expect("return");
        }

        verify_against_model(&mut table, &model);
        table.close().expect("close");
    }

    let mut table = AttributeTable::import(&path, opts).expect("import");
    verify_against_model(&mut table, &model);
}

fn verify_against_model(table: &mut AttributeTable, model: &HashMap<u64, ModelRow>) {
    let default = ModelRow::default();
    for fid in 0..ROWS {
        let expected = model.get(&fid).unwrap_or(&default);
        let feature = table.checkout(fid).expect("checkout");
        assert_eq!(feature.bools, vec![expected.visited], "fid {fid} bools");
        assert_eq!(
            feature.ints,
            vec![expected.area, expected.perimeter],
            "fid {fid} ints"
        );
        assert_eq!(
            feature.floats,
            vec![expected.mean_b1, expected.mean_b2],
            "fid {fid} floats"
        );
        assert_eq!(feature.neighbours, expected.neighbours, "fid {fid} neighbours");
    }
}
