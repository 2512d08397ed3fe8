use colhash_table::{HashTable, HashTableConfig};
use colhash_types::{Batch, ColumnSpec, ColumnVectorType, DEFAULT_BATCH_ROW_CAPACITY, Value};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

fn keyed_batch(rows: usize, distinct_keys: i64, seed: i64) -> Batch {
    let values: Vec<Vec<Value>> = (0..rows)
        .map(|row| {
            let row = i64::try_from(row).unwrap_or(i64::MAX);
            let key = (row.wrapping_mul(7_919) + seed) % distinct_keys;
            vec![Value::Integer(key), Value::Text(format!("bench-row-{row:06}"))]
        })
        .collect();
    let specs = [
        ColumnSpec::new("k", ColumnVectorType::Int64),
        ColumnSpec::new("payload", ColumnVectorType::Text),
    ];
    Batch::from_rows(&values, &specs, DEFAULT_BATCH_ROW_CAPACITY).expect("batch should build")
}

fn build_table(duplicates: i64) -> HashTable {
    let rows = DEFAULT_BATCH_ROW_CAPACITY;
    let keys = i64::try_from(rows).unwrap_or(i64::MAX) / duplicates;
    HashTable::new(
        HashTableConfig::default(),
        keyed_batch(rows, keys, 0),
        vec![0],
    )
    .expect("table should build")
}

fn bench_probe_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("colhash_probe_join");
    let probe = keyed_batch(DEFAULT_BATCH_ROW_CAPACITY, 2_048, 3);
    group.throughput(Throughput::Elements(probe.len() as u64));

    for duplicates in [1_i64, 4, 16] {
        let mut table = build_table(duplicates);
        let mut scratch = table.new_scratch();
        group.bench_with_input(
            BenchmarkId::from_parameter(duplicates),
            &probe,
            |b, probe| {
                b.iter(|| {
                    table.reset_visited();
                    let matched = table
                        .probe_join(&mut scratch, probe, &[0])
                        .expect("probe should succeed");
                    criterion::black_box(matched);
                });
            },
        );
    }

    group.finish();
}

fn bench_dedup_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("colhash_dedup_batch");
    let table = build_table(1);
    let mut scratch = table.new_scratch();

    for distinct_keys in [16_i64, 256, 1_024] {
        let input = keyed_batch(DEFAULT_BATCH_ROW_CAPACITY, distinct_keys, 1);
        group.throughput(Throughput::Elements(input.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(distinct_keys),
            &input,
            |b, input| {
                b.iter(|| {
                    let mut batch = input.clone();
                    let emitted = table
                        .dedup_batch(&mut scratch, &mut batch, &[0])
                        .expect("dedup should succeed");
                    criterion::black_box(emitted);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_probe_join, bench_dedup_batch);
criterion_main!(benches);
