//! Benchmarks for vector search and ranking

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::HashMap;

use mnemo::rank::rank;
use mnemo::storage::queries::{create_item, list_candidates};
use mnemo::storage::vectors::{search, upsert_vector, SearchFilter};
use mnemo::storage::Storage;
use mnemo::types::{CreateItemInput, IdPrefix, ItemId, ItemSubtype, RankConfig};

fn seeded_storage(count: usize, dims: usize) -> Storage {
    let storage = Storage::open_in_memory().unwrap();
    storage
        .with_transaction(|conn| {
            for i in 0..count {
                let item = create_item(
                    conn,
                    &CreateItemInput {
                        workspace: "default".to_string(),
                        thread_id: "bench".to_string(),
                        subtype: ItemSubtype::Decision,
                        summary: format!("decision number {}", i),
                        body: format!("decision number {} body text", i),
                        salience: 0.5,
                        payload: HashMap::new(),
                        source_artifact_id: ItemId::new(IdPrefix::Artifact, 1),
                        source_span: (0, 0),
                        embedding_model_id: Some("bench-model".to_string()),
                    },
                )?;
                let mut vector = vec![0.0f32; dims];
                vector[i % dims] = 1.0;
                vector[(i + 1) % dims] = 0.5;
                upsert_vector(conn, "default", &item.id, &vector, "bench-model")?;
            }
            Ok(())
        })
        .unwrap();
    storage
}

fn bench_vector_search(c: &mut Criterion) {
    let dims = 256;
    let mut group = c.benchmark_group("vector_search");

    for count in [100, 1000] {
        let storage = seeded_storage(count, dims);
        let mut query = vec![0.0f32; dims];
        query[0] = 1.0;

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                storage
                    .with_connection(|conn| {
                        search(
                            conn,
                            "default",
                            black_box(&query),
                            16,
                            &SearchFilter::default(),
                            "bench-model",
                        )
                    })
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_rank(c: &mut Criterion) {
    let storage = seeded_storage(256, 64);
    let items = storage
        .with_connection(|conn| list_candidates(conn, "default", &SearchFilter::default(), 256))
        .unwrap();
    let pairs: Vec<_> = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| (item, Some(1.0 - i as f32 * 0.003)))
        .collect();

    c.bench_function("rank_256_candidates", |b| {
        b.iter(|| {
            rank(
                black_box(pairs.clone()),
                "plan the storage migration",
                &RankConfig::default(),
                chrono::Utc::now(),
            )
        })
    });
}

criterion_group!(benches, bench_vector_search, bench_rank);
criterion_main!(benches);
