use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use tempfile::tempdir;
use tokio::runtime::Runtime;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, GetString, ReadTxn, StateVector, Text, Transact, WriteTxn};
use yrs_persistence::{
    MemoryStore, MergeEngine, Persistence, PersistenceConfig, YrsMergeEngine,
};

fn make_updates(count: usize) -> Vec<Vec<u8>> {
    let doc = Doc::new();
    (0..count)
        .map(|i| {
            let sv = doc.transact().state_vector().encode_v1();
            {
                let mut txn = doc.transact_mut();
                let text = txn.get_or_insert_text("content");
                let len = text.get_string(&txn).len() as u32;
                text.insert(&mut txn, len, &format!("edit {i}; "));
            }
            let sv = StateVector::decode_v1(&sv).unwrap();
            doc.transact().encode_state_as_update_v1(&sv)
        })
        .collect()
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn bench_merge_updates(c: &mut Criterion) {
    let updates = make_updates(500);
    let engine = YrsMergeEngine;

    c.bench_function("merge_500_updates", |b| {
        b.iter(|| black_box(engine.merge_updates(black_box(&updates)).unwrap()))
    });
}

fn bench_append_memory(c: &mut Criterion) {
    let rt = runtime();
    let updates = make_updates(100);

    c.bench_function("append_100_updates_memory", |b| {
        b.iter_batched(
            || {
                let _guard = rt.enter();
                Persistence::with_store(
                    MemoryStore::new(),
                    YrsMergeEngine,
                    PersistenceConfig::default(),
                )
            },
            |persistence| {
                rt.block_on(async {
                    for update in &updates {
                        persistence.append_update("bench", update.clone()).await.unwrap();
                    }
                })
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_append_rocksdb(c: &mut Criterion) {
    let rt = runtime();
    let dir = tempdir().unwrap();
    let persistence = {
        let _guard = rt.enter();
        Persistence::open(dir.path(), PersistenceConfig::default()).unwrap()
    };
    let update = make_updates(1).remove(0);

    // Every iteration targets a new document so the first-append path is measured too
    let mut n = 0u64;
    c.bench_function("append_update_rocksdb", |b| {
        b.iter(|| {
            n += 1;
            let doc_name = format!("doc-{}", n % 1000);
            rt.block_on(persistence.append_update(&doc_name, update.clone()))
        })
    });

    rt.block_on(persistence.close());
}

fn bench_load_and_flush(c: &mut Criterion) {
    let rt = runtime();
    let updates = make_updates(500);

    c.bench_function("get_document_500_updates_with_flush", |b| {
        b.iter_batched(
            || {
                let _guard = rt.enter();
                let persistence = Persistence::with_store(
                    MemoryStore::new(),
                    YrsMergeEngine,
                    PersistenceConfig::for_testing(100),
                );
                rt.block_on(async {
                    for update in &updates {
                        persistence.append_update("bench", update.clone()).await.unwrap();
                    }
                });
                persistence
            },
            |persistence| {
                rt.block_on(async {
                    black_box(persistence.get_document("bench").await.unwrap());
                })
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_merge_updates,
    bench_append_memory,
    bench_append_rocksdb,
    bench_load_and_flush,
);
criterion_main!(benches);
