use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use dateback::{
    DatebackManager,
    backend::traits::CommitEntries,
    core::store::InMemoryStore,
    op::{DatebackOperation, OperationId, OperationKind},
    types::{DEFAULT_KEYSPACE, MASTER_BRANCH, QualifiedKey},
};

fn seeded_store(commits: u64) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    for i in 1..=commits {
        let entries = CommitEntries::from([(
            QualifiedKey::new(DEFAULT_KEYSPACE, format!("K{}", i % 64)),
            Some(i.to_le_bytes().to_vec()),
        )]);
        store
            .commit_at(MASTER_BRANCH, i * 10, &entries, None)
            .expect("commit");
    }
    store
}

fn bench_purge_session(c: &mut Criterion) {
    c.bench_function("session_purge_5k", |b| {
        b.iter(|| {
            let store = seeded_store(5_000);
            let manager = DatebackManager::in_memory(store);
            manager
                .dateback(MASTER_BRANCH, |d| {
                    let mut purged = 0usize;
                    for i in 1..=5_000u64 {
                        if d.purge_entry(DEFAULT_KEYSPACE, &format!("K{}", i % 64), i * 10)? {
                            purged += 1;
                        }
                    }
                    Ok::<_, dateback::error::DatebackError>(purged)
                })
                .expect("dateback");
        });
    });
}

fn bench_inject_session(c: &mut Criterion) {
    c.bench_function("session_inject_5k", |b| {
        b.iter(|| {
            let store = seeded_store(5_000);
            let manager = DatebackManager::in_memory(store);
            manager
                .dateback(MASTER_BRANCH, |d| {
                    for i in 1..5_000u64 {
                        d.inject(DEFAULT_KEYSPACE, "Injected", i * 10 + 5, Some(vec![1]))?;
                    }
                    Ok::<_, dateback::error::DatebackError>(())
                })
                .expect("dateback");
        });
    });
}

fn bench_affecting_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("affecting_query");
    let store = seeded_store(1_000);
    store
        .create_branch_at("B1", MASTER_BRANCH, 5_000)
        .expect("B1");
    store.create_branch_at("B2", "B1", 5_000).expect("B2");
    let manager = DatebackManager::in_memory(Arc::clone(&store));

    for (i, branch) in (0..30_000u64).zip([MASTER_BRANCH, "B1", "B2"].into_iter().cycle()) {
        let op = DatebackOperation::restore(
            OperationId::generate(),
            branch,
            i,
            OperationKind::PurgeEntry {
                timestamp: (i % 10_000) + 1,
                keyspace: DEFAULT_KEYSPACE.to_string(),
                key: format!("K{}", i % 64),
            },
        )
        .expect("op");
        manager.add_dateback_operation_to_log(op).expect("log");
    }

    for branch in [MASTER_BRANCH, "B1", "B2"] {
        group.bench_with_input(BenchmarkId::from_parameter(branch), &branch, |b, &branch| {
            b.iter(|| {
                let _ = manager.dateback_operations_affecting_timestamp(branch, 7_500);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_purge_session,
    bench_inject_session,
    bench_affecting_query
);
criterion_main!(benches);
