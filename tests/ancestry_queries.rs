use std::sync::Arc;

use dateback::{
    DatebackManager,
    backend::traits::CommitEntries,
    core::store::InMemoryStore,
    error::{DatebackError, DatebackResult},
    op::{DatebackOperation, OperationId, OperationKind},
    types::{DEFAULT_KEYSPACE, MASTER_BRANCH, QualifiedKey, Timestamp},
};

fn hello(value: &str) -> CommitEntries {
    CommitEntries::from([(
        QualifiedKey::new(DEFAULT_KEYSPACE, "Hello"),
        Some(value.as_bytes().to_vec()),
    )])
}

/// master: commits at 1000 and 2000; B1 forks master at 1500 and commits at 2500;
/// B2 forks B1 at 2200 and commits at 3000.
fn branched() -> (Arc<InMemoryStore>, DatebackManager) {
    let store = Arc::new(InMemoryStore::new());
    store
        .commit_at(MASTER_BRANCH, 1_000, &hello("m1"), None)
        .expect("master 1000");
    store
        .commit_at(MASTER_BRANCH, 2_000, &hello("m2"), None)
        .expect("master 2000");
    store
        .create_branch_at("B1", MASTER_BRANCH, 1_500)
        .expect("B1");
    store.commit_at("B1", 2_500, &hello("b1"), None).expect("B1 2500");
    store.create_branch_at("B2", "B1", 2_200).expect("B2");
    store.commit_at("B2", 3_000, &hello("b2"), None).expect("B2 3000");
    let manager = DatebackManager::in_memory(Arc::clone(&store));
    (store, manager)
}

fn purge(ts: Timestamp) -> OperationKind {
    OperationKind::PurgeEntry {
        timestamp: ts,
        keyspace: DEFAULT_KEYSPACE.to_string(),
        key: "Hello".to_string(),
    }
}

fn earliest(ops: &[DatebackOperation]) -> Vec<(String, Timestamp)> {
    ops.iter()
        .map(|op| (op.branch().to_string(), op.earliest_affected_timestamp()))
        .collect()
}

#[test]
fn visibility_follows_the_branch_points_down_the_chain() {
    let (_store, manager) = branched();

    manager
        .dateback(MASTER_BRANCH, |d| -> DatebackResult<()> {
            assert!(d.purge_entry(DEFAULT_KEYSPACE, "Hello", 1_000)?);
            assert!(d.purge_entry(DEFAULT_KEYSPACE, "Hello", 2_000)?);
            // Exactly at and just after the point B1 forks from.
            assert!(d.inject(DEFAULT_KEYSPACE, "Fork", 1_500, Some(b"at".to_vec()))?);
            assert!(d.inject(DEFAULT_KEYSPACE, "Fork", 1_501, Some(b"after".to_vec()))?);
            Ok(())
        })
        .expect("master dateback");
    manager
        .dateback("B1", |d| -> DatebackResult<()> {
            assert!(d.inject(DEFAULT_KEYSPACE, "Hello", 2_000, Some(b"b1-early".to_vec()))?);
            assert!(d.inject(DEFAULT_KEYSPACE, "Fork", 2_200, Some(b"at".to_vec()))?);
            assert!(d.inject(DEFAULT_KEYSPACE, "Fork", 2_201, Some(b"after".to_vec()))?);
            assert!(d.inject(DEFAULT_KEYSPACE, "Hello", 2_400, Some(b"b1-late".to_vec()))?);
            Ok(())
        })
        .expect("B1 dateback");
    manager
        .dateback("B2", |d| d.update_commit_metadata(3_000, Some(b"tagged".to_vec())))
        .expect("B2 dateback");

    let master = |ts: Timestamp| (MASTER_BRANCH.to_string(), ts);
    let b1 = |ts: Timestamp| ("B1".to_string(), ts);

    let on_master = manager
        .dateback_operations_affecting_timestamp(MASTER_BRANCH, 1_500)
        .expect("master");
    assert_eq!(earliest(&on_master), vec![master(1_000), master(1_500)]);

    let on_b1 = manager
        .dateback_operations_affecting_timestamp("B1", 2_450)
        .expect("B1");
    assert_eq!(
        earliest(&on_b1),
        vec![
            master(1_000),
            master(1_500),
            b1(2_000),
            b1(2_200),
            b1(2_201),
            b1(2_400),
        ]
    );

    let on_b2 = manager
        .dateback_operations_affecting_timestamp("B2", 3_000)
        .expect("B2");
    assert_eq!(
        earliest(&on_b2),
        vec![
            master(1_000),
            master(1_500),
            b1(2_000),
            b1(2_200),
            ("B2".to_string(), 3_000),
        ]
    );

    let past_the_commit = manager
        .dateback_operations_affecting_timestamp("B2", 3_001)
        .expect("B2 later");
    assert_eq!(
        earliest(&past_the_commit),
        vec![master(1_000), master(1_500), b1(2_000), b1(2_200)]
    );

    // Ancestors are still cut at the branch points, even below B2's own fork.
    let below_the_fork = manager
        .dateback_operations_affecting_timestamp("B2", 2_100)
        .expect("B2 before fork");
    assert_eq!(
        earliest(&below_the_fork),
        vec![master(1_000), master(1_500), b1(2_000), b1(2_200)]
    );
}

#[test]
fn affecting_queries_reject_unknown_branches() {
    let (_store, manager) = branched();
    assert!(matches!(
        manager.dateback_operations_affecting_timestamp("ghost", 0),
        Err(DatebackError::BranchNotFound(_))
    ));
    assert!(matches!(
        manager.dateback_operations_performed_between("ghost", 0, 1),
        Err(DatebackError::BranchNotFound(_))
    ));
}

#[test]
fn performed_between_filters_inclusively_and_sorts_by_branch_then_time() {
    let (store, manager) = branched();
    store
        .create_branch_at("other", MASTER_BRANCH, 1_000)
        .expect("other");

    let replay = [
        ("B1", 300, 10),
        ("B1", 100, 11),
        (MASTER_BRANCH, 200, 12),
        (MASTER_BRANCH, 250, 13),
        (MASTER_BRANCH, 99, 14),
        ("B2", 150, 15),
        ("other", 150, 16),
    ];
    for (branch, wall_clock, ts) in replay {
        let op = DatebackOperation::restore(OperationId::generate(), branch, wall_clock, purge(ts))
            .expect("restore");
        manager.add_dateback_operation_to_log(op).expect("replay");
    }

    let between = manager
        .dateback_operations_performed_between("B1", 100, 250)
        .expect("between");
    let seen: Vec<(String, u64)> = between
        .iter()
        .map(|op| (op.branch().to_string(), op.wall_clock_time()))
        .collect();
    assert_eq!(
        seen,
        vec![
            ("B1".to_string(), 100),
            (MASTER_BRANCH.to_string(), 200),
            (MASTER_BRANCH.to_string(), 250),
        ]
    );

    let from_b2 = manager
        .dateback_operations_performed_between("B2", 0, u64::MAX)
        .expect("between");
    let branches: Vec<&str> = from_b2.iter().map(|op| op.branch()).collect();
    assert_eq!(branches, vec!["B1", "B1", "B2", "master", "master", "master"]);

    assert!(matches!(
        manager.dateback_operations_performed_between("B1", 300, 100),
        Err(DatebackError::Precondition(_))
    ));
}

#[test]
fn all_performed_operations_keep_append_order() {
    let (_store, manager) = branched();

    manager
        .dateback("B1", |d| d.purge_entry(DEFAULT_KEYSPACE, "Hello", 2_500))
        .expect("B1");
    manager
        .dateback(MASTER_BRANCH, |d| d.purge_entry(DEFAULT_KEYSPACE, "Hello", 2_000))
        .expect("master");

    let all = manager.all_performed_dateback_operations().expect("all");
    assert_eq!(
        earliest(&all),
        vec![("B1".to_string(), 2_500), (MASTER_BRANCH.to_string(), 2_000)]
    );
}
