use std::collections::{BTreeSet, HashSet};

use proptest::prelude::*;

use dateback::{
    error::DatebackError,
    op::{DatebackOperation, OperationId, OperationKind, PersistedKind, StoredOperation},
    persist::{decode_operation, encode_operation},
    types::{QualifiedKey, TIMESTAMP_INFINITY, Timestamp},
};

fn purge_entry(ts: Timestamp) -> OperationKind {
    OperationKind::PurgeEntry {
        timestamp: ts,
        keyspace: "default".to_string(),
        key: "Hello".to_string(),
    }
}

fn every_kind(ts: Timestamp) -> Vec<OperationKind> {
    vec![
        purge_entry(ts),
        OperationKind::PurgeKey {
            keyspace: "default".to_string(),
            key: "Hello".to_string(),
            from_timestamp: ts,
            to_timestamp: ts + 10,
        },
        OperationKind::PurgeKeyspace {
            keyspace: "default".to_string(),
            from_timestamp: ts,
            to_timestamp: ts + 10,
        },
        OperationKind::PurgeCommits {
            commit_timestamps: BTreeSet::from([ts + 5, ts]),
        },
        OperationKind::InjectEntries {
            timestamp: ts,
            injected_keys: BTreeSet::from([QualifiedKey::new("default", "X")]),
            commit_metadata_override: true,
        },
        OperationKind::TransformEntry {
            keyspace: "default".to_string(),
            key: "Hello".to_string(),
            commit_timestamps: BTreeSet::from([ts]),
        },
        OperationKind::TransformValuesOfKey {
            keyspace: "default".to_string(),
            key: "Hello".to_string(),
            commit_timestamps: BTreeSet::from([ts, ts + 3]),
        },
        OperationKind::TransformCommit {
            commit_timestamp: ts,
        },
        OperationKind::TransformValuesOfKeyspace {
            keyspace: "default".to_string(),
            earliest_affected_timestamp: ts,
        },
        OperationKind::UpdateCommitMetadata {
            commit_timestamp: ts,
        },
    ]
}

#[test]
fn every_variant_reports_its_earliest_affected_timestamp() {
    for kind in every_kind(1_000) {
        assert_eq!(kind.earliest_affected_timestamp(), 1_000, "{}", kind.name());
        assert!(kind.affects_timestamp(1_000), "{}", kind.name());
        assert!(!kind.affects_timestamp(999), "{}", kind.name());
    }
}

#[test]
fn update_commit_metadata_only_affects_its_own_commit() {
    let kind = OperationKind::UpdateCommitMetadata {
        commit_timestamp: 500,
    };
    assert!(kind.affects_timestamp(500));
    assert!(!kind.affects_timestamp(499));
    assert!(!kind.affects_timestamp(501));
}

#[test]
fn empty_timestamp_sets_never_affect_anything() {
    let kinds = [
        OperationKind::PurgeCommits {
            commit_timestamps: BTreeSet::new(),
        },
        OperationKind::TransformEntry {
            keyspace: "default".to_string(),
            key: "Hello".to_string(),
            commit_timestamps: BTreeSet::new(),
        },
        OperationKind::TransformValuesOfKey {
            keyspace: "default".to_string(),
            key: "Hello".to_string(),
            commit_timestamps: BTreeSet::new(),
        },
    ];
    for kind in kinds {
        assert_eq!(kind.earliest_affected_timestamp(), TIMESTAMP_INFINITY);
        assert!(!kind.affects_timestamp(0));
        assert!(!kind.affects_timestamp(TIMESTAMP_INFINITY));
    }
}

#[test]
fn equality_and_hashing_follow_the_id_only() {
    let id = OperationId::generate();
    let a = DatebackOperation::restore(id, "master", 1, purge_entry(10)).expect("a");
    let b = DatebackOperation::restore(
        id,
        "other",
        2,
        OperationKind::TransformCommit {
            commit_timestamp: 99,
        },
    )
    .expect("b");
    let c = DatebackOperation::new("master", purge_entry(10)).expect("c");

    assert_eq!(a, b);
    assert_ne!(a, c);

    let set: HashSet<DatebackOperation> = [a, b, c].into_iter().collect();
    assert_eq!(set.len(), 2);
}

#[test]
fn construction_rejects_malformed_payloads() {
    let empty_branch = DatebackOperation::new("", purge_entry(1));
    assert!(matches!(empty_branch, Err(DatebackError::Precondition(_))));

    let empty_key = DatebackOperation::new(
        "master",
        OperationKind::PurgeEntry {
            timestamp: 1,
            keyspace: "default".to_string(),
            key: String::new(),
        },
    );
    assert!(matches!(empty_key, Err(DatebackError::Precondition(_))));

    let inverted = DatebackOperation::new(
        "master",
        OperationKind::PurgeKeyspace {
            keyspace: "default".to_string(),
            from_timestamp: 10,
            to_timestamp: 5,
        },
    );
    assert!(matches!(inverted, Err(DatebackError::Precondition(_))));
}

#[test]
fn purge_ranges_render_half_open() {
    let op = DatebackOperation::new(
        "master",
        OperationKind::PurgeKey {
            keyspace: "default".to_string(),
            key: "Hello".to_string(),
            from_timestamp: 100,
            to_timestamp: 201,
        },
    )
    .expect("op");
    assert_eq!(op.to_string(), "[PurgeKey] master: default->Hello [100, 201)");
}

#[test]
fn legacy_single_commit_transform_upcasts_on_load() {
    let id = OperationId::generate();
    let legacy = format!(
        r#"{{"format_version":1,"stored":{{"id":"{id}","branch":"master","wall_clock_time":42,
            "operation":{{"type":"transform_entry","keyspace":"default","key":"Hello","commit_timestamp":1000}}}}}}"#
    );

    let op = decode_operation(legacy.as_bytes()).expect("decode legacy");
    assert_eq!(op.id(), id);
    assert_eq!(op.wall_clock_time(), 42);
    assert_eq!(
        op.kind(),
        &OperationKind::TransformEntry {
            keyspace: "default".to_string(),
            key: "Hello".to_string(),
            commit_timestamps: BTreeSet::from([1_000]),
        }
    );

    let rewritten = String::from_utf8(encode_operation(&op).expect("encode")).expect("utf8");
    assert!(rewritten.contains(r#""type":"transform_entry_v2""#));
    assert!(!rewritten.contains(r#""type":"transform_entry""#));
}

#[test]
fn bare_records_without_envelope_still_decode() {
    let op = DatebackOperation::new("master", purge_entry(7)).expect("op");
    let bare = serde_json::to_vec(&StoredOperation::from(&op)).expect("bare");
    let decoded = decode_operation(&bare).expect("decode");
    assert_eq!(decoded, op);
    assert_eq!(decoded.kind(), op.kind());
}

#[test]
fn replayed_records_are_validated_like_fresh_ones() {
    let stored = StoredOperation {
        id: OperationId::generate(),
        branch: String::new(),
        wall_clock_time: 1,
        operation: PersistedKind::TransformCommit {
            commit_timestamp: 3,
        },
    };
    let payload = serde_json::to_vec(&stored).expect("encode");
    assert!(decode_operation(&payload).is_err());
}

#[test]
fn persisted_tags_are_stable() {
    let tags: Vec<&str> = every_kind(1)
        .iter()
        .map(|kind| PersistedKind::from(kind).tag())
        .collect();
    assert_eq!(
        tags,
        vec![
            "purge_entry",
            "purge_key",
            "purge_keyspace",
            "purge_commits",
            "inject_entries",
            "transform_entry_v2",
            "transform_values_of_key",
            "transform_commit",
            "transform_values_of_keyspace",
            "update_commit_metadata",
        ]
    );
}

proptest! {
    #[test]
    fn monotonic_variants_stay_affected(base in 0u64..1_000_000, a in 0u64..10_000, b in 0u64..10_000) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        for kind in every_kind(base) {
            if matches!(kind, OperationKind::UpdateCommitMetadata { .. }) {
                continue;
            }
            if kind.affects_timestamp(base + lo) {
                prop_assert!(kind.affects_timestamp(base + hi), "{} lost effect", kind.name());
            }
        }
    }
}
