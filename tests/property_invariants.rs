use std::sync::Arc;

use proptest::prelude::*;

use dateback::{
    DatebackManager,
    backend::traits::CommitEntries,
    core::store::InMemoryStore,
    error::DatebackResult,
    types::{DEFAULT_KEYSPACE, MASTER_BRANCH, QualifiedKey, TIMESTAMP_INFINITY, Timestamp},
};

const KEYS: [&str; 4] = ["k0", "k1", "k2", "k3"];

#[derive(Debug, Clone)]
enum Action {
    PurgeEntry { key: usize, slot: u64 },
    PurgeKeyBetween { key: usize, from: u64, len: u64 },
    PurgeCommit { slot: u64 },
    Inject { key: usize, slot: u64, value: Option<u8> },
    UpdateMetadata { slot: u64, tag: Option<u8> },
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0..KEYS.len(), 1u64..=10).prop_map(|(key, slot)| Action::PurgeEntry { key, slot }),
        (0..KEYS.len(), 0u64..=10, 0u64..=5)
            .prop_map(|(key, from, len)| Action::PurgeKeyBetween { key, from, len }),
        (1u64..=10).prop_map(|slot| Action::PurgeCommit { slot }),
        (0..KEYS.len(), 1u64..=10, proptest::option::of(0u8..3))
            .prop_map(|(key, slot, value)| Action::Inject { key, slot, value }),
        (1u64..=10, proptest::option::of(0u8..2))
            .prop_map(|(slot, tag)| Action::UpdateMetadata { slot, tag }),
    ]
}

/// Ten commits at 100, 200, .. 1000, each writing one of the keys.
fn seeded() -> (Arc<InMemoryStore>, DatebackManager) {
    let store = Arc::new(InMemoryStore::new());
    for slot in 1u64..=10 {
        let key = KEYS[(slot as usize) % KEYS.len()];
        let entries = CommitEntries::from([(
            QualifiedKey::new(DEFAULT_KEYSPACE, key),
            Some(vec![(slot % 3) as u8]),
        )]);
        store
            .commit_at(MASTER_BRANCH, slot * 100, &entries, None)
            .expect("seed commit");
    }
    let manager = DatebackManager::in_memory(Arc::clone(&store));
    (store, manager)
}

#[derive(Debug)]
struct Step {
    changed: bool,
    log_before: usize,
    log_after: usize,
    earliest_before: Timestamp,
    earliest_after: Timestamp,
    highest_after: Option<Timestamp>,
}

fn run(manager: &DatebackManager, actions: &[Action]) -> Vec<Step> {
    let log_len = || {
        manager
            .all_performed_dateback_operations()
            .expect("log")
            .len()
    };
    manager
        .dateback(MASTER_BRANCH, |d| -> DatebackResult<Vec<Step>> {
            let mut steps = Vec::with_capacity(actions.len());
            for action in actions {
                let log_before = log_len();
                let earliest_before = d.earliest_touched_timestamp();
                let changed = match action {
                    Action::PurgeEntry { key, slot } => {
                        d.purge_entry(DEFAULT_KEYSPACE, KEYS[*key], slot * 100)?
                    }
                    Action::PurgeKeyBetween { key, from, len } => d.purge_key_between(
                        DEFAULT_KEYSPACE,
                        KEYS[*key],
                        from * 100,
                        (from + len) * 100,
                    )?,
                    Action::PurgeCommit { slot } => d.purge_commit(slot * 100)?,
                    Action::Inject { key, slot, value } => d.inject(
                        DEFAULT_KEYSPACE,
                        KEYS[*key],
                        slot * 100,
                        value.map(|v| vec![v]),
                    )?,
                    Action::UpdateMetadata { slot, tag } => {
                        d.update_commit_metadata(slot * 100, tag.map(|t| vec![t]))?
                    }
                };
                steps.push(Step {
                    changed,
                    log_before,
                    log_after: log_len(),
                    earliest_before,
                    earliest_after: d.earliest_touched_timestamp(),
                    highest_after: d.highest_untouched_timestamp(),
                });
            }
            Ok(steps)
        })
        .expect("dateback")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn earliest_touched_only_moves_down(actions in prop::collection::vec(action_strategy(), 1..24)) {
        let (_store, manager) = seeded();
        let steps = run(&manager, &actions);

        for step in &steps {
            prop_assert!(step.earliest_after <= step.earliest_before, "{step:?}");
            prop_assert_eq!(step.highest_after, step.earliest_after.checked_sub(1));
            if step.changed {
                prop_assert!(step.earliest_after < TIMESTAMP_INFINITY);
            }
        }
    }

    #[test]
    fn only_effective_mutations_are_logged(actions in prop::collection::vec(action_strategy(), 1..24)) {
        let (_store, manager) = seeded();
        let steps = run(&manager, &actions);

        for step in &steps {
            let expected = step.log_before + usize::from(step.changed);
            prop_assert_eq!(step.log_after, expected, "{:?}", step);
            if !step.changed {
                prop_assert_eq!(step.earliest_after, step.earliest_before);
            }
        }
        let effective = steps.iter().filter(|step| step.changed).count();
        let logged = manager.all_performed_dateback_operations().expect("log");
        prop_assert_eq!(logged.len(), effective);
        for op in &logged {
            prop_assert!(op.affects_timestamp(op.earliest_affected_timestamp()));
        }
    }
}
