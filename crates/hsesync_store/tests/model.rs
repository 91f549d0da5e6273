//! The store behaves like a map of maps, before and after a restart.

use hsesync_store::{LocalStore, StoreConfig};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tempfile::tempdir;

const PARTITIONS: [&str; 2] = ["incidents", "corrective_actions"];

#[derive(Debug, Clone)]
enum Op {
    Put { partition: usize, key: u8, rev: u32 },
    Delete { partition: usize, key: u8 },
    Clear { partition: usize },
    Replace { partition: usize, keys: Vec<u8> },
    Compact,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (0..2usize, 0..8u8, any::<u32>())
            .prop_map(|(partition, key, rev)| Op::Put { partition, key, rev }),
        3 => (0..2usize, 0..8u8).prop_map(|(partition, key)| Op::Delete { partition, key }),
        1 => (0..2usize).prop_map(|partition| Op::Clear { partition }),
        1 => (0..2usize, prop::collection::vec(0..8u8, 0..5))
            .prop_map(|(partition, keys)| Op::Replace { partition, keys }),
        1 => Just(Op::Compact),
    ]
}

fn record(key: u8, rev: u32) -> Value {
    json!({"id": format!("k{key}"), "rev": rev})
}

type Model = BTreeMap<&'static str, BTreeMap<String, Value>>;

fn apply(store: &LocalStore, model: &mut Model, op: &Op) {
    match op {
        Op::Put { partition, key, rev } => {
            let name = PARTITIONS[*partition];
            store.put(name, record(*key, *rev)).unwrap();
            model
                .entry(name)
                .or_default()
                .insert(format!("k{key}"), record(*key, *rev));
        }
        Op::Delete { partition, key } => {
            let name = PARTITIONS[*partition];
            store.delete(name, &format!("k{key}")).unwrap();
            model.entry(name).or_default().remove(&format!("k{key}"));
        }
        Op::Clear { partition } => {
            let name = PARTITIONS[*partition];
            store.clear(name).unwrap();
            model.entry(name).or_default().clear();
        }
        Op::Replace { partition, keys } => {
            let name = PARTITIONS[*partition];
            let records: Vec<_> = keys.iter().map(|k| record(*k, 0)).collect();
            store.replace_all(name, records.clone()).unwrap();
            let entry = model.entry(name).or_default();
            entry.clear();
            for r in records {
                entry.insert(r["id"].as_str().unwrap().to_string(), r);
            }
        }
        Op::Compact => {
            store.compact().unwrap();
        }
    }
}

fn assert_matches(store: &LocalStore, model: &Model) {
    for name in PARTITIONS {
        let expected: Vec<Value> = model
            .get(name)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        assert_eq!(store.get_all(name).unwrap(), expected, "partition {name}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn store_matches_model_across_restart(ops in prop::collection::vec(op(), 1..40)) {
        let tmp = tempdir().unwrap();
        let config = StoreConfig::new().partitions(PARTITIONS).sync_on_commit(false);
        let mut model = Model::new();

        {
            let store = LocalStore::open(tmp.path(), config.clone()).unwrap();
            for op in &ops {
                apply(&store, &mut model, op);
            }
            assert_matches(&store, &model);
        }

        let reopened = LocalStore::open(tmp.path(), config).unwrap();
        assert_matches(&reopened, &model);
    }
}
