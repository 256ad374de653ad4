use proptest::prelude::*;
use serde_json::{json, Value};

use super::{key, node_registry, Fixture};
use crate::config::OdmConfig;
use crate::document::Document;
use crate::session::Fields;

fn nodes(fx: &Fixture, count: usize) -> Vec<Document> {
    let model = fx.session.model("Node").unwrap();
    (0..count)
        .map(|i| {
            model
                .create(Fields::new().key(key(&format!("n{i}"))).value("name", format!("node {i}")))
                .unwrap()
        })
        .collect()
}

fn stored_next(fx: &Fixture, k: &str) -> Option<String> {
    match &fx.record("nodes", &key(k)).unwrap()["next"] {
        Value::String(next) => Some(next.clone()),
        _ => None,
    }
}

fn stored_prev(fx: &Fixture, k: &str) -> Vec<String> {
    fx.record("nodes", &key(k)).unwrap()["prev"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Every stored `next` is mirrored by exactly one `prev` entry and the other
/// way round.
fn assert_stored_symmetry(fx: &Fixture, count: usize) {
    let names: Vec<String> = (0..count).map(|i| format!("n{i}")).collect();
    for name in &names {
        if let Some(next) = stored_next(fx, name) {
            let prev = stored_prev(fx, &next);
            assert_eq!(
                prev.iter().filter(|p| *p == name).count(),
                1,
                "{next} should list {name} once in prev, has {prev:?}"
            );
        }
        for prev in stored_prev(fx, name) {
            assert_eq!(
                stored_next(fx, &prev).as_deref(),
                Some(name.as_str()),
                "{name} lists {prev} in prev"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Fixed shapes
// ---------------------------------------------------------------------------

#[test]
fn mutual_references_settle_in_one_call() {
    let fx = Fixture::new(node_registry());
    let n = nodes(&fx, 2);
    n[0].set_reference("next", Some(&n[1])).unwrap();
    n[1].set_reference("next", Some(&n[0])).unwrap();
    n[0].save().unwrap();

    // the root is rewritten once after its partner added it to prev
    assert_eq!(fx.store.write_count("nodes", &key("n0")), 2);
    assert_eq!(fx.store.write_count("nodes", &key("n1")), 1);
    assert_eq!(stored_prev(&fx, "n0"), vec!["n1"]);
    assert_eq!(stored_prev(&fx, "n1"), vec!["n0"]);
    assert!(!n[0].is_dirty());
    assert!(!n[1].is_dirty());
}

#[test]
fn self_reference_saves_once() {
    let fx = Fixture::new(node_registry());
    let n = nodes(&fx, 1);
    n[0].set_reference("next", Some(&n[0])).unwrap();
    n[0].save().unwrap();

    assert_eq!(fx.store.write_count("nodes", &key("n0")), 1);
    assert_eq!(stored_next(&fx, "n0").as_deref(), Some("n0"));
    assert_eq!(stored_prev(&fx, "n0"), vec!["n0"]);

    n[0].set_reference("next", None).unwrap();
    n[0].save().unwrap();
    assert!(stored_prev(&fx, "n0").is_empty());
}

#[test]
fn depth_limit_stops_the_cascade() {
    let mut config = OdmConfig::default();
    config.cascade.max_depth = 1;
    let fx = Fixture::with_config(node_registry(), config);
    let n = nodes(&fx, 3);
    n[0].set_reference("next", Some(&n[1])).unwrap();
    n[1].set_reference("next", Some(&n[2])).unwrap();
    n[0].save().unwrap();

    assert!(n[0].is_saved());
    assert!(n[1].is_saved());
    assert!(!n[2].is_saved());
    assert!(fx.record("nodes", &key("n2")).is_none());
    // the in-memory edit is kept for a later save
    assert_eq!(n[2].reference_keys("prev").unwrap(), vec![key("n1")]);
    assert!(n[2].is_dirty());

    n[2].save().unwrap();
    assert_stored_symmetry(&fx, 3);
}

#[test]
fn loaded_ring_is_one_instance_per_key() {
    let fx = Fixture::new(node_registry());
    {
        let n = nodes(&fx, 3);
        for i in 0..3 {
            n[i].set_reference("next", Some(&n[(i + 1) % 3])).unwrap();
        }
        n[0].save().unwrap();
    }
    assert_eq!(fx.session.sweep(), 3);

    let model = fx.session.model("Node").unwrap();
    let n0 = model.load(&key("n0"), true).unwrap();
    let n1 = n0.reference("next").unwrap().unwrap();
    let n2 = n1.reference("next").unwrap().unwrap();
    let back = n2.reference("next").unwrap().unwrap();
    assert!(back.same_instance(&n0));
    assert_eq!(fx.session.cached_count(), 3);
    assert_eq!(n0.get("prev").unwrap(), json!(["n2"]));
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn chain_writes_each_node_once(len in 3usize..10) {
        let fx = Fixture::new(node_registry());
        let n = nodes(&fx, len);
        for i in 0..len - 1 {
            n[i].set_reference("next", Some(&n[i + 1])).unwrap();
        }
        n[0].save().unwrap();

        for i in 0..len {
            let k = key(&format!("n{i}"));
            prop_assert_eq!(fx.store.write_count("nodes", &k), 1);
            prop_assert!(!n[i].is_dirty());
        }
        prop_assert!(stored_prev(&fx, "n0").is_empty());
        for i in 1..len {
            prop_assert_eq!(stored_prev(&fx, &format!("n{i}")), vec![format!("n{}", i - 1)]);
        }
    }

    #[test]
    fn random_reassignments_stay_symmetric(
        ops in prop::collection::vec((0usize..5, prop::option::of(0usize..5)), 1..24)
    ) {
        let fx = Fixture::new(node_registry());
        let n = nodes(&fx, 5);
        for node in &n {
            node.save().unwrap();
        }

        for (source, target) in ops {
            fx.store.reset_write_counts();
            n[source].set_reference("next", target.map(|t| &n[t])).unwrap();
            n[source].save().unwrap();

            for (i, node) in n.iter().enumerate() {
                prop_assert!(!node.is_dirty(), "n{} left dirty", i);
                let writes = fx.store.write_count("nodes", &key(&format!("n{i}")));
                prop_assert!(writes <= 2, "n{} written {} times", i, writes);
            }
            assert_stored_symmetry(&fx, 5);
        }
    }
}
