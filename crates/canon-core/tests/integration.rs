//! Integration tests for the Canon store

use canon_core::lineage::{genesis_hash, verify_all_claim_hashes, verify_lineage_chain};
use canon_core::query::SegmentClaimRetriever;
use canon_core::*;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn open_with(config: CanonConfig) -> CanonApi {
    let api = CanonApi::new(config).with_clock(Arc::new(ManualClock::new(1_700_000_000_000_000_000, 1_000)));
    api.init().expect("Failed to init canon");
    api
}

fn open(dir: &TempDir) -> CanonApi {
    open_with(CanonConfig::new(dir.path()))
}

#[test]
fn test_genesis_and_parent_links() {
    let dir = tempfile::tempdir().unwrap();
    let api = open(&dir);

    let first = api
        .create_claim(CreateClaimParams::new("ENT-alice", "HAS_NAME", "Alice Smith"))
        .unwrap();
    let second = api
        .create_claim(CreateClaimParams::new("ENT-alice", "HAS_AGE", 34))
        .unwrap();

    assert_eq!(first.prev_hash, genesis_hash());
    assert_eq!(
        first.prev_hash.as_str(),
        "901131d838b17aac0f7885b81e03cbdc9f5157a00343d30ab22083685ed1416a"
    );
    assert_eq!(second.prev_hash, first.hash);
}

#[test]
fn test_nan_value_is_never_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let api = open(&dir);

    let params = CreateClaimParams::new(
        "ENT-alice",
        "HAS_ATTRIBUTE",
        CanonValue::object([("score", CanonValue::Number(f64::NAN))]),
    );
    let err = api.create_claim(params).unwrap_err();
    assert_eq!(err.code, CanonErrorCode::InvalidValueNan);

    api.close().unwrap();
    let reopened = open(&dir);
    assert!(reopened.get_all_claims().is_empty());
}

#[test]
fn test_supersession_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let api = open(&dir);

    let a = api
        .create_claim(CreateClaimParams::new("ENT-bob", "HAS_ROLE", "engineer"))
        .unwrap();
    let b = api
        .create_claim(CreateClaimParams::new("ENT-bob", "HAS_ROLE", "manager").with_supersedes(&a.id))
        .unwrap();

    assert_eq!(api.get_claim(&a.id).unwrap().status, ClaimStatus::Superseded);
    let active = api.get_active_claims_by_subject_and_predicate("ENT-bob", "HAS_ROLE");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, b.id);

    // a third role no longer conflicts with the superseded one
    let conflict = api.check_conflicts(&CreateClaimParams::new("ENT-bob", "HAS_ROLE", "manager"));
    assert!(!conflict.has_conflict);
}

#[test]
fn test_supersession_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = {
        let api = open(&dir);
        let a = api.create_claim(CreateClaimParams::new("ENT-c", "HAS_AGE", 3)).unwrap();
        let b = api
            .create_claim(CreateClaimParams::new("ENT-c", "HAS_AGE", 4).with_supersedes(&a.id))
            .unwrap();
        api.close().unwrap();
        (a, b)
    };

    let api = open(&dir);
    assert_eq!(api.get_all_claims().len(), 2);
    assert_eq!(api.get_claim(&a.id).unwrap().status, ClaimStatus::Superseded);
    assert_eq!(
        api.get_active_claims_by_subject_and_predicate("ENT-c", "HAS_AGE"),
        vec![b.clone()]
    );

    let next = api.create_claim(CreateClaimParams::new("ENT-c", "HAS_NAME", "C")).unwrap();
    assert_eq!(next.prev_hash, b.hash);
    assert_eq!(next.version, 3);
}

#[test]
fn test_key_order_is_not_a_contradiction() {
    let dir = tempfile::tempdir().unwrap();
    let api = open(&dir);

    api.create_claim(CreateClaimParams::new(
        "ENT-x",
        "HAS_ATTRIBUTE",
        CanonValue::from(json!({"b": 2, "a": 1})),
    ))
    .unwrap();

    let same = CreateClaimParams::new("ENT-x", "HAS_ATTRIBUTE", CanonValue::from(json!({"a": 1, "b": 2})));
    assert!(api.create_claim(same).is_ok());

    let different = CreateClaimParams::new("ENT-x", "HAS_ATTRIBUTE", CanonValue::from(json!({"a": 2})));
    let err = api.create_claim(different).unwrap_err();
    assert_eq!(err.code, CanonErrorCode::ContradictionDirect);
}

#[test]
fn test_many_claims_chain_and_rotation() {
    let dir = tempfile::tempdir().unwrap();
    let config = CanonConfig::new(dir.path())
        .with_rotate_strategy(RotateStrategy::ClaimCount)
        .with_segment_max_claims(4);
    let api = open_with(config.clone());

    for i in 0..10 {
        api.create_claim(CreateClaimParams::new(format!("ENT-{}", i), "HAS_AGE", i))
            .unwrap();
    }

    let stats = api.get_stats();
    assert_eq!(stats.claim_count, 10);
    assert_eq!(stats.segment_count, 3);
    assert!(stats.chain_valid);

    let claims = api.get_all_claims();
    assert!(verify_lineage_chain(&claims).valid);
    assert_eq!(verify_all_claim_hashes(&claims), None);

    let report = api.verify_integrity().unwrap();
    assert!(report.valid, "{:?}", report);
    api.close().unwrap();

    let reopened = open_with(config);
    assert_eq!(reopened.get_all_claims(), claims);
}

#[test]
fn test_tampered_segment_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    {
        let api = open(&dir);
        api.create_claim(CreateClaimParams::new("ENT-alice", "HAS_NAME", "Alice Smith"))
            .unwrap();
        api.create_claim(CreateClaimParams::new("ENT-bob", "HAS_NAME", "Bob"))
            .unwrap();
        api.close().unwrap();
    }

    let segment = dir.path().join("segment-000001.ndjson");
    let content = std::fs::read_to_string(&segment).unwrap();
    std::fs::write(&segment, content.replace("Alice Smith", "Alice Jones")).unwrap();

    let api = open(&dir);
    let report = api.verify_integrity().unwrap();
    assert!(!report.valid);
    assert_eq!(report.hash_mismatch_at, Some(0));
    assert_eq!(report.manifest.mismatched_segments, vec!["segment-000001".to_string()]);
}

#[test]
fn test_index_rebuilt_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let claim = {
        let api = open(&dir);
        let claim = api.create_claim(CreateClaimParams::new("ENT-a", "KNOWS", "ENT-b")).unwrap();
        api.close().unwrap();
        claim
    };

    std::fs::remove_file(dir.path().join("index.json")).unwrap();
    let api = open(&dir);
    assert!(dir.path().join("index.json").exists());

    let result = api.query(&QueryFilter::new().object_entity("ENT-b")).unwrap();
    assert_eq!(result.claims, vec![claim]);
}

#[test]
fn test_segment_retriever_reads_persisted_claims() {
    let dir = tempfile::tempdir().unwrap();
    let config = CanonConfig::new(dir.path())
        .with_rotate_strategy(RotateStrategy::ClaimCount)
        .with_segment_max_claims(2);
    let api = open_with(config);
    let created: Vec<Claim> = (0..5)
        .map(|i| {
            api.create_claim(CreateClaimParams::new("ENT-r", "HAS_ATTRIBUTE", format!("v{}", i)))
                .unwrap()
        })
        .collect();
    api.close().unwrap();

    let retriever = SegmentClaimRetriever::open(dir.path()).unwrap();
    let result = query::query(
        retriever.index(),
        &retriever,
        &QueryFilter::new().subject("ENT-r").order(OrderBy::Timestamp, OrderDir::Desc).limit(2),
    )
    .unwrap();
    assert_eq!(result.total, 5);
    assert!(result.has_more);
    assert_eq!(result.claims, vec![created[4].clone(), created[3].clone()]);

    let by_hash = retriever.get_by_hash(&created[2].hash).unwrap();
    assert_eq!(by_hash, Some(created[2].clone()));
}

#[test]
fn test_query_results_are_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    let api = open(&dir);
    for subject in ["ENT-a", "ENT-b", "ENT-c"] {
        api.create_claim(CreateClaimParams::new(subject, "HAS_NAME", subject)).unwrap();
        api.create_claim(CreateClaimParams::new(subject, "MEMBER_OF", "ENT-team")).unwrap();
    }

    let filter = QueryFilter::new().predicate("MEMBER_OF").object_entity("ENT-team");
    let first = api.query(&filter).unwrap();
    let second = api.query(&filter).unwrap();
    assert_eq!(first.total, 3);
    assert_eq!(first.query_hash, second.query_hash);
    assert_eq!(first.claims, second.claims);
}

#[test]
fn test_custom_catalog_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let catalog_path = dir.path().join("catalog.json");
    std::fs::write(
        &catalog_path,
        serde_json::to_string(&json!({
            "version": "2.0.0",
            "predicates": [{
                "id": "HAS_COLOR",
                "subject_type": "ENTITY",
                "object_type": "STRING",
                "symmetric": false,
                "transitive": false,
                "introduced_version": "2.0.0"
            }]
        }))
        .unwrap(),
    )
    .unwrap();

    let api = open_with(CanonConfig::new(dir.path().join("store")).with_catalog_path(&catalog_path));
    assert_eq!(api.catalog().catalog_version(), "2.0.0");
    assert!(api.create_claim(CreateClaimParams::new("ENT-car", "HAS_COLOR", "red")).is_ok());

    let err = api
        .create_claim(CreateClaimParams::new("ENT-car", "HAS_NAME", "Herbie"))
        .unwrap_err();
    assert_eq!(err.code, CanonErrorCode::InvalidPredicate);
}

#[test]
fn test_two_apis_share_one_directory() {
    let dir = tempfile::tempdir().unwrap();
    let first = open(&dir);
    let second = CanonApi::new(CanonConfig::new(dir.path()));
    second.init().unwrap();

    let a = first.create_claim(CreateClaimParams::new("ENT-a", "HAS_AGE", 1)).unwrap();
    let b = second.create_claim(CreateClaimParams::new("ENT-b", "HAS_AGE", 2)).unwrap();
    assert_eq!(b.prev_hash, a.hash);

    let c = first.create_claim(CreateClaimParams::new("ENT-c", "HAS_AGE", 3)).unwrap();
    assert_eq!(c.prev_hash, b.hash);
    assert!(first.verify_integrity().unwrap().valid);
}

fn shared_config(dir: &TempDir) -> CanonConfig {
    CanonConfig::new(dir.path()).with_lock_timeout(std::time::Duration::from_secs(60))
}

#[test]
fn test_concurrent_writers_keep_one_chain() {
    const WRITERS: usize = 4;
    const CLAIMS_EACH: usize = 50;

    let dir = tempfile::tempdir().unwrap();
    let barrier = Arc::new(std::sync::Barrier::new(WRITERS));
    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let config = shared_config(&dir);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let api = CanonApi::new(config);
                api.init().unwrap();
                barrier.wait();
                for i in 0..CLAIMS_EACH {
                    api.create_claim(CreateClaimParams::new(format!("ENT-w{}-{}", w, i), "HAS_AGE", i as i64))
                        .unwrap();
                }
                api.close().unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let api = CanonApi::new(shared_config(&dir));
    api.init().unwrap();
    let all = api.get_all_claims();
    assert_eq!(all.len(), WRITERS * CLAIMS_EACH);
    assert_eq!(all[0].prev_hash, genesis_hash());
    for pair in all.windows(2) {
        assert_eq!(pair[1].prev_hash, pair[0].hash);
    }
    assert!(verify_lineage_chain(&all).valid);

    let report = api.verify_integrity().unwrap();
    assert!(report.valid, "{:?}", report);
    assert_eq!(api.get_stats().claim_count, (WRITERS * CLAIMS_EACH) as u64);
}

#[test]
fn test_concurrent_writers_cannot_both_contradict() {
    const WRITERS: usize = 3;
    const ROUNDS: usize = 10;

    let dir = tempfile::tempdir().unwrap();
    let barrier = Arc::new(std::sync::Barrier::new(WRITERS));
    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let config = shared_config(&dir);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let api = CanonApi::new(config);
                api.init().unwrap();
                let mut created = 0;
                for round in 0..ROUNDS {
                    barrier.wait();
                    match api.create_claim(CreateClaimParams::new(format!("ENT-r{}", round), "HAS_AGE", w as i64)) {
                        Ok(_) => created += 1,
                        Err(e) => assert_eq!(e.code, CanonErrorCode::ContradictionDirect),
                    }
                }
                api.close().unwrap();
                created
            })
        })
        .collect();
    let created: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(created, ROUNDS);

    let api = CanonApi::new(shared_config(&dir));
    api.init().unwrap();
    for round in 0..ROUNDS {
        let active = api.get_active_claims_by_subject_and_predicate(&format!("ENT-r{}", round), "HAS_AGE");
        assert_eq!(active.len(), 1, "round {}", round);
    }
    assert!(api.verify_integrity().unwrap().valid);
}
