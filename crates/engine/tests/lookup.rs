//! Tier-transparent lookups.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use tierstore_engine::{LookupResolver, Tier, TieringError};
use tierstore_storage::memory::FaultOp;
use tierstore_storage::{codec, ArchiveStore, HashPolicy, Record};

#[tokio::test]
async fn primary_hit_is_served_from_primary() {
    let (primary, archive) = stores();
    let r = record("R100", 5, serde_json::json!({"amount": 1}));
    primary.seed([r.clone()]);

    let resolved = resolver(&primary, &archive)
        .resolve("R100")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.tier, Tier::Primary);
    assert_eq!(resolved.record, r);
}

#[tokio::test]
async fn primary_miss_falls_back_to_archive() {
    let (primary, archive) = stores();
    let r = record("R100", 120, serde_json::json!({"amount": 42}));
    archive
        .put("R100", &codec::encode(&r).unwrap(), true)
        .await
        .unwrap();

    let resolved = resolver(&primary, &archive)
        .resolve("R100")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.tier, Tier::Archive);
    assert_eq!(resolved.record, r);
}

#[tokio::test]
async fn primary_copy_wins_when_both_tiers_hold_the_record() {
    let (primary, archive) = stores();
    let old = record("R100", 120, serde_json::json!({"v": 1}));
    let new = record("R100", 1, serde_json::json!({"v": 2}));
    archive
        .put("R100", &codec::encode(&old).unwrap(), true)
        .await
        .unwrap();
    primary.seed([new.clone()]);

    let got = resolver(&primary, &archive).get("R100").await.unwrap();
    assert_eq!(got, Some(new));
}

#[tokio::test]
async fn absent_everywhere_is_none() {
    let (primary, archive) = stores();
    let got = resolver(&primary, &archive).get("NOPE").await.unwrap();
    assert_eq!(got, None);
}

#[tokio::test]
async fn primary_outage_is_not_treated_as_a_miss() {
    let (primary, archive) = stores();
    let r = record("R100", 120, serde_json::json!({}));
    archive
        .put("R100", &codec::encode(&r).unwrap(), true)
        .await
        .unwrap();
    primary.faults().set_unavailable(true);

    let err = resolver(&primary, &archive).get("R100").await.unwrap_err();
    assert!(
        matches!(err, TieringError::BackendUnavailable { tier: Tier::Primary, .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn primary_backend_error_surfaces_with_tier() {
    let (primary, archive) = stores();
    primary.faults().fail(FaultOp::Get, "R100");

    let err = resolver(&primary, &archive).get("R100").await.unwrap_err();
    assert!(
        matches!(err, TieringError::Storage { tier: Tier::Primary, .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn archive_outage_after_primary_miss_is_an_error() {
    let (primary, archive) = stores();
    archive.faults().set_unavailable(true);

    let err = resolver(&primary, &archive).get("R100").await.unwrap_err();
    assert!(
        matches!(err, TieringError::BackendUnavailable { tier: Tier::Archive, .. }),
        "got {err:?}"
    );
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn slow_primary_times_out_as_unavailable() {
    let (primary, archive) = stores();
    primary.seed([record("R100", 5, serde_json::json!({}))]);
    primary.faults().set_delay(Some(Duration::from_millis(500)));

    let err = resolver(&primary, &archive)
        .with_timeout(Some(Duration::from_millis(20)))
        .get("R100")
        .await
        .unwrap_err();
    assert!(err.is_unavailable(), "got {err:?}");
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn undecodable_blob_is_corrupt() {
    let (primary, archive) = stores();
    archive.put("R100", b"not json", true).await.unwrap();

    let err = resolver(&primary, &archive).get("R100").await.unwrap_err();
    assert!(matches!(err, TieringError::Corrupt { ref id, .. } if id == "R100"), "got {err:?}");
}

#[tokio::test]
async fn blob_holding_another_record_is_corrupt() {
    let (primary, archive) = stores();
    let other = record("OTHER", 120, serde_json::json!({}));
    archive
        .put("R200", &codec::encode(&other).unwrap(), true)
        .await
        .unwrap();

    let err = resolver(&primary, &archive).get("R200").await.unwrap_err();
    assert!(matches!(err, TieringError::Corrupt { .. }), "got {err:?}");
    assert!(err.to_string().contains("OTHER"));
}

#[tokio::test]
async fn unaddressable_ids_are_rejected() {
    let (primary, archive) = stores();
    let resolver = resolver(&primary, &archive);
    for id in ["", "a/b", ".."] {
        let err = resolver.get(id).await.unwrap_err();
        assert!(matches!(err, TieringError::InvalidId { .. }), "{id:?}: got {err:?}");
    }
}

#[tokio::test]
async fn hash_partitioned_primary_resolves() {
    let (primary, archive) = stores();
    let policy = HashPolicy::new(16).unwrap();
    let r = Record::new("R100", days_ago(3), serde_json::json!({"h": true}), &policy).unwrap();
    assert!(r.partition_key.starts_with('p'));
    primary.seed([r.clone()]);

    let resolver = LookupResolver::new(primary.clone(), archive.clone(), Arc::new(policy));
    assert_eq!(resolver.get("R100").await.unwrap(), Some(r));
}

#[tokio::test]
async fn lookups_racing_a_migration_always_find_the_record() {
    let (primary, archive) = stores();
    let ids: Vec<String> = (0..12).map(|i| format!("R{i:02}")).collect();
    primary.seed(ids.iter().map(|id| record(id, 100, serde_json::json!({"id": id}))));
    archive.faults().set_delay(Some(Duration::from_millis(2)));

    let engine = engine(&primary, &archive, settings());
    let resolver = resolver(&primary, &archive);

    let lookups = async {
        for _ in 0..30 {
            for id in &ids {
                let found = resolver.get(id).await.unwrap();
                assert!(found.is_some(), "{id} missing from both tiers");
            }
            tokio::task::yield_now().await;
        }
    };
    let (report, ()) = tokio::join!(engine.run_cycle(cutoff()), lookups);

    assert_eq!(report.unwrap().archived(), ids.len());
    assert!(primary.is_empty());
    for id in &ids {
        let resolved = resolver.resolve(id).await.unwrap().unwrap();
        assert_eq!(resolved.tier, Tier::Archive);
    }
}
