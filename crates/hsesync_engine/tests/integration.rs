//! Integration tests for the queue, cache mirror and sync engine.

use hsesync_engine::{
    open_store, open_store_in_memory, CacheMirror, FlushOutcome, Notice, OrgContext, RemoteCall,
    SkipReason, SyncConfig, SyncError, SyncState,
};
use hsesync_model::{Collection, Document, OperationKind};
use hsesync_store::LocalStore;
use hsesync_testkit::{eventually, manual_config, EngineHarness};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn incident(id: &str) -> Document {
    Document::from_value(json!({"id": id, "type": "near_miss", "title": "Forklift reversing"}))
        .unwrap()
}

fn open_dir(path: &Path) -> Arc<LocalStore> {
    Arc::new(open_store(path).unwrap())
}

#[tokio::test]
async fn enqueue_then_read() {
    let h = EngineHarness::offline();
    let op = h
        .engine
        .queue()
        .enqueue(Collection::Incidents, OperationKind::Insert, incident("abc"))
        .unwrap();

    let listed = h.engine.queue().list_unsynced().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, op.id);
    assert_eq!(listed[0].collection, Collection::Incidents);
    assert_eq!(listed[0].kind, OperationKind::Insert);
    assert_eq!(listed[0].payload, incident("abc"));
    assert!(!listed[0].synced);
}

#[tokio::test]
async fn sync_removes_on_success() {
    let h = EngineHarness::online();
    h.writer.insert(Collection::Incidents, incident("abc")).unwrap();

    let outcome = h.engine.flush_now().await.unwrap();
    let report = outcome.report().unwrap();
    assert_eq!((report.attempted, report.succeeded, report.failed), (1, 1, 0));
    assert_eq!(h.queued(), 0);

    let calls = h.remote.calls();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        RemoteCall::Create { collection, record } => {
            assert_eq!(*collection, Collection::Incidents);
            assert_eq!(record.get("organization_id"), Some(&json!("org-1")));
            assert_eq!(record.get("type"), Some(&json!("near_miss")));
        }
        other => panic!("unexpected call {other:?}"),
    }
    assert_eq!(h.notices.notices(), vec![Notice::Synced { count: 1 }]);
}

#[tokio::test]
async fn sync_retains_on_failure() {
    let h = EngineHarness::online();
    let op = h.writer.insert(Collection::Incidents, incident("abc")).unwrap();
    h.remote.fail_record("abc");

    let report = h.engine.flush_now().await.unwrap().report().cloned().unwrap();
    assert_eq!((report.attempted, report.succeeded, report.failed), (1, 0, 1));

    let listed = h.engine.queue().list_unsynced().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, op.id);
    assert!(!listed[0].synced);
    assert_eq!(h.notices.notices(), vec![Notice::Synced { count: 1 }]);
}

#[tokio::test]
async fn partial_failure_is_isolated() {
    let h = EngineHarness::online();
    let a = h.writer.insert(Collection::Incidents, incident("a")).unwrap();
    let b = h.writer.insert(Collection::Incidents, incident("b")).unwrap();
    let c = h.writer.insert(Collection::Incidents, incident("c")).unwrap();
    h.remote.fail_record("b");

    let report = h.engine.flush_now().await.unwrap().report().cloned().unwrap();
    assert_eq!((report.attempted, report.succeeded, report.failed), (3, 2, 1));

    let remaining: Vec<String> = h
        .engine
        .queue()
        .list_unsynced()
        .unwrap()
        .into_iter()
        .map(|op| op.id)
        .collect();
    assert_eq!(remaining, vec![b.id.clone()]);

    // Replay order follows enqueue order, failures included.
    let order: Vec<Option<String>> = h
        .remote
        .calls()
        .iter()
        .map(|call| call.record_id().map(str::to_string))
        .collect();
    assert_eq!(order, ["a", "b", "c"].map(|s| Some(s.to_string())));
    assert!(h.engine.queue().get(&a.id).unwrap().is_none());
    assert!(h.engine.queue().get(&c.id).unwrap().is_none());
}

#[tokio::test]
async fn reentrant_flush_is_skipped() {
    let h = EngineHarness::online();
    h.writer.insert(Collection::Incidents, incident("a")).unwrap();
    h.remote.pause();

    let first = {
        let engine = Arc::clone(&h.engine);
        tokio::spawn(async move { engine.flush_now().await })
    };
    assert!(h.remote.wait_blocked(1, Duration::from_secs(10)).await);
    assert_eq!(h.engine.state(), SyncState::Syncing);

    let second = h.engine.flush_now().await.unwrap();
    assert_eq!(second, FlushOutcome::Skipped(SkipReason::InFlight));

    h.remote.resume();
    let first = first.await.unwrap().unwrap();
    assert_eq!(first.report().unwrap().succeeded, 1);
    assert_eq!(h.engine.state(), SyncState::Idle);
    assert_eq!(h.remote.calls().len(), 1);
}

#[tokio::test]
async fn offline_flush_is_a_noop() {
    let h = EngineHarness::offline();
    h.writer.insert(Collection::Incidents, incident("a")).unwrap();
    let mut states = h.engine.subscribe_state();

    let outcome = h.engine.flush_now().await.unwrap();
    assert_eq!(outcome, FlushOutcome::Skipped(SkipReason::Offline));
    assert!(!states.has_changed().unwrap());
    assert_eq!(h.queued(), 1);
    assert!(h.remote.calls().is_empty());
    assert!(h.notices.notices().is_empty());
}

#[tokio::test]
async fn cache_reflects_offline_writes() {
    let h = EngineHarness::offline();
    h.writer
        .refresh(Collection::Incidents, vec![incident("old")])
        .unwrap();

    h.writer.insert(Collection::Incidents, incident("new")).unwrap();
    h.writer
        .update(
            Collection::Incidents,
            Document::with_id("old").with("severity", json!("high")),
        )
        .unwrap();

    let cached = h.writer.read_all(Collection::Incidents).unwrap();
    assert_eq!(cached.len(), 2);
    assert_eq!(
        h.writer
            .get(Collection::Incidents, "old")
            .unwrap()
            .unwrap()
            .get("severity"),
        Some(&json!("high"))
    );
    assert!(h.writer.get(Collection::Incidents, "new").unwrap().is_some());
    assert_eq!(h.queued(), 2);
}

#[test]
fn full_replace_is_atomic() {
    let store = Arc::new(open_store_in_memory().unwrap());
    let cache = CacheMirror::new(Arc::clone(&store));
    let batch = |tag: &str| -> Vec<Document> {
        (0..50)
            .map(|n| {
                Document::from_value(json!({
                    "id": format!("r-{n:02}"),
                    "hazard": tag,
                    "risk_level": "low",
                }))
                .unwrap()
            })
            .collect()
    };
    cache.replace_all(Collection::RiskAssessments, batch("old")).unwrap();

    std::thread::scope(|scope| {
        let reader = scope.spawn(|| {
            for _ in 0..500 {
                let seen = cache.read_all(Collection::RiskAssessments).unwrap();
                assert_eq!(seen.len(), 50);
                let first = seen[0].get("hazard").cloned();
                assert!(seen.iter().all(|doc| doc.get("hazard").cloned() == first));
            }
        });
        for round in 0..50 {
            let tag = if round % 2 == 0 { "new" } else { "old" };
            cache.replace_all(Collection::RiskAssessments, batch(tag)).unwrap();
        }
        reader.join().unwrap();
    });
}

#[tokio::test]
async fn attempts_grow_per_failed_flush_and_vanish_on_success() {
    let h = EngineHarness::online();
    let op = h.writer.insert(Collection::Incidents, incident("abc")).unwrap();
    h.remote.fail_record("abc");

    for expected in 1..=3 {
        h.engine.flush_now().await.unwrap();
        let attempt = h.engine.queue().attempts(&op.id).unwrap().unwrap();
        assert_eq!(attempt.attempts, expected);
    }
    let health = h.engine.queue_health().unwrap();
    assert_eq!(health.pending, 1);
    assert_eq!(health.max_attempts, 3);

    h.remote.heal();
    h.engine.flush_now().await.unwrap();
    assert_eq!(h.queued(), 0);
    assert!(h.engine.queue().attempts(&op.id).unwrap().is_none());
}

#[tokio::test]
async fn context_failure_aborts_without_touching_queue() {
    let h = EngineHarness::online();
    let op = h.writer.insert(Collection::Incidents, incident("abc")).unwrap();
    h.remote.set_context(None);

    let err = h.engine.flush_now().await.unwrap_err();
    assert!(matches!(err, SyncError::ContextResolutionFailed(_)));
    assert!(h.remote.calls().is_empty());
    assert!(h.notices.notices().is_empty());
    assert!(h.engine.queue().attempts(&op.id).unwrap().is_none());
    assert_eq!(h.queued(), 1);

    h.remote.set_context(Some(OrgContext::new("org-7")));
    h.remote.set_identity(None);
    let err = h.engine.flush_now().await.unwrap_err();
    assert!(matches!(err, SyncError::NotAuthenticated(_)));
    assert_eq!(h.queued(), 1);
}

#[tokio::test]
async fn queue_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store");
    let first_id = {
        let h = EngineHarness::new(
            open_dir(&path),
            SyncConfig::new().with_flush_after_write(false),
            false,
        );
        let op = h.writer.insert(Collection::Incidents, incident("abc")).unwrap();
        h.writer.delete(Collection::PpeIssuances, "p-1").unwrap();
        op.id
    };

    let h = EngineHarness::new(open_dir(&path), manual_config(), true);
    let listed = h.engine.queue().list_unsynced().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, first_id);
    assert!(h.writer.get(Collection::Incidents, "abc").unwrap().is_some());

    h.engine.flush_now().await.unwrap();
    assert_eq!(h.queued(), 0);
}

#[tokio::test]
async fn write_while_online_flushes_immediately() {
    let h = EngineHarness::new(
        Arc::new(open_store_in_memory().unwrap()),
        SyncConfig::new().with_flush_on_start(false),
        true,
    );
    h.writer.insert(Collection::Incidents, incident("abc")).unwrap();
    eventually("write-triggered flush", || h.queued() == 0).await;
    assert_eq!(h.remote.records(Collection::Incidents).len(), 1);
}

#[tokio::test]
async fn timer_flushes_while_running() {
    let h = EngineHarness::new(
        Arc::new(open_store_in_memory().unwrap()),
        SyncConfig::new()
            .with_flush_interval(Duration::from_millis(50))
            .with_flush_on_start(false)
            .with_flush_after_write(false),
        true,
    );
    h.engine.start().unwrap();
    h.writer.insert(Collection::Incidents, incident("abc")).unwrap();

    eventually("timer flush", || h.queued() == 0).await;
    assert!(h.engine.stats().flushes_completed >= 1);
    h.engine.stop().await;
    assert!(!h.engine.is_running());
}

#[tokio::test]
async fn reconnect_notifies_and_flushes() {
    let h = EngineHarness::new(
        Arc::new(open_store_in_memory().unwrap()),
        SyncConfig::new()
            .with_flush_interval(Duration::from_secs(3600))
            .with_flush_on_start(false),
        false,
    );
    h.engine.start().unwrap();
    h.writer.insert(Collection::Incidents, incident("a")).unwrap();
    h.writer.insert(Collection::Incidents, incident("b")).unwrap();
    assert_eq!(h.queued(), 2);

    h.connectivity.set_online(true);
    eventually("reconnect flush", || h.queued() == 0).await;
    eventually("synced notice", || h.notices.notices().len() == 2).await;
    assert_eq!(
        h.notices.take(),
        vec![Notice::Reconnected, Notice::Synced { count: 2 }]
    );

    h.connectivity.set_online(false);
    eventually("offline notice", || !h.notices.notices().is_empty()).await;
    assert_eq!(h.notices.take(), vec![Notice::WentOffline]);
    h.engine.stop().await;
}

#[tokio::test]
async fn stop_waits_for_flush_in_progress() {
    let h = EngineHarness::new(
        Arc::new(open_store_in_memory().unwrap()),
        SyncConfig::new()
            .with_flush_interval(Duration::from_secs(3600))
            .with_flush_after_write(false),
        true,
    );
    h.writer.insert(Collection::Incidents, incident("a")).unwrap();
    h.remote.pause();
    h.engine.start().unwrap();
    assert!(h.remote.wait_blocked(1, Duration::from_secs(10)).await);

    let stopping = {
        let engine = Arc::clone(&h.engine);
        tokio::spawn(async move { engine.stop().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!stopping.is_finished());

    h.remote.resume();
    stopping.await.unwrap();
    assert_eq!(h.queued(), 0);
    assert_eq!(h.engine.state(), SyncState::Idle);
}

#[tokio::test]
async fn stop_ends_the_loop_while_the_timer_keeps_firing() {
    let h = EngineHarness::new(
        Arc::new(open_store_in_memory().unwrap()),
        manual_config().with_flush_interval(Duration::from_millis(1)),
        true,
    );
    h.writer.insert(Collection::Incidents, incident("a")).unwrap();
    h.remote.fail_record("a");
    h.engine.start().unwrap();
    eventually("repeated timer flushes", || h.engine.stats().flushes_completed >= 3).await;

    h.engine.stop().await;
    assert!(!h.engine.is_running());
    let flushes = h.engine.stats().flushes_completed;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.engine.stats().flushes_completed, flushes);
    assert_eq!(h.queued(), 1);
}
