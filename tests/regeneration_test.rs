//! Full regeneration: streaming into a new generation, promotion, catch-up
//! of concurrent writes, cancellation and per-index serialization

mod common;

use common::{policies, policy, policy_key, tenant, Harness};
use policy_index_manager::lifecycle::{LifecycleError, MaintenanceCoordinator, RegenerationState, LIFECYCLE_METRICS};
use policy_index_manager::models::{EntityKind, Environment, IndexKey};
use policy_index_manager::search::SearchQuery;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

async fn document_ticks(harness: &Harness, key: &IndexKey, id: Uuid) -> Option<i64> {
    let response = harness
        .search
        .search(key, &SearchQuery::all().with_limit(1000))
        .await
        .unwrap();
    response
        .hits
        .into_iter()
        .find(|hit| hit.document.id == id)
        .map(|hit| hit.document.last_modified_ticks)
}

#[tokio::test]
async fn test_write_during_streaming_is_caught_up() {
    let harness = Harness::new(10);
    let key = policy_key("acme", Environment::Production);
    harness.policies.extend(policies(&key, (1..=50).map(|i| i * 100)));
    harness.syncer.sync_live(&key, &CancellationToken::new()).await.unwrap();
    assert_eq!(harness.syncer.read_watermark(&key).await.unwrap(), Some(5000));

    // Written after the last incremental sync
    let late = policy(&key, 6000);
    let late_id = late.id;
    harness.policies.upsert(late);

    // Modified again once the rebuild has read its final, empty page
    {
        let source = harness.policies.clone();
        harness.policies.on_page_served(move |page| {
            if page == 7 {
                source.touch(&late_id, 7000);
            }
        });
    }

    let report = harness
        .orchestrator
        .regenerate(&key, &CancellationToken::new())
        .await
        .unwrap();
    harness.policies.clear_page_hook();

    assert_eq!(report.generation, 2);
    assert_eq!(report.cutoff_ticks, Some(5000));
    assert_eq!(report.streamed_documents, 51);
    assert_eq!(report.streamed_pages, 6);
    assert_eq!(report.caught_up_documents, 1);

    assert_eq!(document_ticks(&harness, &key, late_id).await, Some(7000));
    assert_eq!(harness.syncer.read_watermark(&key).await.unwrap(), Some(7000));
    assert_eq!(harness.search.stats(&key).await.unwrap().document_count, 51);
    assert_eq!(harness.orchestrator.state(&key), RegenerationState::Idle);
}

#[tokio::test]
async fn test_entity_modified_while_streaming_keeps_later_pages_intact() {
    let harness = Harness::new(5);
    let key = policy_key("acme", Environment::Production);
    let records = policies(&key, 1..=10);
    let first = records[0].id;
    let sixth = records[5].id;
    harness.policies.extend(records);
    harness.syncer.sync_live(&key, &CancellationToken::new()).await.unwrap();

    {
        let source = harness.policies.clone();
        let touched = Arc::new(AtomicBool::new(false));
        harness.policies.on_page_served(move |page| {
            if page == 1 && !touched.swap(true, Ordering::SeqCst) {
                source.touch(&first, 100);
            }
        });
    }

    let report = harness
        .orchestrator
        .regenerate(&key, &CancellationToken::new())
        .await
        .unwrap();
    harness.policies.clear_page_hook();

    assert_eq!(report.cutoff_ticks, Some(10));
    assert_eq!(report.streamed_documents, 11);
    assert_eq!(report.caught_up_documents, 1);

    assert_eq!(harness.search.stats(&key).await.unwrap().document_count, 10);
    assert_eq!(document_ticks(&harness, &key, sixth).await, Some(6));
    assert_eq!(document_ticks(&harness, &key, first).await, Some(100));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_promotion_waits_for_in_flight_sync() {
    let harness = Harness::new(10);
    let key = policy_key("acme", Environment::Production);
    harness.policies.extend(policies(&key, 1..=30));
    harness.syncer.sync_live(&key, &CancellationToken::new()).await.unwrap();
    harness.policies.extend(policies(&key, 31..=50));

    // The next sync stalls while its first page is served
    let (started_tx, started_rx) = tokio::sync::oneshot::channel();
    {
        let started = Mutex::new(Some(started_tx));
        harness.policies.on_page_served(move |_| {
            let first_call = started.lock().unwrap().take();
            if let Some(tx) = first_call {
                let _ = tx.send(());
                std::thread::sleep(Duration::from_millis(1500));
            }
        });
    }

    let sync = {
        let syncer = harness.syncer.clone();
        let key = key.clone();
        tokio::spawn(async move { syncer.sync_live(&key, &CancellationToken::new()).await })
    };
    started_rx.await.unwrap();

    let report = harness
        .orchestrator
        .regenerate(&key, &CancellationToken::new())
        .await
        .unwrap();
    assert!(sync.is_finished(), "generation promoted while a sync was still writing");
    let synced = sync.await.unwrap().unwrap();
    harness.policies.clear_page_hook();

    assert_eq!(synced.documents_written, 20);
    assert_eq!(report.generation, 2);
    assert_eq!(report.cutoff_ticks, Some(30));
    assert_eq!(report.caught_up_documents, 20);

    // Syncs after the promotion write into the new generation
    harness.policies.extend(policies(&key, 51..=55));
    harness.syncer.sync_live(&key, &CancellationToken::new()).await.unwrap();
    let stats = harness.search.stats(&key).await.unwrap();
    assert_eq!(stats.generation, Some(2));
    assert_eq!(stats.document_count, 55);
    assert_eq!(stats.watermark_ticks, Some(55));
}

#[tokio::test]
async fn test_regeneration_of_never_built_index() {
    let harness = Harness::new(100);
    let key = policy_key("acme", Environment::Staging);
    harness.policies.extend(policies(&key, 1..=30));

    let report = harness
        .orchestrator
        .regenerate(&key, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.generation, 1);
    assert_eq!(report.cutoff_ticks, None);
    // Without a cutoff the catch-up is a full pass over already indexed entities
    assert_eq!(report.caught_up_documents, 30);
    assert_eq!(harness.search.stats(&key).await.unwrap().document_count, 30);
}

#[tokio::test]
async fn test_cancelled_regeneration_leaves_live_untouched() {
    let harness = Harness::new(10);
    let key = policy_key("acme", Environment::Production);
    harness.policies.extend(policies(&key, 1..=40));
    harness.syncer.sync_live(&key, &CancellationToken::new()).await.unwrap();
    let live_before = harness.generations.get_live_directory(&key).unwrap();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        harness.policies.on_page_served(move |page| {
            if page == 2 {
                cancel.cancel();
            }
        });
    }

    let err = harness.orchestrator.regenerate(&key, &cancel).await.unwrap_err();
    harness.policies.clear_page_hook();

    assert!(err.is_cancelled(), "unexpected error: {}", err);
    assert!(matches!(
        err,
        LifecycleError::RegenerationAborted {
            state: RegenerationState::Streaming,
            ..
        }
    ));
    assert_eq!(harness.generations.get_live_directory(&key).unwrap(), live_before);
    assert_eq!(harness.search.stats(&key).await.unwrap().document_count, 40);
    assert_eq!(harness.orchestrator.state(&key), RegenerationState::Idle);
    assert!(!harness.orchestrator.has_pending_catchup(&key));

    // The abandoned directory is discarded by the next attempt
    let report = harness
        .orchestrator
        .regenerate(&key, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.generation, 3);
    assert_eq!(harness.search.stats(&key).await.unwrap().document_count, 40);
}

#[tokio::test]
async fn test_failed_streaming_page_aborts_before_promotion() {
    let harness = Harness::new(10);
    let key = policy_key("acme", Environment::Production);
    harness.policies.extend(policies(&key, 1..=35));
    harness.syncer.sync_live(&key, &CancellationToken::new()).await.unwrap();

    harness.policies.fail_page_once(3);
    let err = harness
        .orchestrator
        .regenerate(&key, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(!err.is_cancelled());
    assert!(matches!(
        err,
        LifecycleError::RegenerationAborted {
            state: RegenerationState::Streaming,
            ..
        }
    ));
    assert_eq!(harness.generations.live_generation(&key).unwrap().unwrap().id, 1);
    assert_eq!(harness.search.stats(&key).await.unwrap().document_count, 35);
}

#[tokio::test]
async fn test_regenerations_of_one_index_are_serialized() {
    let harness = Harness::new(100);
    let key = policy_key("acme", Environment::Production);
    let other = IndexKey::new(key.tenant.clone(), Environment::Production, EntityKind::Quote);
    harness.policies.extend(policies(&key, 1..=5));

    let guard = harness.locks.acquire(&key).await;

    // A different index is not blocked
    harness
        .orchestrator
        .regenerate(&other, &CancellationToken::new())
        .await
        .unwrap();

    let blocked = {
        let orchestrator = harness.orchestrator.clone();
        let key = key.clone();
        tokio::spawn(async move { orchestrator.regenerate(&key, &CancellationToken::new()).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!blocked.is_finished());
    assert_eq!(harness.orchestrator.state(&key), RegenerationState::Idle);
    assert!(harness.generations.live_generation(&key).unwrap().is_none());

    drop(guard);
    let report = blocked.await.unwrap().unwrap();
    assert_eq!(report.streamed_documents, 5);
    assert!(!harness.locks.is_locked(&key));
}

#[tokio::test]
async fn test_failed_catch_up_is_retried_by_next_sync_cycle() {
    let harness = Harness::new(10);
    let key = policy_key("acme", Environment::Production);
    harness.policies.extend(policies(&key, 1..=50));
    harness.syncer.sync_live(&key, &CancellationToken::new()).await.unwrap();

    // Fail the first catch-up page once streaming has served its last page
    {
        let source = harness.policies.clone();
        harness.policies.on_page_served(move |page| {
            if page == 5 {
                source.fail_page_once(1);
            }
        });
    }

    let err = harness
        .orchestrator
        .regenerate(&key, &CancellationToken::new())
        .await
        .unwrap_err();
    harness.policies.clear_page_hook();

    assert!(matches!(err, LifecycleError::SyncPageFailed { page: 1, .. }));
    assert_eq!(harness.orchestrator.state(&key), RegenerationState::Idle);
    assert!(
        LIFECYCLE_METRICS
            .regenerations_total
            .with_label_values(&["production", "policy", "catchup_pending"])
            .get()
            >= 1.0
    );
    // Promotion already happened; only the catch-up is outstanding
    assert_eq!(harness.generations.live_generation(&key).unwrap().unwrap().id, 2);
    assert!(harness.orchestrator.has_pending_catchup(&key));

    harness.policies.extend(policies(&key, 51..=55));
    let coordinator = MaintenanceCoordinator::new(harness.orchestrator.clone(), vec![tenant("acme")])
        .with_environments(vec![Environment::Production])
        .with_kinds(vec![EntityKind::Policy]);

    let summary = coordinator.run_incremental_sync(&CancellationToken::new()).await;
    assert!(summary.is_clean(), "{:?}", summary.failures);
    assert!(!harness.orchestrator.has_pending_catchup(&key));
    assert_eq!(harness.search.stats(&key).await.unwrap().document_count, 55);
    assert_eq!(harness.syncer.read_watermark(&key).await.unwrap(), Some(55));
}

#[tokio::test]
async fn test_coordinator_regenerates_every_tenant() {
    let harness = Harness::new(10);
    let acme = policy_key("acme", Environment::Production);
    let globex = policy_key("globex", Environment::Production);
    harness.policies.extend(policies(&acme, 1..=12));
    harness.policies.extend(policies(&globex, 1..=8));

    let orchestrator = harness
        .orchestrator
        .clone()
        .with_environments(vec![Environment::Production]);
    let coordinator = MaintenanceCoordinator::new(orchestrator, vec![tenant("globex"), tenant("acme")])
        .with_environments(vec![Environment::Production]);

    let summaries = coordinator.run_regeneration(&CancellationToken::new()).await;
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].tenant, tenant("acme"));
    assert!(summaries.iter().all(|s| s.is_success()));
    // Policies and quotes for each tenant
    assert!(summaries.iter().all(|s| s.completed.len() == 2));

    assert_eq!(harness.search.stats(&acme).await.unwrap().document_count, 12);
    assert_eq!(harness.search.stats(&globex).await.unwrap().document_count, 8);
}
