//! Stuck-job reaper behavior against the mock queue store.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use mailroom_core::EmailStatus;
use mailroom_delivery::{storage::mock::MockQueueStorage, StuckReaper};
use tokio_util::sync::CancellationToken;

const INTERVAL: Duration = Duration::from_secs(30);

#[tokio::test]
async fn requeues_rows_older_than_the_threshold() {
    let storage = Arc::new(MockQueueStorage::new());

    let orphaned = storage
        .insert_aged(
            "orphan@x.test",
            EmailStatus::Processing,
            Utc::now() - chrono::Duration::seconds(60),
        )
        .await;
    let in_flight = storage.insert("fresh@x.test", EmailStatus::Processing).await;

    let reaper = StuckReaper::new(storage.clone(), INTERVAL, CancellationToken::new());
    let requeued = reaper.run_once().await.expect("reaper pass should succeed");

    assert_eq!(requeued, 1);
    assert_eq!(storage.status_of(orphaned).await, Some(EmailStatus::Pending));
    // A row updated within the threshold is still being worked on.
    assert_eq!(storage.status_of(in_flight).await, Some(EmailStatus::Processing));
}

#[tokio::test]
async fn terminal_rows_are_never_requeued() {
    let storage = Arc::new(MockQueueStorage::new());
    let old = Utc::now() - chrono::Duration::seconds(3600);

    let sent = storage.insert_aged("done@x.test", EmailStatus::Sent, old).await;
    let failed = storage.insert_aged("bounced@x.test", EmailStatus::Failed, old).await;
    let pending = storage.insert_aged("queued@x.test", EmailStatus::Pending, old).await;

    let reaper = StuckReaper::new(storage.clone(), INTERVAL, CancellationToken::new());
    let requeued = reaper.run_once().await.expect("reaper pass should succeed");

    assert_eq!(requeued, 0);
    assert_eq!(storage.status_of(sent).await, Some(EmailStatus::Sent));
    assert_eq!(storage.status_of(failed).await, Some(EmailStatus::Failed));
    assert_eq!(storage.status_of(pending).await, Some(EmailStatus::Pending));
}

#[tokio::test(start_paused = true)]
async fn reaper_loop_ticks_until_cancelled() {
    let storage = Arc::new(MockQueueStorage::new());
    let orphaned = storage
        .insert_aged(
            "orphan@x.test",
            EmailStatus::Processing,
            Utc::now() - chrono::Duration::seconds(120),
        )
        .await;

    let token = CancellationToken::new();
    let reaper = StuckReaper::new(storage.clone(), INTERVAL, token.clone());
    let handle = tokio::spawn(async move { reaper.run().await });

    // One interval elapses on the paused clock, so one pass runs.
    tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
    assert_eq!(storage.status_of(orphaned).await, Some(EmailStatus::Pending));

    token.cancel();
    handle.await.expect("reaper task should join cleanly");
}
