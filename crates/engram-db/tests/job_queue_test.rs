//! Ingestion queue integration tests.
//!
//! These run against a live PostgreSQL instance with the engram schema
//! applied. Set `DATABASE_URL` and run with `cargo test -- --ignored`.

use std::time::Duration;

use uuid::Uuid;

use engram_core::{CaptureMetadata, JobRepository, JobStatus, NewCapture};
use engram_db::{Database, JobQueueConfig};

async fn test_db() -> Database {
    dotenvy::dotenv().ok();
    let url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/engram_test".to_string());
    Database::connect(&url).await.expect("test database")
}

fn capture(user_id: Uuid, text: &str, url: Option<&str>) -> NewCapture {
    NewCapture {
        user_id,
        raw_text: text.to_string(),
        metadata: CaptureMetadata {
            url: url.map(String::from),
            ..Default::default()
        },
    }
}

#[tokio::test]
#[ignore]
async fn test_enqueue_identical_text_is_deduplicated() {
    let db = test_db().await;
    let user_id = Uuid::new_v4();

    let first = db
        .jobs
        .enqueue(capture(user_id, "identical capture text for dedup", None))
        .await
        .unwrap();
    let second = db
        .jobs
        .enqueue(capture(user_id, "identical capture text for dedup", None))
        .await
        .unwrap();

    assert!(!first.is_duplicate());
    assert!(second.is_duplicate());
    assert_eq!(first.job_id(), second.job_id());
}

#[tokio::test]
#[ignore]
async fn test_enqueue_same_url_near_duplicate_is_suppressed() {
    let db = test_db().await;
    let user_id = Uuid::new_v4();
    let base = "the rust borrow checker enforces unique mutable references at compile time \
                and rejects aliased mutation";

    let first = db
        .jobs
        .enqueue(capture(user_id, base, Some("https://example.com/borrow")))
        .await
        .unwrap();
    // One trailing word differs: same URL, similarity above 0.9.
    let second = db
        .jobs
        .enqueue(capture(
            user_id,
            &format!("{base} today"),
            Some("https://example.com/borrow"),
        ))
        .await
        .unwrap();

    assert!(second.is_duplicate());
    assert_eq!(first.job_id(), second.job_id());
}

#[tokio::test]
#[ignore]
async fn test_different_users_are_not_deduplicated() {
    let db = test_db().await;

    let a = db
        .jobs
        .enqueue(capture(Uuid::new_v4(), "shared capture text", None))
        .await
        .unwrap();
    let b = db
        .jobs
        .enqueue(capture(Uuid::new_v4(), "shared capture text", None))
        .await
        .unwrap();

    assert!(!a.is_duplicate());
    assert!(!b.is_duplicate());
    assert_ne!(a.job_id(), b.job_id());
}

#[tokio::test]
#[ignore]
async fn test_claim_takes_lease_and_complete_is_terminal() {
    let db = test_db().await;
    let user_id = Uuid::new_v4();

    let outcome = db
        .jobs
        .enqueue(capture(user_id, &format!("claim test {}", Uuid::new_v4()), None))
        .await
        .unwrap();

    let job = loop {
        let claimed = db.jobs.claim_next().await.unwrap().expect("claimable job");
        if claimed.id == outcome.job_id() {
            break claimed;
        }
        // Another test's job; finish it and keep claiming.
        db.jobs.complete(claimed.id).await.unwrap();
    };

    assert_eq!(job.status, JobStatus::Running);
    assert!(job.lease_expires_at.is_some());

    db.jobs.complete(job.id).await.unwrap();
    let stored = db.jobs.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
}

#[tokio::test]
#[ignore]
async fn test_fail_delays_then_fails_terminally() {
    let db = test_db().await;
    let user_id = Uuid::new_v4();

    let outcome = db
        .jobs
        .enqueue(capture(user_id, &format!("retry test {}", Uuid::new_v4()), None))
        .await
        .unwrap();
    let job_id = outcome.job_id();

    db.jobs.fail(job_id, "first failure").await.unwrap();
    let delayed = db.jobs.get(job_id).await.unwrap().unwrap();
    assert_eq!(delayed.status, JobStatus::Delayed);
    assert_eq!(delayed.retry_count, 1);
    assert!(delayed.run_at.is_some());

    db.jobs.fail(job_id, "second failure").await.unwrap();
    let failed = db.jobs.get(job_id).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error_message.as_deref(), Some("second failure"));
}

#[tokio::test]
#[ignore]
async fn test_cleanup_preserves_non_completed_jobs() {
    let db = test_db().await;
    let user_id = Uuid::new_v4();

    let pending = db
        .jobs
        .enqueue(capture(user_id, &format!("pending {}", Uuid::new_v4()), None))
        .await
        .unwrap();

    db.jobs.cleanup().await.unwrap();

    let job = db.jobs.get(pending.job_id()).await.unwrap();
    assert!(job.is_some(), "pending jobs must survive cleanup");
}

#[tokio::test]
#[ignore]
async fn test_stalled_cancelled_job_is_discarded() {
    // Short lease and zero stall grace so the sweep sees the job
    // immediately.
    dotenvy::dotenv().ok();
    let url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/engram_test".to_string());
    let db = Database::connect_with(
        &url,
        Default::default(),
        JobQueueConfig {
            lease_secs: 0,
            stall_after_secs: 0,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let user_id = Uuid::new_v4();
    let outcome = db
        .jobs
        .enqueue(capture(user_id, &format!("stall test {}", Uuid::new_v4()), None))
        .await
        .unwrap();
    let job_id = outcome.job_id();

    // Claim, then request cancellation while it is "running".
    loop {
        let claimed = db.jobs.claim_next().await.unwrap().expect("claimable job");
        if claimed.id == job_id {
            break;
        }
        db.jobs.complete(claimed.id).await.unwrap();
    }
    assert!(db.jobs.request_cancel(job_id).await.unwrap());

    tokio::time::sleep(Duration::from_millis(50)).await;
    db.jobs.recover_stalled().await.unwrap();

    let job = db.jobs.get(job_id).await.unwrap().unwrap();
    assert_eq!(
        job.status,
        JobStatus::Cancelled,
        "stalled cancelled job is discarded, not retried"
    );
}
