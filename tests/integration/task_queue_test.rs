// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Duration;
use harvestrs::domain::models::job::JobPlatform;
use harvestrs::domain::models::task::{ScrapeTask, TaskStatus};
use harvestrs::infrastructure::repositories::task_repo_impl::TaskRepositoryImpl;
use harvestrs::queue::task_queue::{DatabaseTaskQueue, TaskQueue};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::helpers::setup_database;

fn queue_with(repo: Arc<TaskRepositoryImpl>, lease_secs: i64) -> DatabaseTaskQueue<TaskRepositoryImpl> {
    DatabaseTaskQueue::new(repo, Duration::seconds(lease_secs))
}

async fn make_queue(lease_secs: i64) -> (DatabaseTaskQueue<TaskRepositoryImpl>, crate::helpers::TestDb) {
    let test_db = setup_database().await;
    let repo = Arc::new(TaskRepositoryImpl::new(test_db.db.clone()));
    (queue_with(repo, lease_secs), test_db)
}

#[tokio::test]
async fn test_details_enqueue_deduplicates_on_subject() {
    let (queue, _db) = make_queue(300).await;
    let owner = Uuid::new_v4();
    let params = json!({"subject_id": "job-42", "url": null});

    let first = queue
        .enqueue(ScrapeTask::new_details(
            owner,
            JobPlatform::Linkedin,
            "job-42",
            params.clone(),
        ))
        .await
        .unwrap();
    let second = queue
        .enqueue(ScrapeTask::new_details(
            owner,
            JobPlatform::Linkedin,
            "job-42",
            params.clone(),
        ))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.status, TaskStatus::Pending);

    // A different subject gets its own task
    let other = queue
        .enqueue(ScrapeTask::new_details(
            owner,
            JobPlatform::Linkedin,
            "job-43",
            json!({"subject_id": "job-43", "url": null}),
        ))
        .await
        .unwrap();
    assert_ne!(other.id, first.id);
}

#[tokio::test]
async fn test_terminal_details_task_is_reopened() {
    let (queue, _db) = make_queue(300).await;
    let owner = Uuid::new_v4();
    let params = json!({"subject_id": "job-77", "url": null});

    let task = queue
        .enqueue(ScrapeTask::new_details(
            owner,
            JobPlatform::Indeed,
            "job-77",
            params.clone(),
        ))
        .await
        .unwrap();

    let claimed = queue.claim_next(Uuid::new_v4()).await.unwrap().unwrap();
    queue.complete(claimed.id, json!({"done": true})).await.unwrap();

    // Re-requesting the same subject reuses the deterministic id
    let reopened = queue
        .enqueue(ScrapeTask::new_details(
            owner,
            JobPlatform::Indeed,
            "job-77",
            params,
        ))
        .await
        .unwrap();

    assert_eq!(reopened.id, task.id);
    assert_eq!(reopened.status, TaskStatus::Pending);
    assert!(reopened.result.is_none());
    assert!(reopened.completed_at.is_none());
}

#[tokio::test]
async fn test_claim_takes_oldest_pending_first() {
    let (queue, _db) = make_queue(300).await;
    let owner = Uuid::new_v4();

    let first = queue
        .enqueue(ScrapeTask::new_search(
            owner,
            JobPlatform::Linkedin,
            json!({"keywords": ["first"]}),
        ))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    queue
        .enqueue(ScrapeTask::new_search(
            owner,
            JobPlatform::Linkedin,
            json!({"keywords": ["second"]}),
        ))
        .await
        .unwrap();

    let claimed = queue.claim_next(Uuid::new_v4()).await.unwrap().unwrap();
    assert_eq!(claimed.id, first.id);
    assert_eq!(claimed.status, TaskStatus::Processing);
    assert!(claimed.lock_token.is_some());
    assert!(claimed.lock_expires_at.is_some());
}

#[tokio::test]
async fn test_concurrent_claims_yield_exactly_one_winner() {
    let (queue, _db) = make_queue(300).await;
    let queue = Arc::new(queue);
    let owner = Uuid::new_v4();

    queue
        .enqueue(ScrapeTask::new_search(
            owner,
            JobPlatform::Glassdoor,
            json!({"keywords": ["solo"]}),
        ))
        .await
        .unwrap();

    let a = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.claim_next(Uuid::new_v4()).await.unwrap() })
    };
    let b = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.claim_next(Uuid::new_v4()).await.unwrap() })
    };

    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    assert_eq!(
        a.is_some() as u8 + b.is_some() as u8,
        1,
        "exactly one claimer must win"
    );
}

#[tokio::test]
async fn test_complete_is_idempotent_and_terminal_is_immutable() {
    let (queue, _db) = make_queue(300).await;
    let owner = Uuid::new_v4();

    let task = queue
        .enqueue(ScrapeTask::new_search(
            owner,
            JobPlatform::Indeed,
            json!({"keywords": ["x"]}),
        ))
        .await
        .unwrap();
    let claimed = queue.claim_next(Uuid::new_v4()).await.unwrap().unwrap();
    assert_eq!(claimed.id, task.id);

    queue.complete(task.id, json!({"jobs": []})).await.unwrap();
    let completed = queue.status(task.id).await.unwrap().unwrap();
    assert_eq!(completed.status, TaskStatus::Completed);
    assert!(completed.completed_at.is_some());

    // Repeat completion and a late fail are both no-ops
    queue.complete(task.id, json!({"jobs": [1]})).await.unwrap();
    queue.fail(task.id, "late failure".into()).await.unwrap();

    let unchanged = queue.status(task.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, TaskStatus::Completed);
    assert_eq!(unchanged.result, Some(json!({"jobs": []})));
    assert!(unchanged.error.is_none());
}

#[tokio::test]
async fn test_expired_lease_is_reclaimed_and_reclaimable() {
    // 零秒租约：认领即过期
    let (queue, _db) = make_queue(0).await;
    let owner = Uuid::new_v4();

    let task = queue
        .enqueue(ScrapeTask::new_search(
            owner,
            JobPlatform::Linkedin,
            json!({"keywords": ["orphan"]}),
        ))
        .await
        .unwrap();
    let claimed = queue.claim_next(Uuid::new_v4()).await.unwrap().unwrap();
    assert_eq!(claimed.status, TaskStatus::Processing);

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let reclaimed = queue.reclaim_expired().await.unwrap();
    assert_eq!(reclaimed, 1);

    let status = queue.status(task.id).await.unwrap().unwrap();
    assert_eq!(status.status, TaskStatus::Pending);
    assert!(status.lock_token.is_none());

    // The reclaimed task can be claimed again
    let reclaimed_task = queue.claim_next(Uuid::new_v4()).await.unwrap().unwrap();
    assert_eq!(reclaimed_task.id, task.id);
}

#[tokio::test]
async fn test_active_lease_is_not_reclaimed() {
    let (queue, _db) = make_queue(300).await;
    let owner = Uuid::new_v4();

    queue
        .enqueue(ScrapeTask::new_search(
            owner,
            JobPlatform::Indeed,
            json!({"keywords": ["held"]}),
        ))
        .await
        .unwrap();
    queue.claim_next(Uuid::new_v4()).await.unwrap().unwrap();

    assert_eq!(queue.reclaim_expired().await.unwrap(), 0);
}

#[tokio::test]
async fn test_purge_removes_only_old_terminal_tasks() {
    let (queue, _db) = make_queue(300).await;
    let owner = Uuid::new_v4();

    let done = queue
        .enqueue(ScrapeTask::new_search(
            owner,
            JobPlatform::Linkedin,
            json!({"keywords": ["done"]}),
        ))
        .await
        .unwrap();
    let claimed = queue.claim_next(Uuid::new_v4()).await.unwrap().unwrap();
    assert_eq!(claimed.id, done.id);
    queue.complete(done.id, json!([])).await.unwrap();

    let pending = queue
        .enqueue(ScrapeTask::new_search(
            owner,
            JobPlatform::Linkedin,
            json!({"keywords": ["waiting"]}),
        ))
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    // 零保留期：所有已终态任务立即过期
    let removed = queue.purge_older_than(Duration::zero()).await.unwrap();
    assert_eq!(removed, 1);

    assert!(queue.status(done.id).await.unwrap().is_none());
    assert!(queue.status(pending.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_statistics_break_down_by_status_and_operation() {
    let (queue, _db) = make_queue(300).await;
    let owner = Uuid::new_v4();

    queue
        .enqueue(ScrapeTask::new_search(
            owner,
            JobPlatform::Linkedin,
            json!({"keywords": ["a"]}),
        ))
        .await
        .unwrap();
    queue
        .enqueue(ScrapeTask::new_details(
            owner,
            JobPlatform::Linkedin,
            "job-1",
            json!({"subject_id": "job-1", "url": null}),
        ))
        .await
        .unwrap();

    let claimed = queue.claim_next(Uuid::new_v4()).await.unwrap().unwrap();
    queue.fail(claimed.id, "boom".into()).await.unwrap();

    let stats = queue.statistics_for(owner).await.unwrap();
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.searches, 1);
    assert_eq!(stats.details, 1);

    // Other owners see nothing
    let other = queue.statistics_for(Uuid::new_v4()).await.unwrap();
    assert_eq!(other.pending + other.failed + other.completed, 0);
}
