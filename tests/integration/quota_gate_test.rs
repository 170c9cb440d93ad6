// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{Duration, Utc};
use harvestrs::application::quota_gate::QuotaGate;
use harvestrs::domain::models::quota::{RoutingMode, SubscriberTier, TierLimits, TierTable};
use harvestrs::domain::models::task::Operation;
use harvestrs::domain::repositories::quota_repository::QuotaRepository;
use harvestrs::infrastructure::database::entities::quota_counter;
use harvestrs::infrastructure::repositories::quota_repo_impl::QuotaRepositoryImpl;
use harvestrs::utils::errors::ScrapeError;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::helpers::setup_database;

fn small_tier_table() -> TierTable {
    let limits = |search, detail, routing| TierLimits {
        search_daily: search,
        detail_daily: detail,
        routing,
    };
    TierTable {
        free: limits(3, 2, RoutingMode::Deferred),
        basic: limits(10, 5, RoutingMode::Deferred),
        pro: limits(10, 5, RoutingMode::Immediate),
        enterprise: limits(100, 50, RoutingMode::Immediate),
    }
}

async fn make_gate() -> (QuotaGate, Arc<QuotaRepositoryImpl>, crate::helpers::TestDb) {
    let test_db = setup_database().await;
    let repo = Arc::new(QuotaRepositoryImpl::new(test_db.db.clone()));
    let gate = QuotaGate::new(repo.clone(), small_tier_table());
    (gate, repo, test_db)
}

#[tokio::test]
async fn test_limit_plus_one_is_rejected_without_side_effects() {
    let (gate, _repo, _db) = make_gate().await;
    let owner = Uuid::new_v4();

    for _ in 0..3 {
        gate.route_and_accept(owner, SubscriberTier::Free, Operation::Search)
            .await
            .unwrap();
    }

    let rejected = gate
        .route_and_accept(owner, SubscriberTier::Free, Operation::Search)
        .await;
    assert!(matches!(rejected, Err(ScrapeError::QuotaExceeded(_))));

    // The rejected call must not have incremented anything
    let usage = gate.usage(owner, SubscriberTier::Free).await.unwrap();
    assert_eq!(usage.search_used, 3);
    assert_eq!(usage.search_remaining, 0);
}

#[tokio::test]
async fn test_search_and_detail_budgets_are_independent() {
    let (gate, _repo, _db) = make_gate().await;
    let owner = Uuid::new_v4();

    for _ in 0..3 {
        gate.route_and_accept(owner, SubscriberTier::Free, Operation::Search)
            .await
            .unwrap();
    }
    // Search budget is spent, details still available
    assert!(gate
        .route_and_accept(owner, SubscriberTier::Free, Operation::Search)
        .await
        .is_err());
    assert!(gate
        .route_and_accept(owner, SubscriberTier::Free, Operation::Details)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_day_rollover_resets_the_counter() {
    let (gate, _repo, db) = make_gate().await;
    let owner = Uuid::new_v4();

    for _ in 0..3 {
        gate.route_and_accept(owner, SubscriberTier::Free, Operation::Search)
            .await
            .unwrap();
    }
    assert!(gate
        .route_and_accept(owner, SubscriberTier::Free, Operation::Search)
        .await
        .is_err());

    // 模拟跨日：把窗口拨回昨天
    let yesterday = Utc::now() - Duration::days(1);
    quota_counter::Entity::update_many()
        .set(quota_counter::ActiveModel {
            window_start: Set(yesterday.into()),
            ..Default::default()
        })
        .filter(quota_counter::Column::OwnerId.eq(owner))
        .exec(db.db.as_ref())
        .await
        .unwrap();

    // A fresh day admits the request again with a fresh counter
    gate.route_and_accept(owner, SubscriberTier::Free, Operation::Search)
        .await
        .unwrap();
    let usage = gate.usage(owner, SubscriberTier::Free).await.unwrap();
    assert_eq!(usage.search_used, 1);
}

#[tokio::test]
async fn test_concurrent_burst_cannot_exceed_limit() {
    let (gate, _repo, _db) = make_gate().await;
    let gate = Arc::new(gate);
    let owner = Uuid::new_v4();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let gate = gate.clone();
        handles.push(tokio::spawn(async move {
            gate.route_and_accept(owner, SubscriberTier::Basic, Operation::Search)
                .await
                .is_ok()
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            accepted += 1;
        }
    }

    // basic层级搜索限额为10
    assert_eq!(accepted, 10);
    let usage = gate.usage(owner, SubscriberTier::Basic).await.unwrap();
    assert_eq!(usage.search_used, 10);
}

#[tokio::test]
async fn test_can_accept_has_no_side_effects() {
    let (gate, _repo, _db) = make_gate().await;
    let owner = Uuid::new_v4();

    for _ in 0..5 {
        assert!(gate
            .can_accept(owner, SubscriberTier::Free, Operation::Search)
            .await
            .unwrap());
    }

    let usage = gate.usage(owner, SubscriberTier::Free).await.unwrap();
    assert_eq!(usage.search_used, 0);
}

#[tokio::test]
async fn test_scheduler_style_rollover_sweep() {
    let (gate, repo, db) = make_gate().await;
    let owner = Uuid::new_v4();

    gate.route_and_accept(owner, SubscriberTier::Free, Operation::Details)
        .await
        .unwrap();

    let yesterday = Utc::now() - Duration::days(1);
    quota_counter::Entity::update_many()
        .set(quota_counter::ActiveModel {
            window_start: Set(yesterday.into()),
            ..Default::default()
        })
        .filter(quota_counter::Column::OwnerId.eq(owner))
        .exec(db.db.as_ref())
        .await
        .unwrap();

    let rolled = repo.rollover_expired().await.unwrap();
    assert_eq!(rolled, 1);

    let counter = repo.find_by_owner(owner).await.unwrap().unwrap();
    assert_eq!(counter.detail_count, 0);
}

#[tokio::test]
async fn test_usage_reports_limits_and_reset_time() {
    let (gate, _repo, _db) = make_gate().await;
    let owner = Uuid::new_v4();

    gate.route_and_accept(owner, SubscriberTier::Free, Operation::Search)
        .await
        .unwrap();

    let usage = gate.usage(owner, SubscriberTier::Free).await.unwrap();
    assert_eq!(usage.search_used, 1);
    assert_eq!(usage.search_limit, 3);
    assert_eq!(usage.search_remaining, 2);
    assert_eq!(usage.detail_used, 0);
    assert!(usage.resets_at > Utc::now());
}
