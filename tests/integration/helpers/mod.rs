// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use std::sync::Arc;
use tempfile::TempDir;

/// 临时SQLite数据库，应用真实迁移
///
/// 目录守卫随测试结束自动清理
pub struct TestDb {
    pub db: Arc<DatabaseConnection>,
    _dir: TempDir,
}

pub async fn setup_database() -> TestDb {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("harvestrs-test.db");
    let url = format!("sqlite://{}?mode=rwc", path.display());

    let db = Database::connect(&url).await.expect("connect sqlite");
    Migrator::up(&db, None).await.expect("run migrations");

    TestDb {
        db: Arc::new(db),
        _dir: dir,
    }
}
