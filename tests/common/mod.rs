//! Shared test helpers: in-memory database setup and engine wiring
//! against the scripted mock collaborators.

#![allow(dead_code)]

use std::sync::Arc;

use factotum::adapters::mock::{MockExecutor, MockOracle};
use factotum::adapters::sqlite::{create_migrated_test_pool, SqliteTaskRepository};
use factotum::services::{EventMatcher, TaskLifecycle, WorkflowEngine};
use sqlx::SqlitePool;

pub async fn setup_test_pool() -> SqlitePool {
    create_migrated_test_pool()
        .await
        .expect("failed to create test database")
}

pub async fn setup_lifecycle() -> Arc<TaskLifecycle<SqliteTaskRepository>> {
    let pool = setup_test_pool().await;
    Arc::new(TaskLifecycle::new(Arc::new(SqliteTaskRepository::new(pool))))
}

pub struct TestHarness {
    pub lifecycle: Arc<TaskLifecycle<SqliteTaskRepository>>,
    pub engine: Arc<WorkflowEngine<SqliteTaskRepository, MockExecutor, MockOracle>>,
    pub matcher: EventMatcher<SqliteTaskRepository, MockExecutor, MockOracle>,
    pub executor: Arc<MockExecutor>,
    pub oracle: Arc<MockOracle>,
}

pub async fn setup_harness() -> TestHarness {
    let lifecycle = setup_lifecycle().await;
    let executor = Arc::new(MockExecutor::new());
    let oracle = Arc::new(MockOracle::new());
    let engine = Arc::new(WorkflowEngine::new(
        lifecycle.clone(),
        executor.clone(),
        oracle.clone(),
    ));
    let matcher = EventMatcher::new(lifecycle.clone(), engine.clone());

    TestHarness {
        lifecycle,
        engine,
        matcher,
        executor,
        oracle,
    }
}
