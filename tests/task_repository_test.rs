mod common;

use chrono::{Duration, Utc};
use factotum::adapters::sqlite::SqliteTaskRepository;
use factotum::domain::errors::DomainError;
use factotum::domain::models::{Task, TaskStatus, TaskType, WaitDescriptor, WaitingFor};
use factotum::domain::ports::{TaskFilter, TaskRepository};
use uuid::Uuid;

use common::setup_test_pool;

fn sample_task(user_id: &str) -> Task {
    Task::new(user_id, "Email Jane about the offsite", TaskType::EmailWorkflow)
}

#[tokio::test]
async fn test_insert_and_get_roundtrip() {
    let pool = setup_test_pool().await;
    let repo = SqliteTaskRepository::new(pool);

    let mut task = sample_task("user-1");
    task.next_step = Some("step_2".to_string());
    task.record_completed_step("step_1");
    task.waiting_for = Some(WaitingFor::EmailReply);
    task.waiting_for_data = Some(
        WaitDescriptor::default()
            .with_thread_id("t-1")
            .with_recipient_email("jane@example.com"),
    );
    task.status = TaskStatus::WaitingForResponse;

    repo.insert(&task).await.expect("insert failed");
    let loaded = repo.get(task.id).await.expect("get failed").expect("missing row");

    assert_eq!(loaded, task);
}

#[tokio::test]
async fn test_get_nonexistent_returns_none() {
    let pool = setup_test_pool().await;
    let repo = SqliteTaskRepository::new(pool);

    let result = repo.get(Uuid::new_v4()).await.expect("query failed");
    assert!(result.is_none());
}

#[tokio::test]
async fn test_update_checked_detects_lost_race() {
    let pool = setup_test_pool().await;
    let repo = SqliteTaskRepository::new(pool);

    let mut task = sample_task("user-1");
    repo.insert(&task).await.unwrap();

    let stale_version = task.version;
    task.touch();
    repo.update_checked(&task, stale_version).await.unwrap();

    // A second writer still holding the old version loses.
    let mut racing = task.clone();
    racing.touch();
    let err = repo.update_checked(&racing, stale_version).await.unwrap_err();
    assert!(matches!(err, DomainError::ConcurrencyConflict(_)));
}

#[tokio::test]
async fn test_update_checked_missing_row_is_not_found() {
    let pool = setup_test_pool().await;
    let repo = SqliteTaskRepository::new(pool);

    let task = sample_task("user-1");
    let err = repo.update_checked(&task, task.version).await.unwrap_err();
    assert!(matches!(err, DomainError::TaskNotFound(_)));
}

#[tokio::test]
async fn test_delete_removes_row() {
    let pool = setup_test_pool().await;
    let repo = SqliteTaskRepository::new(pool);

    let task = sample_task("user-1");
    repo.insert(&task).await.unwrap();
    repo.delete(task.id).await.unwrap();
    assert!(repo.get(task.id).await.unwrap().is_none());

    let err = repo.delete(task.id).await.unwrap_err();
    assert!(matches!(err, DomainError::TaskNotFound(_)));
}

#[tokio::test]
async fn test_waiting_tasks_filtered_by_kind_newest_first() {
    let pool = setup_test_pool().await;
    let repo = SqliteTaskRepository::new(pool);

    let mut email_wait = sample_task("user-1");
    email_wait.status = TaskStatus::WaitingForResponse;
    email_wait.waiting_for = Some(WaitingFor::EmailReply);
    email_wait.waiting_for_data = Some(WaitDescriptor::default().with_thread_id("t-1"));
    email_wait.created_at = Utc::now() - Duration::minutes(30);

    let mut calendar_wait = sample_task("user-1");
    calendar_wait.status = TaskStatus::WaitingForResponse;
    calendar_wait.waiting_for = Some(WaitingFor::CalendarResponse);
    calendar_wait.waiting_for_data = Some(WaitDescriptor::default().with_object("e-1", "event"));

    let mut other_user = sample_task("user-2");
    other_user.status = TaskStatus::WaitingForResponse;
    other_user.waiting_for = Some(WaitingFor::EmailReply);
    other_user.waiting_for_data = Some(WaitDescriptor::default().with_thread_id("t-2"));

    repo.insert(&email_wait).await.unwrap();
    repo.insert(&calendar_wait).await.unwrap();
    repo.insert(&other_user).await.unwrap();

    let email_waits = repo
        .waiting_tasks("user-1", Some(WaitingFor::EmailReply))
        .await
        .unwrap();
    assert_eq!(email_waits.len(), 1);
    assert_eq!(email_waits[0].id, email_wait.id);

    let all_waits = repo.waiting_tasks("user-1", None).await.unwrap();
    assert_eq!(all_waits.len(), 2);
    // Newest first.
    assert_eq!(all_waits[0].id, calendar_wait.id);
}

#[tokio::test]
async fn test_active_tasks_excludes_terminal() {
    let pool = setup_test_pool().await;
    let repo = SqliteTaskRepository::new(pool);

    let pending = sample_task("user-1");
    let mut completed = sample_task("user-1");
    completed.status = TaskStatus::Completed;
    let mut cancelled = sample_task("user-1");
    cancelled.status = TaskStatus::Cancelled;

    repo.insert(&pending).await.unwrap();
    repo.insert(&completed).await.unwrap();
    repo.insert(&cancelled).await.unwrap();

    let active = repo.active_tasks("user-1").await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, pending.id);
}

#[tokio::test]
async fn test_overdue_tasks() {
    let pool = setup_test_pool().await;
    let repo = SqliteTaskRepository::new(pool);

    let now = Utc::now();

    let mut overdue = sample_task("user-1");
    overdue.scheduled_for = Some(now - Duration::hours(1));
    let mut upcoming = sample_task("user-1");
    upcoming.scheduled_for = Some(now + Duration::hours(1));
    let mut done = sample_task("user-1");
    done.scheduled_for = Some(now - Duration::hours(2));
    done.status = TaskStatus::Completed;

    repo.insert(&overdue).await.unwrap();
    repo.insert(&upcoming).await.unwrap();
    repo.insert(&done).await.unwrap();

    let found = repo.overdue_tasks("user-1", now).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, overdue.id);
}

#[tokio::test]
async fn test_list_with_filters_and_limit() {
    let pool = setup_test_pool().await;
    let repo = SqliteTaskRepository::new(pool);

    for _ in 0..3 {
        repo.insert(&sample_task("user-1")).await.unwrap();
    }
    let mut crm = Task::new("user-1", "Update the deal", TaskType::HubspotWorkflow);
    crm.status = TaskStatus::InProgress;
    repo.insert(&crm).await.unwrap();

    let by_type = repo
        .list(TaskFilter {
            user_id: Some("user-1".to_string()),
            task_type: Some(TaskType::HubspotWorkflow),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_type.len(), 1);
    assert_eq!(by_type[0].id, crm.id);

    let limited = repo
        .list(TaskFilter {
            user_id: Some("user-1".to_string()),
            limit: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn test_subtasks_and_status_counts() {
    let pool = setup_test_pool().await;
    let repo = SqliteTaskRepository::new(pool);

    let parent = sample_task("user-1");
    repo.insert(&parent).await.unwrap();

    let mut child_a = sample_task("user-1").with_parent(parent.id);
    child_a.status = TaskStatus::Completed;
    let child_b = sample_task("user-1").with_parent(parent.id);
    repo.insert(&child_a).await.unwrap();
    repo.insert(&child_b).await.unwrap();

    let children = repo.subtasks(parent.id).await.unwrap();
    assert_eq!(children.len(), 2);

    let counts = repo.count_by_status("user-1").await.unwrap();
    assert_eq!(counts.get(&TaskStatus::Pending), Some(&2));
    assert_eq!(counts.get(&TaskStatus::Completed), Some(&1));
}
