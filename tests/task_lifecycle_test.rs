mod common;

use chrono::{Duration, Utc};
use factotum::domain::errors::DomainError;
use factotum::domain::models::{
    TaskPriority, TaskStatus, TaskType, WaitDescriptor, WaitingFor,
};
use factotum::services::{CreateOptions, TaskPatch};
use serde_json::json;
use uuid::Uuid;

use common::setup_lifecycle;

#[tokio::test]
async fn test_create_applies_defaults() {
    let lifecycle = setup_lifecycle().await;

    let task = lifecycle
        .create(
            "user-1",
            "Email Jane about the offsite",
            TaskType::EmailWorkflow,
            CreateOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.priority, TaskPriority::Medium);
    assert_eq!(task.max_retries, 3);
    assert!(task.wait_state_consistent());
}

#[tokio::test]
async fn test_create_rejects_missing_fields() {
    let lifecycle = setup_lifecycle().await;

    let err = lifecycle
        .create("user-1", "   ", TaskType::EmailWorkflow, CreateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    let err = lifecycle
        .create("", "Do a thing", TaskType::EmailWorkflow, CreateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
}

#[tokio::test]
async fn test_create_rejects_unknown_parent() {
    let lifecycle = setup_lifecycle().await;

    let err = lifecycle
        .create(
            "user-1",
            "Subtask of nothing",
            TaskType::MultiStepAction,
            CreateOptions {
                parent_task_id: Some(Uuid::new_v4()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::TaskNotFound(_)));
}

#[tokio::test]
async fn test_transition_stamps_terminal_timestamps_once() {
    let lifecycle = setup_lifecycle().await;
    let task = lifecycle
        .create("user-1", "Do a thing", TaskType::MultiStepAction, CreateOptions::default())
        .await
        .unwrap();

    lifecycle
        .transition(task.id, TaskStatus::InProgress, TaskPatch::default())
        .await
        .unwrap();
    let failed = lifecycle
        .transition(
            task.id,
            TaskStatus::Failed,
            TaskPatch::default().with_failure_reason("executor exploded"),
        )
        .await
        .unwrap();

    let first_failed_at = failed.failed_at.unwrap();
    assert_eq!(failed.failure_reason.as_deref(), Some("executor exploded"));

    // Retry, fail again: failed_at keeps its original stamp.
    lifecycle.retry(task.id).await.unwrap();
    lifecycle
        .transition(task.id, TaskStatus::InProgress, TaskPatch::default())
        .await
        .unwrap();
    let failed_again = lifecycle
        .transition(
            task.id,
            TaskStatus::Failed,
            TaskPatch::default().with_failure_reason("again"),
        )
        .await
        .unwrap();
    assert_eq!(failed_again.failed_at.unwrap(), first_failed_at);
}

#[tokio::test]
async fn test_transition_rejects_illegal_moves() {
    let lifecycle = setup_lifecycle().await;
    let task = lifecycle
        .create("user-1", "Do a thing", TaskType::MultiStepAction, CreateOptions::default())
        .await
        .unwrap();

    // Pending cannot complete directly.
    let err = lifecycle
        .transition(task.id, TaskStatus::Completed, TaskPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidTransition { .. }));

    // Cancelled is terminal.
    lifecycle.cancel(task.id, "no longer needed").await.unwrap();
    let err = lifecycle
        .transition(task.id, TaskStatus::InProgress, TaskPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidTransition { .. }));

    let err = lifecycle
        .transition(Uuid::new_v4(), TaskStatus::InProgress, TaskPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::TaskNotFound(_)));
}

#[tokio::test]
async fn test_waiting_invariant_holds_through_suspend_and_resume() {
    let lifecycle = setup_lifecycle().await;
    let task = lifecycle
        .create("user-1", "Email Jane", TaskType::EmailWorkflow, CreateOptions::default())
        .await
        .unwrap();
    lifecycle
        .transition(task.id, TaskStatus::InProgress, TaskPatch::default())
        .await
        .unwrap();

    let waiting = lifecycle
        .mark_waiting(
            task.id,
            WaitingFor::EmailReply,
            WaitDescriptor::default().with_thread_id("t-1"),
        )
        .await
        .unwrap();
    assert_eq!(waiting.status, TaskStatus::WaitingForResponse);
    assert!(waiting.wait_state_consistent());

    let resumed = lifecycle
        .resume(task.id, json!({"from": "jane@x.com"}), TaskStatus::InProgress)
        .await
        .unwrap();
    assert_eq!(resumed.status, TaskStatus::InProgress);
    assert!(resumed.waiting_for.is_none());
    assert!(resumed.waiting_for_data.is_none());
    assert!(resumed.wait_state_consistent());
    assert_eq!(
        resumed.workflow_state.resume_event,
        Some(json!({"from": "jane@x.com"}))
    );
}

#[tokio::test]
async fn test_mark_waiting_rejects_empty_descriptor() {
    let lifecycle = setup_lifecycle().await;
    let task = lifecycle
        .create("user-1", "Email Jane", TaskType::EmailWorkflow, CreateOptions::default())
        .await
        .unwrap();
    lifecycle
        .transition(task.id, TaskStatus::InProgress, TaskPatch::default())
        .await
        .unwrap();

    let err = lifecycle
        .mark_waiting(task.id, WaitingFor::EmailReply, WaitDescriptor::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
}

#[tokio::test]
async fn test_mark_waiting_replaces_prior_descriptor() {
    let lifecycle = setup_lifecycle().await;
    let task = lifecycle
        .create("user-1", "Email Jane", TaskType::EmailWorkflow, CreateOptions::default())
        .await
        .unwrap();
    lifecycle
        .transition(task.id, TaskStatus::InProgress, TaskPatch::default())
        .await
        .unwrap();

    lifecycle
        .mark_waiting(
            task.id,
            WaitingFor::EmailReply,
            WaitDescriptor::default().with_thread_id("t-old"),
        )
        .await
        .unwrap();
    let rewaited = lifecycle
        .mark_waiting(
            task.id,
            WaitingFor::CalendarResponse,
            WaitDescriptor::default().with_object("evt-1", "event"),
        )
        .await
        .unwrap();

    assert_eq!(rewaited.waiting_for, Some(WaitingFor::CalendarResponse));
    let descriptor = rewaited.waiting_for_data.unwrap();
    assert!(descriptor.thread_id.is_none());
    assert_eq!(descriptor.object_id.as_deref(), Some("evt-1"));
}

#[tokio::test]
async fn test_resume_requires_waiting_state_and_leaves_task_unmodified() {
    let lifecycle = setup_lifecycle().await;
    let task = lifecycle
        .create("user-1", "Email Jane", TaskType::EmailWorkflow, CreateOptions::default())
        .await
        .unwrap();

    let err = lifecycle
        .resume(task.id, json!({}), TaskStatus::InProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotWaiting(_)));

    let unchanged = lifecycle.require(task.id).await.unwrap();
    assert_eq!(unchanged, task);
}

#[tokio::test]
async fn test_retry_budget_is_enforced() {
    let lifecycle = setup_lifecycle().await;
    let task = lifecycle
        .create("user-1", "Do a thing", TaskType::MultiStepAction, CreateOptions::default())
        .await
        .unwrap();

    // Retry of a non-failed task is refused.
    let err = lifecycle.retry(task.id).await.unwrap_err();
    assert!(matches!(err, DomainError::NotFailed(_)));

    // Fail and retry three times; the fourth attempt exhausts the budget.
    for attempt in 1..=3 {
        lifecycle
            .transition(task.id, TaskStatus::InProgress, TaskPatch::default())
            .await
            .unwrap();
        lifecycle
            .transition(
                task.id,
                TaskStatus::Failed,
                TaskPatch::default().with_failure_reason("boom"),
            )
            .await
            .unwrap();
        let retried = lifecycle.retry(task.id).await.unwrap();
        assert_eq!(retried.retry_count, attempt);
        assert_eq!(retried.status, TaskStatus::Pending);
        assert!(retried.failure_reason.is_none());
    }

    lifecycle
        .transition(task.id, TaskStatus::InProgress, TaskPatch::default())
        .await
        .unwrap();
    lifecycle
        .transition(
            task.id,
            TaskStatus::Failed,
            TaskPatch::default().with_failure_reason("boom"),
        )
        .await
        .unwrap();

    let err = lifecycle.retry(task.id).await.unwrap_err();
    assert!(matches!(err, DomainError::RetryExhausted { max_retries: 3, .. }));

    let final_task = lifecycle.require(task.id).await.unwrap();
    assert_eq!(final_task.retry_count, 3);
}

#[tokio::test]
async fn test_cancel_cascades_to_subtasks() {
    let lifecycle = setup_lifecycle().await;
    let parent = lifecycle
        .create("user-1", "Parent work", TaskType::CompositeTask, CreateOptions::default())
        .await
        .unwrap();
    let child = lifecycle
        .create(
            "user-1",
            "Child work",
            TaskType::MultiStepAction,
            CreateOptions {
                parent_task_id: Some(parent.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let grandchild = lifecycle
        .create(
            "user-1",
            "Grandchild work",
            TaskType::MultiStepAction,
            CreateOptions {
                parent_task_id: Some(child.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let cancelled = lifecycle.cancel(parent.id, "scope changed").await.unwrap();
    assert_eq!(cancelled.len(), 3);

    for id in [parent.id, child.id, grandchild.id] {
        let task = lifecycle.require(id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert_eq!(task.failure_reason.as_deref(), Some("scope changed"));
    }
}

#[tokio::test]
async fn test_subtask_cannot_be_retried_after_parent_cancelled() {
    let lifecycle = setup_lifecycle().await;
    let parent = lifecycle
        .create("user-1", "Parent work", TaskType::CompositeTask, CreateOptions::default())
        .await
        .unwrap();
    let child = lifecycle
        .create(
            "user-1",
            "Child work",
            TaskType::MultiStepAction,
            CreateOptions {
                parent_task_id: Some(parent.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Child fails before the parent is cancelled, so it survives the
    // cascade in a failed state.
    lifecycle
        .transition(child.id, TaskStatus::InProgress, TaskPatch::default())
        .await
        .unwrap();
    lifecycle
        .transition(
            child.id,
            TaskStatus::Failed,
            TaskPatch::default().with_failure_reason("boom"),
        )
        .await
        .unwrap();
    lifecycle.cancel(parent.id, "abandoned").await.unwrap();

    let err = lifecycle.retry(child.id).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
}

#[tokio::test]
async fn test_parent_auto_completes_when_subtasks_terminal() {
    let lifecycle = setup_lifecycle().await;
    let parent = lifecycle
        .create("user-1", "Parent work", TaskType::CompositeTask, CreateOptions::default())
        .await
        .unwrap();
    lifecycle
        .transition(parent.id, TaskStatus::InProgress, TaskPatch::default())
        .await
        .unwrap();

    let mut children = Vec::new();
    for n in 0..2 {
        let child = lifecycle
            .create(
                "user-1",
                format!("Child {}", n).as_str(),
                TaskType::MultiStepAction,
                CreateOptions {
                    parent_task_id: Some(parent.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        lifecycle
            .transition(child.id, TaskStatus::InProgress, TaskPatch::default())
            .await
            .unwrap();
        children.push(child);
    }

    lifecycle
        .transition(children[0].id, TaskStatus::Completed, TaskPatch::default())
        .await
        .unwrap();
    let parent_mid = lifecycle.require(parent.id).await.unwrap();
    assert_eq!(parent_mid.status, TaskStatus::InProgress);

    lifecycle
        .transition(children[1].id, TaskStatus::Completed, TaskPatch::default())
        .await
        .unwrap();
    let parent_done = lifecycle.require(parent.id).await.unwrap();
    assert_eq!(parent_done.status, TaskStatus::Completed);
    assert!(parent_done.completed_at.is_some());
}

#[tokio::test]
async fn test_overdue_and_status_count_queries() {
    let lifecycle = setup_lifecycle().await;
    let now = Utc::now();

    lifecycle
        .create(
            "user-1",
            "Late task",
            TaskType::ScheduledTask,
            CreateOptions {
                scheduled_for: Some(now - Duration::hours(3)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let future = lifecycle
        .create(
            "user-1",
            "Future task",
            TaskType::ScheduledTask,
            CreateOptions {
                scheduled_for: Some(now + Duration::hours(3)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let overdue = lifecycle.overdue_tasks("user-1", now).await.unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].title, "Late task");

    // Rescheduling into the past makes the task overdue too.
    lifecycle
        .record_progress(
            future.id,
            TaskPatch {
                scheduled_for: Some(now - Duration::minutes(5)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let overdue = lifecycle.overdue_tasks("user-1", now).await.unwrap();
    assert_eq!(overdue.len(), 2);

    let counts = lifecycle.status_counts("user-1").await.unwrap();
    assert_eq!(counts.get(&TaskStatus::Pending), Some(&2));
}
