use crate::{
    id,
    modules::{
        account::entity::{Account, MailerType},
        database::{manager::DB_MANAGER, upsert_impl},
        scheduler::model::{SyncTaskEntity, TaskStatus},
    },
    utc_now,
};

async fn saved_account() -> Account {
    let account = Account {
        id: id!(64),
        email: format!("user-{}@example.com", id!(32)),
        name: None,
        enabled: true,
        mailer_type: MailerType::InMemory,
        imap: None,
        sync_folders: vec!["INBOX".into()],
        created_at: utc_now!(),
        updated_at: utc_now!(),
    };
    account.save().await.unwrap();
    account
}

#[tokio::test]
async fn test_schedule_creates_due_task() {
    let account = saved_account().await;
    SyncTaskEntity::schedule_account(&account).await.unwrap();

    let task = SyncTaskEntity::find(account.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Scheduled);
    assert_eq!(task.account_email, account.email);
    assert!(task.next_run <= utc_now!());

    let due = SyncTaskEntity::due_tasks().await.unwrap();
    assert!(due.iter().any(|t| t.account_id == account.id));
}

#[tokio::test]
async fn test_running_task_not_dispatched_again() {
    let account = saved_account().await;
    SyncTaskEntity::schedule_account(&account).await.unwrap();
    SyncTaskEntity::mark_running(account.id).await.unwrap();

    let due = SyncTaskEntity::due_tasks().await.unwrap();
    assert!(!due.iter().any(|t| t.account_id == account.id));
}

#[tokio::test]
async fn test_abandoned_running_task_is_reclaimed() {
    let account = saved_account().await;
    SyncTaskEntity::schedule_account(&account).await.unwrap();
    SyncTaskEntity::mark_running(account.id).await.unwrap();

    // a worker that dies between start and finish leaves the Running
    // marker behind; backdate the start past the stale window
    let mut task = SyncTaskEntity::find(account.id).await.unwrap().unwrap();
    task.last_run_at = Some(utc_now!() - 60_000);
    task.next_run = utc_now!() - 1;
    upsert_impl(DB_MANAGER.tasks_db(), task).await.unwrap();

    let due = SyncTaskEntity::due_tasks().await.unwrap();
    assert!(due
        .iter()
        .any(|t| t.account_id == account.id && t.status == TaskStatus::Running));
}

#[tokio::test]
async fn test_finished_task_reschedules() {
    let account = saved_account().await;
    SyncTaskEntity::schedule_account(&account).await.unwrap();
    SyncTaskEntity::mark_running(account.id).await.unwrap();

    SyncTaskEntity::mark_finished(account.id, Ok(7), 120)
        .await
        .unwrap();
    let task = SyncTaskEntity::find(account.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Success);
    assert_eq!(task.last_synced, 7);
    assert_eq!(task.last_duration_ms, Some(120));
    assert!(task.last_error.is_none());
    assert!(task.next_run > utc_now!() - 100);
}

#[tokio::test]
async fn test_failed_run_records_error_and_retries() {
    let account = saved_account().await;
    SyncTaskEntity::schedule_account(&account).await.unwrap();
    SyncTaskEntity::mark_running(account.id).await.unwrap();

    SyncTaskEntity::mark_finished(account.id, Err("timeout".into()), 40)
        .await
        .unwrap();
    let task = SyncTaskEntity::find(account.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.last_error.as_deref(), Some("timeout"));
    // stays scheduled for the next cadence tick
    assert!(task.next_run > 0);
}

#[tokio::test]
async fn test_reschedule_preserves_history() {
    let account = saved_account().await;
    SyncTaskEntity::schedule_account(&account).await.unwrap();
    SyncTaskEntity::mark_running(account.id).await.unwrap();
    SyncTaskEntity::mark_finished(account.id, Ok(3), 55)
        .await
        .unwrap();

    // account update re-registers the task
    SyncTaskEntity::schedule_account(&account).await.unwrap();
    let task = SyncTaskEntity::find(account.id).await.unwrap().unwrap();
    assert_eq!(task.last_synced, 3);
    assert_eq!(task.last_duration_ms, Some(55));
    assert_eq!(task.status, TaskStatus::Scheduled);
}

#[tokio::test]
async fn test_cleanup_removes_task() {
    let account = saved_account().await;
    SyncTaskEntity::schedule_account(&account).await.unwrap();
    SyncTaskEntity::cleanup_account(account.id).await.unwrap();
    assert!(SyncTaskEntity::find(account.id).await.unwrap().is_none());

    // idempotent
    SyncTaskEntity::cleanup_account(account.id).await.unwrap();
}
