use native_db::*;
use native_model::{native_model, Model};
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    modules::{
        account::entity::Account,
        database::{
            async_find_impl, batch_delete_impl, list_all_impl, manager::DB_MANAGER, update_impl,
            upsert_impl,
        },
        error::{code::ErrorCode, NuboResult},
        settings::cli::SETTINGS,
    },
    raise_error, utc_now,
};

/// Lifecycle of a scheduled account sync.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize, Enum)]
pub enum TaskStatus {
    /// Waiting for its next due time.
    #[default]
    Scheduled,
    /// A dispatch is currently executing the sync.
    Running,
    /// The last run completed without error.
    Success,
    /// The last run failed; the task stays scheduled and retries on its
    /// normal cadence.
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status_str = match self {
            TaskStatus::Scheduled => "Scheduled",
            TaskStatus::Running => "Running",
            TaskStatus::Success => "Success",
            TaskStatus::Failed => "Failed",
        };
        write!(f, "{}", status_str)
    }
}

/// One recurring sync task per account. Created when the account is
/// registered and removed with it.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize, Object)]
#[native_model(id = 7, version = 1)]
#[native_db]
pub struct SyncTaskEntity {
    /// Same value as the account id; one task per account.
    #[primary_key]
    pub account_id: u64,
    pub account_email: String,
    pub status: TaskStatus,
    /// When the task next becomes due (epoch ms).
    pub next_run: i64,
    pub last_run_at: Option<i64>,
    pub last_duration_ms: Option<u64>,
    /// Messages newly cached by the last run.
    pub last_synced: u32,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SyncTaskEntity {
    /// Registers (or refreshes) the recurring sync task for an account.
    /// The task becomes due immediately so a new account starts syncing on
    /// the next dispatch tick.
    pub async fn schedule_account(account: &Account) -> NuboResult<()> {
        let existing = Self::find(account.id).await?;
        let entity = SyncTaskEntity {
            account_id: account.id,
            account_email: account.email.clone(),
            status: TaskStatus::Scheduled,
            next_run: utc_now!(),
            last_run_at: existing.as_ref().and_then(|e| e.last_run_at),
            last_duration_ms: existing.as_ref().and_then(|e| e.last_duration_ms),
            last_synced: existing.as_ref().map(|e| e.last_synced).unwrap_or(0),
            last_error: existing.as_ref().and_then(|e| e.last_error.clone()),
            created_at: existing
                .as_ref()
                .map(|e| e.created_at)
                .unwrap_or_else(|| utc_now!()),
            updated_at: utc_now!(),
        };
        upsert_impl(DB_MANAGER.tasks_db(), entity).await
    }

    pub async fn find(account_id: u64) -> NuboResult<Option<SyncTaskEntity>> {
        async_find_impl(DB_MANAGER.tasks_db(), account_id).await
    }

    pub async fn list_all() -> NuboResult<Vec<SyncTaskEntity>> {
        list_all_impl(DB_MANAGER.tasks_db()).await
    }

    /// Tasks whose due time has passed and that no live dispatch is
    /// currently running.
    pub async fn due_tasks() -> NuboResult<Vec<SyncTaskEntity>> {
        let now = utc_now!();
        let tasks = Self::list_all().await?;
        Ok(tasks
            .into_iter()
            .filter(|task| {
                task.next_run <= now
                    && (task.status != TaskStatus::Running || task.running_stale(now))
            })
            .collect())
    }

    /// The persisted `Running` marker is a lease, not a mutex: a run that
    /// started more than one sync interval ago is treated as abandoned (the
    /// worker crashed between start and finish) and the task becomes
    /// dispatchable again. The folder-level lease keeps a pass that is in
    /// fact still alive safe from the reclaimed dispatch.
    fn running_stale(&self, now: i64) -> bool {
        let window = (SETTINGS.nubo_sync_interval_seconds as i64) * 1000;
        self.last_run_at
            .map_or(true, |started| started + window <= now)
    }

    pub async fn mark_running(account_id: u64) -> NuboResult<()> {
        Self::modify(account_id, |updated| {
            updated.status = TaskStatus::Running;
            updated.last_run_at = Some(utc_now!());
        })
        .await
    }

    /// Records the outcome of a run and schedules the next one.
    pub async fn mark_finished(
        account_id: u64,
        result: Result<u32, String>,
        duration_ms: u64,
    ) -> NuboResult<()> {
        let interval_ms = (SETTINGS.nubo_sync_interval_seconds as i64) * 1000;
        Self::modify(account_id, move |updated| {
            match result {
                Ok(synced) => {
                    updated.status = TaskStatus::Success;
                    updated.last_synced = synced;
                    updated.last_error = None;
                }
                Err(message) => {
                    updated.status = TaskStatus::Failed;
                    updated.last_error = Some(message);
                }
            }
            updated.last_duration_ms = Some(duration_ms);
            updated.next_run = utc_now!() + interval_ms;
        })
        .await
    }

    async fn modify(
        account_id: u64,
        apply: impl FnOnce(&mut SyncTaskEntity) + Send + 'static,
    ) -> NuboResult<()> {
        update_impl(
            DB_MANAGER.tasks_db(),
            move |rw| {
                rw.get()
                    .primary::<SyncTaskEntity>(account_id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Sync task for account id='{account_id}' not found"),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                apply(&mut updated);
                updated.updated_at = utc_now!();
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }

    pub async fn cleanup_account(account_id: u64) -> NuboResult<()> {
        batch_delete_impl(DB_MANAGER.tasks_db(), move |rw| {
            let row = rw
                .get()
                .primary::<SyncTaskEntity>(account_id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            Ok(row.into_iter().collect())
        })
        .await?;
        Ok(())
    }
}
