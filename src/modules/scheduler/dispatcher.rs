use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::modules::error::NuboResult;
use crate::modules::scheduler::model::SyncTaskEntity;
use crate::modules::scheduler::periodic::{PeriodicTask, TaskHandle};
use crate::modules::settings::cli::SETTINGS;
use crate::modules::sync::sync_account;

const DISPATCH_TICK_SECONDS: u64 = 30;

/// Starts the background dispatcher that drives account syncs.
///
/// Every tick it collects the due tasks and runs each account's sync on its
/// own spawned task, bounded by a shared concurrency permit. Folders within
/// an account are synced sequentially; accounts run in parallel.
pub fn start_sync_dispatcher() -> TaskHandle {
    let permits = Arc::new(Semaphore::new(SETTINGS.nubo_sync_concurrency));
    PeriodicTask::new("sync-dispatcher").start(
        move || dispatch_due_tasks(permits.clone()),
        Duration::from_secs(DISPATCH_TICK_SECONDS),
        false,
        true,
    )
}

async fn dispatch_due_tasks(permits: Arc<Semaphore>) -> NuboResult<()> {
    let due = SyncTaskEntity::due_tasks().await?;
    if due.is_empty() {
        return Ok(());
    }
    debug!(count = due.len(), "dispatching due sync tasks");

    for task in due {
        let permit = match permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            // The semaphore is never closed while the dispatcher runs.
            Err(_) => return Ok(()),
        };
        let account_id = task.account_id;
        if let Err(e) = SyncTaskEntity::mark_running(account_id).await {
            warn!(account_id, error = %e, "failed to mark sync task running");
            continue;
        }
        tokio::spawn(async move {
            let started = Instant::now();
            let result = sync_account(account_id)
                .await
                .map_err(|e| e.to_string());
            let duration_ms = started.elapsed().as_millis() as u64;
            if let Err(e) = SyncTaskEntity::mark_finished(account_id, result, duration_ms).await {
                warn!(account_id, error = %e, "failed to record sync task outcome");
            }
            drop(permit);
        });
    }
    Ok(())
}
