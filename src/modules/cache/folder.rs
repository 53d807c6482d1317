use native_db::*;
use native_model::{native_model, Model};
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};

use crate::{
    modules::{
        database::{
            async_find_impl, batch_delete_impl, filter_by_secondary_key_impl, manager::DB_MANAGER,
            try_update_impl, update_impl, upsert_impl,
        },
        error::{code::ErrorCode, NuboResult},
        settings::cli::SETTINGS,
        utils::folder_id,
    },
    raise_error, utc_now,
};

/// Classifies a failed sync pass so the UI can distinguish "retry will
/// probably fix it" from "the user must reconnect the account".
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize, Enum)]
pub enum SyncErrorKind {
    /// Timeout, connection refused, rate limit. Retried on the next pass.
    Transient,
    /// Expired or invalid credential. Sync is skipped until the account
    /// credentials are refreshed.
    Auth,
    /// The folder no longer exists on the remote server.
    RemoteFolderMissing,
}

/// Per (account, folder) synchronization state.
///
/// The `locked_until` field doubles as the in-progress guard: a sync pass
/// holds the folder while `locked_until` lies in the future. Expired leases
/// are reclaimable, so a worker that crashed mid-sync never wedges the
/// folder permanently.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize, Object)]
#[native_model(id = 3, version = 1)]
#[native_db(primary_key(pk -> u64))]
pub struct FolderSyncState {
    /// Stable identifier derived from (account_id, folder_name).
    pub folder_id: u64,
    /// The ID of the owning account.
    #[secondary_key]
    pub account_id: u64,
    /// The decoded, human-readable folder name (e.g., "INBOX").
    pub folder_name: String,
    /// UIDVALIDITY reported by the remote server on the last sync.
    /// When the remote value differs, all cached rows for this folder are
    /// stale and the folder must be resynced from scratch.
    pub uid_validity: Option<u32>,
    /// Highest remote UID already mirrored into the cache. 0 means no
    /// message has been synced yet.
    pub checkpoint_uid: u32,
    /// Timestamp (epoch ms) of the last successful sync pass.
    pub last_sync_at: Option<i64>,
    /// Lease expiry (epoch ms). 0 or a past value means unlocked.
    pub locked_until: i64,
    /// Message count reported by the remote folder.
    pub total_messages: u32,
    /// Number of messages mirrored locally. Updated incrementally so
    /// partial progress is visible mid-sync.
    pub synced_messages: u32,
    pub error_kind: Option<SyncErrorKind>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl FolderSyncState {
    fn pk(&self) -> u64 {
        self.folder_id
    }

    pub fn sync_in_progress(&self) -> bool {
        self.locked_until > utc_now!()
    }

    pub async fn find(folder_id: u64) -> NuboResult<Option<FolderSyncState>> {
        async_find_impl(DB_MANAGER.cache_db(), folder_id).await
    }

    pub async fn get(folder_id: u64) -> NuboResult<FolderSyncState> {
        Self::find(folder_id).await?.ok_or_else(|| {
            raise_error!(
                format!("Folder sync state id='{folder_id}' not found"),
                ErrorCode::FolderNotCached
            )
        })
    }

    /// Returns the existing state for (account, folder), creating a fresh
    /// one on the first sync attempt.
    pub async fn get_or_create(account_id: u64, folder_name: &str) -> NuboResult<FolderSyncState> {
        let folder_id = folder_id(account_id, folder_name);
        if let Some(existing) = Self::find(folder_id).await? {
            return Ok(existing);
        }
        let state = FolderSyncState {
            folder_id,
            account_id,
            folder_name: folder_name.to_string(),
            uid_validity: None,
            checkpoint_uid: 0,
            last_sync_at: None,
            locked_until: 0,
            total_messages: 0,
            synced_messages: 0,
            error_kind: None,
            error_message: None,
            created_at: utc_now!(),
            updated_at: utc_now!(),
        };
        upsert_impl(DB_MANAGER.cache_db(), state.clone()).await?;
        Ok(state)
    }

    /// Attempts to take the sync lease for this folder. Returns `None` when
    /// another worker currently holds an unexpired lease.
    pub async fn try_acquire_lease(folder_id: u64) -> NuboResult<Option<FolderSyncState>> {
        let lease_ms = (SETTINGS.nubo_sync_lease_seconds as i64) * 1000;
        try_update_impl(
            DB_MANAGER.cache_db(),
            move |rw| {
                rw.get()
                    .primary::<FolderSyncState>(folder_id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Folder sync state id='{folder_id}' not found"),
                            ErrorCode::FolderNotCached
                        )
                    })
            },
            move |current| {
                let now = utc_now!();
                if current.locked_until > now {
                    return Ok(None);
                }
                let mut updated = current.clone();
                updated.locked_until = now + lease_ms;
                updated.updated_at = now;
                Ok(Some(updated))
            },
        )
        .await
    }

    /// Releases the lease after a successful pass, advancing the checkpoint
    /// and clearing any recorded error.
    pub async fn complete_success(
        folder_id: u64,
        checkpoint_uid: u32,
        uid_validity: u32,
        total_messages: u32,
        synced_messages: u32,
    ) -> NuboResult<()> {
        Self::modify(folder_id, move |updated| {
            updated.checkpoint_uid = checkpoint_uid;
            updated.uid_validity = Some(uid_validity);
            updated.total_messages = total_messages;
            updated.synced_messages = synced_messages;
            updated.last_sync_at = Some(utc_now!());
            updated.locked_until = 0;
            updated.error_kind = None;
            updated.error_message = None;
        })
        .await
    }

    /// Releases the lease after a failed pass. The checkpoint is left
    /// untouched so the next attempt resumes from the same point.
    pub async fn record_error(
        folder_id: u64,
        kind: SyncErrorKind,
        message: String,
    ) -> NuboResult<()> {
        Self::modify(folder_id, move |updated| {
            updated.locked_until = 0;
            updated.error_kind = Some(kind);
            updated.error_message = Some(message);
        })
        .await
    }

    /// Publishes incremental progress while a pass holds the lease.
    pub async fn update_progress(
        folder_id: u64,
        total_messages: u32,
        synced_messages: u32,
    ) -> NuboResult<()> {
        Self::modify(folder_id, move |updated| {
            updated.total_messages = total_messages;
            updated.synced_messages = synced_messages;
        })
        .await
    }

    /// Resets checkpoint and counters after a UIDVALIDITY rollover. The
    /// caller is responsible for dropping the folder's cached rows.
    pub async fn reset_for_rollover(folder_id: u64, new_validity: u32) -> NuboResult<()> {
        Self::modify(folder_id, move |updated| {
            updated.uid_validity = Some(new_validity);
            updated.checkpoint_uid = 0;
            updated.total_messages = 0;
            updated.synced_messages = 0;
            updated.last_sync_at = None;
        })
        .await
    }

    async fn modify(
        folder_id: u64,
        apply: impl FnOnce(&mut FolderSyncState) + Send + 'static,
    ) -> NuboResult<()> {
        update_impl(
            DB_MANAGER.cache_db(),
            move |rw| {
                rw.get()
                    .primary::<FolderSyncState>(folder_id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Folder sync state id='{folder_id}' not found"),
                            ErrorCode::FolderNotCached
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

    pub async fn list_account(account_id: u64) -> NuboResult<Vec<FolderSyncState>> {
        filter_by_secondary_key_impl(
            DB_MANAGER.cache_db(),
            FolderSyncStateKey::account_id,
            account_id,
        )
        .await
    }

    pub async fn clean_account(account_id: u64) -> NuboResult<()> {
        batch_delete_impl(DB_MANAGER.cache_db(), move |rw| {
            rw.scan()
                .secondary::<FolderSyncState>(FolderSyncStateKey::account_id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .start_with(account_id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))
        })
        .await?;
        Ok(())
    }
}
