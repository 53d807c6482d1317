use native_db::*;
use native_model::{native_model, Model};
use poem_openapi::Object;
use serde::{Deserialize, Serialize};

use crate::{
    modules::{
        common::Addr,
        database::{
            batch_delete_impl, batch_upsert_impl, delete_impl, manager::DB_MANAGER,
            paginate_primary_prefix_impl, secondary_find_impl, update_impl, upsert_impl,
        },
        error::{code::ErrorCode, NuboResult},
    },
    raise_error, utc_now,
};

/// One cached message header, one row per (account, folder, remote UID).
///
/// The primary key sorts by folder, then internal date, then UID, so a
/// reverse prefix scan yields a folder's messages newest-first with a
/// deterministic UID tie-break. The key is immutable for the life of the
/// row, which keeps offset pagination stable while a sync pass inserts
/// newer messages concurrently.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize, Object)]
#[native_model(id = 4, version = 1)]
#[native_db(primary_key(pk -> String), secondary_key(entity_id -> u64, unique))]
pub struct CachedEmail {
    /// Stable identifier derived from (account, folder, uid).
    pub id: u64,
    /// The ID of the owning account.
    #[secondary_key]
    pub account_id: u64,
    /// Stable identifier of the containing folder.
    pub folder_id: u64,
    /// The decoded, human-readable folder name (e.g., "INBOX").
    pub folder_name: String,
    /// The unique identifier (IMAP UID) of the email within the folder.
    pub uid: u32,
    /// Server-reported receive time, epoch milliseconds.
    pub internal_date: i64,
    /// The subject of the email, if available.
    pub subject: Option<String>,
    /// The sender's address, including name and email, if available.
    pub from: Option<Addr>,
    /// The primary recipient(s) of the email.
    pub to: Vec<Addr>,
    /// The carbon copy (CC) recipient(s) of the email.
    pub cc: Vec<Addr>,
    /// Short plain-text preview of the body. Filled when the body is first
    /// fetched; absent for rows synced header-only.
    pub snippet: Option<String>,
    /// The size of the email in bytes.
    pub size: u32,
    /// Number of attachments reported by the message structure.
    pub attachment_count: u32,
    pub is_read: bool,
    pub is_starred: bool,
    pub is_archived: bool,
    pub is_trash: bool,
    pub is_spam: bool,
    /// Timestamp (epoch ms) of the last flag reconciliation with the remote
    /// server.
    pub flags_synced_at: i64,
    /// Set when a local flag mutation has not yet been confirmed on the
    /// remote side. While present and newer than the observed remote state,
    /// the local flags win conflict resolution.
    pub dirty_at: Option<i64>,
    /// Whether a body row exists for this email.
    pub body_cached: bool,
    pub created_at: i64,
}

/// Flag mutations accepted from the UI layer. Absent fields are left
/// untouched.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize, Object)]
pub struct FlagUpdateRequest {
    pub is_read: Option<bool>,
    pub is_starred: Option<bool>,
    pub is_archived: Option<bool>,
    pub is_trash: Option<bool>,
    pub is_spam: Option<bool>,
}

impl FlagUpdateRequest {
    pub fn is_empty(&self) -> bool {
        self.is_read.is_none()
            && self.is_starred.is_none()
            && self.is_archived.is_none()
            && self.is_trash.is_none()
            && self.is_spam.is_none()
    }
}

impl CachedEmail {
    pub fn pk(&self) -> String {
        format!(
            "{:016x}_{:013}_{:010}",
            self.folder_id,
            self.internal_date.max(0),
            self.uid
        )
    }

    pub fn entity_id(&self) -> u64 {
        self.id
    }

    pub fn folder_prefix(folder_id: u64) -> String {
        format!("{:016x}_", folder_id)
    }

    pub async fn find(email_id: u64) -> NuboResult<Option<CachedEmail>> {
        secondary_find_impl(DB_MANAGER.cache_db(), CachedEmailKey::entity_id, email_id).await
    }

    pub async fn get(email_id: u64) -> NuboResult<CachedEmail> {
        Self::find(email_id).await?.ok_or_else(|| {
            raise_error!(
                format!("Email with ID '{email_id}' not found"),
                ErrorCode::ResourceNotFound
            )
        })
    }

    pub async fn upsert(email: CachedEmail) -> NuboResult<()> {
        upsert_impl(DB_MANAGER.cache_db(), email).await
    }

    pub async fn batch_upsert(batch: Vec<CachedEmail>) -> NuboResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        batch_upsert_impl(DB_MANAGER.cache_db(), batch).await
    }

    /// One page of a folder's messages, newest first, plus the folder's
    /// total row count.
    pub async fn list_folder_page(
        folder_id: u64,
        limit: u64,
        offset: u64,
    ) -> NuboResult<(u64, Vec<CachedEmail>)> {
        paginate_primary_prefix_impl(
            DB_MANAGER.cache_db(),
            Self::folder_prefix(folder_id),
            limit,
            offset,
        )
        .await
    }

    /// Applies a local flag mutation and stamps `dirty_at` so the next sync
    /// pass knows the local state is ahead of the remote.
    pub async fn update_flags(
        email_id: u64,
        updates: FlagUpdateRequest,
    ) -> NuboResult<CachedEmail> {
        update_impl(
            DB_MANAGER.cache_db(),
            move |rw| {
                rw.get()
                    .secondary::<CachedEmail>(CachedEmailKey::entity_id, email_id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Email with ID '{email_id}' not found"),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                if let Some(is_read) = updates.is_read {
                    updated.is_read = is_read;
                }
                if let Some(is_starred) = updates.is_starred {
                    updated.is_starred = is_starred;
                }
                if let Some(is_archived) = updates.is_archived {
                    updated.is_archived = is_archived;
                }
                if let Some(is_trash) = updates.is_trash {
                    updated.is_trash = is_trash;
                }
                if let Some(is_spam) = updates.is_spam {
                    updated.is_spam = is_spam;
                }
                updated.dirty_at = Some(utc_now!());
                Ok(updated)
            },
        )
        .await
    }

    /// Overwrites flags with the remote-observed state during a sync pass.
    /// Only called when conflict resolution decided the remote side wins;
    /// clears the dirty marker.
    pub async fn apply_remote_flags(
        email_id: u64,
        is_read: bool,
        is_starred: bool,
        is_trash: bool,
        is_spam: bool,
        is_archived: bool,
    ) -> NuboResult<()> {
        update_impl(
            DB_MANAGER.cache_db(),
            move |rw| {
                rw.get()
                    .secondary::<CachedEmail>(CachedEmailKey::entity_id, email_id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Email with ID '{email_id}' not found"),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                updated.is_read = is_read;
                updated.is_starred = is_starred;
                updated.is_trash = is_trash;
                updated.is_spam = is_spam;
                updated.is_archived = is_archived;
                updated.flags_synced_at = utc_now!();
                updated.dirty_at = None;
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }

    /// Marks a local mutation as successfully pushed to the remote server.
    pub async fn mark_flags_pushed(email_id: u64, pushed_dirty_at: i64) -> NuboResult<()> {
        update_impl(
            DB_MANAGER.cache_db(),
            move |rw| {
                rw.get()
                    .secondary::<CachedEmail>(CachedEmailKey::entity_id, email_id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Email with ID '{email_id}' not found"),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                updated.flags_synced_at = utc_now!();
                // A newer local mutation may have landed while the push was
                // in flight; keep the dirty marker in that case.
                if updated.dirty_at.map_or(true, |d| d <= pushed_dirty_at) {
                    updated.dirty_at = None;
                }
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }

    pub async fn mark_body_cached(email_id: u64, snippet: Option<String>) -> NuboResult<()> {
        update_impl(
            DB_MANAGER.cache_db(),
            move |rw| {
                rw.get()
                    .secondary::<CachedEmail>(CachedEmailKey::entity_id, email_id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Email with ID '{email_id}' not found"),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                updated.body_cached = true;
                if updated.snippet.is_none() {
                    updated.snippet = snippet;
                }
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }

    pub async fn delete(email_id: u64) -> NuboResult<()> {
        delete_impl(DB_MANAGER.cache_db(), move |rw| {
            rw.get()
                .secondary::<CachedEmail>(CachedEmailKey::entity_id, email_id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .ok_or_else(|| {
                    raise_error!(
                        format!("Email with ID '{email_id}' not found"),
                        ErrorCode::ResourceNotFound
                    )
                })
        })
        .await
    }

    /// Drops rows whose UID is no longer present on the remote folder.
    pub async fn prune_missing(folder_id: u64, live_uids: Vec<u32>) -> NuboResult<usize> {
        let prefix = Self::folder_prefix(folder_id);
        batch_delete_impl(DB_MANAGER.cache_db(), move |rw| {
            let live: std::collections::BTreeSet<u32> = live_uids.into_iter().collect();
            let rows: Vec<CachedEmail> = rw
                .scan()
                .primary::<CachedEmail>()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .start_with(prefix)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            Ok(rows
                .into_iter()
                .filter(|row| !live.contains(&row.uid))
                .collect())
        })
        .await
    }

    pub async fn clean_folder(folder_id: u64) -> NuboResult<usize> {
        let prefix = Self::folder_prefix(folder_id);
        batch_delete_impl(DB_MANAGER.cache_db(), move |rw| {
            rw.scan()
                .primary::<CachedEmail>()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .start_with(prefix)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))
        })
        .await
    }

    pub async fn clean_account(account_id: u64) -> NuboResult<()> {
        batch_delete_impl(DB_MANAGER.cache_db(), move |rw| {
            rw.scan()
                .secondary::<CachedEmail>(CachedEmailKey::account_id)
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
