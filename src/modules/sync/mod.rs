//! Folder synchronization engine.
//!
//! A sync pass mirrors one remote folder into the local cache: header sync
//! from the UID checkpoint, pruning of remotely deleted rows, then flag
//! reconciliation in both directions. Passes are serialized per folder by a
//! lease on `FolderSyncState`; different folders sync independently.

use ahash::AHashSet;
use tracing::{debug, info, warn};

use crate::modules::account::entity::Account;
use crate::modules::cache::attachment::EmailAttachment;
use crate::modules::cache::body::EmailBody;
use crate::modules::cache::email::CachedEmail;
use crate::modules::cache::folder::{FolderSyncState, SyncErrorKind};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::{NuboError, NuboResult};
use crate::modules::provider::{EmailFlags, Mailer, RemoteEnvelope};
use crate::modules::settings::cli::SETTINGS;
use crate::modules::utils::email_id;
use crate::utc_now;

#[cfg(test)]
mod tests;

const UPSERT_CHUNK: usize = 50;

/// Runs one sync pass for every folder the account is configured to mirror.
/// A failing folder does not stop the others. Returns the number of newly
/// cached messages.
pub async fn sync_account(account_id: u64) -> NuboResult<u32> {
    let account = Account::check_account_active(account_id).await?;
    let mut synced = 0;
    for folder in &account.sync_folders {
        match sync_folder(account_id, folder).await {
            Ok(count) => synced += count,
            Err(e) => {
                warn!(
                    account_id,
                    folder = folder.as_str(),
                    error = %e,
                    "folder sync failed"
                );
            }
        }
    }
    Ok(synced)
}

/// Runs one sync pass for a single folder. Returns the number of newly
/// cached messages, or 0 without touching the remote when another pass
/// currently holds the folder's lease.
pub async fn sync_folder(account_id: u64, folder_name: &str) -> NuboResult<u32> {
    let account = Account::check_account_active(account_id).await?;
    let state = FolderSyncState::get_or_create(account_id, folder_name).await?;

    // an auth failure pauses the folder; retrying with the same credential
    // only gets the account locked out. The pause lifts once the account
    // record has been touched after the failure.
    if state.error_kind == Some(SyncErrorKind::Auth) && account.updated_at <= state.updated_at {
        debug!(
            account_id,
            folder = folder_name,
            "previous pass failed authentication, waiting for updated credentials"
        );
        return Ok(0);
    }

    let lease = match FolderSyncState::try_acquire_lease(state.folder_id).await? {
        Some(lease) => lease,
        None => {
            debug!(
                account_id,
                folder = folder_name,
                "sync already in progress, skipping"
            );
            return Ok(0);
        }
    };

    let mailer = Mailer::for_account(&account)?;
    match run_pass(&account, &mailer, &lease).await {
        Ok(synced) => Ok(synced),
        Err(e) => {
            let kind = classify(&e);
            if let Err(record) =
                FolderSyncState::record_error(lease.folder_id, kind, e.to_string()).await
            {
                warn!(
                    folder_id = lease.folder_id,
                    error = %record,
                    "failed to record sync error"
                );
            }
            Err(e)
        }
    }
}

async fn run_pass(account: &Account, mailer: &Mailer, state: &FolderSyncState) -> NuboResult<u32> {
    let folder_id = state.folder_id;
    let folder = state.folder_name.as_str();
    let status = mailer.folder_status(folder).await?;

    let mut checkpoint = state.checkpoint_uid;
    if let Some(cached_validity) = state.uid_validity {
        if cached_validity != status.uid_validity {
            info!(
                folder_id,
                folder,
                cached_validity,
                remote_validity = status.uid_validity,
                "UIDVALIDITY changed, rebuilding folder cache"
            );
            CachedEmail::clean_folder(folder_id).await?;
            EmailBody::clean_folder(folder_id).await?;
            EmailAttachment::clean_folder(folder_id).await?;
            FolderSyncState::reset_for_rollover(folder_id, status.uid_validity).await?;
            checkpoint = 0;
        }
    }

    // First sync mirrors a bounded window of the newest messages; later
    // passes fetch only what is above the checkpoint.
    let envelopes = if checkpoint == 0 {
        mailer
            .fetch_recent_headers(folder, SETTINGS.nubo_initial_sync_window)
            .await?
    } else {
        mailer.fetch_headers_since(folder, checkpoint).await?
    };

    let synced = envelopes.len() as u32;
    let mut new_checkpoint = checkpoint;
    for chunk in envelopes.chunks(UPSERT_CHUNK) {
        let mut rows = Vec::with_capacity(chunk.len());
        for envelope in chunk {
            new_checkpoint = new_checkpoint.max(envelope.uid);
            rows.push(build_row(account.id, folder_id, folder, envelope).await?);
        }
        CachedEmail::batch_upsert(rows).await?;
        let cached_total = folder_row_count(folder_id).await?;
        FolderSyncState::update_progress(folder_id, status.exists, cached_total).await?;
    }

    let live_uids = mailer.list_uids(folder).await?;
    prune_stale(folder_id, &live_uids).await?;

    reconcile_flags(account.id, mailer, folder, folder_id, new_checkpoint).await?;

    let cached_total = folder_row_count(folder_id).await?;
    FolderSyncState::complete_success(
        folder_id,
        new_checkpoint,
        status.uid_validity,
        status.exists,
        cached_total,
    )
    .await?;

    info!(
        account_id = account.id,
        folder, synced, cached_total, "folder sync completed"
    );
    Ok(synced)
}

async fn folder_row_count(folder_id: u64) -> NuboResult<u32> {
    let (total, _) = CachedEmail::list_folder_page(folder_id, 1, 0).await?;
    Ok(total as u32)
}

/// Converts a remote envelope into a cache row, preserving local state that
/// must survive a re-sync of the same UID: creation time, cached body and,
/// when a local flag mutation is still unconfirmed, the local flags.
async fn build_row(
    account_id: u64,
    folder_id: u64,
    folder_name: &str,
    envelope: &RemoteEnvelope,
) -> NuboResult<CachedEmail> {
    let id = email_id(account_id, folder_id, envelope.uid);
    let existing = CachedEmail::find(id).await?;

    let mut row = CachedEmail {
        id,
        account_id,
        folder_id,
        folder_name: folder_name.to_string(),
        uid: envelope.uid,
        internal_date: envelope.internal_date,
        subject: envelope.subject.clone(),
        from: envelope.from.clone(),
        to: envelope.to.clone(),
        cc: envelope.cc.clone(),
        snippet: envelope.snippet.clone(),
        size: envelope.size,
        attachment_count: envelope.attachment_count,
        is_read: envelope.flags.is_read,
        is_starred: envelope.flags.is_starred,
        is_archived: envelope.flags.is_archived,
        is_trash: envelope.flags.is_trash,
        is_spam: envelope.flags.is_spam,
        flags_synced_at: utc_now!(),
        dirty_at: None,
        body_cached: false,
        created_at: utc_now!(),
    };

    if let Some(existing) = existing {
        row.created_at = existing.created_at;
        row.body_cached = existing.body_cached;
        if row.snippet.is_none() {
            row.snippet = existing.snippet.clone();
        }
        if existing.dirty_at.is_some() {
            row.is_read = existing.is_read;
            row.is_starred = existing.is_starred;
            row.is_archived = existing.is_archived;
            row.is_trash = existing.is_trash;
            row.is_spam = existing.is_spam;
            row.dirty_at = existing.dirty_at;
            row.flags_synced_at = existing.flags_synced_at;
        }
    }
    Ok(row)
}

/// Drops cache rows (and their bodies and attachments) whose UID no longer
/// exists on the remote folder.
async fn prune_stale(folder_id: u64, live_uids: &[u32]) -> NuboResult<()> {
    let (_, rows) = CachedEmail::list_folder_page(folder_id, u64::MAX, 0).await?;
    let live: AHashSet<u32> = live_uids.iter().copied().collect();
    let stale: Vec<CachedEmail> = rows
        .into_iter()
        .filter(|row| !live.contains(&row.uid))
        .collect();
    if stale.is_empty() {
        return Ok(());
    }
    for row in &stale {
        EmailBody::clean_email(row.id).await?;
        EmailAttachment::clean_email(row.id).await?;
    }
    let pruned = CachedEmail::prune_missing(folder_id, live_uids.to_vec()).await?;
    debug!(folder_id, pruned, "pruned remotely deleted messages");
    Ok(())
}

/// Bidirectional flag reconciliation. Remote state wins by default; a row
/// carrying an unconfirmed local mutation (`dirty_at`) is pushed to the
/// remote instead.
async fn reconcile_flags(
    account_id: u64,
    mailer: &Mailer,
    folder: &str,
    folder_id: u64,
    max_uid: u32,
) -> NuboResult<()> {
    let remote = mailer.fetch_flags(folder, max_uid).await?;
    for (uid, remote_flags) in remote {
        let id = email_id(account_id, folder_id, uid);
        let cached = match CachedEmail::find(id).await? {
            Some(cached) => cached,
            None => continue,
        };
        match cached.dirty_at {
            Some(dirty_at) => {
                mailer.push_flags(folder, uid, cached_flags(&cached)).await?;
                CachedEmail::mark_flags_pushed(id, dirty_at).await?;
            }
            None => {
                if cached_flags(&cached) != remote_flags {
                    CachedEmail::apply_remote_flags(
                        id,
                        remote_flags.is_read,
                        remote_flags.is_starred,
                        remote_flags.is_trash,
                        remote_flags.is_spam,
                        remote_flags.is_archived,
                    )
                    .await?;
                }
            }
        }
    }
    Ok(())
}

pub(crate) fn cached_flags(cached: &CachedEmail) -> EmailFlags {
    EmailFlags {
        is_read: cached.is_read,
        is_starred: cached.is_starred,
        is_archived: cached.is_archived,
        is_trash: cached.is_trash,
        is_spam: cached.is_spam,
    }
}

fn classify(error: &NuboError) -> SyncErrorKind {
    match error.code() {
        ErrorCode::ImapAuthenticationFailed => SyncErrorKind::Auth,
        ErrorCode::RemoteFolderMissing => SyncErrorKind::RemoteFolderMissing,
        _ => SyncErrorKind::Transient,
    }
}
