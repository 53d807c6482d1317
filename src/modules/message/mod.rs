//! Read and mutation fronts over the email cache.
//!
//! Reads are served from the cache only and never block on the remote
//! server; bodies and attachment content are the one exception and are
//! fetched lazily on first open. Flag mutations apply locally first and are
//! pushed to the remote in the background.

use tracing::warn;

use crate::modules::account::entity::Account;
use crate::modules::cache::attachment::EmailAttachment;
use crate::modules::cache::body::EmailBody;
use crate::modules::cache::email::{CachedEmail, FlagUpdateRequest};
use crate::modules::common::auth::ClientContext;
use crate::modules::error::{code::ErrorCode, NuboResult};
use crate::modules::provider::Mailer;
use crate::modules::sync::cached_flags;
use crate::modules::utils::{folder_id, hash};
use crate::{raise_error, utc_now};

#[cfg(test)]
mod tests;

pub const MAX_PAGE_SIZE: u64 = 200;
pub const DEFAULT_PAGE_SIZE: u64 = 50;

const SNIPPET_LIMIT: usize = 160;

pub const TRASH_FOLDER: &str = "Trash";

/// One page of cached messages, newest first, plus the total row count
/// behind the page.
///
/// With an explicit `account_id` the page covers that account's folder.
/// Without one it covers the same-named folder of every account the caller
/// may read, merged into a single date-ordered view.
pub async fn list_emails(
    context: &ClientContext,
    account_id: Option<u64>,
    folder: &str,
    limit: u64,
    offset: u64,
) -> NuboResult<(u64, Vec<CachedEmail>)> {
    if limit == 0 {
        return Err(raise_error!(
            "limit must be greater than 0".into(),
            ErrorCode::InvalidParameter
        ));
    }
    if limit > MAX_PAGE_SIZE {
        return Err(raise_error!(
            format!("limit must not exceed {MAX_PAGE_SIZE}"),
            ErrorCode::ExceedsLimitation
        ));
    }
    if folder.is_empty() {
        return Err(raise_error!(
            "folder must not be empty".into(),
            ErrorCode::InvalidParameter
        ));
    }

    let account_ids = resolve_account_ids(context, account_id).await?;

    if let [single] = account_ids.as_slice() {
        return CachedEmail::list_folder_page(folder_id(*single, folder), limit, offset).await;
    }

    // Unified view: pull the head of each account's folder, merge, window.
    let mut total = 0u64;
    let mut merged: Vec<CachedEmail> = Vec::new();
    for id in account_ids {
        let (folder_total, rows) =
            CachedEmail::list_folder_page(folder_id(id, folder), offset + limit, 0).await?;
        total += folder_total;
        merged.extend(rows);
    }
    merged.sort_by(|a, b| {
        b.internal_date
            .cmp(&a.internal_date)
            .then(b.uid.cmp(&a.uid))
    });
    let page = merged
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect();
    Ok((total, page))
}

async fn resolve_account_ids(
    context: &ClientContext,
    account_id: Option<u64>,
) -> NuboResult<Vec<u64>> {
    match account_id {
        Some(id) => {
            context.require_account_access(id)?;
            Account::get(id).await?;
            Ok(vec![id])
        }
        None => match context.accessible_accounts()? {
            Some(granted) => Ok(granted.iter().copied().collect()),
            None => {
                let accounts = Account::list_all().await?;
                Ok(accounts.into_iter().map(|a| a.id).collect())
            }
        },
    }
}

/// Applies a flag mutation to the cache and answers immediately; the remote
/// push happens in the background and is retried by the next sync pass if
/// it fails.
pub async fn update_email_flags(
    context: &ClientContext,
    email_id: u64,
    updates: FlagUpdateRequest,
) -> NuboResult<CachedEmail> {
    if updates.is_empty() {
        return Err(raise_error!(
            "at least one flag must be provided".into(),
            ErrorCode::InvalidParameter
        ));
    }
    let email = CachedEmail::get(email_id).await?;
    context.require_account_access(email.account_id)?;

    let updated = CachedEmail::update_flags(email_id, updates).await?;

    if let Ok(account) = Account::check_account_active(updated.account_id).await {
        let email = updated.clone();
        tokio::spawn(async move {
            if let Err(e) = push_flags_to_remote(&account, &email).await {
                warn!(
                    email_id = email.id,
                    error = %e,
                    "background flag push failed, next sync pass will retry"
                );
            }
        });
    }
    Ok(updated)
}

async fn push_flags_to_remote(account: &Account, email: &CachedEmail) -> NuboResult<()> {
    let dirty_at = match email.dirty_at {
        Some(dirty_at) => dirty_at,
        None => return Ok(()),
    };
    let mailer = Mailer::for_account(account)?;
    mailer
        .push_flags(&email.folder_name, email.uid, cached_flags(email))
        .await?;
    CachedEmail::mark_flags_pushed(email.id, dirty_at).await
}

/// Moves a message to another folder on the remote server and drops the
/// origin cache row; the target folder picks the message up on its next
/// sync pass.
pub async fn move_email(
    context: &ClientContext,
    email_id: u64,
    target_folder: &str,
) -> NuboResult<()> {
    if target_folder.is_empty() {
        return Err(raise_error!(
            "target folder must not be empty".into(),
            ErrorCode::InvalidParameter
        ));
    }
    let email = CachedEmail::get(email_id).await?;
    context.require_account_access(email.account_id)?;
    if email.folder_name == target_folder {
        return Err(raise_error!(
            format!("Message is already in folder '{target_folder}'"),
            ErrorCode::InvalidParameter
        ));
    }

    let account = Account::check_account_active(email.account_id).await?;
    let mailer = Mailer::for_account(&account)?;
    mailer
        .move_message(&email.folder_name, email.uid, target_folder)
        .await?;

    drop_cached_message(email_id).await
}

/// Deletes a message. A permanent delete, or deleting a message already in
/// the trash, removes it on the remote server and from the cache; otherwise
/// the message is flagged as trash and moved to the Trash folder remotely.
pub async fn delete_email(
    context: &ClientContext,
    email_id: u64,
    permanent: bool,
) -> NuboResult<()> {
    let email = CachedEmail::get(email_id).await?;
    context.require_account_access(email.account_id)?;
    let account = Account::check_account_active(email.account_id).await?;
    let mailer = Mailer::for_account(&account)?;

    let in_trash = email.is_trash || email.folder_name.eq_ignore_ascii_case(TRASH_FOLDER);
    if permanent || in_trash {
        mailer.delete_message(&email.folder_name, email.uid).await?;
    } else {
        // the trash flag lands in the cache before the remote move, so a
        // failed move still leaves the message visibly trashed and dirty
        // for the next sync pass
        CachedEmail::update_flags(
            email_id,
            FlagUpdateRequest {
                is_trash: Some(true),
                ..Default::default()
            },
        )
        .await?;
        mailer
            .move_message(&email.folder_name, email.uid, TRASH_FOLDER)
            .await?;
    }
    drop_cached_message(email_id).await
}

async fn drop_cached_message(email_id: u64) -> NuboResult<()> {
    EmailBody::clean_email(email_id).await?;
    EmailAttachment::clean_email(email_id).await?;
    CachedEmail::delete(email_id).await
}

/// The text/html content of a message. Served from the cache when present,
/// fetched from the remote server and cached on first open.
pub async fn get_email_body(context: &ClientContext, email_id: u64) -> NuboResult<EmailBody> {
    let email = CachedEmail::get(email_id).await?;
    context.require_account_access(email.account_id)?;

    if email.body_cached {
        if let Some(body) = EmailBody::find(email_id).await? {
            return Ok(body);
        }
    }
    fetch_and_cache_body(&email).await
}

async fn fetch_and_cache_body(email: &CachedEmail) -> NuboResult<EmailBody> {
    let account = Account::check_account_active(email.account_id).await?;
    let mailer = Mailer::for_account(&account)?;
    let content = mailer.fetch_message(&email.folder_name, email.uid).await?;

    let body = EmailBody {
        email_id: email.id,
        account_id: email.account_id,
        folder_id: email.folder_id,
        text: content.text.clone(),
        html: content.html.clone(),
        fetched_at: utc_now!(),
    };
    EmailBody::save(body.clone()).await?;

    let attachments = content
        .attachments
        .iter()
        .map(|remote| {
            let pk = format!("{:016x}_{}", email.id, remote.part_number);
            let content_type = if remote.content_type.is_empty() {
                remote
                    .filename
                    .as_deref()
                    .map(|name| mime_guess::from_path(name).first_or_octet_stream().to_string())
                    .unwrap_or_else(|| "application/octet-stream".to_string())
            } else {
                remote.content_type.clone()
            };
            EmailAttachment {
                id: hash(&pk),
                email_id: email.id,
                account_id: email.account_id,
                folder_id: email.folder_id,
                part_number: remote.part_number.clone(),
                filename: remote.filename.clone(),
                content_type,
                size: remote.size,
                inline: remote.inline,
                content_id: remote.content_id.clone(),
                data: None,
                fetched_at: None,
            }
        })
        .collect();
    EmailAttachment::save_batch(attachments).await?;

    let snippet = content
        .text
        .as_deref()
        .map(|text| text.chars().take(SNIPPET_LIMIT).collect());
    CachedEmail::mark_body_cached(email.id, snippet).await?;

    Ok(body)
}

/// Attachment metadata for a message, enumerating it from the remote
/// message structure on first request.
pub async fn list_attachments(
    context: &ClientContext,
    email_id: u64,
) -> NuboResult<Vec<EmailAttachment>> {
    let email = CachedEmail::get(email_id).await?;
    context.require_account_access(email.account_id)?;

    if !email.body_cached {
        fetch_and_cache_body(&email).await?;
    }
    EmailAttachment::list_by_email(email_id).await
}

/// Attachment content, downloading and caching it on first request.
pub async fn download_attachment(
    context: &ClientContext,
    attachment_id: u64,
) -> NuboResult<EmailAttachment> {
    let attachment = EmailAttachment::get(attachment_id).await?;
    context.require_account_access(attachment.account_id)?;

    if attachment.is_downloaded() {
        return Ok(attachment);
    }

    let email = CachedEmail::get(attachment.email_id).await?;
    let account = Account::check_account_active(email.account_id).await?;
    let mailer = Mailer::for_account(&account)?;
    let data = mailer
        .fetch_attachment(&email.folder_name, email.uid, &attachment.part_number)
        .await?;
    EmailAttachment::store_content(attachment_id, data).await
}
