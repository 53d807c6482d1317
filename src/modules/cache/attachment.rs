use native_db::*;
use native_model::{native_model, Model};
use poem_openapi::Object;
use serde::{Deserialize, Serialize};

use crate::{
    modules::{
        database::{
            batch_delete_impl, batch_upsert_impl, filter_by_secondary_key_impl, manager::DB_MANAGER,
            secondary_find_impl, update_impl,
        },
        error::{code::ErrorCode, NuboResult},
    },
    raise_error, utc_now,
};

/// Attachment metadata for one cached email. The content blob is fetched on
/// demand; metadata rows are written when attachments are first enumerated.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize, Object)]
#[native_model(id = 6, version = 1)]
#[native_db(primary_key(pk -> String), secondary_key(attachment_id -> u64, unique))]
pub struct EmailAttachment {
    /// Stable identifier derived from (email_id, part_number).
    pub id: u64,
    /// Matches `CachedEmail::id`.
    #[secondary_key]
    pub email_id: u64,
    /// The ID of the owning account.
    #[secondary_key]
    pub account_id: u64,
    /// Stable identifier of the containing folder.
    #[secondary_key]
    pub folder_id: u64,
    /// MIME part number within the message structure (e.g., "2", "1.2").
    pub part_number: String,
    /// Original filename, if the message supplied one.
    pub filename: Option<String>,
    /// MIME content type (e.g., "application/pdf").
    pub content_type: String,
    /// Size in bytes as reported by the message structure.
    pub size: u32,
    /// Whether the part is inline (referenced from the HTML body) rather
    /// than a regular attachment.
    pub inline: bool,
    /// Content-ID for inline parts.
    pub content_id: Option<String>,
    /// Decoded content. `None` until first downloaded.
    #[oai(skip)]
    pub data: Option<Vec<u8>>,
    /// Timestamp (epoch ms) when the content was fetched, if it has been.
    pub fetched_at: Option<i64>,
}

impl EmailAttachment {
    pub fn pk(&self) -> String {
        format!("{:016x}_{}", self.email_id, self.part_number)
    }

    pub fn attachment_id(&self) -> u64 {
        self.id
    }

    pub fn is_downloaded(&self) -> bool {
        self.data.is_some()
    }

    pub async fn find(attachment_id: u64) -> NuboResult<Option<EmailAttachment>> {
        secondary_find_impl(
            DB_MANAGER.cache_db(),
            EmailAttachmentKey::attachment_id,
            attachment_id,
        )
        .await
    }

    pub async fn get(attachment_id: u64) -> NuboResult<EmailAttachment> {
        Self::find(attachment_id).await?.ok_or_else(|| {
            raise_error!(
                format!("Attachment with ID '{attachment_id}' not found"),
                ErrorCode::ResourceNotFound
            )
        })
    }

    pub async fn list_by_email(email_id: u64) -> NuboResult<Vec<EmailAttachment>> {
        filter_by_secondary_key_impl(
            DB_MANAGER.cache_db(),
            EmailAttachmentKey::email_id,
            email_id,
        )
        .await
    }

    pub async fn save_batch(batch: Vec<EmailAttachment>) -> NuboResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        batch_upsert_impl(DB_MANAGER.cache_db(), batch).await
    }

    /// Stores the downloaded content of a single attachment.
    pub async fn store_content(attachment_id: u64, data: Vec<u8>) -> NuboResult<EmailAttachment> {
        update_impl(
            DB_MANAGER.cache_db(),
            move |rw| {
                rw.get()
                    .secondary::<EmailAttachment>(EmailAttachmentKey::attachment_id, attachment_id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Attachment with ID '{attachment_id}' not found"),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                updated.size = data.len() as u32;
                updated.data = Some(data);
                updated.fetched_at = Some(utc_now!());
                Ok(updated)
            },
        )
        .await
    }

    pub async fn clean_email(email_id: u64) -> NuboResult<()> {
        batch_delete_impl(DB_MANAGER.cache_db(), move |rw| {
            rw.scan()
                .secondary::<EmailAttachment>(EmailAttachmentKey::email_id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .start_with(email_id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))
        })
        .await?;
        Ok(())
    }

    pub async fn clean_folder(folder_id: u64) -> NuboResult<()> {
        batch_delete_impl(DB_MANAGER.cache_db(), move |rw| {
            rw.scan()
                .secondary::<EmailAttachment>(EmailAttachmentKey::folder_id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .start_with(folder_id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))
        })
        .await?;
        Ok(())
    }

    pub async fn clean_account(account_id: u64) -> NuboResult<()> {
        batch_delete_impl(DB_MANAGER.cache_db(), move |rw| {
            rw.scan()
                .secondary::<EmailAttachment>(EmailAttachmentKey::account_id)
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
