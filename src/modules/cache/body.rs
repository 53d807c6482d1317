use native_db::*;
use native_model::{native_model, Model};
use poem_openapi::Object;
use serde::{Deserialize, Serialize};

use crate::{
    modules::{
        database::{async_find_impl, batch_delete_impl, manager::DB_MANAGER, upsert_impl},
        error::{code::ErrorCode, NuboResult},
    },
    raise_error,
};

/// Text/html content of one cached email, stored apart from the header row
/// so header sync stays cheap. Absent until the message is first opened.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize, Object)]
#[native_model(id = 5, version = 1)]
#[native_db]
pub struct EmailBody {
    /// Matches `CachedEmail::id`.
    #[primary_key]
    pub email_id: u64,
    /// The ID of the owning account.
    #[secondary_key]
    pub account_id: u64,
    /// Stable identifier of the containing folder.
    #[secondary_key]
    pub folder_id: u64,
    /// Plain-text body, if the message carries one.
    pub text: Option<String>,
    /// HTML body, if the message carries one.
    pub html: Option<String>,
    /// Timestamp (epoch ms) when the body was fetched from the remote.
    pub fetched_at: i64,
}

impl EmailBody {
    pub async fn find(email_id: u64) -> NuboResult<Option<EmailBody>> {
        async_find_impl(DB_MANAGER.cache_db(), email_id).await
    }

    pub async fn save(body: EmailBody) -> NuboResult<()> {
        upsert_impl(DB_MANAGER.cache_db(), body).await
    }

    pub async fn clean_email(email_id: u64) -> NuboResult<()> {
        batch_delete_impl(DB_MANAGER.cache_db(), move |rw| {
            let row = rw
                .get()
                .primary::<EmailBody>(email_id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            Ok(row.into_iter().collect())
        })
        .await?;
        Ok(())
    }

    pub async fn clean_folder(folder_id: u64) -> NuboResult<()> {
        batch_delete_impl(DB_MANAGER.cache_db(), move |rw| {
            rw.scan()
                .secondary::<EmailBody>(EmailBodyKey::folder_id)
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
                .secondary::<EmailBody>(EmailBodyKey::account_id)
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
