use native_db::*;
use native_model::{native_model, Model};

use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    id,
    modules::{
        account::payload::{AccountCreateRequest, AccountUpdateRequest},
        cache::{
            attachment::EmailAttachment, body::EmailBody, email::CachedEmail,
            folder::FolderSyncState,
        },
        database::{
            delete_impl, insert_impl, list_all_impl, manager::DB_MANAGER, secondary_find_impl,
            update_impl,
        },
        error::{code::ErrorCode, NuboResult},
        scheduler::model::SyncTaskEntity,
        token::AccessToken,
    },
    raise_error, utc_now,
};

/// Method used to reach the remote mailbox.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize, Enum)]
pub enum MailerType {
    /// A real IMAP server.
    #[default]
    Imap,
    /// An in-process mail store, used for local development and tests.
    InMemory,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize, Enum)]
pub enum Encryption {
    Ssl,
    StartTls,
    None,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize, Enum)]
pub enum AuthType {
    Password,
    OAuth2,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize, Object)]
pub struct ImapAuth {
    pub auth_type: AuthType,
    /// App password, required when `auth_type` is `Password`.
    pub password: Option<String>,
    /// OAuth2 access token, required when `auth_type` is `OAuth2`.
    pub access_token: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize, Object)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub encryption: Encryption,
    pub auth: ImapAuth,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize, Object)]
#[native_model(id = 1, version = 1)]
#[native_db(primary_key(pk -> String))]
pub struct Account {
    /// Unique account identifier
    #[secondary_key(unique)]
    pub id: u64,
    /// Email address associated with this account
    pub email: String,
    /// Display name for the account (optional)
    pub name: Option<String>,
    /// Represents the account activation status.
    ///
    /// If this value is `false`, all account-related resources will be unavailable
    /// and any attempts to access them should return an error indicating the account
    /// is inactive.
    pub enabled: bool,
    /// Method used to access and manage emails.
    pub mailer_type: MailerType,
    /// IMAP server configuration, required when `mailer_type` is `Imap`.
    pub imap: Option<ImapConfig>,
    /// Folders to keep synchronized. Defaults to `INBOX` if empty.
    pub sync_folders: Vec<String>,
    /// Creation timestamp (UNIX epoch milliseconds)
    pub created_at: i64,
    /// Last update timestamp (UNIX epoch milliseconds)
    pub updated_at: i64,
}

impl Account {
    fn pk(&self) -> String {
        format!("{}_{}", self.created_at, self.id)
    }

    pub fn create(request: AccountCreateRequest) -> NuboResult<Self> {
        request.validate()?;
        let sync_folders = if request.sync_folders.is_empty() {
            vec!["INBOX".into()]
        } else {
            request.sync_folders
        };
        Ok(Self {
            id: id!(64),
            email: request.email,
            name: request.name,
            enabled: request.enabled,
            mailer_type: request.mailer_type,
            imap: request.imap,
            sync_folders,
            created_at: utc_now!(),
            updated_at: utc_now!(),
        })
    }

    pub async fn check_account_active(account_id: u64) -> NuboResult<Account> {
        let account = Self::find(account_id).await?.ok_or_else(|| {
            raise_error!(
                format!("Account id='{account_id}' not found"),
                ErrorCode::ResourceNotFound
            )
        })?;

        if !account.enabled {
            return Err(raise_error!(
                format!("Account id='{account_id}' is disabled"),
                ErrorCode::AccountDisabled
            ));
        }

        Ok(account)
    }

    /// Fetches an `Account` by its `id`.
    pub async fn get(account_id: u64) -> NuboResult<Account> {
        let result = Self::find(account_id).await?.ok_or_else(|| {
            raise_error!(
                format!("Account with ID '{account_id}' not found"),
                ErrorCode::ResourceNotFound
            )
        })?;
        Ok(result)
    }

    pub async fn find(account_id: u64) -> NuboResult<Option<Account>> {
        secondary_find_impl::<Account>(DB_MANAGER.meta_db(), AccountKey::id, account_id).await
    }

    /// Saves the current `Account` by persisting it to storage.
    pub async fn save(&self) -> NuboResult<()> {
        insert_impl(DB_MANAGER.meta_db(), self.to_owned()).await
    }

    pub async fn create_account(request: AccountCreateRequest) -> NuboResult<Account> {
        let entity = Self::create(request)?;
        entity.save().await?;
        SyncTaskEntity::schedule_account(&entity).await?;
        Ok(entity)
    }

    pub async fn update(account_id: u64, request: AccountUpdateRequest) -> NuboResult<Account> {
        request.validate()?;
        let updated = update_impl(DB_MANAGER.meta_db(), move |rw| {
            rw.get().secondary::<Account>(AccountKey::id, account_id).map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?.ok_or_else(|| raise_error!(format!(
                "Attempted to edit the account's base information, but the corresponding account metadata was not found. account_id={}",
                account_id
            ), ErrorCode::ResourceNotFound))
        }, |current|{
            Self::apply_update_fields(current, request)
        }).await?;

        SyncTaskEntity::schedule_account(&updated).await?;
        Ok(updated)
    }

    pub async fn delete(account_id: u64) -> NuboResult<()> {
        let request = AccountUpdateRequest {
            enabled: Some(false),
            ..Default::default()
        };
        let _ = Self::update(account_id, request).await?;
        Self::cleanup_account_resources_sequential(account_id).await
    }

    async fn delete_account(account_id: u64) -> NuboResult<()> {
        delete_impl(DB_MANAGER.meta_db(), move|rw|{
            rw.get().secondary::<Account>(AccountKey::id, account_id).map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
            .ok_or_else(||raise_error!(format!("The account entity with id={account_id} that you want to delete was not found."), ErrorCode::ResourceNotFound))
        }).await
    }

    async fn cleanup_account_resources_sequential(account_id: u64) -> NuboResult<()> {
        SyncTaskEntity::cleanup_account(account_id).await?;
        AccessToken::cleanup_account(account_id).await?;
        CachedEmail::clean_account(account_id).await?;
        EmailBody::clean_account(account_id).await?;
        EmailAttachment::clean_account(account_id).await?;
        FolderSyncState::clean_account(account_id).await?;
        Self::delete_account(account_id).await?;
        info!("Sequential cleanup completed for account: {}", account_id);
        Ok(())
    }

    /// Retrieves a list of all `Account` instances.
    pub async fn list_all() -> NuboResult<Vec<Account>> {
        list_all_impl(DB_MANAGER.meta_db()).await
    }

    fn apply_update_fields(old: &Account, request: AccountUpdateRequest) -> NuboResult<Account> {
        let mut new = old.clone();

        if let Some(name) = &request.name {
            new.name = Some(name.clone());
        }

        if let Some(imap) = &request.imap {
            new.imap = Some(imap.clone());
        }

        if let Some(sync_folders) = request.sync_folders {
            new.sync_folders = sync_folders;
        }

        if let Some(enabled) = request.enabled {
            new.enabled = enabled;
        }
        new.updated_at = utc_now!();
        Ok(new)
    }
}
