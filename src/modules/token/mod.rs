use crate::modules::database::manager::DB_MANAGER;
use crate::modules::database::{delete_impl, insert_impl, list_all_impl, update_impl};
use crate::modules::token::payload::AccessTokenUpdateRequest;
use crate::raise_error;
use crate::{
    generate_token, modules::error::NuboResult, modules::token::payload::AccessTokenCreateRequest,
    utc_now,
};
use native_db::*;
use native_model::{native_model, Model};
use poem_openapi::Object;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::error::code::ErrorCode;

pub mod payload;
pub mod root;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, Object)]
#[native_model(id = 2, version = 1)]
#[native_db]
pub struct AccessToken {
    /// The unique token string used for authentication
    #[primary_key]
    pub token: String,
    /// The set of account ids the token is allowed to access.
    pub accounts: BTreeSet<u64>,
    /// The timestamp (in milliseconds since epoch) when the token was created.
    pub created_at: i64,
    /// The timestamp (in milliseconds since epoch) when the token was last updated.
    pub updated_at: i64,
    /// An optional description of the token's purpose or usage.
    pub description: Option<String>,
    /// The timestamp (in milliseconds since epoch) when the token was last used.
    pub last_access_at: i64,
    /// Root tokens bypass per-account access checks.
    pub is_root: bool,
}

impl AccessToken {
    pub fn new(token: String, accounts: BTreeSet<u64>, description: Option<String>) -> Self {
        Self {
            token,
            accounts,
            created_at: utc_now!(),
            updated_at: utc_now!(),
            description,
            last_access_at: Default::default(),
            is_root: false,
        }
    }

    pub async fn try_update_access_timestamp(token: &str) -> NuboResult<AccessToken> {
        let token = token.to_string();
        update_impl(
            DB_MANAGER.meta_db(),
            |rw| {
                rw.get()
                    .primary::<AccessToken>(token)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!("Token not exist.".into(), ErrorCode::ResourceNotFound)
                    })
            },
            |current| {
                let mut updated = current.clone();
                updated.last_access_at = utc_now!();
                Ok(updated)
            },
        )
        .await
    }

    pub async fn grant_account_access(token: &str, account_id: u64) -> NuboResult<()> {
        let token = token.to_string();
        update_impl(
            DB_MANAGER.meta_db(),
            move |rw| {
                rw.get()
                    .primary::<AccessToken>(token.clone())
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!(
                            "The access token with token={} that you want to modify was not found.",
                            token
                        ),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                updated.accounts.insert(account_id);
                updated.updated_at = utc_now!();
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }

    pub async fn update(token: &str, request: AccessTokenUpdateRequest) -> NuboResult<()> {
        if request.should_skip_update() {
            return Err(raise_error!(
                "No changes detected in description or accounts. \
                 Please modify at least one of these fields to perform an update."
                    .into(),
                ErrorCode::InvalidParameter
            ));
        }
        request.validate().await?;

        let token = token.to_string();
        update_impl(
            DB_MANAGER.meta_db(),
            move |rw| {
                rw.get()
                    .primary::<AccessToken>(token.clone())
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!(
                            "The access token with token={} that you want to modify was not found.",
                            token
                        ),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                if let Some(description) = request.description {
                    updated.description = Some(description);
                }

                if let Some(accounts) = request.accounts {
                    updated.accounts = accounts;
                }

                updated.updated_at = utc_now!();
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }

    pub async fn create(request: AccessTokenCreateRequest) -> NuboResult<String> {
        request.validate().await?;

        let AccessTokenCreateRequest {
            accounts,
            description,
        } = request;

        let token = generate_token!(128);
        let access_token = AccessToken::new(token.clone(), accounts, description);

        insert_impl(DB_MANAGER.meta_db(), access_token).await?;
        Ok(token)
    }

    pub async fn get(token: &str) -> NuboResult<Option<AccessToken>> {
        crate::modules::database::async_find_impl(DB_MANAGER.meta_db(), token.to_string()).await
    }

    pub async fn delete(token: &str) -> NuboResult<()> {
        let token = token.to_string();
        delete_impl(DB_MANAGER.meta_db(), move |rw| {
            rw.get()
                .primary::<AccessToken>(token.clone())
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .ok_or_else(|| {
                    raise_error!(
                        format!("Token '{}' not found during deletion process.", token),
                        ErrorCode::ResourceNotFound
                    )
                })
        })
        .await
    }

    pub async fn list_all() -> NuboResult<Vec<AccessToken>> {
        list_all_impl(DB_MANAGER.meta_db()).await
    }

    pub async fn list_account_tokens(account_id: u64) -> NuboResult<Vec<AccessToken>> {
        let all = AccessToken::list_all().await?;
        let result: Vec<AccessToken> = all
            .into_iter()
            .filter(|e| e.accounts.contains(&account_id))
            .collect();
        Ok(result)
    }

    pub async fn cleanup_account(account_id: u64) -> NuboResult<()> {
        let tokens = Self::list_account_tokens(account_id).await?;
        if tokens.is_empty() {
            return Ok(());
        }

        for token in tokens {
            update_impl(
                DB_MANAGER.meta_db(),
                move |rw| {
                    rw.get()
                        .primary::<AccessToken>(token.token.clone())
                        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                        .ok_or_else(|| {
                            raise_error!(
                                format!("Cannot find access token, {}", token.token),
                                ErrorCode::ResourceNotFound
                            )
                        })
                },
                move |current| {
                    let mut updated = current.clone();
                    updated.updated_at = utc_now!();
                    updated.accounts.retain(|id| *id != account_id);
                    Ok(updated)
                },
            )
            .await?;
        }
        Ok(())
    }

    pub fn can_access_account(&self, account_id: u64) -> bool {
        self.accounts.contains(&account_id)
    }
}
