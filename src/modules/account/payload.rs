use email_address::EmailAddress;
use poem_openapi::Object;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{
    modules::{
        account::entity::{AuthType, ImapConfig, MailerType},
        error::{code::ErrorCode, NuboResult},
    },
    raise_error,
};

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, Object)]
pub struct AccountCreateRequest {
    /// Email address associated with this account
    pub email: String,
    /// Display name for the account (optional)
    #[oai(validator(max_length = "255"))]
    pub name: Option<String>,
    /// Whether the account starts enabled
    pub enabled: bool,
    /// Method used to access and manage emails.
    pub mailer_type: MailerType,
    /// IMAP server configuration, required when `mailer_type` is `Imap`.
    pub imap: Option<ImapConfig>,
    /// Folders to keep synchronized. Defaults to `INBOX` if empty.
    pub sync_folders: Vec<String>,
}

impl AccountCreateRequest {
    pub fn validate(&self) -> NuboResult<()> {
        if EmailAddress::from_str(&self.email).is_err() {
            return Err(raise_error!(
                format!("Invalid email address: {}", self.email),
                ErrorCode::InvalidParameter
            ));
        }

        match self.mailer_type {
            MailerType::Imap => {
                let imap = self.imap.as_ref().ok_or_else(|| {
                    raise_error!(
                        "IMAP configuration is required for IMAP accounts".into(),
                        ErrorCode::InvalidParameter
                    )
                })?;
                validate_imap_config(imap)?;
            }
            MailerType::InMemory => {}
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, Object)]
pub struct AccountUpdateRequest {
    /// Display name for the account (optional)
    #[oai(validator(max_length = "255"))]
    pub name: Option<String>,
    /// Whether the account is enabled
    pub enabled: Option<bool>,
    /// IMAP server configuration
    pub imap: Option<ImapConfig>,
    /// Folders to keep synchronized
    pub sync_folders: Option<Vec<String>>,
}

impl AccountUpdateRequest {
    pub fn validate(&self) -> NuboResult<()> {
        if let Some(imap) = &self.imap {
            validate_imap_config(imap)?;
        }
        if let Some(sync_folders) = &self.sync_folders {
            if sync_folders.is_empty() {
                return Err(raise_error!(
                    "sync_folders cannot be empty; provide at least one folder name".into(),
                    ErrorCode::InvalidParameter
                ));
            }
        }
        Ok(())
    }
}

fn validate_imap_config(imap: &ImapConfig) -> NuboResult<()> {
    if imap.host.is_empty() {
        return Err(raise_error!(
            "IMAP host cannot be empty".into(),
            ErrorCode::InvalidParameter
        ));
    }
    match imap.auth.auth_type {
        AuthType::Password => {
            if imap.auth.password.is_none() {
                return Err(raise_error!(
                    "A password is required for password authentication".into(),
                    ErrorCode::InvalidParameter
                ));
            }
        }
        AuthType::OAuth2 => {
            if imap.auth.access_token.is_none() {
                return Err(raise_error!(
                    "An access token is required for OAuth2 authentication".into(),
                    ErrorCode::InvalidParameter
                ));
            }
        }
    }
    Ok(())
}
