use std::collections::BTreeSet;

use crate::{
    modules::{
        account::entity::Account,
        error::{code::ErrorCode, NuboResult},
    },
    raise_error,
};
use poem_openapi::Object;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, Object)]
pub struct AccessTokenCreateRequest {
    /// The set of account ids associated with the token.
    pub accounts: BTreeSet<u64>,
    /// An optional description of the token's purpose or usage.
    #[oai(validator(max_length = "255"))]
    pub description: Option<String>,
}

impl AccessTokenCreateRequest {
    pub async fn validate(&self) -> NuboResult<()> {
        if self.accounts.is_empty() {
            return Err(raise_error!(
                "Account list cannot be empty. Please provide at least one valid account ID."
                    .into(),
                ErrorCode::InvalidParameter
            ));
        }

        let mut not_found = Vec::new();
        for account_id in &self.accounts {
            if Account::find(*account_id).await?.is_none() {
                not_found.push(*account_id);
            }
        }
        if !not_found.is_empty() {
            return Err(raise_error!(
                format!("The following account IDs were not found: {}. Please provide valid account IDs.", not_found.iter().map(u64::to_string).collect::<Vec<_>>().join(", ")),
                ErrorCode::InvalidParameter
            ));
        }

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, Object)]
pub struct AccessTokenUpdateRequest {
    /// The set of account ids associated with the token.
    pub accounts: Option<BTreeSet<u64>>,
    /// An optional description of the token's purpose or usage.
    #[oai(validator(max_length = "255"))]
    pub description: Option<String>,
}

impl AccessTokenUpdateRequest {
    pub async fn validate(&self) -> NuboResult<()> {
        if let Some(accounts) = &self.accounts {
            if accounts.is_empty() {
                return Err(raise_error!(
                    "Account list cannot be empty. Please provide at least one valid account ID."
                        .into(),
                    ErrorCode::InvalidParameter
                ));
            }

            let mut not_found = Vec::new();
            for account_id in accounts {
                if Account::find(*account_id).await?.is_none() {
                    not_found.push(*account_id);
                }
            }
            if !not_found.is_empty() {
                return Err(raise_error!(
                    format!("The following account IDs were not found: {}. Please provide valid account IDs.", not_found.iter().map(u64::to_string).collect::<Vec<_>>().join(", ")),
                    ErrorCode::InvalidParameter
                ));
            }
        }

        Ok(())
    }

    pub fn should_skip_update(&self) -> bool {
        self.description.is_none() && self.accounts.is_none()
    }
}
