use crate::modules::account::entity::Account;
use crate::modules::account::payload::{AccountCreateRequest, AccountUpdateRequest};
use crate::modules::common::auth::ClientContext;
use crate::modules::rest::api::ApiTags;
use crate::modules::rest::ApiResult;
use poem_openapi::{param::Path, payload::Json, OpenApi};

pub struct AccountApi;

#[OpenApi(prefix_path = "/api/v1", tag = "ApiTags::Account")]
impl AccountApi {
    /// Lists the accounts the caller may access.
    #[oai(path = "/account-list", method = "get", operation_id = "list_accounts")]
    async fn list_accounts(&self, context: ClientContext) -> ApiResult<Json<Vec<Account>>> {
        let accounts = Account::list_all().await?;
        let accounts = match context.accessible_accounts()? {
            Some(granted) => accounts
                .into_iter()
                .filter(|account| granted.contains(&account.id))
                .collect(),
            None => accounts,
        };
        Ok(Json(accounts))
    }

    /// Retrieves a single account.
    #[oai(path = "/account/:account_id", method = "get", operation_id = "get_account")]
    async fn get_account(
        &self,
        /// The ID of the account to retrieve.
        account_id: Path<u64>,
        context: ClientContext,
    ) -> ApiResult<Json<Account>> {
        context.require_account_access(account_id.0)?;
        Ok(Json(Account::get(account_id.0).await?))
    }

    /// Registers a new mailbox account and schedules its recurring sync.
    ///
    /// Requires root privileges.
    #[oai(path = "/account", method = "post", operation_id = "create_account")]
    async fn create_account(
        &self,
        context: ClientContext,
        /// The request payload.
        payload: Json<AccountCreateRequest>,
    ) -> ApiResult<Json<Account>> {
        context.require_root()?;
        Ok(Json(Account::create_account(payload.0).await?))
    }

    /// Updates an existing account.
    ///
    /// Requires root privileges.
    #[oai(
        path = "/account/:account_id",
        method = "post",
        operation_id = "update_account"
    )]
    async fn update_account(
        &self,
        context: ClientContext,
        /// The ID of the account to update.
        account_id: Path<u64>,
        /// The request payload.
        payload: Json<AccountUpdateRequest>,
    ) -> ApiResult<Json<Account>> {
        context.require_root()?;
        Ok(Json(Account::update(account_id.0, payload.0).await?))
    }

    /// Removes an account and all of its cached data.
    ///
    /// Requires root privileges.
    #[oai(
        path = "/account/:account_id",
        method = "delete",
        operation_id = "remove_account"
    )]
    async fn remove_account(
        &self,
        context: ClientContext,
        /// The ID of the account to remove.
        account_id: Path<u64>,
    ) -> ApiResult<()> {
        context.require_root()?;
        Ok(Account::delete(account_id.0).await?)
    }
}
