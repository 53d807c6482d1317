use crate::{
    modules::{
        error::{code::ErrorCode, NuboResult},
        settings::cli::SETTINGS,
        token::AccessToken,
    },
    raise_error,
};
use poem::{
    web::{
        headers::{authorization::Bearer, Authorization, HeaderMapExt},
        RealIp,
    },
    Endpoint, FromRequest, Middleware, Request, RequestBody, Result,
};
use serde::Deserialize;
use std::{collections::BTreeSet, net::IpAddr, sync::Arc};

use super::create_api_error_response;

pub struct ApiGuard;

pub struct ApiGuardEndpoint<E> {
    ep: E,
}

impl<E: Endpoint> Middleware<E> for ApiGuard {
    type Output = ApiGuardEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        ApiGuardEndpoint { ep }
    }
}

#[derive(Deserialize)]
struct Param {
    access_token: String,
}

impl<E: Endpoint> Endpoint for ApiGuardEndpoint<E> {
    type Output = E::Output;

    async fn call(&self, mut req: Request) -> Result<Self::Output> {
        let context = extract_client_context(&req).await?;
        context.require_authorized().map_err(|error| {
            create_api_error_response(&error.to_string(), ErrorCode::PermissionDenied)
        })?;
        req.set_data(Arc::new(context));
        self.ep.call(req).await
    }
}

#[derive(Clone, Debug, Default)]
pub struct ClientContext {
    pub ip_addr: Option<IpAddr>,
    pub access_token: Option<AccessToken>,
    pub is_root: bool,
}

impl ClientContext {
    pub fn require_root(&self) -> NuboResult<()> {
        if !SETTINGS.nubo_enable_access_token || self.is_root {
            Ok(())
        } else {
            Err(raise_error!(
                "Root access required".into(),
                ErrorCode::PermissionDenied
            ))
        }
    }

    pub fn require_authorized(&self) -> NuboResult<()> {
        if !SETTINGS.nubo_enable_access_token || self.is_root || self.access_token.is_some() {
            Ok(())
        } else {
            Err(raise_error!(
                "Authorization required".into(),
                ErrorCode::PermissionDenied
            ))
        }
    }

    pub fn require_account_access(&self, account_id: u64) -> NuboResult<()> {
        if !SETTINGS.nubo_enable_access_token || self.is_root {
            return Ok(());
        }

        match &self.access_token {
            Some(token) if token.can_access_account(account_id) => Ok(()),
            _ => Err(raise_error!(format!(
                "You do not have permission to access the requested email account (ID: {}). Please check your access rights or contact the administrator.",
                account_id
            ), ErrorCode::PermissionDenied)),
        }
    }

    /// Returns `None` when every account is accessible (auth disabled or root
    /// token), otherwise the set of account ids the token is bound to.
    pub fn accessible_accounts(&self) -> NuboResult<Option<&BTreeSet<u64>>> {
        if !SETTINGS.nubo_enable_access_token || self.is_root {
            Ok(None)
        } else {
            match &self.access_token {
                Some(token) => Ok(Some(&token.accounts)),
                None => Err(raise_error!(
                    "Missing access token".into(),
                    ErrorCode::PermissionDenied
                )),
            }
        }
    }
}

impl<'a> FromRequest<'a> for ClientContext {
    async fn from_request(req: &'a Request, _body: &mut RequestBody) -> Result<Self> {
        extract_client_context(req).await
    }
}

pub async fn extract_client_context(req: &Request) -> Result<ClientContext> {
    if SETTINGS.nubo_enable_access_token {
        let ip_addr = RealIp::from_request_without_body(req)
            .await
            .map_err(|_| {
                create_api_error_response(
                    "Failed to parse client IP address",
                    ErrorCode::InvalidParameter,
                )
            })?
            .0;
        // Extract access token from Bearer header or query params
        let bearer = req
            .headers()
            .typed_get::<Authorization<Bearer>>()
            .map(|auth| auth.0.token().to_string())
            .or_else(|| req.params::<Param>().ok().map(|param| param.access_token));

        let token = bearer.ok_or_else(|| {
            create_api_error_response("Valid access token not found", ErrorCode::PermissionDenied)
        })?;

        // Validate and update access token
        let validated_token = AccessToken::try_update_access_timestamp(&token)
            .await
            .map_err(|_| {
                create_api_error_response("Invalid access token", ErrorCode::PermissionDenied)
            })?;

        let is_root = validated_token.is_root;
        return Ok(ClientContext {
            ip_addr,
            access_token: Some(validated_token),
            is_root,
        });
    }

    Ok(Default::default())
}
