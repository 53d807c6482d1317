use access_token::AccessTokenApi;
use account::AccountApi;
use message::MessageApi;
use poem_openapi::{OpenApiService, Tags};
use sync::SyncApi;

use crate::nubo_version;

pub mod access_token;
pub mod account;
pub mod message;
pub mod sync;

#[derive(Tags)]
pub enum ApiTags {
    AccessToken,
    Account,
    Message,
    Sync,
}

type NuboOpenApi = (AccessTokenApi, AccountApi, MessageApi, SyncApi);

pub fn create_openapi_service() -> OpenApiService<NuboOpenApi, ()> {
    OpenApiService::new(
        (AccessTokenApi, AccountApi, MessageApi, SyncApi),
        "NuboSyncApi",
        nubo_version!(),
    )
}
