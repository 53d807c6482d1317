use crate::modules::cache::folder::FolderSyncState;
use crate::modules::common::auth::ClientContext;
use crate::modules::rest::api::ApiTags;
use crate::modules::rest::response::{FolderStatusResponse, SyncRunResponse};
use crate::modules::rest::ApiResult;
use crate::modules::scheduler::model::SyncTaskEntity;
use crate::modules::sync::sync_folder;
use poem_openapi::{param::Path, param::Query, payload::Json, OpenApi};

pub struct SyncApi;

#[OpenApi(prefix_path = "/api/v1", tag = "ApiTags::Sync")]
impl SyncApi {
    /// Runs a sync pass for one folder right now, ahead of its schedule.
    ///
    /// Returns the number of newly cached messages, or 0 when another pass
    /// already holds the folder's lease.
    #[oai(path = "/sync/folder", method = "post", operation_id = "sync_folder_now")]
    async fn sync_folder_now(
        &self,
        context: ClientContext,
        /// The ID of the account to sync.
        account_id: Query<u64>,
        /// The folder to sync (default: "INBOX").
        folder: Query<Option<String>>,
    ) -> ApiResult<Json<SyncRunResponse>> {
        context.require_account_access(account_id.0)?;
        let folder = folder.0.unwrap_or_else(|| "INBOX".to_string());
        let synced = sync_folder(account_id.0, &folder).await?;
        Ok(Json(SyncRunResponse { synced }))
    }

    /// Per-folder sync state of an account: checkpoint, progress counters
    /// and the last error, if any.
    #[oai(
        path = "/sync/status/:account_id",
        method = "get",
        operation_id = "get_sync_status"
    )]
    async fn get_sync_status(
        &self,
        context: ClientContext,
        /// The ID of the account.
        account_id: Path<u64>,
    ) -> ApiResult<Json<Vec<FolderStatusResponse>>> {
        context.require_account_access(account_id.0)?;
        let states = FolderSyncState::list_account(account_id.0).await?;
        Ok(Json(states.into_iter().map(Into::into).collect()))
    }

    /// Lists the scheduled sync tasks of every account.
    ///
    /// Requires root privileges.
    #[oai(path = "/sync/tasks", method = "get", operation_id = "list_sync_tasks")]
    async fn list_sync_tasks(&self, context: ClientContext) -> ApiResult<Json<Vec<SyncTaskEntity>>> {
        context.require_root()?;
        Ok(Json(SyncTaskEntity::list_all().await?))
    }
}
