use crate::modules::cache::attachment::EmailAttachment;
use crate::modules::cache::body::EmailBody;
use crate::modules::cache::email::{CachedEmail, FlagUpdateRequest};
use crate::modules::common::auth::ClientContext;
use crate::modules::message;
use crate::modules::message::DEFAULT_PAGE_SIZE;
use crate::modules::rest::api::ApiTags;
use crate::modules::rest::response::EmailPage;
use crate::modules::rest::ApiResult;
use poem_openapi::payload::Attachment;
use poem_openapi::{param::Path, param::Query, payload::Json, Object, OpenApi};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, Object)]
pub struct MoveEmailRequest {
    /// The destination folder name (e.g., "Archive").
    pub target_folder: String,
}

pub struct MessageApi;

#[OpenApi(prefix_path = "/api/v1", tag = "ApiTags::Message")]
impl MessageApi {
    /// Lists cached messages of a folder, newest first.
    ///
    /// Without an `account_id` the listing merges the same-named folder of
    /// every account the caller may access into one date-ordered view.
    /// Served entirely from the cache; never contacts the remote server.
    #[oai(path = "/emails", method = "get", operation_id = "list_emails")]
    async fn list_emails(
        &self,
        context: ClientContext,
        /// Restrict the listing to a single account.
        account_id: Query<Option<u64>>,
        /// The folder to list (default: "INBOX").
        folder: Query<Option<String>>,
        /// Page size (default 50, max 200).
        limit: Query<Option<u64>>,
        /// Number of messages to skip.
        offset: Query<Option<u64>>,
    ) -> ApiResult<Json<EmailPage>> {
        let folder = folder.0.unwrap_or_else(|| "INBOX".to_string());
        let limit = limit.0.unwrap_or(DEFAULT_PAGE_SIZE);
        let offset = offset.0.unwrap_or(0);
        let (total, items) =
            message::list_emails(&context, account_id.0, &folder, limit, offset).await?;
        Ok(Json(EmailPage::new(total, limit, offset, items)))
    }

    /// Updates message flags (read, starred, archived, trash, spam).
    ///
    /// The change is visible in subsequent reads immediately; the remote
    /// server is updated in the background.
    #[oai(
        path = "/email/:email_id/flags",
        method = "patch",
        operation_id = "update_email_flags"
    )]
    async fn update_email_flags(
        &self,
        context: ClientContext,
        /// The ID of the message to update.
        email_id: Path<u64>,
        /// The flags to change; absent fields are left untouched.
        payload: Json<FlagUpdateRequest>,
    ) -> ApiResult<Json<CachedEmail>> {
        Ok(Json(
            message::update_email_flags(&context, email_id.0, payload.0).await?,
        ))
    }

    /// Moves a message to another folder on the remote server.
    #[oai(
        path = "/email/:email_id/move",
        method = "post",
        operation_id = "move_email"
    )]
    async fn move_email(
        &self,
        context: ClientContext,
        /// The ID of the message to move.
        email_id: Path<u64>,
        /// The request payload.
        payload: Json<MoveEmailRequest>,
    ) -> ApiResult<()> {
        Ok(message::move_email(&context, email_id.0, &payload.0.target_folder).await?)
    }

    /// Deletes a message.
    ///
    /// By default the message is only flagged as trash; with
    /// `permanent=true` it is removed from the remote server and the cache.
    #[oai(
        path = "/email/:email_id",
        method = "delete",
        operation_id = "delete_email"
    )]
    async fn delete_email(
        &self,
        context: ClientContext,
        /// The ID of the message to delete.
        email_id: Path<u64>,
        /// Permanently remove the message instead of flagging it as trash.
        permanent: Query<Option<bool>>,
    ) -> ApiResult<()> {
        Ok(message::delete_email(&context, email_id.0, permanent.0.unwrap_or(false)).await?)
    }

    /// Retrieves the text/html content of a message, fetching and caching
    /// it on first open.
    #[oai(
        path = "/email/:email_id/body",
        method = "get",
        operation_id = "get_email_body"
    )]
    async fn get_email_body(
        &self,
        context: ClientContext,
        /// The ID of the message.
        email_id: Path<u64>,
    ) -> ApiResult<Json<EmailBody>> {
        Ok(Json(message::get_email_body(&context, email_id.0).await?))
    }

    /// Lists the attachments of a message.
    #[oai(
        path = "/email/:email_id/attachments",
        method = "get",
        operation_id = "list_email_attachments"
    )]
    async fn list_email_attachments(
        &self,
        context: ClientContext,
        /// The ID of the message.
        email_id: Path<u64>,
    ) -> ApiResult<Json<Vec<EmailAttachment>>> {
        Ok(Json(message::list_attachments(&context, email_id.0).await?))
    }

    /// Downloads the content of an attachment, fetching and caching it on
    /// first request.
    #[oai(
        path = "/attachment/:attachment_id/download",
        method = "get",
        operation_id = "download_attachment"
    )]
    async fn download_attachment(
        &self,
        context: ClientContext,
        /// The ID of the attachment.
        attachment_id: Path<u64>,
    ) -> ApiResult<Attachment<Vec<u8>>> {
        let attachment = message::download_attachment(&context, attachment_id.0).await?;
        let filename = attachment
            .filename
            .clone()
            .unwrap_or_else(|| format!("attachment-{}", attachment.id));
        let data = attachment.data.unwrap_or_default();
        Ok(Attachment::new(data).filename(filename))
    }
}
