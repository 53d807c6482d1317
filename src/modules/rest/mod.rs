use crate::modules::common::auth::ApiGuard;
use crate::modules::common::log::Tracing;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::handler::error_handler;
use crate::modules::error::NuboResult;
use crate::modules::{common::signal::shutdown_signal, settings::cli::SETTINGS};
use crate::raise_error;

use super::error::ApiErrorResponse;
use api::create_openapi_service;
use http::HeaderValue;
use poem::listener::TcpListener;
use poem::middleware::{CatchPanic, Cors, SetHeader};
use poem::{EndpointExt, Route, Server};
use std::time::Duration;
use tracing::info;

pub mod api;
pub mod response;

pub type ApiResult<T, E = ApiErrorResponse> = std::result::Result<T, E>;

const DESCRIPTION: &str = r#"
    The Nubo email synchronization core.

    - Mirrors remote mailboxes into a local cache on a periodic schedule with resumable, per-folder checkpoints.
    - Serves unified, paginated email reads across accounts without blocking on the remote server.
    - Applies flag mutations locally first and reconciles them with the remote in the background.
"#;

pub async fn start_http_server() -> NuboResult<()> {
    let listener = TcpListener::bind((
        SETTINGS.nubo_bind_ip.clone().unwrap_or("0.0.0.0".into()),
        SETTINGS.nubo_http_port,
    ));

    let api_service = create_openapi_service()
        .description(DESCRIPTION)
        .summary("Email synchronization and caching service");

    let swagger = api_service.swagger_ui();
    let spec_json = api_service.spec_endpoint();

    let open_api_route = Route::new()
        .nest_no_strip("/api/v1", api_service)
        .with(ApiGuard)
        .with(Tracing);

    let mut cors_origins = SETTINGS.nubo_cors_origins.clone();
    if cors_origins.is_empty() {
        cors_origins = ["*".to_string()].into_iter().collect();
    }

    let cors = Cors::new()
        .allow_origins(cors_origins)
        .allow_credentials(true)
        .allow_methods(vec!["GET", "POST", "PATCH", "DELETE", "OPTIONS", "HEAD"])
        .allow_headers(vec!["Content-Type", "Authorization"])
        .max_age(SETTINGS.nubo_cors_max_age);

    let docs_cache_header = SetHeader::new().overriding(
        http::header::CACHE_CONTROL,
        HeaderValue::from_static("max-age=86400"),
    );

    let route = Route::new()
        .nest("/api-docs/swagger", swagger.with(docs_cache_header))
        .nest("/api-docs/spec.json", spec_json)
        .nest_no_strip("/api/v1", open_api_route)
        .with(cors)
        .with(CatchPanic::new());

    let server = Server::new(listener)
        .name("Nubo Sync API Service")
        .idle_timeout(Duration::from_secs(60))
        .run_with_graceful_shutdown(
            route.catch_all_error(error_handler),
            shutdown_signal(),
            Some(Duration::from_secs(5)),
        );
    info!(
        "Nubo Sync API Service is now running on port {}.",
        SETTINGS.nubo_http_port
    );
    server
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))
}
