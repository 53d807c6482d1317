use mimalloc::MiMalloc;
use modules::{
    common::rustls::NuboTls,
    common::signal::SignalManager,
    database::manager::DatabaseManager,
    error::NuboResult,
    logger,
    rest::start_http_server,
    scheduler::dispatcher::start_sync_dispatcher,
    settings::{cli::SETTINGS, dir::DataDirManager},
    token::root::ensure_root_token,
    Initialize,
};
use tracing::{error, info};

mod modules;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

static LOGO: &str = r#"
  _   _       _
 | \ | |_   _| |__   ___
 |  \| | | | | '_ \ / _ \
 | |\  | |_| | |_) | (_) |
 |_| \_|\__,_|_.__/ \___/

"#;

#[tokio::main]
async fn main() -> NuboResult<()> {
    logger::initialize_logging();
    info!("{}", LOGO);
    info!("Starting nubo-sync");
    info!("Version:  {}", nubo_version!());

    if let Err(error) = initialize().await {
        eprintln!("{:?}", error);
        return Err(error);
    }

    let dispatcher = start_sync_dispatcher();

    if let Err(error) = start_http_server().await {
        error!("HTTP server exited with error: {:#?}", error);
        return Err(error);
    }
    dispatcher.cancel().await;
    info!("nubo-sync stopped");
    Ok(())
}

async fn initialize() -> NuboResult<()> {
    info!(
        "Data directory: {}",
        SETTINGS.nubo_root_dir.to_string_lossy()
    );
    SignalManager::initialize().await?;
    DataDirManager::initialize().await?;
    NuboTls::initialize().await?;
    DatabaseManager::initialize().await?;
    ensure_root_token().await?;
    Ok(())
}
