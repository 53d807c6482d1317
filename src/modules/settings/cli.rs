use clap::Parser;
use std::{collections::HashSet, path::PathBuf, sync::LazyLock};

#[cfg(not(test))]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::parse);

#[cfg(test)]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::new_for_test);

#[derive(Debug, Parser)]
#[clap(
    name = "nubo-sync",
    about = "The Nubo email synchronization core: mirrors remote mailboxes into a local cache
    and serves unified, paginated email reads over REST without blocking on the remote server.",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Settings {
    /// nubo-sync log level (default: "info")
    #[clap(long, default_value = "info", env, help = "Set the log level")]
    pub nubo_log_level: String,

    /// Write logs to rolling files under the data directory instead of stdout
    #[clap(long, default_value = "false", env, help = "Log to file instead of stdout")]
    pub nubo_log_to_file: bool,

    /// Enable ANSI colors in stdout logs
    #[clap(long, default_value = "true", env, help = "Enable ANSI colors in logs")]
    pub nubo_ansi_logs: bool,

    /// HTTP port (default: 15800)
    #[clap(long, default_value = "15800", env, help = "Set the HTTP port")]
    pub nubo_http_port: u16,

    /// The IP address the HTTP server binds to
    #[clap(long, env, help = "The IPv4 address to bind the HTTP server to")]
    pub nubo_bind_ip: Option<String>,

    /// Root directory for databases and logs
    #[clap(long, default_value = "./nubo-data", env, help = "Set the data directory")]
    pub nubo_root_dir: PathBuf,

    /// Keep all databases in memory; nothing is persisted. Used by tests.
    #[clap(long, default_value = "false", env, help = "Run databases in memory")]
    pub nubo_metadata_memory_mode_enabled: bool,

    /// Interval between scheduled sync passes for each account folder, in seconds
    #[clap(long, default_value = "180", env, help = "Periodic sync interval in seconds")]
    pub nubo_sync_interval_seconds: u64,

    /// Lifetime of the per-folder sync lease. A worker that dies mid-sync
    /// leaves a lease that expires on its own after this many seconds.
    #[clap(long, default_value = "300", env, help = "Sync lease duration in seconds")]
    pub nubo_sync_lease_seconds: u64,

    /// Number of most recent messages fetched when a folder is synced for the
    /// first time or after a UID validity rollover
    #[clap(long, default_value = "500", env, help = "Initial sync window size")]
    pub nubo_initial_sync_window: u32,

    /// Upper bound for any single remote mailbox operation, in seconds
    #[clap(long, default_value = "60", env, help = "Remote operation timeout in seconds")]
    pub nubo_remote_timeout_seconds: u64,

    /// Maximum number of folder sync passes running at the same time
    #[clap(long, default_value = "8", env, help = "Concurrent folder sync limit")]
    pub nubo_sync_concurrency: usize,

    /// Require a bearer access token on every API call
    #[clap(long, default_value = "true", env, help = "Enable access token checks")]
    pub nubo_enable_access_token: bool,

    /// CORS allowed origins (comma-separated)
    #[clap(
        long,
        default_value = "*",
        env,
        help = "Set the allowed CORS origins (comma-separated list)",
        value_parser = parse_cors_origins
    )]
    pub nubo_cors_origins: HashSet<String>,

    /// CORS max age in seconds (default: 86400)
    #[clap(long, default_value = "86400", env, help = "Set the CORS max age in seconds")]
    pub nubo_cors_max_age: i32,
}

fn parse_cors_origins(s: &str) -> Result<HashSet<String>, String> {
    let set: HashSet<String> = s
        .split(',')
        .map(|origin| origin.trim().to_string())
        .filter(|origin| !origin.is_empty())
        .collect();
    Ok(set)
}

impl Settings {
    #[cfg(test)]
    pub fn new_for_test() -> Self {
        Settings {
            nubo_log_level: "debug".into(),
            nubo_log_to_file: false,
            nubo_ansi_logs: false,
            nubo_http_port: 15800,
            nubo_bind_ip: None,
            nubo_root_dir: std::env::temp_dir().join("nubo-sync-test"),
            nubo_metadata_memory_mode_enabled: true,
            nubo_sync_interval_seconds: 1,
            nubo_sync_lease_seconds: 300,
            nubo_initial_sync_window: 500,
            nubo_remote_timeout_seconds: 5,
            nubo_sync_concurrency: 4,
            nubo_enable_access_token: false,
            nubo_cors_origins: HashSet::new(),
            nubo_cors_max_age: 86400,
        }
    }
}
