use crate::modules::database::{CACHE_MODELS, META_MODELS, TASK_MODELS};
use crate::modules::error::{code::ErrorCode, NuboError, NuboResult};
use crate::modules::settings::cli::SETTINGS;
use crate::modules::settings::dir::DATA_DIR_MANAGER;
use crate::modules::Initialize;
use crate::raise_error;
use native_db::{Builder, Database};
use std::sync::{Arc, LazyLock};
use tracing::info;

pub static DB_MANAGER: LazyLock<DatabaseManager> = LazyLock::new(DatabaseManager::new);

// 128MB for metadata and tasks, 1GB for the email cache.
const META_CACHE_SIZE: usize = 134217728;
const TASK_CACHE_SIZE: usize = 134217728;
const EMAIL_CACHE_SIZE: usize = 1073741824;

pub struct DatabaseManager {
    /// Metadata database instance (accounts, access tokens)
    meta_db: Arc<Database<'static>>,
    /// Task scheduling database instance
    tasks_db: Arc<Database<'static>>,
    /// Email cache database instance (folder states, envelopes, bodies)
    cache_db: Arc<Database<'static>>,
}

impl DatabaseManager {
    fn new() -> Self {
        let meta_db = Self::init_meta_database().expect("Failed to initialize metadata database");
        let tasks_db =
            Self::init_task_queue_database().expect("Failed to initialize tasks database");
        let cache_db =
            Self::init_email_cache_database().expect("Failed to initialize email cache database");
        DatabaseManager {
            meta_db,
            tasks_db,
            cache_db,
        }
    }

    /// Get a reference to the metadata database
    pub fn meta_db(&self) -> &Arc<Database<'static>> {
        &self.meta_db
    }

    /// Get a reference to the task scheduler database
    pub fn tasks_db(&self) -> &Arc<Database<'static>> {
        &self.tasks_db
    }

    pub fn cache_db(&self) -> &Arc<Database<'static>> {
        &self.cache_db
    }

    fn init_meta_database() -> NuboResult<Arc<Database<'static>>> {
        if SETTINGS.nubo_metadata_memory_mode_enabled {
            return Ok(Arc::new(
                Builder::new().create_in_memory(&META_MODELS).unwrap(),
            ));
        }
        let mut database = Builder::new()
            .set_cache_size(META_CACHE_SIZE)
            .create(&META_MODELS, DATA_DIR_MANAGER.meta_db.clone())
            .map_err(Self::handle_database_error)?;
        database
            .compact()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        Ok(Arc::new(database))
    }

    fn init_task_queue_database() -> NuboResult<Arc<Database<'static>>> {
        if SETTINGS.nubo_metadata_memory_mode_enabled {
            return Ok(Arc::new(
                Builder::new().create_in_memory(&TASK_MODELS).unwrap(),
            ));
        }
        let mut database = Builder::new()
            .set_cache_size(TASK_CACHE_SIZE)
            .create(&TASK_MODELS, DATA_DIR_MANAGER.task_db.clone())
            .map_err(Self::handle_database_error)?;
        database
            .compact()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        Ok(Arc::new(database))
    }

    fn init_email_cache_database() -> NuboResult<Arc<Database<'static>>> {
        if SETTINGS.nubo_metadata_memory_mode_enabled {
            return Ok(Arc::new(
                Builder::new().create_in_memory(&CACHE_MODELS).unwrap(),
            ));
        }
        info!(
            "Initializing email cache database at: {:?}",
            &DATA_DIR_MANAGER.cache_db
        );
        let mut database = Builder::new()
            .set_cache_size(EMAIL_CACHE_SIZE)
            .create(&CACHE_MODELS, DATA_DIR_MANAGER.cache_db.clone())
            .map_err(Self::handle_database_error)?;
        database
            .compact()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        Ok(Arc::new(database))
    }

    fn handle_database_error(error: native_db::db_type::Error) -> NuboError {
        match error {
            native_db::db_type::Error::RedbDatabaseError(database_error) => match database_error {
                redb::DatabaseError::DatabaseAlreadyOpen => {
                    raise_error!(
                        "Database is already open by another instance".into(),
                        ErrorCode::InternalError
                    )
                }
                other => {
                    raise_error!(
                        format!("Database error: {:?}", other),
                        ErrorCode::InternalError
                    )
                }
            },
            other => {
                raise_error!(
                    format!("Failed to create database: {:?}", other),
                    ErrorCode::InternalError
                )
            }
        }
    }
}

impl Initialize for DatabaseManager {
    async fn initialize() -> NuboResult<()> {
        LazyLock::force(&DB_MANAGER);
        Ok(())
    }
}
