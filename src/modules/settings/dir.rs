use crate::modules::settings::cli::SETTINGS;
use crate::modules::Initialize;
use crate::{
    modules::error::{code::ErrorCode, NuboResult},
    raise_error,
};
use std::path::PathBuf;
use std::sync::LazyLock;

pub const META_FILE: &str = "meta.db";
pub const TASK_FILE: &str = "tasks.db";
pub const CACHE_FILE: &str = "cache.db";
const LOG_DIR: &str = "logs";

pub static DATA_DIR_MANAGER: LazyLock<DataDirManager> =
    LazyLock::new(|| DataDirManager::new(PathBuf::from(&SETTINGS.nubo_root_dir)));

#[derive(Debug)]
pub struct DataDirManager {
    pub root_dir: PathBuf,
    pub meta_db: PathBuf,
    pub task_db: PathBuf,
    pub cache_db: PathBuf,
    pub log_dir: PathBuf,
}

impl Initialize for DataDirManager {
    async fn initialize() -> NuboResult<()> {
        std::fs::create_dir_all(&DATA_DIR_MANAGER.root_dir)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        std::fs::create_dir_all(&DATA_DIR_MANAGER.log_dir)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        Ok(())
    }
}

impl DataDirManager {
    pub fn new(root_dir: PathBuf) -> Self {
        Self {
            root_dir: root_dir.clone(),
            meta_db: root_dir.join(META_FILE),
            task_db: root_dir.join(TASK_FILE),
            cache_db: root_dir.join(CACHE_FILE),
            log_dir: root_dir.join(LOG_DIR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_dir_layout() {
        let root = tempfile::tempdir().unwrap();
        let manager = DataDirManager::new(root.path().to_path_buf());
        assert_eq!(manager.meta_db, root.path().join(META_FILE));
        assert_eq!(manager.task_db, root.path().join(TASK_FILE));
        assert_eq!(manager.cache_db, root.path().join(CACHE_FILE));
        assert_eq!(manager.log_dir, root.path().join(LOG_DIR));

        std::fs::create_dir_all(&manager.log_dir).unwrap();
        assert!(manager.log_dir.is_dir());
    }
}
