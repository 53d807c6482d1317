use crate::{
    generate_token,
    modules::{
        database::{insert_impl, manager::DB_MANAGER},
        error::{code::ErrorCode, NuboResult},
        settings::{cli::SETTINGS, dir::DATA_DIR_MANAGER},
        token::AccessToken,
    },
    raise_error, utc_now,
};
use std::fs::File;
use std::io::Write;
use tracing::info;

pub const ROOT_TOKEN_FILE: &str = "root";

/// Creates the root access token on first startup and writes it to the
/// `root` file under the data directory so the operator can retrieve it.
pub async fn ensure_root_token() -> NuboResult<()> {
    if let Some(existing) = find_root_token().await? {
        if !SETTINGS.nubo_metadata_memory_mode_enabled {
            save_to_file(&existing.token, ROOT_TOKEN_FILE)?;
        }
        return Ok(());
    }

    let token = generate_token!(128);
    let access_token = AccessToken {
        token: token.clone(),
        accounts: Default::default(),
        created_at: utc_now!(),
        updated_at: utc_now!(),
        description: Some("root token".into()),
        last_access_at: Default::default(),
        is_root: true,
    };
    insert_impl(DB_MANAGER.meta_db(), access_token).await?;
    if !SETTINGS.nubo_metadata_memory_mode_enabled {
        save_to_file(&token, ROOT_TOKEN_FILE)?;
    }
    info!("Generated new root access token");
    Ok(())
}

pub async fn reset_root_token() -> NuboResult<String> {
    if let Some(existing) = find_root_token().await? {
        AccessToken::delete(&existing.token).await?;
    }
    let token = generate_token!(128);
    let access_token = AccessToken {
        token: token.clone(),
        accounts: Default::default(),
        created_at: utc_now!(),
        updated_at: utc_now!(),
        description: Some("root token".into()),
        last_access_at: Default::default(),
        is_root: true,
    };
    insert_impl(DB_MANAGER.meta_db(), access_token).await?;
    if !SETTINGS.nubo_metadata_memory_mode_enabled {
        save_to_file(&token, ROOT_TOKEN_FILE)?;
    }
    Ok(token)
}

async fn find_root_token() -> NuboResult<Option<AccessToken>> {
    let all = AccessToken::list_all().await?;
    Ok(all.into_iter().find(|t| t.is_root))
}

fn save_to_file(content: &str, filename: &str) -> NuboResult<()> {
    let file_path = DATA_DIR_MANAGER.root_dir.join(filename);
    let mut file = File::create(&file_path)
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
    writeln!(file, "{}", content)
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
    Ok(())
}
