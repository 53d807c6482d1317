use crate::{
    id,
    modules::{
        cache::email::CachedEmail,
        cache::folder::FolderSyncState,
        database::{
            batch_delete_impl, batch_upsert_impl, manager::DB_MANAGER,
            paginate_primary_prefix_impl, try_update_impl, upsert_impl,
        },
        error::code::ErrorCode,
        utils::email_id,
    },
    raise_error, utc_now,
};

fn rows_for(folder_id: u64, uids: &[u32]) -> Vec<CachedEmail> {
    let base = utc_now!();
    uids.iter()
        .map(|&uid| CachedEmail {
            id: email_id(1, folder_id, uid),
            account_id: 1,
            folder_id,
            folder_name: "INBOX".into(),
            uid,
            internal_date: base + (uid as i64) * 10,
            created_at: base,
            ..Default::default()
        })
        .collect()
}

#[tokio::test]
async fn test_prefix_pagination_isolates_folders() {
    let folder_a = id!(64);
    let folder_b = id!(64);
    batch_upsert_impl(DB_MANAGER.cache_db(), rows_for(folder_a, &[1, 2, 3]))
        .await
        .unwrap();
    batch_upsert_impl(DB_MANAGER.cache_db(), rows_for(folder_b, &[7, 8]))
        .await
        .unwrap();

    let (total, page): (u64, Vec<CachedEmail>) = paginate_primary_prefix_impl(
        DB_MANAGER.cache_db(),
        CachedEmail::folder_prefix(folder_a),
        10,
        0,
    )
    .await
    .unwrap();
    assert_eq!(total, 3);
    assert!(page.iter().all(|row| row.folder_id == folder_a));
    // descending key order
    let uids: Vec<u32> = page.iter().map(|row| row.uid).collect();
    assert_eq!(uids, vec![3, 2, 1]);
}

#[tokio::test]
async fn test_prefix_pagination_offset_past_end() {
    let folder = id!(64);
    batch_upsert_impl(DB_MANAGER.cache_db(), rows_for(folder, &[1, 2]))
        .await
        .unwrap();

    let (total, page): (u64, Vec<CachedEmail>) = paginate_primary_prefix_impl(
        DB_MANAGER.cache_db(),
        CachedEmail::folder_prefix(folder),
        5,
        9,
    )
    .await
    .unwrap();
    assert_eq!(total, 2);
    assert!(page.is_empty());
}

#[tokio::test]
async fn test_try_update_none_leaves_row_untouched() {
    let folder = id!(64);
    let state = FolderSyncState {
        folder_id: folder,
        account_id: 1,
        folder_name: "INBOX".into(),
        checkpoint_uid: 5,
        created_at: utc_now!(),
        updated_at: utc_now!(),
        ..Default::default()
    };
    upsert_impl(DB_MANAGER.cache_db(), state).await.unwrap();

    let outcome = try_update_impl(
        DB_MANAGER.cache_db(),
        move |rw| {
            rw.get()
                .primary::<FolderSyncState>(folder)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .ok_or_else(|| {
                    raise_error!("missing".into(), ErrorCode::ResourceNotFound)
                })
        },
        |_: &FolderSyncState| Ok(None),
    )
    .await
    .unwrap();
    assert!(outcome.is_none());

    let reread = FolderSyncState::get(folder).await.unwrap();
    assert_eq!(reread.checkpoint_uid, 5);
}

#[tokio::test]
async fn test_batch_delete_reports_count() {
    let folder = id!(64);
    batch_upsert_impl(DB_MANAGER.cache_db(), rows_for(folder, &[1, 2, 3]))
        .await
        .unwrap();

    let prefix = CachedEmail::folder_prefix(folder);
    let deleted = batch_delete_impl(DB_MANAGER.cache_db(), move |rw| {
        rw.scan()
            .primary::<CachedEmail>()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
            .start_with(prefix)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))
    })
    .await
    .unwrap();
    assert_eq!(deleted, 3);
}
