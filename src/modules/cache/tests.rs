use crate::{
    id,
    modules::{
        cache::email::{CachedEmail, FlagUpdateRequest},
        cache::folder::{FolderSyncState, SyncErrorKind},
        error::code::ErrorCode,
        utils::{email_id, folder_id},
    },
    utc_now,
};

fn sample_email(account_id: u64, folder_id: u64, uid: u32, internal_date: i64) -> CachedEmail {
    CachedEmail {
        id: email_id(account_id, folder_id, uid),
        account_id,
        folder_id,
        folder_name: "INBOX".into(),
        uid,
        internal_date,
        subject: Some(format!("uid {uid}")),
        size: 42,
        flags_synced_at: utc_now!(),
        created_at: utc_now!(),
        ..Default::default()
    }
}

#[test]
fn test_primary_key_orders_by_date_then_uid() {
    let fid = 7u64;
    let older = sample_email(1, fid, 10, 1_000);
    let newer = sample_email(1, fid, 2, 2_000);
    assert!(older.pk() < newer.pk());

    // same date: uid breaks the tie
    let a = sample_email(1, fid, 3, 5_000);
    let b = sample_email(1, fid, 4, 5_000);
    assert!(a.pk() < b.pk());

    // keys stay within the folder prefix
    assert!(older.pk().starts_with(&CachedEmail::folder_prefix(fid)));
    assert!(!older
        .pk()
        .starts_with(&CachedEmail::folder_prefix(fid + 1)));
}

#[tokio::test]
async fn test_folder_page_newest_first() {
    let account_id = id!(64);
    let fid = folder_id(account_id, "INBOX");
    let base = utc_now!();
    let batch = (1..=4u32)
        .map(|uid| sample_email(account_id, fid, uid, base + (uid as i64) * 100))
        .collect();
    CachedEmail::batch_upsert(batch).await.unwrap();

    let (total, rows) = CachedEmail::list_folder_page(fid, 2, 0).await.unwrap();
    assert_eq!(total, 4);
    assert_eq!(rows[0].uid, 4);
    assert_eq!(rows[1].uid, 3);

    let (_, tail) = CachedEmail::list_folder_page(fid, 10, 3).await.unwrap();
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].uid, 1);
}

#[tokio::test]
async fn test_prune_missing_keeps_live_rows() {
    let account_id = id!(64);
    let fid = folder_id(account_id, "INBOX");
    let base = utc_now!();
    let batch = (1..=3u32)
        .map(|uid| sample_email(account_id, fid, uid, base + (uid as i64) * 100))
        .collect();
    CachedEmail::batch_upsert(batch).await.unwrap();

    let pruned = CachedEmail::prune_missing(fid, vec![1, 3]).await.unwrap();
    assert_eq!(pruned, 1);
    let (total, rows) = CachedEmail::list_folder_page(fid, 10, 0).await.unwrap();
    assert_eq!(total, 2);
    assert!(rows.iter().all(|row| row.uid != 2));
}

#[tokio::test]
async fn test_update_flags_marks_dirty() {
    let account_id = id!(64);
    let fid = folder_id(account_id, "INBOX");
    let email = sample_email(account_id, fid, 1, utc_now!());
    let eid = email.id;
    CachedEmail::upsert(email).await.unwrap();

    let updated = CachedEmail::update_flags(
        eid,
        FlagUpdateRequest {
            is_starred: Some(true),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(updated.is_starred);
    let dirty_at = updated.dirty_at.unwrap();

    // confirming the push clears the marker
    CachedEmail::mark_flags_pushed(eid, dirty_at).await.unwrap();
    let reread = CachedEmail::get(eid).await.unwrap();
    assert!(reread.dirty_at.is_none());
    assert!(reread.is_starred);
}

#[tokio::test]
async fn test_pushed_marker_survives_newer_mutation() {
    let account_id = id!(64);
    let fid = folder_id(account_id, "INBOX");
    let email = sample_email(account_id, fid, 1, utc_now!());
    let eid = email.id;
    CachedEmail::upsert(email).await.unwrap();

    let first = CachedEmail::update_flags(
        eid,
        FlagUpdateRequest {
            is_read: Some(true),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let first_dirty = first.dirty_at.unwrap();

    // a second mutation lands while the first push is in flight
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    CachedEmail::update_flags(
        eid,
        FlagUpdateRequest {
            is_trash: Some(true),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    CachedEmail::mark_flags_pushed(eid, first_dirty).await.unwrap();
    let reread = CachedEmail::get(eid).await.unwrap();
    // the newer mutation still needs a push
    assert!(reread.dirty_at.is_some());
}

#[tokio::test]
async fn test_lease_lifecycle() {
    let account_id = id!(64);
    let state = FolderSyncState::get_or_create(account_id, "INBOX")
        .await
        .unwrap();
    assert!(!state.sync_in_progress());

    let lease = FolderSyncState::try_acquire_lease(state.folder_id)
        .await
        .unwrap()
        .unwrap();
    assert!(lease.sync_in_progress());
    assert!(FolderSyncState::try_acquire_lease(state.folder_id)
        .await
        .unwrap()
        .is_none());

    FolderSyncState::complete_success(state.folder_id, 12, 1, 20, 12)
        .await
        .unwrap();
    let released = FolderSyncState::get(state.folder_id).await.unwrap();
    assert!(!released.sync_in_progress());
    assert_eq!(released.checkpoint_uid, 12);
    assert_eq!(released.uid_validity, Some(1));

    // reclaimable again after release
    assert!(FolderSyncState::try_acquire_lease(state.folder_id)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_record_error_keeps_checkpoint() {
    let account_id = id!(64);
    let state = FolderSyncState::get_or_create(account_id, "INBOX")
        .await
        .unwrap();
    FolderSyncState::complete_success(state.folder_id, 30, 5, 30, 30)
        .await
        .unwrap();

    FolderSyncState::try_acquire_lease(state.folder_id)
        .await
        .unwrap()
        .unwrap();
    FolderSyncState::record_error(
        state.folder_id,
        SyncErrorKind::Transient,
        "connection reset".into(),
    )
    .await
    .unwrap();

    let reread = FolderSyncState::get(state.folder_id).await.unwrap();
    assert!(!reread.sync_in_progress());
    assert_eq!(reread.checkpoint_uid, 30);
    assert_eq!(reread.error_kind, Some(SyncErrorKind::Transient));
}

#[tokio::test]
async fn test_rollover_reset_clears_counters() {
    let account_id = id!(64);
    let state = FolderSyncState::get_or_create(account_id, "INBOX")
        .await
        .unwrap();
    FolderSyncState::complete_success(state.folder_id, 9, 1, 9, 9)
        .await
        .unwrap();

    FolderSyncState::reset_for_rollover(state.folder_id, 2)
        .await
        .unwrap();
    let reread = FolderSyncState::get(state.folder_id).await.unwrap();
    assert_eq!(reread.uid_validity, Some(2));
    assert_eq!(reread.checkpoint_uid, 0);
    assert_eq!(reread.synced_messages, 0);
    assert!(reread.last_sync_at.is_none());
}

#[tokio::test]
async fn test_get_unknown_folder_state() {
    let err = FolderSyncState::get(id!(64)).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::FolderNotCached);
}

#[test]
fn test_flag_request_empty_detection() {
    assert!(FlagUpdateRequest::default().is_empty());
    assert!(!FlagUpdateRequest {
        is_spam: Some(false),
        ..Default::default()
    }
    .is_empty());
}
