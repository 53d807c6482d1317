use crate::{
    id,
    modules::{
        account::entity::{Account, MailerType},
        account::payload::AccountUpdateRequest,
        cache::email::{CachedEmail, FlagUpdateRequest},
        cache::folder::{FolderSyncState, SyncErrorKind},
        error::code::ErrorCode,
        provider::{EmailFlags, MemoryMailer, MemoryMessage},
        sync::sync_folder,
        utils::{email_id, folder_id},
    },
    utc_now,
};

async fn memory_account() -> Account {
    let account = Account {
        id: id!(64),
        email: format!("user-{}@example.com", id!(32)),
        name: Some("Test".into()),
        enabled: true,
        mailer_type: MailerType::InMemory,
        imap: None,
        sync_folders: vec!["INBOX".into()],
        created_at: utc_now!(),
        updated_at: utc_now!(),
    };
    account.save().await.unwrap();
    account
}

fn seed_inbox(account_id: u64, count: usize) -> Vec<u32> {
    let mailer = MemoryMailer::new(account_id);
    mailer.ensure_folder("INBOX");
    let base = utc_now!() - 60_000;
    (0..count)
        .map(|i| {
            mailer.seed_message(
                "INBOX",
                MemoryMessage {
                    internal_date: base + (i as i64) * 1000,
                    subject: Some(format!("message {}", i + 1)),
                    text: Some(format!("body {}", i + 1)),
                    ..Default::default()
                },
            )
        })
        .collect()
}

#[tokio::test]
async fn test_initial_sync_mirrors_folder() {
    let account = memory_account().await;
    seed_inbox(account.id, 3);

    let synced = sync_folder(account.id, "INBOX").await.unwrap();
    assert_eq!(synced, 3);

    let fid = folder_id(account.id, "INBOX");
    let (total, rows) = CachedEmail::list_folder_page(fid, 10, 0).await.unwrap();
    assert_eq!(total, 3);
    // newest first
    assert_eq!(rows[0].subject.as_deref(), Some("message 3"));
    assert_eq!(rows[2].subject.as_deref(), Some("message 1"));

    let state = FolderSyncState::get(fid).await.unwrap();
    assert_eq!(state.checkpoint_uid, 3);
    assert_eq!(state.synced_messages, 3);
    assert!(state.last_sync_at.is_some());
    assert!(!state.sync_in_progress());
}

#[tokio::test]
async fn test_repeat_sync_is_idempotent() {
    let account = memory_account().await;
    seed_inbox(account.id, 3);

    assert_eq!(sync_folder(account.id, "INBOX").await.unwrap(), 3);
    assert_eq!(sync_folder(account.id, "INBOX").await.unwrap(), 0);

    let fid = folder_id(account.id, "INBOX");
    let (total, _) = CachedEmail::list_folder_page(fid, 10, 0).await.unwrap();
    assert_eq!(total, 3);
}

#[tokio::test]
async fn test_incremental_sync_picks_up_new_messages() {
    let account = memory_account().await;
    seed_inbox(account.id, 2);
    assert_eq!(sync_folder(account.id, "INBOX").await.unwrap(), 2);

    let mailer = MemoryMailer::new(account.id);
    mailer.seed_message(
        "INBOX",
        MemoryMessage {
            subject: Some("fresh".into()),
            ..Default::default()
        },
    );
    assert_eq!(sync_folder(account.id, "INBOX").await.unwrap(), 1);

    let fid = folder_id(account.id, "INBOX");
    let state = FolderSyncState::get(fid).await.unwrap();
    assert_eq!(state.checkpoint_uid, 3);
}

#[tokio::test]
async fn test_held_lease_skips_pass() {
    let account = memory_account().await;
    seed_inbox(account.id, 2);

    let state = FolderSyncState::get_or_create(account.id, "INBOX")
        .await
        .unwrap();
    let lease = FolderSyncState::try_acquire_lease(state.folder_id)
        .await
        .unwrap();
    assert!(lease.is_some());

    // second worker cannot take the lease
    let second = FolderSyncState::try_acquire_lease(state.folder_id)
        .await
        .unwrap();
    assert!(second.is_none());

    // a full pass backs off without touching the remote
    assert_eq!(sync_folder(account.id, "INBOX").await.unwrap(), 0);
    let fid = folder_id(account.id, "INBOX");
    let (total, _) = CachedEmail::list_folder_page(fid, 10, 0).await.unwrap();
    assert_eq!(total, 0);
}

#[tokio::test]
async fn test_uid_validity_rollover_rebuilds_cache() {
    let account = memory_account().await;
    seed_inbox(account.id, 3);
    assert_eq!(sync_folder(account.id, "INBOX").await.unwrap(), 3);

    let mailer = MemoryMailer::new(account.id);
    mailer.bump_uid_validity("INBOX");

    let synced = sync_folder(account.id, "INBOX").await.unwrap();
    assert_eq!(synced, 3);

    let fid = folder_id(account.id, "INBOX");
    let state = FolderSyncState::get(fid).await.unwrap();
    assert_eq!(state.uid_validity, Some(2));
    let (total, _) = CachedEmail::list_folder_page(fid, 10, 0).await.unwrap();
    assert_eq!(total, 3);
}

#[tokio::test]
async fn test_remote_deletion_prunes_cache() {
    let account = memory_account().await;
    let uids = seed_inbox(account.id, 3);
    assert_eq!(sync_folder(account.id, "INBOX").await.unwrap(), 3);

    let mailer = MemoryMailer::new(account.id);
    mailer.remove_message("INBOX", uids[1]);
    sync_folder(account.id, "INBOX").await.unwrap();

    let fid = folder_id(account.id, "INBOX");
    let (total, rows) = CachedEmail::list_folder_page(fid, 10, 0).await.unwrap();
    assert_eq!(total, 2);
    assert!(rows.iter().all(|row| row.uid != uids[1]));
}

#[tokio::test]
async fn test_remote_flag_change_wins_when_local_clean() {
    let account = memory_account().await;
    let uids = seed_inbox(account.id, 1);
    sync_folder(account.id, "INBOX").await.unwrap();

    // another client marks the message read on the server
    let mailer = MemoryMailer::new(account.id);
    mailer
        .push_flags(
            "INBOX",
            uids[0],
            EmailFlags {
                is_read: true,
                ..Default::default()
            },
        )
        .unwrap();

    sync_folder(account.id, "INBOX").await.unwrap();

    let fid = folder_id(account.id, "INBOX");
    let cached = CachedEmail::get(email_id(account.id, fid, uids[0]))
        .await
        .unwrap();
    assert!(cached.is_read);
    assert!(cached.dirty_at.is_none());
}

#[tokio::test]
async fn test_dirty_local_flags_pushed_not_overwritten() {
    let account = memory_account().await;
    let uids = seed_inbox(account.id, 1);
    sync_folder(account.id, "INBOX").await.unwrap();

    let fid = folder_id(account.id, "INBOX");
    let eid = email_id(account.id, fid, uids[0]);
    CachedEmail::update_flags(
        eid,
        FlagUpdateRequest {
            is_read: Some(true),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    // concurrent remote change that must lose to the pending local one
    let mailer = MemoryMailer::new(account.id);
    mailer
        .push_flags(
            "INBOX",
            uids[0],
            EmailFlags {
                is_starred: true,
                ..Default::default()
            },
        )
        .unwrap();

    sync_folder(account.id, "INBOX").await.unwrap();

    let cached = CachedEmail::get(eid).await.unwrap();
    assert!(cached.is_read);
    assert!(!cached.is_starred);
    assert!(cached.dirty_at.is_none());

    let remote = mailer.remote_flags("INBOX", uids[0]).unwrap();
    assert!(remote.is_read);
    assert!(!remote.is_starred);
}

#[tokio::test]
async fn test_missing_remote_folder_records_error() {
    let account = memory_account().await;
    // account exists in the registry but the folder was never created
    MemoryMailer::new(account.id).ensure_folder("Sent");

    let result = sync_folder(account.id, "INBOX").await;
    assert!(result.is_err());
    assert_eq!(
        result.unwrap_err().code(),
        ErrorCode::RemoteFolderMissing
    );

    let fid = folder_id(account.id, "INBOX");
    let state = FolderSyncState::get(fid).await.unwrap();
    assert_eq!(state.error_kind, Some(SyncErrorKind::RemoteFolderMissing));
    assert!(state.error_message.is_some());
    assert!(!state.sync_in_progress());
    assert_eq!(state.checkpoint_uid, 0);
}

#[tokio::test]
async fn test_auth_error_pauses_folder_until_account_updated() {
    let account = memory_account().await;
    seed_inbox(account.id, 2);
    let state = FolderSyncState::get_or_create(account.id, "INBOX")
        .await
        .unwrap();
    FolderSyncState::record_error(state.folder_id, SyncErrorKind::Auth, "LOGIN rejected".into())
        .await
        .unwrap();

    // paused: the remote is not contacted while credentials are stale
    assert_eq!(sync_folder(account.id, "INBOX").await.unwrap(), 0);
    let state = FolderSyncState::get(state.folder_id).await.unwrap();
    assert_eq!(state.error_kind, Some(SyncErrorKind::Auth));
    assert_eq!(state.checkpoint_uid, 0);

    // touching the account record lifts the pause
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    Account::update(
        account.id,
        AccountUpdateRequest {
            name: Some("refreshed".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(sync_folder(account.id, "INBOX").await.unwrap(), 2);
    let state = FolderSyncState::get(state.folder_id).await.unwrap();
    assert!(state.error_kind.is_none());
}

#[tokio::test]
async fn test_disabled_account_rejected() {
    let disabled = Account {
        id: id!(64),
        enabled: false,
        ..memory_account().await
    };
    disabled.save().await.unwrap();

    let result = sync_folder(disabled.id, "INBOX").await;
    assert_eq!(result.unwrap_err().code(), ErrorCode::AccountDisabled);
}
