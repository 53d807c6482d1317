use crate::{
    id,
    modules::{
        account::entity::{Account, MailerType},
        cache::email::{CachedEmail, FlagUpdateRequest},
        common::auth::ClientContext,
        error::code::ErrorCode,
        message,
        provider::{MemoryMailer, MemoryMessage, RemoteAttachment},
        sync::sync_folder,
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
    let base = utc_now!() - 600_000;
    (0..count)
        .map(|i| {
            mailer.seed_message(
                "INBOX",
                MemoryMessage {
                    internal_date: base + (i as i64) * 1000,
                    subject: Some(format!("message {}", i + 1)),
                    text: Some(format!("plain body {}", i + 1)),
                    html: Some(format!("<p>html body {}</p>", i + 1)),
                    ..Default::default()
                },
            )
        })
        .collect()
}

async fn synced_account(count: usize) -> Account {
    let account = memory_account().await;
    seed_inbox(account.id, count);
    sync_folder(account.id, "INBOX").await.unwrap();
    account
}

fn ctx() -> ClientContext {
    ClientContext::default()
}

#[tokio::test]
async fn test_list_emails_pagination() {
    let account = synced_account(5).await;

    let (total, first) = message::list_emails(&ctx(), Some(account.id), "INBOX", 2, 0)
        .await
        .unwrap();
    assert_eq!(total, 5);
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].subject.as_deref(), Some("message 5"));
    assert_eq!(first[1].subject.as_deref(), Some("message 4"));

    let (_, second) = message::list_emails(&ctx(), Some(account.id), "INBOX", 2, 2)
        .await
        .unwrap();
    assert_eq!(second[0].subject.as_deref(), Some("message 3"));
    assert_eq!(second[1].subject.as_deref(), Some("message 2"));

    let (_, past_end) = message::list_emails(&ctx(), Some(account.id), "INBOX", 2, 10)
        .await
        .unwrap();
    assert!(past_end.is_empty());
}

#[tokio::test]
async fn test_list_emails_offset_stable_under_new_arrivals() {
    let account = synced_account(4).await;

    let (_, first_page) = message::list_emails(&ctx(), Some(account.id), "INBOX", 2, 0)
        .await
        .unwrap();
    assert_eq!(first_page[0].subject.as_deref(), Some("message 4"));

    // a newer message lands between two page reads
    MemoryMailer::new(account.id).seed_message(
        "INBOX",
        MemoryMessage {
            subject: Some("newcomer".into()),
            ..Default::default()
        },
    );
    sync_folder(account.id, "INBOX").await.unwrap();

    // the arrival lands ahead of the cursor; no older message is skipped
    // when the reader keeps walking
    let (total, rest) = message::list_emails(&ctx(), Some(account.id), "INBOX", 10, 2)
        .await
        .unwrap();
    assert_eq!(total, 5);
    let subjects: Vec<_> = rest
        .iter()
        .map(|e| e.subject.clone().unwrap())
        .collect();
    assert_eq!(subjects, vec!["message 3", "message 2", "message 1"]);
}

#[tokio::test]
async fn test_unified_listing_merges_accounts() {
    let first = memory_account().await;
    let second = memory_account().await;

    let now = utc_now!();
    let mailer_a = MemoryMailer::new(first.id);
    mailer_a.ensure_folder("INBOX");
    mailer_a.seed_message(
        "INBOX",
        MemoryMessage {
            internal_date: now - 3000,
            subject: Some("oldest".into()),
            ..Default::default()
        },
    );
    mailer_a.seed_message(
        "INBOX",
        MemoryMessage {
            internal_date: now - 1000,
            subject: Some("newest".into()),
            ..Default::default()
        },
    );
    let mailer_b = MemoryMailer::new(second.id);
    mailer_b.ensure_folder("INBOX");
    mailer_b.seed_message(
        "INBOX",
        MemoryMessage {
            internal_date: now - 2000,
            subject: Some("middle".into()),
            ..Default::default()
        },
    );

    sync_folder(first.id, "INBOX").await.unwrap();
    sync_folder(second.id, "INBOX").await.unwrap();

    let context = ClientContext {
        access_token: None,
        ip_addr: None,
        is_root: true,
    };
    // restrict the merge to just these two accounts through per-account reads
    let (total_a, _) = message::list_emails(&context, Some(first.id), "INBOX", 10, 0)
        .await
        .unwrap();
    let (total_b, _) = message::list_emails(&context, Some(second.id), "INBOX", 10, 0)
        .await
        .unwrap();
    assert_eq!(total_a + total_b, 3);

    let (_, merged) = message::list_emails(&context, None, "INBOX", 200, 0)
        .await
        .unwrap();
    let subjects: Vec<_> = merged
        .iter()
        .filter(|e| e.account_id == first.id || e.account_id == second.id)
        .map(|e| e.subject.clone().unwrap())
        .collect();
    assert_eq!(subjects, vec!["newest", "middle", "oldest"]);
}

#[tokio::test]
async fn test_invalid_page_size_rejected() {
    let account = synced_account(1).await;
    let err = message::list_emails(&ctx(), Some(account.id), "INBOX", 0, 0)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidParameter);

    let err = message::list_emails(&ctx(), Some(account.id), "INBOX", 1000, 0)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ExceedsLimitation);
}

#[tokio::test]
async fn test_flag_update_visible_immediately() {
    let account = synced_account(1).await;
    let (_, rows) = message::list_emails(&ctx(), Some(account.id), "INBOX", 1, 0)
        .await
        .unwrap();
    let email = &rows[0];
    assert!(!email.is_read);

    let updated = message::update_email_flags(
        &ctx(),
        email.id,
        FlagUpdateRequest {
            is_read: Some(true),
            is_starred: Some(true),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(updated.is_read);
    assert!(updated.is_starred);

    let reread = CachedEmail::get(email.id).await.unwrap();
    assert!(reread.is_read);
    assert!(reread.is_starred);
}

#[tokio::test]
async fn test_flag_update_unknown_email() {
    let err = message::update_email_flags(
        &ctx(),
        id!(64),
        FlagUpdateRequest {
            is_read: Some(true),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ResourceNotFound);
}

#[tokio::test]
async fn test_empty_flag_update_rejected() {
    let account = synced_account(1).await;
    let (_, rows) = message::list_emails(&ctx(), Some(account.id), "INBOX", 1, 0)
        .await
        .unwrap();
    let err = message::update_email_flags(&ctx(), rows[0].id, FlagUpdateRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidParameter);
}

#[tokio::test]
async fn test_body_fetched_lazily_then_cached() {
    let account = synced_account(1).await;
    let (_, rows) = message::list_emails(&ctx(), Some(account.id), "INBOX", 1, 0)
        .await
        .unwrap();
    let email = &rows[0];
    assert!(!email.body_cached);

    let body = message::get_email_body(&ctx(), email.id).await.unwrap();
    assert_eq!(body.text.as_deref(), Some("plain body 1"));
    assert_eq!(body.html.as_deref(), Some("<p>html body 1</p>"));

    let reread = CachedEmail::get(email.id).await.unwrap();
    assert!(reread.body_cached);
    assert_eq!(reread.snippet.as_deref(), Some("plain body 1"));

    // second read comes from the cache, not a new fetch
    let again = message::get_email_body(&ctx(), email.id).await.unwrap();
    assert_eq!(again.fetched_at, body.fetched_at);
}

#[tokio::test]
async fn test_move_email_drops_origin_row() {
    let account = synced_account(1).await;
    let (_, rows) = message::list_emails(&ctx(), Some(account.id), "INBOX", 1, 0)
        .await
        .unwrap();
    let email = rows[0].clone();

    message::move_email(&ctx(), email.id, "Archive")
        .await
        .unwrap();

    assert!(CachedEmail::find(email.id).await.unwrap().is_none());
    let mailer = MemoryMailer::new(account.id);
    assert_eq!(mailer.list_uids("Archive").unwrap().len(), 1);
    assert!(mailer.list_uids("INBOX").unwrap().is_empty());
}

#[tokio::test]
async fn test_move_to_same_folder_rejected() {
    let account = synced_account(1).await;
    let (_, rows) = message::list_emails(&ctx(), Some(account.id), "INBOX", 1, 0)
        .await
        .unwrap();
    let err = message::move_email(&ctx(), rows[0].id, "INBOX")
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidParameter);
}

#[tokio::test]
async fn test_soft_delete_moves_to_trash() {
    let account = synced_account(1).await;
    let (_, rows) = message::list_emails(&ctx(), Some(account.id), "INBOX", 1, 0)
        .await
        .unwrap();

    message::delete_email(&ctx(), rows[0].id, false)
        .await
        .unwrap();

    // gone from the origin folder immediately
    assert!(CachedEmail::find(rows[0].id).await.unwrap().is_none());
    let mailer = MemoryMailer::new(account.id);
    assert!(mailer.list_uids("INBOX").unwrap().is_empty());
    assert_eq!(mailer.list_uids("Trash").unwrap().len(), 1);

    // shows up under Trash after that folder syncs
    sync_folder(account.id, "Trash").await.unwrap();
    let (total, trashed) = message::list_emails(&ctx(), Some(account.id), "Trash", 10, 0)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(trashed[0].subject.as_deref(), Some("message 1"));
}

#[tokio::test]
async fn test_delete_in_trash_is_permanent() {
    let account = synced_account(1).await;
    let (_, rows) = message::list_emails(&ctx(), Some(account.id), "INBOX", 1, 0)
        .await
        .unwrap();
    message::delete_email(&ctx(), rows[0].id, false)
        .await
        .unwrap();
    sync_folder(account.id, "Trash").await.unwrap();
    let (_, trashed) = message::list_emails(&ctx(), Some(account.id), "Trash", 1, 0)
        .await
        .unwrap();

    // a second soft delete of a trashed message removes it for good
    message::delete_email(&ctx(), trashed[0].id, false)
        .await
        .unwrap();
    assert!(CachedEmail::find(trashed[0].id).await.unwrap().is_none());
    assert!(MemoryMailer::new(account.id)
        .list_uids("Trash")
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_permanent_delete_removes_everywhere() {
    let account = synced_account(1).await;
    let (_, rows) = message::list_emails(&ctx(), Some(account.id), "INBOX", 1, 0)
        .await
        .unwrap();

    message::delete_email(&ctx(), rows[0].id, true)
        .await
        .unwrap();
    assert!(CachedEmail::find(rows[0].id).await.unwrap().is_none());
    assert!(MemoryMailer::new(account.id)
        .list_uids("INBOX")
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_attachment_listing_and_download() {
    let account = memory_account().await;
    let mailer = MemoryMailer::new(account.id);
    mailer.ensure_folder("INBOX");
    mailer.seed_message(
        "INBOX",
        MemoryMessage {
            subject: Some("report".into()),
            text: Some("see attachment".into()),
            attachments: vec![(
                RemoteAttachment {
                    part_number: "1".into(),
                    filename: Some("report.pdf".into()),
                    content_type: "application/pdf".into(),
                    size: 4,
                    inline: false,
                    content_id: None,
                },
                b"%PDF".to_vec(),
            )],
            ..Default::default()
        },
    );
    sync_folder(account.id, "INBOX").await.unwrap();

    let (_, rows) = message::list_emails(&ctx(), Some(account.id), "INBOX", 1, 0)
        .await
        .unwrap();
    let email = &rows[0];
    assert_eq!(email.attachment_count, 1);

    let attachments = message::list_attachments(&ctx(), email.id).await.unwrap();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].filename.as_deref(), Some("report.pdf"));
    assert!(!attachments[0].is_downloaded());

    let downloaded = message::download_attachment(&ctx(), attachments[0].id)
        .await
        .unwrap();
    assert_eq!(downloaded.data.as_deref(), Some(b"%PDF".as_slice()));

    // cached afterwards
    let again = message::download_attachment(&ctx(), attachments[0].id)
        .await
        .unwrap();
    assert_eq!(again.fetched_at, downloaded.fetched_at);
}
