//! Normalized remote-mailbox capability.
//!
//! The sync engine and flag reconciler never speak IMAP directly; they see
//! one typed interface (status / fetch / push / move / delete) and
//! provider-specific adapters translate at this boundary.

use crate::modules::account::entity::{Account, MailerType};
use crate::modules::common::Addr;
use crate::modules::error::{code::ErrorCode, NuboResult};
use crate::raise_error;
use serde::{Deserialize, Serialize};

pub mod imap;
pub mod memory;
pub mod session;

pub use imap::ImapMailer;
pub use memory::{MemoryMailer, MemoryMessage};

/// Folder-level state reported by the remote server.
#[derive(Clone, Copy, Debug, Default)]
pub struct RemoteFolderStatus {
    /// UIDVALIDITY marker. A change invalidates all cached UIDs.
    pub uid_validity: u32,
    /// Number of messages currently in the folder.
    pub exists: u32,
}

/// Normalized message flags, mapped to and from provider conventions.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct EmailFlags {
    pub is_read: bool,
    pub is_starred: bool,
    pub is_archived: bool,
    pub is_trash: bool,
    pub is_spam: bool,
}

/// One message header as observed on the remote server.
#[derive(Clone, Debug, Default)]
pub struct RemoteEnvelope {
    pub uid: u32,
    /// Server receive time, epoch milliseconds.
    pub internal_date: i64,
    pub size: u32,
    pub subject: Option<String>,
    pub from: Option<Addr>,
    pub to: Vec<Addr>,
    pub cc: Vec<Addr>,
    pub flags: EmailFlags,
    pub attachment_count: u32,
    /// Present only for providers that hand out previews with headers.
    pub snippet: Option<String>,
}

/// Attachment metadata from the message structure; content is fetched
/// separately by part number.
#[derive(Clone, Debug, Default)]
pub struct RemoteAttachment {
    pub part_number: String,
    pub filename: Option<String>,
    pub content_type: String,
    pub size: u32,
    pub inline: bool,
    pub content_id: Option<String>,
}

/// Full message content returned by a body fetch.
#[derive(Clone, Debug, Default)]
pub struct RemoteContent {
    pub text: Option<String>,
    pub html: Option<String>,
    pub attachments: Vec<RemoteAttachment>,
}

/// A ready-to-use connection recipe for one account's remote mailbox.
pub enum Mailer {
    Imap(ImapMailer),
    InMemory(MemoryMailer),
}

impl Mailer {
    pub fn for_account(account: &Account) -> NuboResult<Mailer> {
        match account.mailer_type {
            MailerType::Imap => {
                let config = account.imap.clone().ok_or_else(|| {
                    raise_error!(
                        format!(
                            "Account id='{}' has no IMAP configuration",
                            account.id
                        ),
                        ErrorCode::InvalidParameter
                    )
                })?;
                Ok(Mailer::Imap(ImapMailer::new(account.email.clone(), config)))
            }
            MailerType::InMemory => Ok(Mailer::InMemory(MemoryMailer::new(account.id))),
        }
    }

    pub async fn folder_status(&self, folder: &str) -> NuboResult<RemoteFolderStatus> {
        match self {
            Mailer::Imap(m) => m.folder_status(folder).await,
            Mailer::InMemory(m) => m.folder_status(folder),
        }
    }

    /// All UIDs currently present in the folder, used to prune cache rows
    /// for remotely deleted messages.
    pub async fn list_uids(&self, folder: &str) -> NuboResult<Vec<u32>> {
        match self {
            Mailer::Imap(m) => m.list_uids(folder).await,
            Mailer::InMemory(m) => m.list_uids(folder),
        }
    }

    /// Headers and flags for every message with UID strictly greater than
    /// `after_uid`.
    pub async fn fetch_headers_since(
        &self,
        folder: &str,
        after_uid: u32,
    ) -> NuboResult<Vec<RemoteEnvelope>> {
        match self {
            Mailer::Imap(m) => m.fetch_headers_since(folder, after_uid).await,
            Mailer::InMemory(m) => m.fetch_headers_since(folder, after_uid),
        }
    }

    /// The newest `window` messages of a folder, for a bounded first sync.
    pub async fn fetch_recent_headers(
        &self,
        folder: &str,
        window: u32,
    ) -> NuboResult<Vec<RemoteEnvelope>> {
        match self {
            Mailer::Imap(m) => m.fetch_recent_headers(folder, window).await,
            Mailer::InMemory(m) => m.fetch_recent_headers(folder, window),
        }
    }

    /// Current flags for every message up to and including `max_uid`, used
    /// by the reconciliation half of a sync pass.
    pub async fn fetch_flags(&self, folder: &str, max_uid: u32) -> NuboResult<Vec<(u32, EmailFlags)>> {
        match self {
            Mailer::Imap(m) => m.fetch_flags(folder, max_uid).await,
            Mailer::InMemory(m) => m.fetch_flags(folder, max_uid),
        }
    }

    pub async fn fetch_message(&self, folder: &str, uid: u32) -> NuboResult<RemoteContent> {
        match self {
            Mailer::Imap(m) => m.fetch_message(folder, uid).await,
            Mailer::InMemory(m) => m.fetch_message(folder, uid),
        }
    }

    pub async fn fetch_attachment(
        &self,
        folder: &str,
        uid: u32,
        part_number: &str,
    ) -> NuboResult<Vec<u8>> {
        match self {
            Mailer::Imap(m) => m.fetch_attachment(folder, uid, part_number).await,
            Mailer::InMemory(m) => m.fetch_attachment(folder, uid, part_number),
        }
    }

    pub async fn push_flags(&self, folder: &str, uid: u32, flags: EmailFlags) -> NuboResult<()> {
        match self {
            Mailer::Imap(m) => m.push_flags(folder, uid, flags).await,
            Mailer::InMemory(m) => m.push_flags(folder, uid, flags),
        }
    }

    pub async fn move_message(&self, folder: &str, uid: u32, target: &str) -> NuboResult<()> {
        match self {
            Mailer::Imap(m) => m.move_message(folder, uid, target).await,
            Mailer::InMemory(m) => m.move_message(folder, uid, target),
        }
    }

    /// Permanently removes the message from the folder.
    pub async fn delete_message(&self, folder: &str, uid: u32) -> NuboResult<()> {
        match self {
            Mailer::Imap(m) => m.delete_message(folder, uid).await,
            Mailer::InMemory(m) => m.delete_message(folder, uid),
        }
    }
}

impl EmailFlags {
    /// Renders the flag set as IMAP store arguments. Non-standard states
    /// use the common keyword conventions (`Junk`, `Archived`).
    pub fn to_imap_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if self.is_read {
            flags.push("\\Seen".to_string());
        }
        if self.is_starred {
            flags.push("\\Flagged".to_string());
        }
        if self.is_trash {
            flags.push("\\Deleted".to_string());
        }
        if self.is_spam {
            flags.push("Junk".to_string());
        }
        if self.is_archived {
            flags.push("Archived".to_string());
        }
        flags
    }
}
