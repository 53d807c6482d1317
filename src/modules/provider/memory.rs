use crate::modules::common::Addr;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::NuboResult;
use crate::modules::provider::{
    EmailFlags, RemoteAttachment, RemoteContent, RemoteEnvelope, RemoteFolderStatus,
};
use crate::{raise_error, utc_now};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::LazyLock;

const SNIPPET_LIMIT: usize = 160;

/// Process-wide registry of simulated mailboxes, keyed by account id.
static REGISTRY: LazyLock<DashMap<u64, MemoryAccount>> = LazyLock::new(DashMap::new);

#[derive(Default)]
struct MemoryAccount {
    folders: BTreeMap<String, MemoryFolder>,
}

struct MemoryFolder {
    uid_validity: u32,
    uid_next: u32,
    messages: BTreeMap<u32, MemoryMessage>,
}

impl Default for MemoryFolder {
    fn default() -> Self {
        Self {
            uid_validity: 1,
            uid_next: 1,
            messages: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryMessage {
    pub internal_date: i64,
    pub subject: Option<String>,
    pub from: Option<Addr>,
    pub to: Vec<Addr>,
    pub cc: Vec<Addr>,
    pub flags: EmailFlags,
    pub text: Option<String>,
    pub html: Option<String>,
    pub attachments: Vec<(RemoteAttachment, Vec<u8>)>,
}

impl MemoryMessage {
    fn size(&self) -> u32 {
        let body = self.text.as_deref().map(str::len).unwrap_or(0)
            + self.html.as_deref().map(str::len).unwrap_or(0);
        let parts: usize = self.attachments.iter().map(|(_, data)| data.len()).sum();
        (body + parts) as u32
    }

    fn snippet(&self) -> Option<String> {
        self.text
            .as_deref()
            .map(|text| text.chars().take(SNIPPET_LIMIT).collect())
    }

    fn envelope(&self, uid: u32) -> RemoteEnvelope {
        RemoteEnvelope {
            uid,
            internal_date: self.internal_date,
            size: self.size(),
            subject: self.subject.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            cc: self.cc.clone(),
            flags: self.flags,
            attachment_count: self.attachments.len() as u32,
            snippet: self.snippet(),
        }
    }
}

/// Simulated mailbox backend. Mirrors the remote-capability surface of the
/// IMAP adapter against process-local state, for in-memory accounts and
/// tests.
pub struct MemoryMailer {
    account_id: u64,
}

impl MemoryMailer {
    pub fn new(account_id: u64) -> Self {
        Self { account_id }
    }

    /// Drops all simulated state for the account.
    pub fn reset(account_id: u64) {
        REGISTRY.remove(&account_id);
    }

    pub fn ensure_folder(&self, folder: &str) {
        REGISTRY
            .entry(self.account_id)
            .or_default()
            .folders
            .entry(folder.to_string())
            .or_default();
    }

    /// Appends a message to the folder and returns its assigned UID.
    pub fn seed_message(&self, folder: &str, message: MemoryMessage) -> u32 {
        let mut account = REGISTRY.entry(self.account_id).or_default();
        let folder = account.folders.entry(folder.to_string()).or_default();
        let uid = folder.uid_next;
        folder.uid_next += 1;
        let mut message = message;
        if message.internal_date == 0 {
            message.internal_date = utc_now!();
        }
        folder.messages.insert(uid, message);
        uid
    }

    /// Simulates a mailbox rebuild: new UIDVALIDITY, all UIDs reassigned.
    pub fn bump_uid_validity(&self, folder: &str) {
        let mut account = REGISTRY.entry(self.account_id).or_default();
        let folder = account.folders.entry(folder.to_string()).or_default();
        folder.uid_validity += 1;
        let messages = std::mem::take(&mut folder.messages);
        folder.uid_next = 1;
        for (_, message) in messages {
            folder.messages.insert(folder.uid_next, message);
            folder.uid_next += 1;
        }
    }

    /// Simulates a remote deletion done by another client.
    pub fn remove_message(&self, folder: &str, uid: u32) {
        if let Some(mut account) = REGISTRY.get_mut(&self.account_id) {
            if let Some(folder) = account.folders.get_mut(folder) {
                folder.messages.remove(&uid);
            }
        }
    }

    /// Flags as currently held by the simulated server, for assertions.
    pub fn remote_flags(&self, folder: &str, uid: u32) -> Option<EmailFlags> {
        REGISTRY
            .get(&self.account_id)
            .and_then(|account| {
                account
                    .folders
                    .get(folder)
                    .and_then(|f| f.messages.get(&uid).map(|m| m.flags))
            })
    }

    fn with_folder<R>(
        &self,
        folder: &str,
        f: impl FnOnce(&mut MemoryFolder) -> NuboResult<R>,
    ) -> NuboResult<R> {
        let mut account = REGISTRY.entry(self.account_id).or_default();
        let folder = account.folders.get_mut(folder).ok_or_else(|| {
            raise_error!(
                format!("Folder '{folder}' does not exist on the remote server"),
                ErrorCode::RemoteFolderMissing
            )
        })?;
        f(folder)
    }

    pub fn folder_status(&self, folder: &str) -> NuboResult<RemoteFolderStatus> {
        self.with_folder(folder, |f| {
            Ok(RemoteFolderStatus {
                uid_validity: f.uid_validity,
                exists: f.messages.len() as u32,
            })
        })
    }

    pub fn list_uids(&self, folder: &str) -> NuboResult<Vec<u32>> {
        self.with_folder(folder, |f| Ok(f.messages.keys().copied().collect()))
    }

    pub fn fetch_headers_since(
        &self,
        folder: &str,
        after_uid: u32,
    ) -> NuboResult<Vec<RemoteEnvelope>> {
        self.with_folder(folder, |f| {
            Ok(f.messages
                .range(after_uid.saturating_add(1)..)
                .map(|(uid, message)| message.envelope(*uid))
                .collect())
        })
    }

    pub fn fetch_recent_headers(
        &self,
        folder: &str,
        window: u32,
    ) -> NuboResult<Vec<RemoteEnvelope>> {
        self.with_folder(folder, |f| {
            let skip = f.messages.len().saturating_sub(window as usize);
            Ok(f.messages
                .iter()
                .skip(skip)
                .map(|(uid, message)| message.envelope(*uid))
                .collect())
        })
    }

    pub fn fetch_flags(&self, folder: &str, max_uid: u32) -> NuboResult<Vec<(u32, EmailFlags)>> {
        self.with_folder(folder, |f| {
            Ok(f.messages
                .range(..=max_uid)
                .map(|(uid, message)| (*uid, message.flags))
                .collect())
        })
    }

    pub fn fetch_message(&self, folder: &str, uid: u32) -> NuboResult<RemoteContent> {
        self.with_folder(folder, |f| {
            let message = f.messages.get(&uid).ok_or_else(|| {
                raise_error!(
                    format!("Message uid={uid} not found on remote server"),
                    ErrorCode::ResourceNotFound
                )
            })?;
            Ok(RemoteContent {
                text: message.text.clone(),
                html: message.html.clone(),
                attachments: message
                    .attachments
                    .iter()
                    .map(|(meta, _)| meta.clone())
                    .collect(),
            })
        })
    }

    pub fn fetch_attachment(
        &self,
        folder: &str,
        uid: u32,
        part_number: &str,
    ) -> NuboResult<Vec<u8>> {
        self.with_folder(folder, |f| {
            let message = f.messages.get(&uid).ok_or_else(|| {
                raise_error!(
                    format!("Message uid={uid} not found on remote server"),
                    ErrorCode::ResourceNotFound
                )
            })?;
            message
                .attachments
                .iter()
                .find(|(meta, _)| meta.part_number == part_number)
                .map(|(_, data)| data.clone())
                .ok_or_else(|| {
                    raise_error!(
                        format!("Message uid={uid} has no attachment part {part_number}"),
                        ErrorCode::ResourceNotFound
                    )
                })
        })
    }

    pub fn push_flags(&self, folder: &str, uid: u32, flags: EmailFlags) -> NuboResult<()> {
        self.with_folder(folder, |f| {
            let message = f.messages.get_mut(&uid).ok_or_else(|| {
                raise_error!(
                    format!("Message uid={uid} not found on remote server"),
                    ErrorCode::ResourceNotFound
                )
            })?;
            message.flags = flags;
            Ok(())
        })
    }

    pub fn move_message(&self, folder: &str, uid: u32, target: &str) -> NuboResult<()> {
        let message = self.with_folder(folder, |f| {
            f.messages.remove(&uid).ok_or_else(|| {
                raise_error!(
                    format!("Message uid={uid} not found on remote server"),
                    ErrorCode::ResourceNotFound
                )
            })
        })?;
        let mut account = REGISTRY.entry(self.account_id).or_default();
        let target = account.folders.entry(target.to_string()).or_default();
        let uid = target.uid_next;
        target.uid_next += 1;
        target.messages.insert(uid, message);
        Ok(())
    }

    pub fn delete_message(&self, folder: &str, uid: u32) -> NuboResult<()> {
        self.with_folder(folder, |f| {
            f.messages.remove(&uid).ok_or_else(|| {
                raise_error!(
                    format!("Message uid={uid} not found on remote server"),
                    ErrorCode::ResourceNotFound
                )
            })?;
            Ok(())
        })
    }
}
