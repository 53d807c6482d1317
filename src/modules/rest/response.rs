use poem_openapi::Object;
use serde::{Deserialize, Serialize};

use crate::modules::cache::email::CachedEmail;
use crate::modules::cache::folder::{FolderSyncState, SyncErrorKind};

/// One page of a folder listing, newest first, with offset pagination
/// metadata.
#[derive(Clone, Debug, Deserialize, Serialize, Object)]
pub struct EmailPage {
    /// Total number of cached messages behind the listing.
    pub total_items: u64,
    /// The page size that was applied.
    pub limit: u64,
    /// The offset that was applied.
    pub offset: u64,
    /// Whether another page exists past this one.
    pub has_more: bool,
    pub items: Vec<CachedEmail>,
}

impl EmailPage {
    pub fn new(total_items: u64, limit: u64, offset: u64, items: Vec<CachedEmail>) -> Self {
        Self {
            total_items,
            limit,
            offset,
            has_more: offset + (items.len() as u64) < total_items,
            items,
        }
    }
}

/// Outcome of an explicitly requested sync pass.
#[derive(Clone, Debug, Deserialize, Serialize, Object)]
pub struct SyncRunResponse {
    /// Number of messages newly mirrored into the cache.
    pub synced: u32,
}

/// Per-folder sync state as reported to the UI. The in-progress flag is
/// derived from the lease so callers never see the raw expiry timestamp.
#[derive(Clone, Debug, Deserialize, Serialize, Object)]
pub struct FolderStatusResponse {
    pub folder_name: String,
    /// Whether a sync pass currently holds the folder's lease.
    pub sync_in_progress: bool,
    /// Highest remote UID already mirrored into the cache.
    pub checkpoint_uid: u32,
    /// Timestamp (epoch ms) of the last successful sync pass.
    pub last_sync_at: Option<i64>,
    /// Message count reported by the remote folder.
    pub total_messages: u32,
    /// Number of messages mirrored locally.
    pub synced_messages: u32,
    pub error_kind: Option<SyncErrorKind>,
    pub error_message: Option<String>,
}

impl From<FolderSyncState> for FolderStatusResponse {
    fn from(state: FolderSyncState) -> Self {
        let sync_in_progress = state.sync_in_progress();
        Self {
            folder_name: state.folder_name,
            sync_in_progress,
            checkpoint_uid: state.checkpoint_uid,
            last_sync_at: state.last_sync_at,
            total_messages: state.total_messages,
            synced_messages: state.synced_messages,
            error_kind: state.error_kind,
            error_message: state.error_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utc_now;

    #[test]
    fn test_folder_status_derives_in_progress_from_lease() {
        let mut state = FolderSyncState {
            folder_name: "INBOX".into(),
            locked_until: utc_now!() + 60_000,
            ..Default::default()
        };
        let status = FolderStatusResponse::from(state.clone());
        assert!(status.sync_in_progress);

        state.locked_until = utc_now!() - 1;
        let status = FolderStatusResponse::from(state);
        assert!(!status.sync_in_progress);
    }
}
