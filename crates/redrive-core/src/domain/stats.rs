use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{MessageStatus, MessageType};

/// Counts for dashboards.
///
/// `by_type` groups every status together (same scope as `total`); it is not
/// a per-status breakdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DlqStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub failed: usize,
    pub resolved: usize,
    pub expired: usize,
    pub by_type: BTreeMap<MessageType, usize>,
}

impl DlqStats {
    pub fn set_status_count(&mut self, status: MessageStatus, count: usize) {
        match status {
            MessageStatus::Pending => self.pending = count,
            MessageStatus::Processing => self.processing = count,
            MessageStatus::Failed => self.failed = count,
            MessageStatus::Resolved => self.resolved = count,
            MessageStatus::Expired => self.expired = count,
        }
    }

    /// Messages a retry driver may still act on.
    pub fn retryable(&self) -> usize {
        self.pending + self.processing
    }
}
