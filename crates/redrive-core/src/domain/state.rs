//! Message status for the DLQ lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Message status.
///
/// State transitions:
/// - Pending -> Processing -> Resolved
/// - Pending -> Processing -> Pending (processor failed, retry budget left)
/// - Pending -> Processing -> Failed (processor failed, budget used up)
/// - Pending -> Failed (budget already used up when driven)
/// - Pending -> Expired (sweep, past `expires_at`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    /// Waiting for a retry (possibly delayed by `next_retry_at`).
    Pending,

    /// A processor attempt is in flight.
    Processing,

    /// Retry budget exhausted.
    Failed,

    /// Processed successfully or closed by an operator.
    Resolved,

    /// Swept after `expires_at` passed while still pending.
    Expired,
}

impl MessageStatus {
    pub const ALL: [MessageStatus; 5] = [
        MessageStatus::Pending,
        MessageStatus::Processing,
        MessageStatus::Failed,
        MessageStatus::Resolved,
        MessageStatus::Expired,
    ];

    /// No engine-driven transition leaves these.
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Resolved | MessageStatus::Expired)
    }

    /// Only pending messages are eligible for the expiration sweep.
    pub fn is_sweepable(self) -> bool {
        matches!(self, MessageStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Pending => "PENDING",
            MessageStatus::Processing => "PROCESSING",
            MessageStatus::Failed => "FAILED",
            MessageStatus::Resolved => "RESOLVED",
            MessageStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
