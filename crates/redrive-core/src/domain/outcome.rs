//! Outcome model: structured results of engine operations.
//!
//! Every expected runtime outcome of retry-drive is a value here, never an
//! `Err`, so batch callers can loop over ids without per-item error handling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{DlqMessage, MessageId, MessageStatus};

/// Why `process_message` returned what it returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessReason {
    /// The processor ran and succeeded.
    Processed,
    NotFound,
    AlreadyResolved,
    Expired,
    RetryBudgetExhausted,
    NotYetEligible,
    /// The processor ran and failed (or timed out).
    ProcessorFailed,
    /// Another driver claimed the message first.
    Conflict,
    /// A fresh claim by another driver is still running.
    InProgress,
    /// No processor registered for the message type.
    NoProcessor,
}

impl ProcessReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessReason::Processed => "processed",
            ProcessReason::NotFound => "not_found",
            ProcessReason::AlreadyResolved => "already_resolved",
            ProcessReason::Expired => "expired",
            ProcessReason::RetryBudgetExhausted => "retry_budget_exhausted",
            ProcessReason::NotYetEligible => "not_yet_eligible",
            ProcessReason::ProcessorFailed => "processor_failed",
            ProcessReason::Conflict => "conflict",
            ProcessReason::InProgress => "in_progress",
            ProcessReason::NoProcessor => "no_processor",
        }
    }
}

impl fmt::Display for ProcessReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one retry-drive call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutcome {
    pub success: bool,
    pub reason: ProcessReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Processor error message for `processor_failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessOutcome {
    fn new(success: bool, reason: ProcessReason) -> Self {
        Self {
            success,
            reason,
            retry_count: None,
            next_retry_at: None,
            error: None,
        }
    }

    pub fn processed(retry_count: u32) -> Self {
        Self::new(true, ProcessReason::Processed).with_retry_count(retry_count)
    }

    pub fn already_resolved() -> Self {
        Self::new(true, ProcessReason::AlreadyResolved)
    }

    /// Any non-success reason without extra fields.
    pub fn rejected(reason: ProcessReason) -> Self {
        Self::new(false, reason)
    }

    pub fn budget_exhausted(retry_count: u32) -> Self {
        Self::new(false, ProcessReason::RetryBudgetExhausted).with_retry_count(retry_count)
    }

    pub fn not_yet_eligible(next_retry_at: DateTime<Utc>) -> Self {
        Self {
            next_retry_at: Some(next_retry_at),
            ..Self::new(false, ProcessReason::NotYetEligible)
        }
    }

    pub fn processor_failed(
        retry_count: u32,
        next_retry_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            retry_count: Some(retry_count),
            next_retry_at: Some(next_retry_at),
            error: Some(error.into()),
            ..Self::new(false, ProcessReason::ProcessorFailed)
        }
    }

    fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }
}

/// One entry of a bulk run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkItem {
    pub message_id: MessageId,
    pub success: bool,
    /// Reason code, or the infrastructure error text if the store failed.
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkReport {
    pub processed: usize,
    pub failed: usize,
    pub results: Vec<BulkItem>,
}

impl BulkReport {
    pub fn push(&mut self, message_id: MessageId, success: bool, reason: impl Into<String>) {
        if success {
            self.processed += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(BulkItem {
            message_id,
            success,
            reason: reason.into(),
        });
    }
}

/// Result of an operator resolve.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveResult {
    Resolved(DlqMessage),
    NotFound,
    AlreadyTerminal(MessageStatus),
}
