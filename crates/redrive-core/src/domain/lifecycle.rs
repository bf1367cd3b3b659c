//! Lifecycle - 状態遷移の純粋関数
//!
//! `(message, event) -> message` の形で遷移を計算し、永続化は engine 側に任せます。
//! DB なしで遷移をテストできるようにするための分離です。
//!
//! - `check_eligibility`: retry-drive の前段チェック（副作用なし）
//! - `apply`: イベントを適用した新しいレコードを返す（元のレコードは変更しない）

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::json;

use super::{DlqMessage, ErrorInfo, MessageStatus, RetryAttempt};

pub const NOTE_PROCESSED: &str = "processed";
pub const NOTE_BUDGET_EXHAUSTED: &str = "retry_budget_exhausted";
pub const NOTE_EXPIRED: &str = "expired";

/// Result of the pre-claim checks, in the order they are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Ready,
    AlreadyResolved,
    Expired,
    BudgetExhausted,
    /// Another driver claimed the message recently.
    InProgress { since: DateTime<Utc> },
    NotYetEligible { next_retry_at: DateTime<Utc> },
}

/// Decide whether `message` may be claimed at `now`.
///
/// A PROCESSING message whose claim is older than `stale_claim_after` is
/// considered abandoned (crashed or cancelled driver) and becomes claimable.
pub fn check_eligibility(
    message: &DlqMessage,
    now: DateTime<Utc>,
    stale_claim_after: TimeDelta,
) -> Eligibility {
    match message.status {
        MessageStatus::Resolved => return Eligibility::AlreadyResolved,
        MessageStatus::Expired => return Eligibility::Expired,
        _ => {}
    }

    if message.budget_exhausted() {
        return Eligibility::BudgetExhausted;
    }

    if message.status == MessageStatus::Processing
        && let Some(since) = message.last_retry_at
        && now - since < stale_claim_after
    {
        return Eligibility::InProgress { since };
    }

    if let Some(next_retry_at) = message.next_retry_at
        && next_retry_at > now
    {
        return Eligibility::NotYetEligible { next_retry_at };
    }

    Eligibility::Ready
}

/// Events that move a message through its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A driver starts a processing attempt.
    Claim { at: DateTime<Utc> },

    /// The processor finished without error.
    Succeeded { at: DateTime<Utc> },

    /// The processor failed; `next_retry_at` comes from the retry policy.
    Failed {
        at: DateTime<Utc>,
        error: ErrorInfo,
        next_retry_at: DateTime<Utc>,
    },

    /// Driven with no retry budget left.
    BudgetExhausted { at: DateTime<Utc> },

    /// Swept past `expires_at`.
    Expire { at: DateTime<Utc> },

    /// Closed by an operator.
    Resolve {
        at: DateTime<Utc>,
        resolved_by: String,
        notes: Option<String>,
    },

    /// Operator override of the retry budget and/or expiration.
    Reconfigure {
        at: DateTime<Utc>,
        max_retries: Option<u32>,
        expires_at: Option<DateTime<Utc>>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Claim { .. } => "claim",
            Event::Succeeded { .. } => "succeeded",
            Event::Failed { .. } => "failed",
            Event::BudgetExhausted { .. } => "budget_exhausted",
            Event::Expire { .. } => "expire",
            Event::Resolve { .. } => "resolve",
            Event::Reconfigure { .. } => "reconfigure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("message is {0} and accepts no further transitions")]
    Terminal(MessageStatus),

    #[error("event '{event}' is not valid from status {from}")]
    InvalidSource {
        from: MessageStatus,
        event: &'static str,
    },

    #[error("max_retries={max_retries} is below retry_count={retry_count}")]
    BudgetBelowRetryCount { max_retries: u32, retry_count: u32 },

    #[error("next_retry_at must be after the attempt start")]
    RetryNotAfterAttempt,
}

/// Apply `event` to `message`, returning the next state.
///
/// `version` is left untouched; the store bumps it on write.
pub fn apply(message: &DlqMessage, event: Event) -> Result<DlqMessage, TransitionError> {
    if message.is_terminal() {
        return Err(TransitionError::Terminal(message.status));
    }

    let mut next = message.clone();
    let invalid = |event: &Event| TransitionError::InvalidSource {
        from: message.status,
        event: event.name(),
    };

    match event {
        Event::Claim { at } => {
            if message.budget_exhausted() {
                return Err(invalid(&event));
            }
            next.status = MessageStatus::Processing;
            next.last_retry_at = Some(at);
            next.updated_at = at;
        }

        Event::Succeeded { at } => {
            if message.status != MessageStatus::Processing {
                return Err(invalid(&event));
            }
            next.status = MessageStatus::Resolved;
            next.processed_at = Some(at);
            next.resolution_notes = Some(NOTE_PROCESSED.to_string());
            next.updated_at = at;
        }

        Event::Failed {
            at,
            ref error,
            next_retry_at,
        } => {
            if message.status != MessageStatus::Processing {
                return Err(invalid(&event));
            }
            if let Some(started) = message.last_retry_at
                && next_retry_at <= started
            {
                return Err(TransitionError::RetryNotAfterAttempt);
            }

            let attempt = message.retry_count + 1;
            next.retry_count = attempt;
            next.next_retry_at = Some(next_retry_at);
            next.retry_history.push(RetryAttempt {
                attempt,
                timestamp: at,
                error: error.message.clone(),
                context: Some(json!({
                    "name": error.name,
                    "stack": error.stack,
                })),
            });
            next.error_message = error.message.clone();
            next.error_stack = error.stack.clone();
            next.error_context = Some(json!({
                "name": error.name,
                "lastAttempt": at,
            }));
            next.status = if attempt >= message.max_retries {
                MessageStatus::Failed
            } else {
                MessageStatus::Pending
            };
            next.updated_at = at;
        }

        Event::BudgetExhausted { at } => {
            if !message.budget_exhausted() {
                return Err(invalid(&event));
            }
            next.status = MessageStatus::Failed;
            next.resolution_notes = Some(NOTE_BUDGET_EXHAUSTED.to_string());
            next.updated_at = at;
        }

        Event::Expire { at } => {
            if !message.status.is_sweepable() {
                return Err(invalid(&event));
            }
            next.status = MessageStatus::Expired;
            next.resolution_notes = Some(NOTE_EXPIRED.to_string());
            next.updated_at = at;
        }

        Event::Resolve {
            at,
            resolved_by,
            notes,
        } => {
            next.status = MessageStatus::Resolved;
            next.resolved_by = Some(resolved_by);
            next.resolution_notes = notes;
            next.processed_at = Some(at);
            next.updated_at = at;
        }

        Event::Reconfigure {
            at,
            max_retries,
            expires_at,
        } => {
            if let Some(max_retries) = max_retries {
                if max_retries < message.retry_count {
                    return Err(TransitionError::BudgetBelowRetryCount {
                        max_retries,
                        retry_count: message.retry_count,
                    });
                }
                next.max_retries = max_retries;
                // A raised budget puts an exhausted message back in rotation.
                if message.status == MessageStatus::Failed && !next.budget_exhausted() {
                    next.status = MessageStatus::Pending;
                    next.resolution_notes = None;
                }
            }
            if let Some(expires_at) = expires_at {
                next.expires_at = expires_at;
            }
            next.updated_at = at;
        }
    }

    Ok(next)
}
