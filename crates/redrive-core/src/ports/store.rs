//! DlqStore port - DLQ message の正本（source of truth）
//!
//! 必要なのは filter / order / count ができる永続ストアだけです。
//!
//! # 設計原則
//! - 更新は必ず `update(next, expected_version)` の条件付き書き込み
//!   （読んだ時点の version と一致しなければ `VersionConflict`）
//! - version はストア側で +1 する
//! - 一覧はその時点のスナップショット（書き込みをブロックしない）

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{DlqMessage, MessageId, MessageStatus, MessageType, OrganizationId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message {0} not found")]
    NotFound(MessageId),

    #[error("message {0} already exists")]
    AlreadyExists(MessageId),

    #[error("message {id} changed concurrently (expected version {expected}, found {actual})")]
    VersionConflict {
        id: MessageId,
        expected: u64,
        actual: u64,
    },

    #[error("backend: {0}")]
    Backend(String),
}

/// Field filter. `None` means "any".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageFilter {
    pub organization_id: Option<OrganizationId>,
    pub message_type: Option<MessageType>,
    pub status: Option<MessageStatus>,
    /// `next_retry_at` is null or `<=` this instant.
    pub retry_due_by: Option<DateTime<Utc>>,
    /// `expires_at` is strictly before this instant.
    pub expires_before: Option<DateTime<Utc>>,
    /// `last_retry_at` is set and `<=` this instant.
    pub claimed_by: Option<DateTime<Utc>>,
}

impl MessageFilter {
    pub fn status(status: MessageStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn in_org(mut self, organization_id: Option<OrganizationId>) -> Self {
        self.organization_id = organization_id;
        self
    }

    pub fn of_type(mut self, message_type: Option<MessageType>) -> Self {
        self.message_type = message_type;
        self
    }

    pub fn retry_due_by(mut self, at: DateTime<Utc>) -> Self {
        self.retry_due_by = Some(at);
        self
    }

    pub fn expires_before(mut self, at: DateTime<Utc>) -> Self {
        self.expires_before = Some(at);
        self
    }

    pub fn claimed_by(mut self, at: DateTime<Utc>) -> Self {
        self.claimed_by = Some(at);
        self
    }

    pub fn matches(&self, message: &DlqMessage) -> bool {
        if let Some(org) = self.organization_id
            && message.organization_id != org
        {
            return false;
        }
        if let Some(t) = self.message_type
            && message.message_type != t
        {
            return false;
        }
        if let Some(status) = self.status
            && message.status != status
        {
            return false;
        }
        if let Some(due) = self.retry_due_by
            && message.next_retry_at.is_some_and(|at| at > due)
        {
            return false;
        }
        if let Some(cutoff) = self.expires_before
            && message.expires_at >= cutoff
        {
            return false;
        }
        if let Some(cutoff) = self.claimed_by
            && !message.last_retry_at.is_some_and(|at| at <= cutoff)
        {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Oldest first (FIFO fairness).
    #[default]
    CreatedAtAsc,
    /// Most recently attempted first; never-attempted last.
    LastRetryAtDesc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageQuery {
    pub filter: MessageFilter,
    pub order: SortOrder,
    pub limit: usize,
}

impl MessageQuery {
    pub fn new(filter: MessageFilter, order: SortOrder, limit: usize) -> Self {
        Self {
            filter,
            order,
            limit,
        }
    }
}

#[async_trait]
pub trait DlqStore: Send + Sync {
    /// Persist a new message. The stored copy is returned.
    async fn insert(&self, message: DlqMessage) -> Result<DlqMessage, StoreError>;

    async fn get(&self, id: MessageId) -> Result<Option<DlqMessage>, StoreError>;

    /// Conditional write: succeeds only if the stored version equals
    /// `expected_version`. The returned copy carries the bumped version.
    async fn update(
        &self,
        next: DlqMessage,
        expected_version: u64,
    ) -> Result<DlqMessage, StoreError>;

    /// Returns whether a message was removed.
    async fn delete(&self, id: MessageId) -> Result<bool, StoreError>;

    async fn find(&self, query: &MessageQuery) -> Result<Vec<DlqMessage>, StoreError>;

    async fn count(&self, filter: &MessageFilter) -> Result<usize, StoreError>;

    /// Count grouped by message type (all statuses).
    async fn count_by_type(
        &self,
        organization_id: Option<OrganizationId>,
    ) -> Result<BTreeMap<MessageType, usize>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EnqueueContext, ErrorInfo};
    use chrono::{TimeDelta, TimeZone};
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn message(org: OrganizationId) -> DlqMessage {
        DlqMessage::new(
            MessageId::from_ulid(Ulid::new()),
            org,
            MessageType::Notification,
            "{}".to_string(),
            &ErrorInfo::new("Error", "smtp down"),
            EnqueueContext::default(),
            3,
            t0() + TimeDelta::days(7),
            t0(),
        )
    }

    #[test]
    fn empty_filter_matches_everything() {
        let msg = message(OrganizationId::from_ulid(Ulid::new()));
        assert!(MessageFilter::default().matches(&msg));
    }

    #[test]
    fn org_and_type_filters() {
        let org = OrganizationId::from_ulid(Ulid::new());
        let other = OrganizationId::from_ulid(Ulid::new());
        let msg = message(org);

        assert!(MessageFilter::default().in_org(Some(org)).matches(&msg));
        assert!(!MessageFilter::default().in_org(Some(other)).matches(&msg));
        assert!(
            !MessageFilter::default()
                .of_type(Some(MessageType::Publish))
                .matches(&msg)
        );
    }

    #[test]
    fn retry_due_treats_null_as_due() {
        let mut msg = message(OrganizationId::from_ulid(Ulid::new()));
        let filter = MessageFilter::default().retry_due_by(t0());
        assert!(filter.matches(&msg));

        msg.next_retry_at = Some(t0());
        assert!(filter.matches(&msg));

        msg.next_retry_at = Some(t0() + TimeDelta::milliseconds(1));
        assert!(!filter.matches(&msg));
    }

    #[test]
    fn expires_before_is_strict() {
        let msg = message(OrganizationId::from_ulid(Ulid::new()));
        let at_expiry = MessageFilter::default().expires_before(msg.expires_at);
        assert!(!at_expiry.matches(&msg));

        let after = MessageFilter::default().expires_before(msg.expires_at + TimeDelta::milliseconds(1));
        assert!(after.matches(&msg));
    }

    #[test]
    fn claimed_by_skips_unclaimed_and_recent_claims() {
        let mut msg = message(OrganizationId::from_ulid(Ulid::new()));
        let filter = MessageFilter::default().claimed_by(t0());
        assert!(!filter.matches(&msg));

        msg.last_retry_at = Some(t0());
        assert!(filter.matches(&msg));

        msg.last_retry_at = Some(t0() + TimeDelta::seconds(1));
        assert!(!filter.matches(&msg));
    }
}
