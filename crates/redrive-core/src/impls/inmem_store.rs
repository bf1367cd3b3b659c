//! InMemoryDlqStore - 開発・テスト用の正本
//!
//! # 実装詳細
//! - `HashMap<MessageId, DlqMessage>` を tokio の RwLock で保護
//! - `update` は version の比較と書き込みを同じ write lock の中で行う（CAS）
//! - 一覧は read lock の中でフィルタ・ソートしてコピーを返す

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{DlqMessage, MessageId, MessageType, OrganizationId};
use crate::ports::{DlqStore, MessageFilter, MessageQuery, SortOrder, StoreError};

#[derive(Default, Clone)]
pub struct InMemoryDlqStore {
    messages: Arc<RwLock<HashMap<MessageId, DlqMessage>>>,
}

impl InMemoryDlqStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

fn sort(messages: &mut [DlqMessage], order: SortOrder) {
    match order {
        SortOrder::CreatedAtAsc => {
            messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        }
        SortOrder::LastRetryAtDesc => {
            // Option: None < Some, so reversing puts never-attempted last.
            messages.sort_by(|a, b| {
                b.last_retry_at
                    .cmp(&a.last_retry_at)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            });
        }
    }
}

#[async_trait]
impl DlqStore for InMemoryDlqStore {
    async fn insert(&self, message: DlqMessage) -> Result<DlqMessage, StoreError> {
        let mut messages = self.messages.write().await;
        if messages.contains_key(&message.id) {
            return Err(StoreError::AlreadyExists(message.id));
        }
        messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn get(&self, id: MessageId) -> Result<Option<DlqMessage>, StoreError> {
        Ok(self.messages.read().await.get(&id).cloned())
    }

    async fn update(
        &self,
        mut next: DlqMessage,
        expected_version: u64,
    ) -> Result<DlqMessage, StoreError> {
        let mut messages = self.messages.write().await;
        let Some(current) = messages.get_mut(&next.id) else {
            return Err(StoreError::NotFound(next.id));
        };
        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                id: next.id,
                expected: expected_version,
                actual: current.version,
            });
        }
        next.version = expected_version + 1;
        *current = next.clone();
        Ok(next)
    }

    async fn delete(&self, id: MessageId) -> Result<bool, StoreError> {
        Ok(self.messages.write().await.remove(&id).is_some())
    }

    async fn find(&self, query: &MessageQuery) -> Result<Vec<DlqMessage>, StoreError> {
        let messages = self.messages.read().await;
        let mut found: Vec<DlqMessage> = messages
            .values()
            .filter(|m| query.filter.matches(m))
            .cloned()
            .collect();
        sort(&mut found, query.order);
        found.truncate(query.limit);
        Ok(found)
    }

    async fn count(&self, filter: &MessageFilter) -> Result<usize, StoreError> {
        let messages = self.messages.read().await;
        Ok(messages.values().filter(|m| filter.matches(m)).count())
    }

    async fn count_by_type(
        &self,
        organization_id: Option<OrganizationId>,
    ) -> Result<BTreeMap<MessageType, usize>, StoreError> {
        let messages = self.messages.read().await;
        let mut counts = BTreeMap::new();
        for message in messages.values() {
            if organization_id.is_some_and(|org| org != message.organization_id) {
                continue;
            }
            *counts.entry(message.message_type).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EnqueueContext, ErrorInfo, MessageStatus};
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn message_at(org: OrganizationId, t: MessageType, created_at: DateTime<Utc>) -> DlqMessage {
        DlqMessage::new(
            MessageId::from_ulid(Ulid::new()),
            org,
            t,
            "{}".to_string(),
            &ErrorInfo::new("Error", "down"),
            EnqueueContext::default(),
            3,
            created_at + TimeDelta::days(7),
            created_at,
        )
    }

    #[tokio::test]
    async fn insert_get_delete() {
        let store = InMemoryDlqStore::new();
        let msg = message_at(OrganizationId::from_ulid(Ulid::new()), MessageType::Publish, t0());

        store.insert(msg.clone()).await.unwrap();
        assert_eq!(store.get(msg.id).await.unwrap(), Some(msg.clone()));
        assert!(matches!(
            store.insert(msg.clone()).await,
            Err(StoreError::AlreadyExists(_))
        ));

        assert!(store.delete(msg.id).await.unwrap());
        assert!(!store.delete(msg.id).await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn update_is_compare_and_swap() {
        let store = InMemoryDlqStore::new();
        let msg = message_at(OrganizationId::from_ulid(Ulid::new()), MessageType::Publish, t0());
        store.insert(msg.clone()).await.unwrap();

        let mut first = msg.clone();
        first.status = MessageStatus::Processing;
        let written = store.update(first, 0).await.unwrap();
        assert_eq!(written.version, 1);

        // A second writer that read version 0 loses.
        let mut second = msg.clone();
        second.status = MessageStatus::Processing;
        let err = store.update(second, 0).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict {
                expected: 0,
                actual: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let store = InMemoryDlqStore::new();
        let msg = message_at(OrganizationId::from_ulid(Ulid::new()), MessageType::Publish, t0());
        assert!(matches!(
            store.update(msg, 0).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn find_orders_and_limits() {
        let store = InMemoryDlqStore::new();
        let org = OrganizationId::from_ulid(Ulid::new());
        let newest = message_at(org, MessageType::Publish, t0() + TimeDelta::seconds(2));
        let oldest = message_at(org, MessageType::Publish, t0());
        let middle = message_at(org, MessageType::Publish, t0() + TimeDelta::seconds(1));
        for m in [&newest, &oldest, &middle] {
            store.insert(m.clone()).await.unwrap();
        }

        let query = MessageQuery::new(MessageFilter::default(), SortOrder::CreatedAtAsc, 2);
        let found = store.find(&query).await.unwrap();
        let ids: Vec<_> = found.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![oldest.id, middle.id]);
    }

    #[tokio::test]
    async fn last_retry_desc_puts_unattempted_last() {
        let store = InMemoryDlqStore::new();
        let org = OrganizationId::from_ulid(Ulid::new());
        let mut early = message_at(org, MessageType::Publish, t0());
        early.last_retry_at = Some(t0() + TimeDelta::seconds(1));
        let mut late = message_at(org, MessageType::Publish, t0());
        late.last_retry_at = Some(t0() + TimeDelta::seconds(5));
        let never = message_at(org, MessageType::Publish, t0());
        for m in [&never, &early, &late] {
            store.insert(m.clone()).await.unwrap();
        }

        let query = MessageQuery::new(MessageFilter::default(), SortOrder::LastRetryAtDesc, 10);
        let ids: Vec<_> = store.find(&query).await.unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![late.id, early.id, never.id]);
    }

    #[tokio::test]
    async fn count_by_type_respects_org() {
        let store = InMemoryDlqStore::new();
        let org = OrganizationId::from_ulid(Ulid::new());
        let other = OrganizationId::from_ulid(Ulid::new());
        store.insert(message_at(org, MessageType::Publish, t0())).await.unwrap();
        store.insert(message_at(org, MessageType::Publish, t0())).await.unwrap();
        store.insert(message_at(org, MessageType::AuditLog, t0())).await.unwrap();
        store.insert(message_at(other, MessageType::Publish, t0())).await.unwrap();

        let scoped = store.count_by_type(Some(org)).await.unwrap();
        assert_eq!(scoped.get(&MessageType::Publish), Some(&2));
        assert_eq!(scoped.get(&MessageType::AuditLog), Some(&1));

        let all = store.count_by_type(None).await.unwrap();
        assert_eq!(all.get(&MessageType::Publish), Some(&3));
    }
}
