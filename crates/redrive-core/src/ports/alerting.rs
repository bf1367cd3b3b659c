//! AlertSink port - アラート通知の抽象化
//!
//! エンジンが出す通知は 2 種類だけ:
//! - enqueue 時（medium）
//! - retry budget を使い切って FAILED になった時（high）
//!
//! 具体的な通知先（インシデント管理、チャット、メール）はこの trait の実装側が扇状に配る。

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{DlqMessage, MessageId, MessageType, OrganizationId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(s)
    }
}

/// Payload handed to alert sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub title: String,
    pub summary: String,
    pub severity: Severity,
    pub source: String,
    pub message_id: MessageId,
    pub message_type: MessageType,
    pub error: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub tags: BTreeMap<String, String>,
}

impl Alert {
    pub const SOURCE: &'static str = "dlq-engine";

    pub fn enqueued(message: &DlqMessage, error_name: &str) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert("messageType".to_string(), message.message_type.to_string());
        tags.insert("messageId".to_string(), message.id.to_string());
        tags.insert("errorType".to_string(), error_name.to_string());
        Self {
            title: "Message added to dead letter queue".to_string(),
            summary: format!(
                "A {} message failed processing and was added to the DLQ",
                message.message_type
            ),
            severity: Severity::Medium,
            source: Self::SOURCE.to_string(),
            message_id: message.id,
            message_type: message.message_type,
            error: message.error_message.clone(),
            retry_count: message.retry_count,
            max_retries: message.max_retries,
            tags,
        }
    }

    pub fn terminal_failure(message: &DlqMessage) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert("messageType".to_string(), message.message_type.to_string());
        tags.insert("messageId".to_string(), message.id.to_string());
        tags.insert("retryCount".to_string(), message.retry_count.to_string());
        Self {
            title: "DLQ message failed after max retries".to_string(),
            summary: format!(
                "A {} message failed processing after {} attempts",
                message.message_type, message.retry_count
            ),
            severity: Severity::High,
            source: Self::SOURCE.to_string(),
            message_id: message.id,
            message_type: message.message_type,
            error: message.error_message.clone(),
            retry_count: message.retry_count,
            max_retries: message.max_retries,
            tags,
        }
    }
}

#[derive(Debug, Error)]
#[error("alert delivery via {sink} failed: {reason}")]
pub struct AlertError {
    pub sink: String,
    pub reason: String,
}

impl AlertError {
    pub fn new(sink: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            reason: reason.into(),
        }
    }
}

/// Alerting bridge.
///
/// The engine logs and swallows delivery errors: the DLQ record is already
/// persisted when an alert goes out.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn on_enqueued(
        &self,
        organization_id: OrganizationId,
        alert: &Alert,
    ) -> Result<(), AlertError>;

    async fn on_terminal_failure(
        &self,
        organization_id: OrganizationId,
        alert: &Alert,
    ) -> Result<(), AlertError>;
}
