//! MessageType - どの非同期処理が失敗したか
//!
//! Processor registry のキーでもあります。作成後は変更されません。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of asynchronous operation a dead-lettered message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    ContentGeneration,
    PolicyCheck,
    Publish,
    MetricsIngestion,
    WebhookProcessing,
    AssetProcessing,
    ExperimentProcessing,
    ReportGeneration,
    Notification,
    AuditLog,
}

impl MessageType {
    pub const ALL: [MessageType; 10] = [
        MessageType::ContentGeneration,
        MessageType::PolicyCheck,
        MessageType::Publish,
        MessageType::MetricsIngestion,
        MessageType::WebhookProcessing,
        MessageType::AssetProcessing,
        MessageType::ExperimentProcessing,
        MessageType::ReportGeneration,
        MessageType::Notification,
        MessageType::AuditLog,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::ContentGeneration => "content-generation",
            MessageType::PolicyCheck => "policy-check",
            MessageType::Publish => "publish",
            MessageType::MetricsIngestion => "metrics-ingestion",
            MessageType::WebhookProcessing => "webhook-processing",
            MessageType::AssetProcessing => "asset-processing",
            MessageType::ExperimentProcessing => "experiment-processing",
            MessageType::ReportGeneration => "report-generation",
            MessageType::Notification => "notification",
            MessageType::AuditLog => "audit-log",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown message type: {0}")]
pub struct UnknownMessageType(pub String);

impl FromStr for MessageType {
    type Err = UnknownMessageType;

    /// Accepts both `content-generation` and `content_generation`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        MessageType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| UnknownMessageType(s.to_string()))
    }
}
