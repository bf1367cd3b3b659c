//! DLQ message record: failed payload + retry bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{MessageId, MessageStatus, MessageType, OrganizationId};

/// Diagnostics of a failure (the upstream error at enqueue time, or a
/// processor error during retry-drive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorInfo {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Capture a Rust error. The `source()` chain becomes the stack.
    pub fn from_error(name: impl Into<String>, err: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {cause}"));
            source = cause.source();
        }
        let info = Self::new(name, err.to_string());
        if chain.is_empty() {
            info
        } else {
            info.with_stack(chain.join("\n"))
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for ErrorInfo {}

/// One failed retry attempt. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryAttempt {
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

/// Operator override of the retry budget and expiration. `None` keeps the
/// current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryOverrides {
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl RetryOverrides {
    pub fn is_empty(&self) -> bool {
        self.max_retries.is_none() && self.expires_at.is_none()
    }
}

/// Optional inputs to `enqueue`.
#[derive(Debug, Clone, Default)]
pub struct EnqueueContext {
    pub message_data: Option<Map<String, Value>>,
    pub source_queue: Option<String>,
    pub source_subject: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    pub max_retries: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl EnqueueContext {
    pub fn with_message_data(mut self, data: Map<String, Value>) -> Self {
        self.message_data = Some(data);
        self
    }

    pub fn with_source(mut self, queue: impl Into<String>, subject: impl Into<String>) -> Self {
        self.source_queue = Some(queue.into());
        self.source_subject = Some(subject.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// A dead-lettered message and its retry lifecycle.
///
/// - The store holds the single source of truth; the engine reads a copy,
///   computes the next state with `lifecycle::apply`, and writes it back with
///   a conditional update on `version`.
/// - `message_type` never changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DlqMessage {
    pub id: MessageId,
    pub organization_id: OrganizationId,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub status: MessageStatus,

    /// Raw serialized payload that failed.
    pub original_message: String,
    /// Parsed payload handed to processors.
    pub message_data: Option<Map<String, Value>>,

    pub error_message: String,
    pub error_stack: Option<String>,
    pub error_context: Option<Value>,

    pub retry_count: u32,
    pub max_retries: u32,
    /// `None` means eligible now.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Start of the most recent processing attempt.
    pub last_retry_at: Option<DateTime<Utc>>,
    pub retry_history: Vec<RetryAttempt>,

    pub source_queue: Option<String>,
    pub source_subject: Option<String>,
    pub metadata: Option<Map<String, Value>>,

    pub expires_at: DateTime<Utc>,
    pub resolved_by: Option<String>,
    pub resolution_notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,

    /// Optimistic-concurrency token, bumped by the store on every write.
    pub version: u64,
}

impl DlqMessage {
    /// Build a fresh PENDING record. `max_retries` and `expires_at` must
    /// already have their defaults applied.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: MessageId,
        organization_id: OrganizationId,
        message_type: MessageType,
        original_message: String,
        error: &ErrorInfo,
        context: EnqueueContext,
        max_retries: u32,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut error_context = Map::new();
        error_context.insert("name".to_string(), json!(error.name));
        if let Some(queue) = &context.source_queue {
            error_context.insert("sourceQueue".to_string(), json!(queue));
        }
        if let Some(subject) = &context.source_subject {
            error_context.insert("sourceSubject".to_string(), json!(subject));
        }
        if let Some(metadata) = &context.metadata {
            error_context.insert("metadata".to_string(), Value::Object(metadata.clone()));
        }

        Self {
            id,
            organization_id,
            message_type,
            status: MessageStatus::Pending,
            original_message,
            message_data: context.message_data,
            error_message: error.message.clone(),
            error_stack: error.stack.clone(),
            error_context: Some(Value::Object(error_context)),
            retry_count: 0,
            max_retries,
            next_retry_at: None,
            last_retry_at: None,
            retry_history: Vec::new(),
            source_queue: context.source_queue,
            source_subject: context.source_subject,
            metadata: context.metadata,
            expires_at,
            resolved_by: None,
            resolution_notes: None,
            created_at: now,
            updated_at: now,
            processed_at: None,
            version: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn budget_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}
