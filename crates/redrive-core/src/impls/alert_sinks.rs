//! AlertSink implementations.
//!
//! - `LogAlertSink`: structured `tracing` events (default bridge)
//! - `NoopAlertSink`: drops everything
//! - `FanoutAlertSink`: forwards to several sinks; one failing sink does not
//!   stop the others

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::domain::OrganizationId;
use crate::ports::{Alert, AlertError, AlertSink, Severity};

#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

impl LogAlertSink {
    fn emit(organization_id: OrganizationId, alert: &Alert) {
        match alert.severity {
            Severity::High => error!(
                organization_id = %organization_id,
                message_id = %alert.message_id,
                message_type = %alert.message_type,
                severity = %alert.severity,
                retry_count = alert.retry_count,
                max_retries = alert.max_retries,
                error = %alert.error,
                "{}", alert.title
            ),
            Severity::Medium => warn!(
                organization_id = %organization_id,
                message_id = %alert.message_id,
                message_type = %alert.message_type,
                severity = %alert.severity,
                retry_count = alert.retry_count,
                max_retries = alert.max_retries,
                error = %alert.error,
                "{}", alert.title
            ),
        }
    }
}

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn on_enqueued(
        &self,
        organization_id: OrganizationId,
        alert: &Alert,
    ) -> Result<(), AlertError> {
        Self::emit(organization_id, alert);
        Ok(())
    }

    async fn on_terminal_failure(
        &self,
        organization_id: OrganizationId,
        alert: &Alert,
    ) -> Result<(), AlertError> {
        Self::emit(organization_id, alert);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAlertSink;

#[async_trait]
impl AlertSink for NoopAlertSink {
    async fn on_enqueued(&self, _: OrganizationId, _: &Alert) -> Result<(), AlertError> {
        Ok(())
    }

    async fn on_terminal_failure(&self, _: OrganizationId, _: &Alert) -> Result<(), AlertError> {
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct FanoutAlertSink {
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl FanoutAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Collapse per-sink failures into one error after every sink was tried.
    fn combine(errors: Vec<AlertError>) -> Result<(), AlertError> {
        if errors.is_empty() {
            return Ok(());
        }
        let reason = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        Err(AlertError::new("fanout", reason))
    }
}

#[async_trait]
impl AlertSink for FanoutAlertSink {
    async fn on_enqueued(
        &self,
        organization_id: OrganizationId,
        alert: &Alert,
    ) -> Result<(), AlertError> {
        let mut errors = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.on_enqueued(organization_id, alert).await {
                errors.push(e);
            }
        }
        Self::combine(errors)
    }

    async fn on_terminal_failure(
        &self,
        organization_id: OrganizationId,
        alert: &Alert,
    ) -> Result<(), AlertError> {
        let mut errors = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.on_terminal_failure(organization_id, alert).await {
                errors.push(e);
            }
        }
        Self::combine(errors)
    }
}
