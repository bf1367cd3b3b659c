//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use ulid::Ulid;

use crate::app::{DlqConfig, DlqEngine, EngineBuilder};
use crate::domain::{
    DlqMessage, EnqueueContext, ErrorInfo, MessageId, MessageType, OrganizationId,
};
use crate::impls::InMemoryDlqStore;
use crate::ports::{Alert, AlertError, AlertSink, FixedClock, FixedJitter};
use crate::typed::{Processor, ProcessorRegistry};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

pub fn sample_message() -> DlqMessage {
    DlqMessage::new(
        MessageId::from_ulid(Ulid::new()),
        OrganizationId::from_ulid(Ulid::new()),
        MessageType::Notification,
        "{\"to\":\"ops\"}".to_string(),
        &ErrorInfo::new("Error", "smtp down"),
        EnqueueContext::default(),
        3,
        t0() + TimeDelta::days(7),
        t0(),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Enqueued,
    TerminalFailure,
}

#[derive(Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<(AlertKind, Alert)>>,
    fail: bool,
}

impl RecordingAlertSink {
    /// Records every alert, then reports a delivery error.
    pub fn failing() -> Self {
        Self {
            alerts: Mutex::default(),
            fail: true,
        }
    }

    pub fn alerts(&self) -> Vec<(AlertKind, Alert)> {
        self.alerts.lock().unwrap().clone()
    }

    fn record(&self, kind: AlertKind, alert: &Alert) -> Result<(), AlertError> {
        self.alerts.lock().unwrap().push((kind, alert.clone()));
        if self.fail {
            return Err(AlertError::new("recording", "configured to fail"));
        }
        Ok(())
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn on_enqueued(&self, _: OrganizationId, alert: &Alert) -> Result<(), AlertError> {
        self.record(AlertKind::Enqueued, alert)
    }

    async fn on_terminal_failure(
        &self,
        _: OrganizationId,
        alert: &Alert,
    ) -> Result<(), AlertError> {
        self.record(AlertKind::TerminalFailure, alert)
    }
}

pub struct FailingProcessor {
    message: String,
}

#[async_trait]
impl Processor for FailingProcessor {
    async fn process(&self, _: &DlqMessage) -> Result<(), ErrorInfo> {
        Err(ErrorInfo::new("Error", self.message.clone()).with_stack("at processor"))
    }
}

pub fn always_fail(message: &str) -> FailingProcessor {
    FailingProcessor {
        message: message.to_string(),
    }
}

pub fn always_succeed() -> CountingProcessor {
    CountingProcessor::succeeding()
}

/// Succeeds and counts invocations. Yields once so concurrent drivers interleave.
#[derive(Default)]
pub struct CountingProcessor {
    calls: AtomicU32,
}

impl CountingProcessor {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Processor for CountingProcessor {
    async fn process(&self, _: &DlqMessage) -> Result<(), ErrorInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(())
    }
}

pub struct SlowProcessor {
    delay: Duration,
}

impl SlowProcessor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Processor for SlowProcessor {
    async fn process(&self, _: &DlqMessage) -> Result<(), ErrorInfo> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

/// Engine on an in-memory store with a fixed clock at `t0()` and zero jitter.
pub struct Harness {
    pub engine: DlqEngine,
    pub clock: Arc<FixedClock>,
    pub store: Arc<InMemoryDlqStore>,
    pub alerts: Arc<RecordingAlertSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(
            DlqConfig::default(),
            RecordingAlertSink::default(),
            ProcessorRegistry::new(),
        )
    }

    pub fn with_config(config: DlqConfig) -> Self {
        Self::build(config, RecordingAlertSink::default(), ProcessorRegistry::new())
    }

    pub fn with_failing_alerts() -> Self {
        Self::build(
            DlqConfig::default(),
            RecordingAlertSink::failing(),
            ProcessorRegistry::new(),
        )
    }

    /// Publish succeeds, ReportGeneration fails, nothing else is registered.
    pub fn with_registry() -> Self {
        let mut registry = ProcessorRegistry::new();
        registry
            .register(MessageType::Publish, Arc::new(always_succeed()))
            .unwrap();
        registry
            .register(MessageType::ReportGeneration, Arc::new(always_fail("renderer crashed")))
            .unwrap();
        Self::build(DlqConfig::default(), RecordingAlertSink::default(), registry)
    }

    fn build(config: DlqConfig, alerts: RecordingAlertSink, registry: ProcessorRegistry) -> Self {
        let clock = Arc::new(FixedClock::new(t0()));
        let store = Arc::new(InMemoryDlqStore::new());
        let alerts = Arc::new(alerts);
        let engine = EngineBuilder::new(store.clone())
            .config(config)
            .clock(clock.clone())
            .jitter(Arc::new(FixedJitter::zero()))
            .alert_sink(alerts.clone())
            .registry(registry)
            .build()
            .unwrap();
        Self {
            engine,
            clock,
            store,
            alerts,
        }
    }
}
