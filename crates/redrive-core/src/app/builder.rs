//! EngineBuilder - エンジンの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - `expect_types()` で processor が必須の message type を宣言
//! - `build()` 時に「期待集合 ⊆ 登録済み集合」と config の妥当性をチェック
//! - 不足や不正があれば BuildError を返す（起動後に no_processor で気付くより早い）

use std::sync::Arc;

use super::config::{ConfigError, DlqConfig};
use super::engine::DlqEngine;
use crate::domain::MessageType;
use crate::impls::LogAlertSink;
use crate::ports::{
    AlertSink, Clock, DlqStore, IdGenerator, JitterSource, RandomJitter, SystemClock,
    UlidGenerator,
};
use crate::typed::{Handler, Payload, Processor, ProcessorRegistry, RegistryError};

/// Builds a [`DlqEngine`].
///
/// ```ignore
/// let engine = EngineBuilder::new(Arc::new(InMemoryDlqStore::new()))
///     .config(DlqConfig::load(None)?)
///     .register_typed::<PublishPayload, _>(PublishHandler)?
///     .expect_types(&[MessageType::Publish])
///     .build()?;
/// ```
///
/// Unset ports default to `SystemClock`, `UlidGenerator`, `RandomJitter` and
/// `LogAlertSink`.
pub struct EngineBuilder {
    store: Arc<dyn DlqStore>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    jitter: Option<Arc<dyn JitterSource>>,
    alerts: Option<Arc<dyn AlertSink>>,
    config: DlqConfig,
    registry: ProcessorRegistry,
    expected_types: Option<Vec<MessageType>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing processors for message types {0:?}; these types were expected but not registered")]
    MissingProcessors(Vec<MessageType>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineBuilder {
    pub fn new(store: Arc<dyn DlqStore>) -> Self {
        Self {
            store,
            clock: None,
            ids: None,
            jitter: None,
            alerts: None,
            config: DlqConfig::default(),
            registry: ProcessorRegistry::new(),
            expected_types: None,
        }
    }

    pub fn config(mut self, config: DlqConfig) -> Self {
        self.config = config;
        self
    }

    /// Also seeds the default id generator, so ULID timestamps follow this clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = Some(jitter);
        self
    }

    pub fn alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Replace the whole registry.
    pub fn registry(mut self, registry: ProcessorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn register(
        mut self,
        message_type: MessageType,
        processor: Arc<dyn Processor>,
    ) -> Result<Self, RegistryError> {
        self.registry.register(message_type, processor)?;
        Ok(self)
    }

    pub fn register_typed<T: Payload, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register_typed::<T, H>(handler)?;
        Ok(self)
    }

    pub fn expect_types(mut self, message_types: &[MessageType]) -> Self {
        self.expected_types = Some(message_types.to_vec());
        self
    }

    pub fn build(self) -> Result<DlqEngine, BuildError> {
        self.config.validate()?;

        if let Some(expected) = &self.expected_types {
            let missing: Vec<MessageType> = expected
                .iter()
                .filter(|t| !self.registry.contains(**t))
                .copied()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingProcessors(missing));
            }
        }

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let jitter = self.jitter.unwrap_or_else(|| Arc::new(RandomJitter));
        let alerts = self.alerts.unwrap_or_else(|| Arc::new(LogAlertSink));

        Ok(DlqEngine::new(
            self.store,
            clock,
            ids,
            jitter,
            alerts,
            self.config,
            self.registry,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DlqMessage;
    use crate::impls::InMemoryDlqStore;
    use crate::typed::FnProcessor;

    fn ok_processor() -> Arc<dyn Processor> {
        Arc::new(FnProcessor::new(|_msg: DlqMessage| async { Ok(()) }))
    }

    #[test]
    fn build_success() {
        let engine = EngineBuilder::new(Arc::new(InMemoryDlqStore::new()))
            .register(MessageType::Publish, ok_processor())
            .unwrap()
            .expect_types(&[MessageType::Publish])
            .build();
        assert!(engine.is_ok());
    }

    #[test]
    fn build_reports_missing_processors() {
        let engine = EngineBuilder::new(Arc::new(InMemoryDlqStore::new()))
            .register(MessageType::Publish, ok_processor())
            .unwrap()
            .expect_types(&[MessageType::Publish, MessageType::Notification])
            .build();
        assert!(matches!(
            engine,
            Err(BuildError::MissingProcessors(missing)) if missing == vec![MessageType::Notification]
        ));
    }

    #[test]
    fn build_without_expectations() {
        let engine = EngineBuilder::new(Arc::new(InMemoryDlqStore::new())).build();
        assert!(engine.is_ok());
    }

    #[test]
    fn build_rejects_invalid_config() {
        let engine = EngineBuilder::new(Arc::new(InMemoryDlqStore::new()))
            .config(DlqConfig {
                sweep_batch_size: 0,
                ..DlqConfig::default()
            })
            .build();
        assert!(matches!(engine, Err(BuildError::Config(_))));
    }
}
