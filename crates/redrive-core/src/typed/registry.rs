//! ProcessorRegistry - message type ごとの Processor の登録と管理
//!
//! - `HashMap<MessageType, Arc<dyn Processor>>` で管理
//! - `register_typed::<T, H>()` は `TypedProcessor` でラップして登録
//! - 同じ type の二重登録はエラー（黙って上書きしない）

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{Handler, TypedProcessor};
use super::payload::Payload;
use super::processor::Processor;
use crate::domain::MessageType;

#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<MessageType, Arc<dyn Processor>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("processor for message type '{0}' is already registered")]
    AlreadyRegistered(MessageType),
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        message_type: MessageType,
        processor: Arc<dyn Processor>,
    ) -> Result<(), RegistryError> {
        if self.processors.contains_key(&message_type) {
            return Err(RegistryError::AlreadyRegistered(message_type));
        }
        self.processors.insert(message_type, processor);
        Ok(())
    }

    pub fn register_typed<T: Payload, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), RegistryError> {
        self.register(T::TYPE, Arc::new(TypedProcessor::<T, H>::new(handler)))
    }

    pub fn get(&self, message_type: MessageType) -> Option<Arc<dyn Processor>> {
        self.processors.get(&message_type).cloned()
    }

    pub fn get_ref(&self, message_type: MessageType) -> Option<&dyn Processor> {
        self.processors.get(&message_type).map(|p| p.as_ref())
    }

    pub fn contains(&self, message_type: MessageType) -> bool {
        self.processors.contains_key(&message_type)
    }

    /// Sorted for stable output.
    pub fn registered_types(&self) -> Vec<MessageType> {
        let mut types: Vec<MessageType> = self.processors.keys().copied().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DlqMessage, ErrorInfo};
    use crate::typed::FnProcessor;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct AuditEntry {
        action: String,
    }

    impl Payload for AuditEntry {
        const TYPE: MessageType = MessageType::AuditLog;
    }

    struct AcceptAll;

    #[async_trait]
    impl Handler<AuditEntry> for AcceptAll {
        async fn handle(&self, _: AuditEntry, _: &DlqMessage) -> Result<(), ErrorInfo> {
            Ok(())
        }
    }

    fn ok_processor() -> Arc<dyn Processor> {
        Arc::new(FnProcessor::new(|_msg: DlqMessage| async { Ok(()) }))
    }

    #[test]
    fn register_and_get() {
        let mut registry = ProcessorRegistry::new();
        registry.register(MessageType::Publish, ok_processor()).unwrap();

        assert!(registry.get(MessageType::Publish).is_some());
        assert!(registry.get_ref(MessageType::Publish).is_some());
        assert!(registry.get(MessageType::MetricsIngestion).is_none());
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = ProcessorRegistry::new();
        registry.register(MessageType::Publish, ok_processor()).unwrap();
        let result = registry.register(MessageType::Publish, ok_processor());
        assert!(matches!(
            result,
            Err(RegistryError::AlreadyRegistered(MessageType::Publish))
        ));
    }

    #[test]
    fn typed_registration_uses_payload_type() {
        let mut registry = ProcessorRegistry::new();
        registry.register_typed::<AuditEntry, _>(AcceptAll).unwrap();
        registry.register(MessageType::Publish, ok_processor()).unwrap();

        assert!(registry.contains(MessageType::AuditLog));
        assert_eq!(
            registry.registered_types(),
            vec![MessageType::Publish, MessageType::AuditLog]
        );
    }
}
