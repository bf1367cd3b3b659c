//! Handler trait - 型付き payload を処理する Handler の定義
//!
//! # 二層構造
//! - `Handler<T>`: 型安全。`T` は `Payload` なので message type と 1:1
//! - `TypedProcessor<T, H>`: `message_data` を `T` にデコードして `Processor` に変換
//!   （type erasure。`ProcessorRegistry` が `Arc<dyn Processor>` で保持する）

use std::marker::PhantomData;

use async_trait::async_trait;

use super::payload::Payload;
use super::processor::Processor;
use crate::domain::{DlqMessage, ErrorInfo};

/// Handles one decoded payload.
///
/// `Handler<PublishPayload>` can only be registered for `MessageType::Publish`,
/// so a typo'd message type is a compile error rather than a runtime miss.
#[async_trait]
pub trait Handler<T: Payload>: Send + Sync {
    async fn handle(&self, payload: T, message: &DlqMessage) -> Result<(), ErrorInfo>;
}

pub struct TypedProcessor<T: Payload, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Payload, H: Handler<T>> TypedProcessor<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Payload, H: Handler<T>> Processor for TypedProcessor<T, H> {
    async fn process(&self, message: &DlqMessage) -> Result<(), ErrorInfo> {
        let payload = T::from_message_data(message.message_data.as_ref())?;
        self.handler.handle(payload, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageType;
    use crate::testing::sample_message;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct NotificationPayload {
        recipient: String,
    }

    impl Payload for NotificationPayload {
        const TYPE: MessageType = MessageType::Notification;
    }

    struct RejectBlankRecipient;

    #[async_trait]
    impl Handler<NotificationPayload> for RejectBlankRecipient {
        async fn handle(
            &self,
            payload: NotificationPayload,
            _message: &DlqMessage,
        ) -> Result<(), ErrorInfo> {
            if payload.recipient.is_empty() {
                return Err(ErrorInfo::new("ValidationError", "blank recipient"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn typed_processor_decodes_message_data() {
        let processor = TypedProcessor::<NotificationPayload, _>::new(RejectBlankRecipient);

        let mut msg = sample_message();
        msg.message_data = json!({"recipient": "ops@example.com"}).as_object().cloned();
        assert!(processor.process(&msg).await.is_ok());

        msg.message_data = json!({"recipient": ""}).as_object().cloned();
        let err = processor.process(&msg).await.unwrap_err();
        assert_eq!(err.name, "ValidationError");
    }

    #[tokio::test]
    async fn undecodable_payload_is_a_decode_error() {
        let processor = TypedProcessor::<NotificationPayload, _>::new(RejectBlankRecipient);

        let mut msg = sample_message();
        msg.message_data = json!({"unexpected": 1}).as_object().cloned();
        assert_eq!(processor.process(&msg).await.unwrap_err().name, "DecodeError");

        msg.message_data = None;
        assert_eq!(processor.process(&msg).await.unwrap_err().name, "DecodeError");
    }

    #[test]
    fn payload_encodes_as_object() {
        let data = NotificationPayload {
            recipient: "a@b.c".to_string(),
        }
        .to_message_data()
        .unwrap();
        assert_eq!(data.get("recipient"), Some(&json!("a@b.c")));
    }
}
