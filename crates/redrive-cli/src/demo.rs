//! Demo processors: a flaky publisher and a notifier that never succeeds.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use redrive_core::domain::{DlqMessage, ErrorInfo};
use redrive_core::typed::{Handler, Payload, Processor};
use redrive_core::MessageType;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishPayload {
    pub post_id: String,
    pub channel: String,
}

impl Payload for PublishPayload {
    const TYPE: MessageType = MessageType::Publish;
}

/// Fails the first `n` times, then publishes.
pub struct FlakyPublisher {
    remaining_failures: AtomicU32,
}

impl FlakyPublisher {
    pub fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl Handler<PublishPayload> for FlakyPublisher {
    async fn handle(&self, payload: PublishPayload, message: &DlqMessage) -> Result<(), ErrorInfo> {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(ErrorInfo::new(
                "ChannelUnavailable",
                format!("{} rejected the post (left={left})", payload.channel),
            ));
        }

        info!(
            message_id = %message.id,
            post_id = %payload.post_id,
            channel = %payload.channel,
            "post published"
        );
        Ok(())
    }
}

/// Always fails, so its messages end up FAILED.
pub struct BrokenNotifier;

#[async_trait]
impl Processor for BrokenNotifier {
    async fn process(&self, _message: &DlqMessage) -> Result<(), ErrorInfo> {
        Err(ErrorInfo::new("SmtpError", "connection refused").with_stack("smtp::send"))
    }
}
