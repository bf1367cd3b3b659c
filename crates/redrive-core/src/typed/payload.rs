//! Payload trait - message type と型付き payload の対応付け
//!
//! # Trait Bounds
//! - `DeserializeOwned`: `message_data` から復元するため
//! - `Serialize`: enqueue 時に `message_data` を組み立てるため
//! - `Send + Sync + 'static`: Arc に格納できるため

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::domain::{ErrorInfo, MessageType};

/// Ties a Rust type to the message type it is decoded from.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct PublishPayload { post_id: String }
///
/// impl Payload for PublishPayload {
///     const TYPE: MessageType = MessageType::Publish;
/// }
/// ```
pub trait Payload: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE: MessageType;

    /// Structured form stored as `message_data`.
    fn to_message_data(&self) -> Result<Map<String, Value>, ErrorInfo> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(ErrorInfo::new(
                "EncodeError",
                format!("payload for {} is not an object: {other}", Self::TYPE),
            )),
            Err(e) => Err(ErrorInfo::new("EncodeError", e.to_string())),
        }
    }

    /// Decode from `message_data`. `DecodeError` failures count as a
    /// processing attempt like any other processor error.
    fn from_message_data(data: Option<&Map<String, Value>>) -> Result<Self, ErrorInfo> {
        let Some(data) = data else {
            return Err(ErrorInfo::new(
                "DecodeError",
                format!("{} message carries no message_data", Self::TYPE),
            ));
        };
        serde_json::from_value(Value::Object(data.clone()))
            .map_err(|e| ErrorInfo::new("DecodeError", format!("{}: {e}", Self::TYPE)))
    }
}
