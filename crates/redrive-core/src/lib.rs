//! redrive-core
//!
//! Dead-letter queue retry engine: failed messages are recorded once and
//! redriven with exponential backoff until they succeed, run out of retry
//! budget, or expire.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, message, status, lifecycle, outcome, stats, errors）
//! - **ports**: 抽象化レイヤー（DlqStore, Clock, IdGenerator, JitterSource, AlertSink）
//! - **retry**: backoff 計算（RetryPolicy）
//! - **typed**: Processor trait, 型付き Handler, ProcessorRegistry
//! - **impls**: 実装（InMemoryDlqStore, alert sinks）
//! - **app**: 設定, EngineBuilder, DlqEngine

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod retry;
pub mod typed;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::app::{DlqConfig, DlqEngine, EngineBuilder};
pub use crate::domain::{
    DlqError, DlqMessage, EnqueueContext, ErrorInfo, MessageId, MessageStatus, MessageType,
    OrganizationId, ProcessOutcome, ProcessReason,
};
pub use crate::retry::RetryPolicy;
pub use crate::typed::{Processor, ProcessorRegistry};
