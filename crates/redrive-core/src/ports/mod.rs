//! Ports - 抽象化レイヤー
//!
//! エンジンが外部に依存する部分（永続化、時刻、乱数、ID、通知）をここで trait にしています。
//! 実装は `impls` に置き、エンジン構築時に差し込みます。

pub mod alerting;
pub mod clock;
pub mod id_generator;
pub mod jitter;
pub mod store;

// 主要な trait を再エクスポート
pub use self::alerting::{Alert, AlertError, AlertSink, Severity};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::jitter::{FixedJitter, JitterSource, RandomJitter};
pub use self::store::{DlqStore, MessageFilter, MessageQuery, SortOrder, StoreError};
