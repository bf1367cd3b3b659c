//! 実装（開発・テスト用）
//!
//! - InMemoryDlqStore: プロセス内の DLQ ストア
//! - LogAlertSink / NoopAlertSink / FanoutAlertSink: アラートの配送先

pub mod alert_sinks;
pub mod inmem_store;

pub use self::alert_sinks::{FanoutAlertSink, LogAlertSink, NoopAlertSink};
pub use self::inmem_store::InMemoryDlqStore;
