//! App - アプリケーション層
//!
//! ports を組み合わせてエンジンを組み立てます。
//!
//! # 主要コンポーネント
//! - **DlqConfig**: 設定の読み込みと検証
//! - **EngineBuilder**: ワイヤリングと起動時検証
//! - **DlqEngine**: enqueue / retry-drive / sweep / stats / operator 操作

pub mod builder;
pub mod config;
pub mod engine;

pub use self::builder::{BuildError, EngineBuilder};
pub use self::config::{ConfigError, DlqConfig, RetryConfig};
pub use self::engine::DlqEngine;
