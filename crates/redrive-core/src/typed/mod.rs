//! Typed - processor API
//!
//! message type の取り違えを型で排除し、payload と Handler の対応付けを静的に保証します。
//!
//! # 二層構造
//! - **表層（Typed）**: `Payload` trait, `Handler<T>` trait - 型安全
//! - **内部（Dyn）**: `Processor` trait - object-safe, type erasure

pub mod handler;
pub mod payload;
pub mod processor;
pub mod registry;

pub use self::handler::{Handler, TypedProcessor};
pub use self::payload::Payload;
pub use self::processor::{FnProcessor, Processor};
pub use self::registry::{ProcessorRegistry, RegistryError};
