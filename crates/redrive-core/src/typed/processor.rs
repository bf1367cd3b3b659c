//! Processor trait - メッセージを再投入する処理の抽象化
//!
//! 成功は `Ok(())`、失敗は `ErrorInfo`（name / message / stack）で返します。
//! エンジンは失敗を retry history にそのまま書き込みます。

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::domain::{DlqMessage, ErrorInfo};

/// Object-safe processor used by the engine.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, message: &DlqMessage) -> Result<(), ErrorInfo>;
}

/// Closure adapter.
///
/// ```ignore
/// let processor = FnProcessor::new(|msg: DlqMessage| async move {
///     println!("redrive {}", msg.id);
///     Ok(())
/// });
/// ```
pub struct FnProcessor<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnProcessor<F, Fut>
where
    F: Fn(DlqMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ErrorInfo>> + Send,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> Processor for FnProcessor<F, Fut>
where
    F: Fn(DlqMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ErrorInfo>> + Send,
{
    async fn process(&self, message: &DlqMessage) -> Result<(), ErrorInfo> {
        (self.f)(message.clone()).await
    }
}
