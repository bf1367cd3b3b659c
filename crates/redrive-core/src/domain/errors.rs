//! Errors - エンジンが返すエラー型
//!
//! retry-drive の「想定内の結果」（not_found / expired など）は `ProcessOutcome` で返し、
//! ここには載せません。ここにあるのはインフラ障害と呼び出し側の誤りだけです。

use thiserror::Error;

use super::lifecycle::TransitionError;
use crate::ports::StoreError;

#[derive(Debug, Error)]
pub enum DlqError {
    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("transition rejected: {0}")]
    Transition(#[from] TransitionError),
}

impl DlqError {
    /// Lost an optimistic-concurrency race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DlqError::Store(StoreError::VersionConflict { .. }))
    }
}
