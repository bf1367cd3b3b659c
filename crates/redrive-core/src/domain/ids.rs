//! Domain identifiers (strongly-typed IDs).
//!
//! ULID + phantom marker で ID 型を分けています。
//! `MessageId` と `OrganizationId` は同じ 128-bit 表現ですが、コンパイル時に混同できません。
//!
//! - Display は `dlq-01H...` / `org-01H...` のようにプレフィックス付き
//! - FromStr はプレフィックス付き・なしの両方を受け付ける（CLI / HTTP 層から渡される想定）

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// Display で使うプレフィックス（例: "dlq-", "org-"）
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `T` は PhantomData なので実行時のサイズは `Ulid` と同じ（16 bytes）。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }

    /// Fresh random id (wall-clock timestamp).
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// ID 文字列のパース失敗
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid id {input:?}: {reason}")]
pub struct ParseIdError {
    input: String,
    reason: String,
}

impl<T: IdMarker> FromStr for Id<T> {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw)
            .map(Self::from_ulid)
            .map_err(|e| ParseIdError {
                input: s.to_string(),
                reason: e.to_string(),
            })
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// DLQ message のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Message {}

impl IdMarker for Message {
    fn prefix() -> &'static str {
        "dlq-"
    }
}

/// Organization (tenant) のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Organization {}

impl IdMarker for Organization {
    fn prefix() -> &'static str {
        "org-"
    }
}

/// Identifier of a dead-lettered message.
pub type MessageId = Id<Message>;

/// Identifier of the tenant that owns a message.
pub type OrganizationId = Id<Organization>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_with_prefix() {
        let ulid = Ulid::new();
        let message = MessageId::from_ulid(ulid);
        let org = OrganizationId::from_ulid(ulid);

        assert_eq!(message.as_ulid(), org.as_ulid());
        assert!(message.to_string().starts_with("dlq-"));
        assert!(org.to_string().starts_with("org-"));
        // let _: MessageId = org; // <- does not compile
    }

    #[test]
    fn parse_accepts_prefixed_and_bare() {
        let id = MessageId::from_ulid(Ulid::new());

        let prefixed: MessageId = id.to_string().parse().unwrap();
        let bare: MessageId = id.as_ulid().to_string().parse().unwrap();

        assert_eq!(prefixed, id);
        assert_eq!(bare, id);
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = "dlq-not-a-ulid".parse::<MessageId>().unwrap_err();
        assert!(err.to_string().contains("dlq-not-a-ulid"));
    }

    #[test]
    fn serializes_as_plain_ulid_string() {
        let id = OrganizationId::from_ulid(Ulid::new());
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.as_ulid().to_string()));

        let back: OrganizationId = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }
}
