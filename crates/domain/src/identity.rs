//! 身份和消息值对象

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 用户ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl From<Uuid> for UserId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 聊天ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub Uuid);

impl From<Uuid> for ChatId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 已认证的应用身份：凭证校验协作者的返回值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

impl User {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

/// 消息内容类别
///
/// Wire codes on the delivery push: 0 message, 1 image, 2 file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Message,
    Image,
    File,
}

impl ContentKind {
    /// 聊天发送信封里 `content-type` 字段的取值
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "message" => Some(Self::Message),
            "image" => Some(Self::Image),
            "file" => Some(Self::File),
            _ => None,
        }
    }

    pub fn wire_code(self) -> u8 {
        match self {
            Self::Message => 0,
            Self::Image => 1,
            Self::File => 2,
        }
    }
}

/// 持久化协作者创建的消息记录
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub id: Uuid,
    pub chat: ChatId,
    pub sender: UserId,
    pub kind: ContentKind,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_kind_labels_round_trip() {
        assert_eq!(ContentKind::from_label("message"), Some(ContentKind::Message));
        assert_eq!(ContentKind::from_label("image"), Some(ContentKind::Image));
        assert_eq!(ContentKind::from_label("file"), Some(ContentKind::File));
        assert_eq!(ContentKind::from_label("video"), None);
    }

    #[test]
    fn content_kind_wire_codes() {
        assert_eq!(ContentKind::Message.wire_code(), 0);
        assert_eq!(ContentKind::Image.wire_code(), 1);
        assert_eq!(ContentKind::File.wire_code(), 2);
    }
}
