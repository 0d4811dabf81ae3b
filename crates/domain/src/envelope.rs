//! 消息信封协议
//!
//! WebSocket 通道上交换的 JSON 帧。每个帧带一个整数 `type` 判别字段：
//! 0 = 认证请求（客户端→服务端），1 = 聊天投递推送（服务端→客户端），
//! 2 = 聊天发送（客户端→服务端）。应答帧用 `status` 字段区分成功与错误。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ProtocolError;
use crate::identity::ContentKind;

/// 认证请求的判别值
pub const KIND_AUTHENTICATE: i64 = 0;
/// 聊天投递推送的判别值
pub const KIND_DELIVERY: i64 = 1;
/// 聊天发送的判别值
pub const KIND_CHAT_SEND: i64 = 2;

#[derive(Debug, Deserialize)]
struct Discriminator {
    #[serde(rename = "type")]
    kind: i64,
}

#[derive(Debug, Deserialize)]
struct AuthenticateFrame {
    #[serde(default)]
    token: String,
}

/// 客户端发来的信封，按判别字段解析
///
/// Unknown discriminators are a distinct variant rather than a decode error:
/// the state machine answers them explicitly instead of dropping the frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEnvelope {
    Authenticate { token: String },
    ChatSend(ChatSend),
    Unknown(i64),
}

impl ClientEnvelope {
    /// 解析一个原始文本帧
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let discriminator: Discriminator =
            serde_json::from_str(raw).map_err(|err| ProtocolError::Decode(err.to_string()))?;

        match discriminator.kind {
            KIND_AUTHENTICATE => {
                let frame: AuthenticateFrame = serde_json::from_str(raw)
                    .map_err(|err| ProtocolError::Decode(err.to_string()))?;
                Ok(Self::Authenticate { token: frame.token })
            }
            KIND_CHAT_SEND => {
                let frame: ChatSend = serde_json::from_str(raw)
                    .map_err(|err| ProtocolError::Decode(err.to_string()))?;
                Ok(Self::ChatSend(frame))
            }
            other => Ok(Self::Unknown(other)),
        }
    }
}

/// 聊天发送信封（type = 2）
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatSend {
    pub chat: Uuid,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub filename: String,
    #[serde(rename = "content-type", default)]
    pub content_type: String,
}

impl ChatSend {
    /// 校验判别字段相关的必填规则，返回消息内容类别
    ///
    /// `"message"` 要求非空 `message` 且空 `filename`；`"image"` 要求空
    /// `filename`；`"file"` 要求非空 `filename`。
    pub fn validate(&self) -> Result<ContentKind, ProtocolError> {
        let kind = ContentKind::from_label(&self.content_type).ok_or_else(|| {
            ProtocolError::validation(
                "field 'content-type' must be one of 'message', 'image', or 'file'",
            )
        })?;

        match kind {
            ContentKind::Message => {
                if self.message.is_empty() {
                    return Err(ProtocolError::validation("field 'message' must be present"));
                }
                if !self.filename.is_empty() {
                    return Err(ProtocolError::validation(
                        "field 'filename' should be empty or nonexistent",
                    ));
                }
            }
            ContentKind::Image => {
                if !self.filename.is_empty() {
                    return Err(ProtocolError::validation(
                        "field 'filename' should be empty or nonexistent",
                    ));
                }
            }
            ContentKind::File => {
                if self.filename.is_empty() {
                    return Err(ProtocolError::validation("field 'filename' must be present"));
                }
            }
        }

        Ok(kind)
    }
}

/// 聊天投递推送信封（type = 1），服务端构造
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatDelivery {
    #[serde(rename = "type")]
    kind: i64,
    pub message: String,
    pub chat: Uuid,
    pub sender: String,
    #[serde(rename = "content-type")]
    pub content_type: u8,
}

impl ChatDelivery {
    pub fn new(chat: Uuid, sender: impl Into<String>, kind: ContentKind, message: impl Into<String>) -> Self {
        Self {
            kind: KIND_DELIVERY,
            message: message.into(),
            chat,
            sender: sender.into(),
            content_type: kind.wire_code(),
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|err| ProtocolError::Decode(err.to_string()))
    }
}

/// 应答帧：`{"status":"success"}` 或 `{"status":"error","reason":...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Reply {
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },
    Error { reason: String },
}

impl Reply {
    pub fn success() -> Self {
        Self::Success { data: None }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|err| ProtocolError::Decode(err.to_string()))
    }
}
