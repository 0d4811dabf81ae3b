//! 错误类型定义

use thiserror::Error;

/// 线上协议错误：解码失败或字段校验失败
///
/// Both categories are answered in-band with an error reply; neither closes
/// the connection.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// 无法解析为信封
    #[error("unable to decode JSON: {0}")]
    Decode(String),

    /// 信封字段不满足校验规则
    #[error("{0}")]
    Validation(String),
}

impl ProtocolError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }
}

/// 外部协作者（凭证校验、成员查询、持久化）返回的错误
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// 凭证有效但指向的用户不存在
    #[error("user in token does not exist")]
    UnknownUser,

    #[error("specified chat does not exist")]
    UnknownChat,

    #[error("storage error: {0}")]
    Storage(String),
}

impl CollaboratorError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}
