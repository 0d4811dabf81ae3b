//! 外部协作者接口
//!
//! 实时核心消费的三个窄接口：凭证校验、聊天成员目录、消息持久化。
//! 周边的 CRUD 应用提供具体实现；接口失败一律转换为带内错误应答，
//! 不会导致连接关闭。

use async_trait::async_trait;

use crate::errors::CollaboratorError;
use crate::identity::{ChatId, ContentKind, MessageRecord, User, UserId};

/// 凭证校验：把不透明的 bearer token 解析为应用身份
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, token: &str) -> Result<User, CollaboratorError>;
}

/// 聊天成员目录
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ChatDirectory: Send + Sync {
    /// 用户是否为聊天成员
    async fn is_member(&self, chat: ChatId, user: UserId) -> Result<bool, CollaboratorError>;

    /// 聊天的全部成员，扇出时用来定位"其他"成员
    async fn members(&self, chat: ChatId) -> Result<Vec<User>, CollaboratorError>;
}

/// 消息持久化：聊天历史的唯一持有者
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_message(
        &self,
        chat: ChatId,
        sender: UserId,
        kind: ContentKind,
        body: &str,
    ) -> Result<MessageRecord, CollaboratorError>;
}
