//! 聊天目录与消息存储的 PostgreSQL 实现

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use domain::{
    ChatDirectory, ChatId, CollaboratorError, ContentKind, MessageRecord, MessageStore, User,
    UserId,
};

fn storage_err(err: sqlx::Error) -> CollaboratorError {
    CollaboratorError::storage(err.to_string())
}

#[derive(Debug, sqlx::FromRow)]
struct DbMember {
    id: Uuid,
    username: String,
}

#[derive(Debug, sqlx::FromRow)]
struct DbMessage {
    id: Uuid,
    chat_id: Uuid,
    sender_id: Uuid,
    content_type: String,
    body: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<DbMessage> for MessageRecord {
    type Error = CollaboratorError;

    fn try_from(row: DbMessage) -> Result<Self, Self::Error> {
        let kind = ContentKind::from_label(&row.content_type).ok_or_else(|| {
            CollaboratorError::storage(format!("unknown stored content type: {}", row.content_type))
        })?;
        Ok(MessageRecord {
            id: row.id,
            chat: ChatId(row.chat_id),
            sender: UserId(row.sender_id),
            kind,
            body: row.body,
            created_at: row.created_at,
        })
    }
}

/// 聊天成员目录的数据库实现
pub struct PgChatDirectory {
    pool: PgPool,
}

impl PgChatDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn chat_exists(&self, chat: ChatId) -> Result<bool, CollaboratorError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM chats WHERE id = $1)")
            .bind(chat.0)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)
    }
}

#[async_trait]
impl ChatDirectory for PgChatDirectory {
    async fn is_member(&self, chat: ChatId, user: UserId) -> Result<bool, CollaboratorError> {
        if !self.chat_exists(chat).await? {
            return Err(CollaboratorError::UnknownChat);
        }
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM chat_members WHERE chat_id = $1 AND user_id = $2)",
        )
        .bind(chat.0)
        .bind(user.0)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)
    }

    async fn members(&self, chat: ChatId) -> Result<Vec<User>, CollaboratorError> {
        let rows = sqlx::query_as::<_, DbMember>(
            r#"SELECT u.id, u.username FROM users u
               JOIN chat_members cm ON cm.user_id = u.id
               WHERE cm.chat_id = $1"#,
        )
        .bind(chat.0)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows
            .into_iter()
            .map(|row| User::new(UserId(row.id), row.username))
            .collect())
    }
}

/// 消息存储的数据库实现
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn create_message(
        &self,
        chat: ChatId,
        sender: UserId,
        kind: ContentKind,
        body: &str,
    ) -> Result<MessageRecord, CollaboratorError> {
        let label = match kind {
            ContentKind::Message => "message",
            ContentKind::Image => "image",
            ContentKind::File => "file",
        };
        let row = sqlx::query_as::<_, DbMessage>(
            r#"INSERT INTO messages (chat_id, sender_id, content_type, body)
               VALUES ($1, $2, $3, $4)
               RETURNING id, chat_id, sender_id, content_type, body, created_at"#,
        )
        .bind(chat.0)
        .bind(sender.0)
        .bind(label)
        .bind(body)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;

        row.try_into()
    }
}
