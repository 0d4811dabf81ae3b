use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use chrono::Utc;
use tokio::{net::TcpListener, sync::oneshot, time::sleep};
use uuid::Uuid;

use config::RealtimeConfig;
use domain::{
    ChatDirectory, ChatId, CollaboratorError, ContentKind, MessageRecord, MessageStore,
    TokenValidator, User, UserId,
};
use infrastructure::{Collaborators, Hub};
use web_api::{router, AppState};

/// 令牌到用户的静态映射
pub struct TestTokens {
    tokens: HashMap<String, User>,
}

#[async_trait::async_trait]
impl TokenValidator for TestTokens {
    async fn validate(&self, token: &str) -> Result<User, CollaboratorError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| CollaboratorError::InvalidToken("signature mismatch".to_string()))
    }
}

/// 聊天到成员名单的静态目录
pub struct TestDirectory {
    chats: HashMap<Uuid, Vec<User>>,
}

#[async_trait::async_trait]
impl ChatDirectory for TestDirectory {
    async fn is_member(&self, chat: ChatId, user: UserId) -> Result<bool, CollaboratorError> {
        let members = self
            .chats
            .get(&chat.0)
            .ok_or(CollaboratorError::UnknownChat)?;
        Ok(members.iter().any(|member| member.id == user))
    }

    async fn members(&self, chat: ChatId) -> Result<Vec<User>, CollaboratorError> {
        self.chats
            .get(&chat.0)
            .cloned()
            .ok_or(CollaboratorError::UnknownChat)
    }
}

/// 不落盘的消息存储
pub struct TestStore;

#[async_trait::async_trait]
impl MessageStore for TestStore {
    async fn create_message(
        &self,
        chat: ChatId,
        sender: UserId,
        kind: ContentKind,
        body: &str,
    ) -> Result<MessageRecord, CollaboratorError> {
        Ok(MessageRecord {
            id: Uuid::new_v4(),
            chat,
            sender,
            kind,
            body: body.to_string(),
            created_at: Utc::now(),
        })
    }
}

pub struct TestBackend {
    pub alice: User,
    pub bob: User,
    pub chat: Uuid,
}

impl TestBackend {
    pub fn new() -> Self {
        Self {
            alice: User::new(UserId(Uuid::new_v4()), "alice"),
            bob: User::new(UserId(Uuid::new_v4()), "bob"),
            chat: Uuid::new_v4(),
        }
    }

    /// alice 和 bob 共处一个聊天；令牌就叫 "alice-token" / "bob-token"
    pub fn build_router(&self) -> Router {
        let mut tokens = HashMap::new();
        tokens.insert("alice-token".to_string(), self.alice.clone());
        tokens.insert("bob-token".to_string(), self.bob.clone());

        let mut chats = HashMap::new();
        chats.insert(self.chat, vec![self.alice.clone(), self.bob.clone()]);

        let realtime = RealtimeConfig::default();
        let hub = Arc::new(Hub::new(realtime.queue_capacity));
        let collaborators = Collaborators {
            tokens: Arc::new(TestTokens { tokens }),
            directory: Arc::new(TestDirectory { chats }),
            messages: Arc::new(TestStore),
        };
        router(AppState::new(hub, collaborators, realtime))
    }
}

pub async fn spawn_app(router: Router) -> (SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await
        .ok();
    });

    // allow server to start
    sleep(Duration::from_millis(100)).await;
    (addr, shutdown_tx)
}
