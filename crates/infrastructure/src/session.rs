//! 协议会话状态机
//!
//! 每条连接的入站循环把文本帧交给这里处理。状态机只有入站循环驱动，
//! 认证状态因此不需要任何锁。状态迁移：未认证 → 已认证 → 关闭（终态，
//! 由循环退出体现）。协议错误和校验错误一律带内应答，连接保持打开；
//! 只有出站队列不可用或服务端自身缺陷才结束会话。

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use domain::envelope::{ChatDelivery, ChatSend, ClientEnvelope, Reply};
use domain::{ChatDirectory, MessageStore, TokenValidator, User};

use crate::connection::{ConnectionHandle, EnqueueError, OutboundFrame};
use crate::hub::Hub;

/// 实时核心消费的三个外部协作者
#[derive(Clone)]
pub struct Collaborators {
    pub tokens: Arc<dyn TokenValidator>,
    pub directory: Arc<dyn ChatDirectory>,
    pub messages: Arc<dyn MessageStore>,
}

/// 会话致命结束的原因；触发连接拆除
#[derive(Error, Debug)]
pub enum SessionEnd {
    /// 自己的出站队列写满或已关闭，无法再应答
    #[error("outbound queue unavailable")]
    QueueUnavailable,
    /// 服务端自身构造的信封无法序列化——程序缺陷，只终止这一条连接
    #[error("internal defect: {0}")]
    Defect(String),
}

enum SessionState {
    Unauthenticated,
    Authenticated(User),
}

pub struct Session {
    hub: Arc<Hub>,
    collaborators: Collaborators,
    handle: Arc<ConnectionHandle>,
    state: SessionState,
}

impl Session {
    pub fn new(hub: Arc<Hub>, collaborators: Collaborators, handle: Arc<ConnectionHandle>) -> Self {
        Self {
            hub,
            collaborators,
            handle,
            state: SessionState::Unauthenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated(_))
    }

    /// 处理一个入站文本帧
    pub async fn handle_frame(&mut self, raw: &str) -> Result<(), SessionEnd> {
        let envelope = match ClientEnvelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                trace!(peer = %self.handle.peer(), %err, "frame failed to parse");
                return self.reply(Reply::error(err.to_string()));
            }
        };

        match (&self.state, envelope) {
            (SessionState::Unauthenticated, ClientEnvelope::Authenticate { token }) => {
                self.handle_authenticate(token).await
            }
            // 认证之前其他任何信封都不处理
            (SessionState::Unauthenticated, _) => {
                trace!(peer = %self.handle.peer(), "envelope before authentication");
                self.reply(Reply::error("unauthenticated connection"))
            }
            (SessionState::Authenticated(_), ClientEnvelope::Authenticate { .. }) => {
                debug!(peer = %self.handle.peer(), "duplicate authentication rejected");
                self.reply(Reply::error("already authenticated"))
            }
            (SessionState::Authenticated(user), ClientEnvelope::ChatSend(send)) => {
                let user = user.clone();
                self.handle_chat_send(user, send).await
            }
            (SessionState::Authenticated(_), ClientEnvelope::Unknown(kind)) => {
                info!(peer = %self.handle.peer(), kind, "invalid message type");
                self.reply(Reply::error("invalid message type"))
            }
        }
    }

    async fn handle_authenticate(&mut self, token: String) -> Result<(), SessionEnd> {
        let user = match self.collaborators.tokens.validate(&token).await {
            Ok(user) => user,
            Err(err) => {
                trace!(peer = %self.handle.peer(), %err, "authentication failed");
                return self.reply(Reply::error(err.to_string()));
            }
        };

        self.hub.attach_user(user.clone(), &self.handle).await;
        self.state = SessionState::Authenticated(user);
        debug!(peer = %self.handle.peer(), "websocket client authenticated");
        self.reply(Reply::success())
    }

    async fn handle_chat_send(&mut self, user: User, send: ChatSend) -> Result<(), SessionEnd> {
        let kind = match send.validate() {
            Ok(kind) => kind,
            Err(err) => return self.reply(Reply::error(err.to_string())),
        };

        match self
            .collaborators
            .directory
            .is_member(send.chat.into(), user.id)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                return self.reply(Reply::error("user is not part of specified chat"));
            }
            Err(err) => return self.reply(Reply::error(err.to_string())),
        }

        let record = match self
            .collaborators
            .messages
            .create_message(send.chat.into(), user.id, kind, &send.message)
            .await
        {
            Ok(record) => record,
            Err(err) => {
                warn!(peer = %self.handle.peer(), chat = %send.chat, %err, "failed to persist message");
                return self.reply(Reply::error(err.to_string()));
            }
        };

        // 持久化完成后才扇出；推送与发送方的成功应答之间没有顺序保证
        let members = match self.collaborators.directory.members(send.chat.into()).await {
            Ok(members) => members,
            Err(err) => {
                // 消息已经落库，聊天历史是它的记录；扇出只能放弃
                warn!(chat = %send.chat, %err, "member lookup failed, skipping fan-out");
                return self.reply(Reply::success());
            }
        };

        let delivery = ChatDelivery::new(send.chat, user.username.clone(), kind, send.message.clone());
        for member in members.iter().filter(|member| member.id != user.id) {
            let pushed = self
                .hub
                .push_to_user(member.id, &delivery)
                .await
                .map_err(|err| SessionEnd::Defect(err.to_string()))?;
            trace!(message = %record.id, recipient = %member.id, devices = pushed, "message fanned out");
        }

        self.reply(Reply::success())
    }

    fn reply(&self, reply: Reply) -> Result<(), SessionEnd> {
        let payload = reply
            .to_json()
            .map_err(|err| SessionEnd::Defect(err.to_string()))?;
        match self.handle.enqueue(OutboundFrame::Envelope(payload)) {
            Ok(()) => Ok(()),
            Err(EnqueueError::Full | EnqueueError::Closed) => Err(SessionEnd::QueueUnavailable),
        }
    }
}
