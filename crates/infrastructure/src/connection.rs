//! 连接句柄与出站队列
//!
//! 每个连接对应一条有界出站队列：入队永不阻塞，队列写满即判定对端
//! 失去响应并触发拆除。所有对传输层的写操作由唯一的出站循环完成。

use std::net::SocketAddr;
use std::sync::{Mutex, OnceLock};

use thiserror::Error;
use tokio::sync::mpsc;

use domain::User;

/// 出站循环消费的帧
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// 已序列化的信封（应答或投递推送）
    Envelope(String),
    /// 对入站 ping 的应答，原样携带对端数据
    Pong(Vec<u8>),
}

/// 非阻塞入队失败
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// 队列写满：对端消费太慢，按背压策略拆除连接
    #[error("outbound queue full")]
    Full,
    /// 队列已在拆除时关闭
    #[error("outbound queue closed")]
    Closed,
}

/// 一条活跃传输会话的句柄
///
/// 以对端地址为会话期内唯一标识。认证状态机归入站循环独有；这里的
/// `user` 只在注册进身份映射时绑定一次，供拆除路径反查映射条目。
pub struct ConnectionHandle {
    peer: SocketAddr,
    sender: Mutex<Option<mpsc::Sender<OutboundFrame>>>,
    user: OnceLock<User>,
}

impl ConnectionHandle {
    /// 创建句柄和配套的出站接收端
    pub(crate) fn channel(
        peer: SocketAddr,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                peer,
                sender: Mutex::new(Some(tx)),
                user: OnceLock::new(),
            },
            rx,
        )
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// 绑定认证后的用户身份；只允许一次
    pub(crate) fn bind_user(&self, user: User) -> bool {
        self.user.set(user).is_ok()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.get()
    }

    /// 非阻塞入队一帧
    pub fn enqueue(&self, frame: OutboundFrame) -> Result<(), EnqueueError> {
        let guard = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let sender = guard.as_ref().ok_or(EnqueueError::Closed)?;
        sender.try_send(frame).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// 关闭出站队列，让出站循环在清空后退出
    ///
    /// 返回本次调用是否真正执行了关闭；并发拆除时只有一方返回 true。
    pub(crate) fn close(&self) -> bool {
        let mut guard = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("peer", &self.peer)
            .field("user", &self.user.get())
            .field("closed", &self.is_closed())
            .finish()
    }
}
