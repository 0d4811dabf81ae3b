//! 连接注册中心（Hub）
//!
//! 所有活跃连接（无论是否已认证）的唯一权威集合，按对端地址索引，
//! 并持有身份映射。注册、注销和向用户推送都从这里走；注销是幂等的：
//! 入站和出站循环的失败可能并发触发拆除，第二次注销必须是空操作。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use domain::envelope::ChatDelivery;
use domain::{ProtocolError, User, UserId};

use crate::connection::{ConnectionHandle, EnqueueError, OutboundFrame};
use crate::mapping::UserMapping;

pub struct Hub {
    connections: RwLock<HashMap<SocketAddr, Arc<ConnectionHandle>>>,
    mapping: UserMapping,
    queue_capacity: usize,
}

impl Hub {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            mapping: UserMapping::new(),
            queue_capacity,
        }
    }

    /// 登记一个新连接，返回句柄和出站接收端
    ///
    /// 调用方保证每条传输会话只注册一次。
    pub async fn register(
        &self,
        peer: SocketAddr,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundFrame>) {
        let (handle, rx) = ConnectionHandle::channel(peer, self.queue_capacity);
        let handle = Arc::new(handle);

        let mut connections = self.connections.write().await;
        connections.insert(peer, handle.clone());
        debug!(%peer, total = connections.len(), "connection registered");

        (handle, rx)
    }

    /// 认证成功后把连接登记进身份映射
    pub async fn attach_user(&self, user: User, handle: &Arc<ConnectionHandle>) {
        if !handle.bind_user(user.clone()) {
            // 会话状态机拒绝重复认证，这里只可能是同一次绑定的重放
            debug!(peer = %handle.peer(), "user already bound to connection");
        }
        self.mapping.add(user.id, handle.clone()).await;

        // 并发拆除可能赶在映射登记之前关闭连接；登记后复查，已关闭的
        // 连接当场撤销映射。不变式：映射里的连接必须仍在注册集合里。
        if handle.is_closed() {
            self.mapping.remove(user.id, handle.peer()).await;
            debug!(peer = %handle.peer(), user = %user.id, "authentication raced with teardown");
            return;
        }

        let devices = self.mapping.device_count(user.id).await;
        info!(
            peer = %handle.peer(),
            user = %user.id,
            username = %user.username,
            devices,
            "device mapped"
        );
    }

    /// 注销一个连接：移出活跃集合、关闭出站队列、清理身份映射
    ///
    /// 幂等：已注销的对端地址是空操作。
    pub async fn unregister(&self, peer: SocketAddr) {
        let removed = {
            let mut connections = self.connections.write().await;
            connections.remove(&peer)
        };

        let Some(handle) = removed else {
            return;
        };

        handle.close();
        if let Some(user) = handle.user() {
            self.mapping.remove(user.id, peer).await;
        }
        info!(%peer, "connection unregistered");
    }

    /// 向一个用户的所有在线设备推送一条投递信封
    ///
    /// 无在线设备时是空操作（聊天历史是消息的唯一记录）。队列写满的
    /// 设备按背压策略当场拆除。返回成功入队的设备数。
    pub async fn push_to_user(
        &self,
        user: UserId,
        delivery: &ChatDelivery,
    ) -> Result<usize, ProtocolError> {
        let devices = self.mapping.get(user).await;
        if devices.is_empty() {
            return Ok(0);
        }

        let payload = delivery.to_json()?;

        let mut enqueued = 0;
        let mut stalled = Vec::new();
        for device in devices {
            match device.enqueue(OutboundFrame::Envelope(payload.clone())) {
                Ok(()) => enqueued += 1,
                Err(EnqueueError::Full) => {
                    warn!(peer = %device.peer(), user = %user, "outbound queue full, dropping connection");
                    stalled.push(device.peer());
                }
                Err(EnqueueError::Closed) => {
                    // 并发拆除已经在处理这个设备
                    debug!(peer = %device.peer(), user = %user, "push raced with teardown");
                }
            }
        }

        for peer in stalled {
            self.unregister(peer).await;
        }

        Ok(enqueued)
    }

    /// 向所有活跃连接推送同一份载荷，入队策略与按用户推送一致
    pub async fn broadcast(&self, payload: &str) {
        let devices: Vec<Arc<ConnectionHandle>> = {
            let connections = self.connections.read().await;
            connections.values().cloned().collect()
        };

        let mut stalled = Vec::new();
        for device in devices {
            match device.enqueue(OutboundFrame::Envelope(payload.to_string())) {
                Ok(()) => {}
                Err(EnqueueError::Full) => {
                    warn!(peer = %device.peer(), "outbound queue full during broadcast, dropping connection");
                    stalled.push(device.peer());
                }
                Err(EnqueueError::Closed) => {}
            }
        }

        for peer in stalled {
            self.unregister(peer).await;
        }
    }

    /// 用户当前映射到的连接快照
    pub async fn devices(&self, user: UserId) -> Vec<Arc<ConnectionHandle>> {
        self.mapping.get(user).await
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// 关闭所有出站队列，让每个连接的出站循环退出
    ///
    /// 进程关闭路径调用；随后的注销由各连接自身的拆除路径完成。
    pub async fn shutdown(&self) {
        let peers: Vec<SocketAddr> = {
            let connections = self.connections.read().await;
            connections.keys().copied().collect()
        };
        info!(connections = peers.len(), "closing all outbound queues");
        for peer in peers {
            self.unregister(peer).await;
        }
    }
}
