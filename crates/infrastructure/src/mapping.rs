//! 用户到设备的身份映射
//!
//! `用户 → (对端地址 → 连接句柄)` 的并发多重映射：一个用户可以有多个
//! 同时在线的设备，删除单个设备不影响其余设备。映射只做目录，不拥有
//! 连接；条目由认证成功时插入、拆除时删除。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::RwLock;

use domain::UserId;

use crate::connection::ConnectionHandle;

/// 用户身份到活跃连接的映射
#[derive(Default)]
pub struct UserMapping {
    inner: RwLock<HashMap<UserId, HashMap<SocketAddr, Arc<ConnectionHandle>>>>,
}

impl UserMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在用户名下登记一个设备
    pub async fn add(&self, user: UserId, handle: Arc<ConnectionHandle>) {
        let mut inner = self.inner.write().await;
        inner.entry(user).or_default().insert(handle.peer(), handle);
    }

    /// 删除一个设备；条目不存在时是空操作
    pub async fn remove(&self, user: UserId, peer: SocketAddr) {
        let mut inner = self.inner.write().await;
        if let Some(devices) = inner.get_mut(&user) {
            devices.remove(&peer);
            if devices.is_empty() {
                inner.remove(&user);
            }
        }
    }

    /// 用户当前在线设备的快照，供扇出使用
    pub async fn get(&self, user: UserId) -> Vec<Arc<ConnectionHandle>> {
        let inner = self.inner.read().await;
        match inner.get(&user) {
            Some(devices) => devices.values().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// 用户当前在线的设备数
    pub async fn device_count(&self, user: UserId) -> usize {
        let inner = self.inner.read().await;
        inner.get(&user).map_or(0, HashMap::len)
    }
}
