//! 统一配置中心
//!
//! 提供应用的全局配置管理，包括：
//! - 数据库连接
//! - JWT认证
//! - 实时通道参数
//! - 服务设置

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 数据库配置
    pub database: DatabaseConfig,
    /// JWT认证配置
    pub jwt: JwtConfig,
    /// 实时通道配置
    pub realtime: RealtimeConfig,
    /// 服务配置
    pub server: ServerConfig,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// JWT配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
}

/// 实时通道配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// 每个连接的出站队列容量；写满即判定对端失去响应
    pub queue_capacity: usize,
    /// 对端超时窗口（秒）：读截止时间，心跳周期取其 9/10
    pub peer_timeout_secs: u64,
    /// 单次写操作的截止时间（秒）
    pub write_timeout_secs: u64,
    /// 入站帧大小上限（字节）
    pub max_frame_bytes: usize,
    /// 进程关闭时等待出站循环退出的宽限期（秒）
    pub shutdown_grace_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            peer_timeout_secs: 60,
            write_timeout_secs: 10,
            max_frame_bytes: 64 * 1024,
            shutdown_grace_secs: 5,
        }
    }
}

impl RealtimeConfig {
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs)
    }

    /// 心跳周期：对端超时窗口的 9/10
    pub fn ping_period(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs) * 9 / 10
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    /// 从环境变量加载配置
    ///
    /// 关键安全配置（DATABASE_URL, JWT_SECRET）缺失时 panic，
    /// 确保生产环境中不会使用不安全的默认值。
    pub fn from_env() -> Self {
        Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .expect("DATABASE_URL environment variable is required for production safety"),
                max_connections: env_parse("DB_MAX_CONNECTIONS", 5),
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET")
                    .expect("JWT_SECRET environment variable is required for production safety"),
            },
            realtime: RealtimeConfig {
                queue_capacity: env_parse("WS_QUEUE_CAPACITY", 256),
                peer_timeout_secs: env_parse("WS_PEER_TIMEOUT_SECS", 60),
                write_timeout_secs: env_parse("WS_WRITE_TIMEOUT_SECS", 10),
                max_frame_bytes: env_parse("WS_MAX_FRAME_BYTES", 64 * 1024),
                shutdown_grace_secs: env_parse("WS_SHUTDOWN_GRACE_SECS", 5),
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env_parse("SERVER_PORT", 8080),
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_period_is_nine_tenths_of_peer_timeout() {
        let realtime = RealtimeConfig::default();
        assert_eq!(realtime.peer_timeout(), Duration::from_secs(60));
        assert_eq!(realtime.ping_period(), Duration::from_secs(54));
    }
}
