//! HTTP / WebSocket 接入层
//!
//! 对外暴露三个端点：健康检查、WebSocket 升级（认证在通道内完成）
//! 和走 HTTP 的消息发送。实时语义都在 infrastructure 里，这一层只做
//! 传输和路由。

pub mod error;
pub mod routes;
pub mod state;
pub mod ws_connection;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
