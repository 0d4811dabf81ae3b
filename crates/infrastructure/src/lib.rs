//! 实时投递基础设施
//!
//! 实现实时核心的四个组件：连接句柄与出站队列、用户到设备的身份映射、
//! 连接注册中心（Hub）和协议会话状态机；另外提供外部协作者接口的
//! PostgreSQL / JWT 具体实现。

pub mod auth;
pub mod connection;
pub mod hub;
pub mod mapping;
pub mod repository;
pub mod session;

pub use auth::JwtTokenValidator;
pub use connection::{ConnectionHandle, EnqueueError, OutboundFrame};
pub use hub::Hub;
pub use mapping::UserMapping;
pub use repository::{PgChatDirectory, PgMessageStore};
pub use session::{Collaborators, Session, SessionEnd};
