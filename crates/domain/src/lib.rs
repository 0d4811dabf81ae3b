//! 领域层
//!
//! 定义实时投递子系统的领域模型：线上协议信封、身份值对象、
//! 外部协作者接口和错误类型。本层不做任何 I/O。

pub mod collaborators;
pub mod envelope;
pub mod errors;
pub mod identity;

pub use collaborators::{ChatDirectory, MessageStore, TokenValidator};
pub use envelope::{ChatDelivery, ChatSend, ClientEnvelope, Reply};
pub use errors::{CollaboratorError, ProtocolError};
pub use identity::{ChatId, ContentKind, MessageRecord, User, UserId};

#[cfg(feature = "testing")]
pub use collaborators::{MockChatDirectory, MockMessageStore, MockTokenValidator};
