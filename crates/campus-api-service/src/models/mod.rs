//! 领域模型模块
//!
//! 包含行为主体、连接请求状态机、通知类型等核心模型

pub mod actor;
pub mod notification;
pub mod ping;

pub use actor::{ActorRef, ActorType};
pub use notification::NotificationKind;
pub use ping::{PingStatus, RelationshipKey};
