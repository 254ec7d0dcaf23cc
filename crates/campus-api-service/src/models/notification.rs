//! 通知类型定义

use serde::{Deserialize, Serialize};

/// 站内通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// 收到新的连接请求
    PingReceived,
    /// 发出的连接请求被接受
    PingAccepted,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PingReceived => "ping_received",
            Self::PingAccepted => "ping_accepted",
        }
    }

    /// 推送标题
    pub fn push_title(&self) -> &'static str {
        match self {
            Self::PingReceived => "新的连接请求",
            Self::PingAccepted => "连接请求已接受",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_str_stable() {
        // 通知类型字符串会写入数据库，属于存储契约，不能随意变更
        assert_eq!(NotificationKind::PingReceived.as_str(), "ping_received");
        assert_eq!(NotificationKind::PingAccepted.as_str(), "ping_accepted");
    }
}
