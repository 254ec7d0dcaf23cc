//! 统一错误处理模块
//!
//! 定义基础设施层共享的错误类型，使用 thiserror 提供良好的错误信息。

use thiserror::Error;

/// 基础设施错误类型
#[derive(Debug, Error)]
pub enum SharedError {
    // ==================== 数据库错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    // ==================== 缓存错误 ====================
    #[error("Redis 错误: {0}")]
    Redis(#[from] redis::RedisError),

    // ==================== 配置错误 ====================
    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),

    // ==================== 通用错误 ====================
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, SharedError>;

impl SharedError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::Redis(_) => "REDIS_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 数据库和 Redis 的连接类故障重试后可能恢复，配置错误不可能。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Redis(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = SharedError::Internal("boom".to_string());
        assert_eq!(err.code(), "INTERNAL_ERROR");

        let err = SharedError::Database(sqlx::Error::PoolTimedOut);
        assert_eq!(err.code(), "DATABASE_ERROR");
    }

    #[test]
    fn test_is_retryable() {
        assert!(SharedError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!SharedError::Internal("x".to_string()).is_retryable());
    }
}
