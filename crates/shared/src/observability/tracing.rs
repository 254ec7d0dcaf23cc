//! 日志初始化模块
//!
//! 基于 tracing-subscriber 提供结构化日志，支持 pretty 和 JSON 两种格式。

use anyhow::Result;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::ObservabilityConfig;

/// 初始化 tracing 日志
///
/// 日志级别优先读取 RUST_LOG 环境变量，其次使用配置中的 log_level。
/// 重复初始化（如测试中）不视为错误。
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = if config.log_format == "json" {
        fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .boxed()
    };

    // try_init 在已有全局 subscriber 时返回错误，此处忽略以便测试复用
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let config = ObservabilityConfig::default();
        assert!(init(&config).is_ok());
        assert!(init(&config).is_ok());
    }
}
