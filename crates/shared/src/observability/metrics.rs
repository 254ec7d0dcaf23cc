//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::ObservabilityConfig;

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(service_name: &str, config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let builder = PrometheusBuilder::new();
    let handle = builder.install_recorder()?;

    // 保存到全局，供其他地方获取指标快照
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册通用指标（预定义的业务指标）
///
/// 这些描述会出现在 /metrics 端点的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!("logins_total", "Total number of successful logins");
    metrics::describe_counter!("registrations_total", "Total number of registrations");
    metrics::describe_counter!("pings_sent_total", "Total number of connection requests sent");
    metrics::describe_counter!(
        "push_deliveries_total",
        "Total number of push notification delivery attempts"
    );
    metrics::describe_counter!("cache_hits_total", "Total number of cache hits");
    metrics::describe_counter!("cache_misses_total", "Total number of cache misses");
    metrics::describe_gauge!(
        "worker_last_run_timestamp",
        "Unix timestamp of the last worker loop run"
    );

    // 记录服务启动
    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
    )
    .record(duration_secs);
}

/// 记录登录成功
#[inline]
pub fn record_login() {
    metrics::counter!("logins_total").increment(1);
}

/// 记录注册成功
#[inline]
pub fn record_registration() {
    metrics::counter!("registrations_total").increment(1);
}

/// 记录连接请求发送
#[inline]
pub fn record_ping_sent() {
    metrics::counter!("pings_sent_total").increment(1);
}

/// 记录推送投递尝试
#[inline]
pub fn record_push_delivery(success: bool) {
    metrics::counter!(
        "push_deliveries_total",
        "result" => if success { "success" } else { "failure" },
    )
    .increment(1);
}

/// 记录 Worker 健康状态
#[inline]
pub fn set_worker_last_run(worker: &str) {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    metrics::gauge!("worker_last_run_timestamp", "worker" => worker.to_string()).set(now);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic_without_recorder() {
        // 未安装 recorder 时 metrics 宏为 no-op，记录函数应安全可调用
        record_http_request("GET", "/api/posts", 200, 0.012);
        record_login();
        record_registration();
        record_ping_sent();
        record_push_delivery(true);
        set_worker_last_run("push_worker");
    }
}
