//! 分级限流中间件
//!
//! 基于 Redis 固定窗口计数器实现请求限流，按 API 类型分级限制：
//! - 认证操作（/api/auth 下的登录、注册、OTP）: 最严格，默认 10 req/min
//! - 写操作（POST/PUT/PATCH/DELETE）: 中等，默认 100 req/min
//! - 读操作（GET）: 最宽松，默认 500 req/min
//!
//! 支持两个维度的限流：
//! - 账号级：按 JWT sub（账号 ID）限流，防止单个账号滥用
//! - 全局级：所有请求共享配额，防止系统整体过载
//!
//! 使用 Redis INCR + EXPIRE 实现分布式计数，支持多实例部署。

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::warn;

use campus_shared::cache::{Cache, CacheKey};

use crate::auth::Claims;
use crate::state::AppState;

/// 限流级别配置
#[derive(Debug, Clone, Copy)]
struct RateLimit {
    /// 时间窗口内允许的最大请求数
    max_requests: i64,
    /// 时间窗口（秒）
    window_secs: u64,
}

/// 限流配置
///
/// 预设三个级别的限流参数，通过 API 路径和 HTTP 方法自动分级
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// 认证操作限制（最严格，防止撞库和 OTP 轰炸）
    auth: RateLimit,
    /// 写操作限制
    write: RateLimit,
    /// 读操作限制（最宽松）
    read: RateLimit,
    /// 全局限流倍数：全局配额 = 账号配额 * 此倍数
    global_multiplier: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            auth: RateLimit {
                max_requests: 10,
                window_secs: 60,
            },
            write: RateLimit {
                max_requests: 100,
                window_secs: 60,
            },
            read: RateLimit {
                max_requests: 500,
                window_secs: 60,
            },
            global_multiplier: 50,
        }
    }
}

/// 限流中间件
///
/// 放置在 auth 中间件之后（需要从 Claims 中提取账号 ID）。
/// 未认证的请求（如登录、注册本身）按调用方 IP 计数。
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if is_exempt_path(&path) {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let config = RateLimitConfig::default();
    let limit = classify_rate_limit(&path, &method, &config);
    let tier = rate_tier_name(&path, &method);

    // 已认证请求按账号 ID 计数，否则按调用方 IP 计数
    let subject = request
        .extensions()
        .get::<Claims>()
        .map(|c| c.sub.clone())
        .or_else(|| client_ip(&request))
        .unwrap_or_else(|| "anonymous".to_string());

    // 1. 账号级限流
    let subject_scope = format!("{}:{}", subject, tier);
    let subject_key = CacheKey::rate_limit(&subject_scope, window_key(limit.window_secs));
    match check_rate_limit(
        &state.cache,
        &subject_key,
        limit.max_requests,
        limit.window_secs,
    )
    .await
    {
        Ok(remaining) if remaining < 0 => {
            warn!(subject = %subject, path = %path, tier = tier, "账号限流触发");
            return too_many_requests_response(limit.window_secs);
        }
        Err(e) => {
            // Redis 不可用时放行，避免限流故障导致业务不可用
            warn!(error = %e, "Redis 限流检查失败，跳过限流");
        }
        _ => {}
    }

    // 2. 全局级限流
    let global_limit = limit.max_requests * config.global_multiplier;
    let global_scope = format!("global:{}", tier);
    let global_key = CacheKey::rate_limit(&global_scope, window_key(limit.window_secs));
    match check_rate_limit(&state.cache, &global_key, global_limit, limit.window_secs).await {
        Ok(remaining) if remaining < 0 => {
            warn!(path = %path, tier = tier, "全局限流触发");
            return too_many_requests_response(limit.window_secs);
        }
        Err(e) => {
            warn!(error = %e, "Redis 全局限流检查失败，跳过限流");
        }
        _ => {}
    }

    next.run(request).await
}

/// 使用 Redis INCR + EXPIRE 实现固定窗口计数器
///
/// 返回剩余配额（负数表示已超限）。
/// 利用 INCR 的原子性保证多实例部署时计数准确。
async fn check_rate_limit(
    cache: &Arc<Cache>,
    key: &str,
    max_requests: i64,
    window_secs: u64,
) -> Result<i64, String> {
    let count = cache
        .incr(key, 1)
        .await
        .map_err(|e| format!("Redis INCR 失败: {}", e))?;

    // 首次创建时设置过期时间，确保窗口到期后自动清理
    if count == 1 {
        let _ = cache
            .expire(key, std::time::Duration::from_secs(window_secs))
            .await;
    }

    Ok(max_requests - count)
}

/// 根据路径和方法分级确定限流参数
///
/// 认证操作 > 写操作 > 读操作（限制从严到宽）
fn classify_rate_limit(path: &str, method: &Method, config: &RateLimitConfig) -> RateLimit {
    if path.starts_with("/api/auth/") {
        return config.auth;
    }

    match *method {
        Method::GET | Method::HEAD | Method::OPTIONS => config.read,
        _ => config.write,
    }
}

/// 返回当前窗口的时间标识
///
/// 以窗口大小对齐的 Unix 时间戳，相同窗口内的请求共享同一个计数器
fn window_key(window_secs: u64) -> u64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    now / window_secs
}

/// 获取限流层级名称（用于 Redis key 的命名空间隔离）
fn rate_tier_name(path: &str, method: &Method) -> &'static str {
    if path.starts_with("/api/auth/") {
        "auth"
    } else {
        match *method {
            Method::GET | Method::HEAD | Method::OPTIONS => "read",
            _ => "write",
        }
    }
}

/// 免限流路径
fn is_exempt_path(path: &str) -> bool {
    matches!(path, "/health" | "/ready" | "/metrics") || path.starts_with("/uploads/")
}

/// 提取调用方 IP（优先代理头）
fn client_ip(request: &Request<Body>) -> Option<String> {
    let headers = request.headers();
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.to_string())
        })
}

/// 生成 429 Too Many Requests 响应
///
/// 包含 Retry-After 头，告知客户端何时可以重试
fn too_many_requests_response(window_secs: u64) -> Response {
    let body = json!({
        "success": false,
        "code": "RATE_LIMITED",
        "message": "请求过于频繁，请稍后再试",
        "data": null
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();
    if let Ok(val) = axum::http::HeaderValue::from_str(&window_secs.to_string()) {
        response.headers_mut().insert("Retry-After", val);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_auth_operations() {
        let config = RateLimitConfig::default();

        let limit = classify_rate_limit("/api/auth/login", &Method::POST, &config);
        assert_eq!(limit.max_requests, 10);

        let limit = classify_rate_limit("/api/auth/otp/request", &Method::POST, &config);
        assert_eq!(limit.max_requests, 10);
    }

    #[test]
    fn test_classify_write_operations() {
        let config = RateLimitConfig::default();

        let limit = classify_rate_limit("/api/posts", &Method::POST, &config);
        assert_eq!(limit.max_requests, 100);

        let limit = classify_rate_limit("/api/accounts/me/experience/1", &Method::PUT, &config);
        assert_eq!(limit.max_requests, 100);

        let limit = classify_rate_limit("/api/posts/1", &Method::DELETE, &config);
        assert_eq!(limit.max_requests, 100);
    }

    #[test]
    fn test_classify_read_operations() {
        let config = RateLimitConfig::default();

        let limit = classify_rate_limit("/api/posts", &Method::GET, &config);
        assert_eq!(limit.max_requests, 500);

        let limit = classify_rate_limit("/api/search", &Method::GET, &config);
        assert_eq!(limit.max_requests, 500);
    }

    #[test]
    fn test_exempt_paths() {
        assert!(is_exempt_path("/health"));
        assert!(is_exempt_path("/ready"));
        assert!(is_exempt_path("/metrics"));
        assert!(is_exempt_path("/uploads/avatar.png"));
        assert!(!is_exempt_path("/api/auth/login"));
        assert!(!is_exempt_path("/api/posts"));
    }

    #[test]
    fn test_rate_tier_name() {
        assert_eq!(rate_tier_name("/api/auth/login", &Method::POST), "auth");
        assert_eq!(rate_tier_name("/api/posts", &Method::POST), "write");
        assert_eq!(rate_tier_name("/api/posts", &Method::GET), "read");
    }

    #[test]
    fn test_window_key_stability() {
        // 同一窗口内调用应返回相同的 key
        let key1 = window_key(60);
        let key2 = window_key(60);
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_client_ip_from_forwarded_header() {
        let req = Request::builder()
            .uri("/api/auth/login")
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req).as_deref(), Some("203.0.113.9"));
    }
}
