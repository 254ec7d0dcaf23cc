//! JWT 认证中间件
//!
//! 支持两种凭证携带方式：httpOnly Cookie（浏览器端）和
//! Authorization Bearer（移动端 / API 调用）。验证通过后还会检查
//! Redis 中的会话标记，登出后的 Token 即使未过期也会被拒绝。

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::warn;

use campus_shared::cache::CacheKey;

use crate::auth::Claims;
use crate::state::AppState;

/// Cookie 中存放 Token 的字段名
pub const TOKEN_COOKIE: &str = "token";

/// 认证中间件
///
/// 从 Cookie 或 Authorization header 中提取 Token，验证后将 Claims
/// 注入请求扩展。公开路由（注册、登录、健康检查）跳过验证。
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path();

    if is_public_path(path) {
        return next.run(request).await;
    }

    let token = match extract_token(&request) {
        Some(t) => t,
        None => return unauthorized_response("缺少认证 Token"),
    };

    let claims = match state.jwt_manager.verify_token(&token) {
        Ok(claims) => claims,
        Err(e) => return unauthorized_response(&e.to_string()),
    };

    let account_id = match claims.account_id() {
        Ok(id) => id,
        Err(e) => return unauthorized_response(&e.to_string()),
    };

    // 会话标记校验：登出时删除标记即可立即失效全部 Token
    let session_key = CacheKey::session(account_id);
    match state.cache.exists(&session_key).await {
        Ok(true) => {}
        Ok(false) => return unauthorized_response("会话已失效，请重新登录"),
        Err(e) => {
            // Redis 不可用时降级为仅 JWT 校验，避免认证服务整体不可用
            warn!(error = %e, "会话标记检查失败，降级为 JWT 校验");
        }
    }

    request.extensions_mut().insert(claims);
    next.run(request).await
}

/// 公开路由列表（不需要认证）
///
/// 登出需要知道当前账号才能删除会话标记，不在公开列表中
fn is_public_path(path: &str) -> bool {
    matches!(path, "/health" | "/ready" | "/metrics")
        || (path.starts_with("/api/auth/") && path != "/api/auth/logout")
        || path.starts_with("/uploads/")
}

/// 提取 Token：优先 Authorization Bearer，其次 Cookie
fn extract_token(request: &Request<Body>) -> Option<String> {
    let headers = request.headers();

    if let Some(header) = headers.get("Authorization").and_then(|h| h.to_str().ok()) {
        if let Some(token) = header.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }

    let cookie_header = headers.get("Cookie").and_then(|h| h.to_str().ok())?;
    for pair in cookie_header.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        if parts.next() == Some(TOKEN_COOKIE) {
            return parts.next().map(|v| v.to_string());
        }
    }
    None
}

/// 生成 401 未授权响应
fn unauthorized_response(message: &str) -> Response {
    let body = json!({
        "success": false,
        "code": "UNAUTHORIZED",
        "message": message,
        "data": null
    });

    (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_headers(headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder().uri("/api/posts");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_public_paths() {
        assert!(is_public_path("/health"));
        assert!(is_public_path("/api/auth/login"));
        assert!(is_public_path("/api/auth/google/callback"));
        assert!(is_public_path("/uploads/avatar.png"));
        assert!(!is_public_path("/api/auth/logout"));
        assert!(!is_public_path("/api/posts"));
        assert!(!is_public_path("/api/network/pings"));
    }

    #[test]
    fn test_extract_bearer_token() {
        let req = request_with_headers(&[("Authorization", "Bearer abc.def.ghi")]);
        assert_eq!(extract_token(&req).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_extract_cookie_token() {
        let req = request_with_headers(&[("Cookie", "theme=dark; token=abc.def.ghi; lang=zh")]);
        assert_eq!(extract_token(&req).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_bearer_takes_precedence_over_cookie() {
        let req = request_with_headers(&[
            ("Authorization", "Bearer from-header"),
            ("Cookie", "token=from-cookie"),
        ]);
        assert_eq!(extract_token(&req).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_missing_token() {
        let req = request_with_headers(&[("Cookie", "theme=dark")]);
        assert!(extract_token(&req).is_none());
    }
}
