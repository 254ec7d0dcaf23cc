//! 校园社交平台后端服务入口
//!
//! 初始化配置、可观测性、数据库和缓存，装配路由与中间件，
//! 启动推送投递 Worker 并以优雅关闭方式运行 HTTP 服务。

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Request,
    http::HeaderValue,
    middleware,
    middleware::Next,
    response::Response,
    routing::get,
};
use tokio::net::TcpListener;
use tower_http::{cors::{Any, CorsLayer}, services::ServeDir};
use tracing::{info, warn};

use campus_api_service::{
    auth::{JwtConfig, JwtManager},
    middleware::{auth_middleware, rate_limit_middleware},
    routes,
    state::AppState,
    worker::{HttpPushSender, PushWorker},
};
use campus_shared::{
    cache::Cache,
    config::AppConfig,
    database::Database,
    observability::{self, middleware as obs_middleware},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 统一加载配置：config/*.toml 叠加 CAMPUS_ 前缀环境变量
    let config = AppConfig::load("campus-api-service").unwrap_or_default();

    let _guard = observability::init(&config.service_name, &config.observability).await?;

    info!("Starting campus-api-service on {}", config.server_addr());

    // 初始化基础设施
    let db = Database::connect(&config.database).await?;
    db.run_migrations().await?;
    let cache = Arc::new(Cache::new(&config.redis)?);

    // JWT 密钥：生产环境必须通过环境变量注入，开发环境允许配置默认值
    let jwt_secret = std::env::var("CAMPUS_JWT_SECRET").unwrap_or_else(|_| {
        if config.is_production() {
            panic!("CAMPUS_JWT_SECRET must be set in production environment");
        }
        warn!("Using default JWT secret - set CAMPUS_JWT_SECRET for production");
        config.auth.jwt_secret.clone()
    });
    let jwt_config = JwtConfig {
        secret: jwt_secret,
        expires_in_secs: config.auth.jwt_expires_in_secs,
        issuer: config.auth.jwt_issuer.clone(),
    };

    let state = AppState::new(
        db.pool().clone(),
        cache.clone(),
        JwtManager::new(jwt_config),
        config.auth.clone(),
        config.uploads.clone(),
    );

    // 启动推送投递 Worker
    let push_worker_pool = db.pool().clone();
    tokio::spawn(async move {
        let worker =
            PushWorker::with_defaults(push_worker_pool, Arc::new(HttpPushSender::new()));
        worker.run().await;
    });

    // CORS：默认允许前端地址，可通过 CAMPUS_CORS_ORIGINS 覆盖
    let allowed_origins = std::env::var("CAMPUS_CORS_ORIGINS")
        .unwrap_or_else(|_| config.auth.frontend_url.clone());

    let cors = if allowed_origins == "*" {
        if config.is_production() {
            warn!("CAMPUS_CORS_ORIGINS=\"*\" 在生产环境中不安全，请设置为具体域名");
        }
        info!("CORS allowed_origins: * (all origins)");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        info!("CORS allowed_origins: {}", allowed_origins);
        let origins: Vec<_> = allowed_origins
            .split(',')
            .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let uploads_dir = config.uploads.dir.clone();

    let app = Router::new()
        .nest("/api", routes::api_routes())
        // 上传文件静态托管
        .nest_service("/uploads", ServeDir::new(uploads_dir))
        .route("/health", get(health_check))
        .route(
            "/ready",
            get({
                let db_for_ready = db;
                let cache_for_ready = cache;
                move || readiness_check(db_for_ready.clone(), cache_for_ready.clone())
            }),
        )
        // 限流中间件：位于 auth 之后，可按账号维度计数
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        // HTTP 安全头：纵深防御，即使反向代理未配置也确保基本安全策略生效
        .layer(middleware::from_fn(security_headers))
        .layer(cors)
        // 认证中间件：验证 JWT Token 和 Redis 会话标记
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        // 可观测性中间件：请求追踪和指标收集
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    // 优雅关闭：收到 SIGTERM（K8s 停止 Pod）或 Ctrl+C 时，
    // 停止接收新连接并等待已有请求处理完毕
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");

    Ok(())
}

/// 为所有响应注入 HTTP 安全头
///
/// 确保即使上游反向代理（如 Nginx/Envoy）未正确配置，
/// 应用层仍能提供基本的浏览器安全策略。
async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    // 禁止浏览器猜测 Content-Type，防止将非可执行内容误判为脚本执行
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    // 禁止页面被嵌入 iframe，防止点击劫持攻击
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    // 强制浏览器后续访问只使用 HTTPS，有效期一年且包含子域名
    headers.insert(
        "strict-transport-security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    // 现代浏览器已内置 XSS 过滤，旧的 X-XSS-Protection 反而可能引入侧信道漏洞，
    // 设为 0 显式禁用，安全策略应依赖 CSP（Content-Security-Policy）
    headers.insert("x-xss-protection", HeaderValue::from_static("0"));
    response
}

/// 监听关闭信号
///
/// K8s 通过 SIGTERM 通知 Pod 停止；本地开发通过 Ctrl+C。
/// 收到任一信号后返回，触发 axum 的优雅关闭流程。
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("注册 Ctrl+C 处理器失败");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("注册 SIGTERM 处理器失败")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}

/// 存活探针：服务进程正常即返回 ok
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "campus-api-service"
    }))
}

/// 就绪探针：检查数据库和 Redis 连接是否可用
///
/// K8s 就绪探针失败时会将 Pod 从 Service 端点移除，
/// 避免将流量路由到无法正常处理请求的实例。
async fn readiness_check(db: Database, cache: Arc<Cache>) -> Json<serde_json::Value> {
    let db_ok = db.health_check().await.is_ok();
    let cache_ok = cache.health_check().await.is_ok();
    let all_ok = db_ok && cache_ok;

    Json(serde_json::json!({
        "status": if all_ok { "ok" } else { "degraded" },
        "service": "campus-api-service",
        "checks": {
            "database": if db_ok { "ok" } else { "fail" },
            "redis": if cache_ok { "ok" } else { "fail" }
        }
    }))
}
