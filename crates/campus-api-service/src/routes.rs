//! 路由配置模块
//!
//! 定义所有 REST API 端点的路由映射

use axum::{
    Router,
    routing::{delete, get, post, put},
};

use crate::{handlers, state::AppState};

/// 认证路由（除 logout 外均为公开路由）
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/otp/request", post(handlers::auth::otp_request))
        .route("/auth/otp/verify", post(handlers::auth::otp_verify))
        .route("/auth/google", get(handlers::auth::google_login))
        .route("/auth/google/callback", get(handlers::auth::google_callback))
}

/// 账号与档案路由
pub fn account_routes() -> Router<AppState> {
    Router::new()
        // 当前账号
        .route("/accounts/me", get(handlers::account::get_me))
        .route("/accounts/me", put(handlers::account::update_me))
        .route("/accounts/check-username", get(handlers::account::check_username))
        // 工作经历
        .route("/accounts/me/experience", post(handlers::experience::create))
        .route("/accounts/me/experience/{id}", put(handlers::experience::update))
        .route("/accounts/me/experience/{id}", delete(handlers::experience::delete))
        // 教育经历
        .route("/accounts/me/education", post(handlers::education::create))
        .route("/accounts/me/education/{id}", put(handlers::education::update))
        .route("/accounts/me/education/{id}", delete(handlers::education::delete))
        // 技能
        .route("/accounts/me/skills", post(handlers::skill::create))
        .route("/accounts/me/skills/{id}", delete(handlers::skill::delete))
        // 项目
        .route("/accounts/me/projects", post(handlers::project::create))
        .route("/accounts/me/projects/{id}", put(handlers::project::update))
        .route("/accounts/me/projects/{id}", delete(handlers::project::delete))
        // 证书
        .route("/accounts/me/certifications", post(handlers::certification::create))
        .route("/accounts/me/certifications/{id}", put(handlers::certification::update))
        .route("/accounts/me/certifications/{id}", delete(handlers::certification::delete))
        // 个人简介
        .route("/accounts/me/about", put(handlers::about::upsert))
        // 他人主页（读路径，走缓存）
        .route("/accounts/{id}", get(handlers::account::get_public_profile))
        .route("/accounts/{id}/experience", get(handlers::experience::list))
        .route("/accounts/{id}/education", get(handlers::education::list))
        .route("/accounts/{id}/skills", get(handlers::skill::list))
        .route("/accounts/{id}/projects", get(handlers::project::list))
        .route("/accounts/{id}/certifications", get(handlers::certification::list))
        .route("/accounts/{id}/about", get(handlers::about::get))
        .route("/accounts/{id}/posts", get(handlers::post::list_by_account))
}

/// 动态路由
pub fn post_routes() -> Router<AppState> {
    Router::new()
        .route("/posts", get(handlers::post::feed))
        .route("/posts", post(handlers::post::create))
        .route("/posts/saved", get(handlers::engagement::list_saved))
        .route("/posts/mine", get(handlers::post::list_mine))
        .route("/posts/{id}", get(handlers::post::get))
        .route("/posts/{id}", put(handlers::post::update))
        .route("/posts/{id}", delete(handlers::post::delete))
        // 互动
        .route("/posts/{id}/react", post(handlers::engagement::toggle_reaction))
        .route("/posts/{id}/share", post(handlers::engagement::toggle_share))
        .route("/posts/{id}/save", post(handlers::engagement::toggle_save))
        .route("/posts/{id}/repost", post(handlers::engagement::repost))
        .route("/posts/{id}/report", post(handlers::engagement::report))
        .route("/posts/{id}/comments", get(handlers::engagement::list_comments))
        .route("/posts/{id}/comments", post(handlers::engagement::create_comment))
        .route(
            "/posts/{id}/comments/{comment_id}",
            delete(handlers::engagement::delete_comment),
        )
}

/// 人脉网络路由
pub fn network_routes() -> Router<AppState> {
    Router::new()
        .route("/network/pings", post(handlers::network::send_ping))
        .route("/network/pings/received", get(handlers::network::list_received))
        .route("/network/pings/sent", get(handlers::network::list_sent))
        .route("/network/pings/{id}/accept", post(handlers::network::accept_ping))
        .route("/network/pings/{id}/decline", post(handlers::network::decline_ping))
        .route("/network/pings/{id}/ignore", post(handlers::network::ignore_ping))
        .route("/network/connections", get(handlers::network::list_connections))
        .route("/network/status/{id}", get(handlers::network::ping_status))
}

/// 通知路由
pub fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(handlers::notification::list))
        .route("/notifications/unread-count", get(handlers::notification::unread_count))
        .route("/notifications/mark-read", post(handlers::notification::mark_read))
        .route("/notifications/subscribe", post(handlers::notification::subscribe))
        .route("/notifications/unsubscribe", post(handlers::notification::unsubscribe))
}

/// 搜索和上传路由
pub fn misc_routes() -> Router<AppState> {
    Router::new()
        .route("/search", get(handlers::search::search))
        .route("/uploads", post(handlers::upload::upload))
}

/// 汇总所有业务路由，统一挂在 /api 前缀下
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(auth_routes())
        .merge(account_routes())
        .merge(post_routes())
        .merge(network_routes())
        .merge(notification_routes())
        .merge(misc_routes())
}
