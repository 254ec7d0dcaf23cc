//! 应用状态定义
//!
//! 包含 Axum 路由共享的应用状态

use std::sync::Arc;

use sqlx::PgPool;

use campus_shared::cache::Cache;
use campus_shared::config::{AuthConfig, UploadConfig};

use crate::auth::{GoogleOAuthClient, JwtManager, LogMailSender, MailSender};

/// Axum 应用共享状态
///
/// 包含数据库连接池、缓存客户端和认证组件，通过 Arc 在 handler 间共享
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL 连接池
    pub pool: PgPool,
    /// Redis 缓存客户端
    pub cache: Arc<Cache>,
    /// JWT 管理器
    pub jwt_manager: Arc<JwtManager>,
    /// Google OAuth 客户端
    pub google: Arc<GoogleOAuthClient>,
    /// OTP 邮件发送器
    pub mail_sender: Arc<dyn MailSender>,
    /// 认证配置（会话 TTL、前端地址等）
    pub auth_config: Arc<AuthConfig>,
    /// 上传配置
    pub upload_config: Arc<UploadConfig>,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(
        pool: PgPool,
        cache: Arc<Cache>,
        jwt_manager: JwtManager,
        auth_config: AuthConfig,
        upload_config: UploadConfig,
    ) -> Self {
        let google = GoogleOAuthClient::new(
            auth_config.google_client_id.clone(),
            auth_config.google_client_secret.clone(),
            auth_config.google_redirect_url.clone(),
        );

        Self {
            pool,
            cache,
            jwt_manager: Arc::new(jwt_manager),
            google: Arc::new(google),
            mail_sender: Arc::new(LogMailSender),
            auth_config: Arc::new(auth_config),
            upload_config: Arc::new(upload_config),
        }
    }
}
