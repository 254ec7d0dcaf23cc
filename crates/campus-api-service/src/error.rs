//! API 服务错误类型定义
//!
//! 包含所有 campus-api-service 特有的错误类型

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use campus_shared::error::SharedError;
use serde_json::json;

/// API 服务错误类型
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // 认证错误
    #[error("未授权: {0}")]
    Unauthorized(String),
    #[error("禁止访问: {0}")]
    Forbidden(String),
    #[error("邮箱或密码错误")]
    InvalidCredentials,
    #[error("账号已被禁用")]
    AccountDisabled,
    #[error("该账号尚未设置密码，请通过验证码登录")]
    OtpRequired,
    #[error("验证码错误")]
    OtpInvalid,
    #[error("验证码已过期，请重新获取")]
    OtpExpired,

    // 注册冲突
    #[error("邮箱已被注册")]
    EmailTaken,
    #[error("用户名已被占用: {0}")]
    UsernameTaken(String),

    // 验证错误
    #[error("参数验证失败: {0}")]
    Validation(String),

    // 资源不存在
    #[error("账号不存在: {0}")]
    AccountNotFound(i64),
    #[error("帖子不存在: {0}")]
    PostNotFound(i64),
    #[error("连接请求不存在: {0}")]
    PingNotFound(i64),
    #[error("资源不存在: {0}")]
    NotFound(String),

    // 业务错误
    #[error("不能向自己发送连接请求")]
    SelfPing,
    #[error("连接请求已存在或等待处理")]
    PingAlreadyExists,
    #[error("连接请求已处理，无法重复操作")]
    PingAlreadyResolved,
    #[error("已转发过该帖子")]
    AlreadyReposted,
    #[error("操作频率超限，请稍后重试")]
    RateLimited,
    #[error("文件处理失败: {0}")]
    FileProcessingError(String),
    #[error("不支持的文件类型: {0}")]
    UnsupportedMediaType(String),
    #[error("文件超出大小限制")]
    PayloadTooLarge,

    // 系统错误
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Redis错误: {0}")]
    Redis(String),
    #[error("外部服务错误: {service} - {message}")]
    ExternalService { service: String, message: String },
    #[error("内部错误: {0}")]
    Internal(String),
}

impl ApiError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 认证错误
            Self::Unauthorized(_) | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::AccountDisabled => StatusCode::FORBIDDEN,
            // OTP 流程属于请求方可修复的错误
            Self::OtpRequired | Self::OtpInvalid | Self::OtpExpired => StatusCode::BAD_REQUEST,

            Self::EmailTaken | Self::UsernameTaken(_) | Self::Validation(_) | Self::SelfPing => {
                StatusCode::BAD_REQUEST
            }
            Self::AlreadyReposted => StatusCode::BAD_REQUEST,

            Self::AccountNotFound(_)
            | Self::PostNotFound(_)
            | Self::PingNotFound(_)
            | Self::NotFound(_) => StatusCode::NOT_FOUND,

            // 请求合法但与当前状态冲突
            Self::PingAlreadyExists | Self::PingAlreadyResolved => StatusCode::CONFLICT,

            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,

            Self::FileProcessingError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,

            Self::Database(_)
            | Self::Redis(_)
            | Self::ExternalService { .. }
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::AccountDisabled => "ACCOUNT_DISABLED",
            Self::OtpRequired => "OTP_REQUIRED",
            Self::OtpInvalid => "OTP_INVALID",
            Self::OtpExpired => "OTP_EXPIRED",
            Self::EmailTaken => "EMAIL_TAKEN",
            Self::UsernameTaken(_) => "USERNAME_TAKEN",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::PostNotFound(_) => "POST_NOT_FOUND",
            Self::PingNotFound(_) => "PING_NOT_FOUND",
            Self::NotFound(_) => "NOT_FOUND",
            Self::SelfPing => "SELF_PING",
            Self::PingAlreadyExists => "PING_ALREADY_EXISTS",
            Self::PingAlreadyResolved => "PING_ALREADY_RESOLVED",
            Self::AlreadyReposted => "ALREADY_REPOSTED",
            Self::RateLimited => "RATE_LIMITED",
            Self::FileProcessingError(_) => "FILE_PROCESSING_ERROR",
            Self::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Redis(_) => "REDIS_ERROR",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志，防止信息泄露
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "数据库操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Redis(e) => {
                tracing::error!(error = %e, "Redis 操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::ExternalService { service, message } => {
                tracing::error!(service = %service, error = %message, "外部服务调用失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "内部错误");
                "服务内部错误，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

/// 从 validator 错误转换
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

/// 从 JSON 序列化错误转换
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON 处理错误: {}", err))
    }
}

/// 从共享基础设施错误转换
impl From<SharedError> for ApiError {
    fn from(err: SharedError) -> Self {
        match err {
            SharedError::Database(e) => Self::Database(e),
            SharedError::Redis(e) => Self::Redis(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// 判断 sqlx 错误是否为指定唯一约束冲突
///
/// ping 创建路径依赖 pair_key 唯一索引将并发重复请求转为约束冲突，
/// 此函数负责把冲突识别出来交给调用方映射为 409。
pub fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}

/// 服务层 Result 类型别名
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    /// 构造所有可简单构造的错误变体及其期望的 (StatusCode, error_code) 映射。
    /// 表驱动方式避免逐个变体写重复断言，新增变体时只需在一处维护。
    fn all_error_variants() -> Vec<(ApiError, StatusCode, &'static str)> {
        vec![
            (ApiError::Unauthorized("token expired".into()), StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            (ApiError::Forbidden("not owner".into()), StatusCode::FORBIDDEN, "FORBIDDEN"),
            (ApiError::InvalidCredentials, StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            (ApiError::AccountDisabled, StatusCode::FORBIDDEN, "ACCOUNT_DISABLED"),
            (ApiError::OtpRequired, StatusCode::BAD_REQUEST, "OTP_REQUIRED"),
            (ApiError::OtpInvalid, StatusCode::BAD_REQUEST, "OTP_INVALID"),
            (ApiError::OtpExpired, StatusCode::BAD_REQUEST, "OTP_EXPIRED"),
            (ApiError::EmailTaken, StatusCode::BAD_REQUEST, "EMAIL_TAKEN"),
            (ApiError::UsernameTaken("neo".into()), StatusCode::BAD_REQUEST, "USERNAME_TAKEN"),
            (ApiError::Validation("email invalid".into()), StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            (ApiError::AccountNotFound(7), StatusCode::NOT_FOUND, "ACCOUNT_NOT_FOUND"),
            (ApiError::PostNotFound(11), StatusCode::NOT_FOUND, "POST_NOT_FOUND"),
            (ApiError::PingNotFound(13), StatusCode::NOT_FOUND, "PING_NOT_FOUND"),
            (ApiError::NotFound("media".into()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (ApiError::SelfPing, StatusCode::BAD_REQUEST, "SELF_PING"),
            (ApiError::PingAlreadyExists, StatusCode::CONFLICT, "PING_ALREADY_EXISTS"),
            (ApiError::PingAlreadyResolved, StatusCode::CONFLICT, "PING_ALREADY_RESOLVED"),
            (ApiError::AlreadyReposted, StatusCode::BAD_REQUEST, "ALREADY_REPOSTED"),
            (ApiError::RateLimited, StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            (ApiError::FileProcessingError("corrupt".into()), StatusCode::UNPROCESSABLE_ENTITY, "FILE_PROCESSING_ERROR"),
            (ApiError::UnsupportedMediaType("text/html".into()), StatusCode::UNSUPPORTED_MEDIA_TYPE, "UNSUPPORTED_MEDIA_TYPE"),
            (ApiError::PayloadTooLarge, StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            (ApiError::Redis("connection refused".into()), StatusCode::INTERNAL_SERVER_ERROR, "REDIS_ERROR"),
            (ApiError::Internal("unexpected state".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        ]
    }

    /// 确保每个错误变体都映射到正确的 HTTP 状态码。
    /// 状态码错误会导致前端误判请求结果，所以需要逐一验证。
    #[test]
    fn test_all_variants_status_code() {
        for (error, expected_status, label) in all_error_variants() {
            assert_eq!(
                error.status_code(),
                expected_status,
                "状态码不匹配: variant={label}"
            );
        }
    }

    /// 错误码是 API 契约的一部分，客户端用它做条件分支。
    /// 任何错误码变更都是破坏性变更，必须逐一锁定。
    #[test]
    fn test_all_variants_error_code() {
        for (error, _status, expected_code) in all_error_variants() {
            assert_eq!(
                error.error_code(),
                expected_code,
                "错误码不匹配: expected={expected_code}"
            );
        }
    }

    /// IntoResponse 是错误到 HTTP 响应的最终出口。
    /// 必须验证响应体结构完整（success/code/message/data 四字段）。
    #[tokio::test]
    async fn test_into_response_body_structure() {
        let test_cases: Vec<(ApiError, StatusCode, &str)> = vec![
            (ApiError::InvalidCredentials, StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            (ApiError::EmailTaken, StatusCode::BAD_REQUEST, "EMAIL_TAKEN"),
            (ApiError::PingAlreadyExists, StatusCode::CONFLICT, "PING_ALREADY_EXISTS"),
            (ApiError::PostNotFound(5), StatusCode::NOT_FOUND, "POST_NOT_FOUND"),
            (ApiError::Internal("crash".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        ];

        for (error, expected_status, expected_code) in test_cases {
            let label = format!("{:?}", error);
            let response = error.into_response();

            assert_eq!(response.status(), expected_status, "响应状态码不匹配: {label}");

            let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .expect("读取响应体失败");
            let body: serde_json::Value =
                serde_json::from_slice(&body_bytes).expect("响应体不是合法 JSON");

            assert_eq!(body["success"], json!(false), "success 字段应为 false: {label}");
            assert_eq!(body["code"], json!(expected_code), "code 字段不匹配: {label}");
            assert!(!body["message"].as_str().unwrap_or("").is_empty(), "message 不应为空: {label}");
            assert!(body["data"].is_null(), "data 字段应为 null: {label}");
        }
    }

    /// 系统级错误的响应消息不应泄露内部细节，只返回通用提示。
    /// 这是安全要求，防止攻击者通过错误消息探测系统架构。
    #[tokio::test]
    async fn test_system_errors_hide_internal_details() {
        let system_errors: Vec<(ApiError, &str)> = vec![
            (ApiError::Redis("redis://10.0.0.1:6379 connection refused".into()), "redis://10.0.0.1:6379"),
            (ApiError::Internal("stack overflow at module X".into()), "stack overflow"),
            (
                ApiError::ExternalService {
                    service: "google-oauth".into(),
                    message: "invalid_client secret=abc".into(),
                },
                "secret=abc",
            ),
        ];

        for (error, leaked_detail) in system_errors {
            let response = error.into_response();
            let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .expect("读取响应体失败");
            let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
            let message = body["message"].as_str().unwrap();

            assert!(
                !message.contains(leaked_detail),
                "系统错误消息泄露了内部细节: message={message}, leaked={leaked_detail}"
            );
            assert!(
                message.contains("服务内部错误"),
                "系统错误应返回统一的通用提示，实际: {message}"
            );
        }
    }

    /// 业务错误的响应消息应保留原始描述，帮助用户理解问题
    #[tokio::test]
    async fn test_business_errors_preserve_display_message() {
        let business_errors: Vec<(ApiError, &str)> = vec![
            (ApiError::Unauthorized("token expired".into()), "token expired"),
            (ApiError::UsernameTaken("neo".into()), "neo"),
            (ApiError::PostNotFound(42), "42"),
            (ApiError::Validation("content is required".into()), "content is required"),
        ];

        for (error, expected_fragment) in business_errors {
            let response = error.into_response();
            let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .expect("读取响应体失败");
            let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
            let message = body["message"].as_str().unwrap();

            assert!(
                message.contains(expected_fragment),
                "业务错误消息应包含上下文: message={message}, expected={expected_fragment}"
            );
        }
    }

    /// validator 是请求参数校验的统一入口，转换必须把字段级错误信息带入，
    /// 否则用户无法知道哪个字段校验失败。
    #[test]
    fn test_from_validation_errors() {
        use validator::{ValidationError, ValidationErrors};

        let mut errors = ValidationErrors::new();
        let mut field_error = ValidationError::new("length");
        field_error.message = Some("邮箱格式不正确".into());
        errors.add("email", field_error);

        let api_error: ApiError = errors.into();
        match &api_error {
            ApiError::Validation(msg) => {
                assert!(msg.contains("email"), "转换后应保留字段名: {msg}");
            }
            other => panic!("期望 Validation 变体，实际: {:?}", other),
        }

        assert_eq!(api_error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(api_error.error_code(), "VALIDATION_ERROR");
    }

    /// SharedError 的 Database 变体应保持为 ApiError::Database，
    /// 避免被路由到 Internal 丢失分类。
    #[test]
    fn test_from_shared_error() {
        let shared = SharedError::Database(sqlx::Error::RowNotFound);
        let api: ApiError = shared.into();
        assert!(matches!(api, ApiError::Database(_)));
        assert_eq!(api.error_code(), "DATABASE_ERROR");

        let shared = SharedError::Internal("x".into());
        let api: ApiError = shared.into();
        assert!(matches!(api, ApiError::Internal(_)));
    }

    /// 非数据库错误不应被误判为唯一约束冲突
    #[test]
    fn test_is_unique_violation_rejects_other_errors() {
        assert!(!is_unique_violation(
            &sqlx::Error::RowNotFound,
            "ping_networks_pair_key_key"
        ));
        assert!(!is_unique_violation(
            &sqlx::Error::PoolTimedOut,
            "ping_networks_pair_key_key"
        ));
    }
}
