//! 认证 API 处理器
//!
//! 实现注册、密码登录、Google OAuth 登录、OTP 验证码登录和登出。
//! 登录成功后签发 JWT（写入 httpOnly Cookie，同时在响应体中返回
//! 供移动端使用），并在 Redis 中写入会话标记。

use std::time::Duration;

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use campus_shared::cache::CacheKey;
use campus_shared::observability::metrics;

use crate::{
    auth::{generate_otp, hash_password, otp_expires_at, verify_password},
    dto::{AccountDto, ApiResponse, LoginRequest, OtpRequestRequest, OtpVerifyRequest, RegisterRequest},
    error::{ApiError, is_unique_violation},
    middleware::TOKEN_COOKIE,
    models::ActorType,
    state::AppState,
};

/// 账号完整查询行（含认证相关列）
#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: i64,
    role: ActorType,
    email: String,
    username: Option<String>,
    password_hash: Option<String>,
    first_name: String,
    last_name: Option<String>,
    headline: Option<String>,
    location: Option<String>,
    profile_picture: Option<String>,
    cover_image: Option<String>,
    college_name: Option<String>,
    interested_field: Option<String>,
    is_email_verified: bool,
    is_active: bool,
    otp_code: Option<String>,
    otp_expires_at: Option<DateTime<Utc>>,
    login_count: i32,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

const ACCOUNT_COLUMNS: &str = "id, role, email, username, password_hash, first_name, last_name, \
     headline, location, profile_picture, cover_image, college_name, interested_field, \
     is_email_verified, is_active, otp_code, otp_expires_at, login_count, last_login_at, created_at";

impl AccountRow {
    fn into_dto(self) -> AccountDto {
        AccountDto {
            id: self.id,
            role: self.role,
            email: self.email,
            username: self.username,
            first_name: self.first_name,
            last_name: self.last_name,
            headline: self.headline,
            location: self.location,
            profile_picture: self.profile_picture,
            cover_image: self.cover_image,
            college_name: self.college_name,
            interested_field: self.interested_field,
            is_email_verified: self.is_email_verified,
            login_count: self.login_count,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
        }
    }
}

/// 登录响应：账号信息 + Token
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub account: AccountDto,
    pub token: String,
    pub expires_at: i64,
}

/// 注册
///
/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    req.validate()?;

    let role = req.role.unwrap_or(ActorType::Student);
    let password_hash = hash_password(&req.password)?;

    let row = sqlx::query_as::<_, AccountRow>(&format!(
        r#"
        INSERT INTO accounts (role, email, username, password_hash, first_name, last_name)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {}
        "#,
        ACCOUNT_COLUMNS
    ))
    .bind(role)
    .bind(req.email.to_lowercase())
    .bind(&req.username)
    .bind(&password_hash)
    .bind(&req.first_name)
    .bind(&req.last_name)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e, "accounts_email_key") {
            ApiError::EmailTaken
        } else if is_unique_violation(&e, "accounts_username_key") {
            ApiError::UsernameTaken(req.username.clone().unwrap_or_default())
        } else {
            ApiError::Database(e)
        }
    })?;

    info!(account_id = row.id, role = %role, "账号注册成功");
    metrics::record_registration();

    issue_session(&state, row).await
}

/// 密码登录
///
/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    req.validate()?;

    let row = sqlx::query_as::<_, AccountRow>(&format!(
        "SELECT {} FROM accounts WHERE email = $1",
        ACCOUNT_COLUMNS
    ))
    .bind(req.email.to_lowercase())
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::InvalidCredentials)?;

    if !row.is_active {
        return Err(ApiError::AccountDisabled);
    }

    // 没有密码的账号（Google 注册或注册未完成）走验证码：
    // 直接下发一枚 OTP，再告知客户端切换到验证码流程
    let Some(hash) = row.password_hash.as_deref() else {
        let code = generate_otp();
        sqlx::query(
            "UPDATE accounts SET otp_code = $1, otp_expires_at = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(&code)
        .bind(otp_expires_at())
        .bind(row.id)
        .execute(&state.pool)
        .await?;
        state.mail_sender.send_otp(&row.email, &code).await?;
        return Err(ApiError::OtpRequired);
    };
    if !verify_password(&req.password, hash)? {
        return Err(ApiError::InvalidCredentials);
    }

    let row = record_login(&state, row.id).await?;
    issue_session(&state, row).await
}

/// 登出
///
/// POST /api/auth/logout
///
/// 删除 Redis 会话标记并清空 Cookie，已签发的 Token 立即失效
pub async fn logout(
    State(state): State<AppState>,
    claims: axum::Extension<crate::auth::Claims>,
) -> Result<Response, ApiError> {
    let account_id = claims.account_id()?;
    state
        .cache
        .delete(&CacheKey::session(account_id))
        .await
        .map_err(|e| ApiError::Redis(e.to_string()))?;

    info!(account_id, "账号登出");

    let mut response = Json(ApiResponse::<()>::success_empty()).into_response();
    let clear = format!("{}=; Path=/; HttpOnly; Max-Age=0; SameSite=Lax", TOKEN_COOKIE);
    if let Ok(val) = HeaderValue::from_str(&clear) {
        response.headers_mut().append(SET_COOKIE, val);
    }
    Ok(response)
}

/// 请求发送 OTP 验证码
///
/// POST /api/auth/otp/request
///
/// 为避免邮箱枚举，无论邮箱是否存在都返回成功
pub async fn otp_request(
    State(state): State<AppState>,
    Json(req): Json<OtpRequestRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    req.validate()?;

    let email = req.email.to_lowercase();
    let code = generate_otp();
    let expires_at = otp_expires_at();

    let updated = sqlx::query(
        "UPDATE accounts SET otp_code = $1, otp_expires_at = $2, updated_at = NOW() WHERE email = $3",
    )
    .bind(&code)
    .bind(expires_at)
    .bind(&email)
    .execute(&state.pool)
    .await?;

    if updated.rows_affected() > 0 {
        state.mail_sender.send_otp(&email, &code).await?;
    } else {
        warn!(email = %email, "OTP 请求的邮箱不存在");
    }

    Ok(Json(ApiResponse::<()>::success_with_message(
        (),
        "验证码已发送，请查收邮箱",
    )))
}

/// 校验 OTP 验证码并登录
///
/// POST /api/auth/otp/verify
///
/// 验证通过后标记邮箱已验证；请求中携带 password 时同时设置密码
pub async fn otp_verify(
    State(state): State<AppState>,
    Json(req): Json<OtpVerifyRequest>,
) -> Result<Response, ApiError> {
    req.validate()?;

    let email = req.email.to_lowercase();
    let row = sqlx::query_as::<_, AccountRow>(&format!(
        "SELECT {} FROM accounts WHERE email = $1",
        ACCOUNT_COLUMNS
    ))
    .bind(&email)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::InvalidCredentials)?;

    if !row.is_active {
        return Err(ApiError::AccountDisabled);
    }

    match (&row.otp_code, row.otp_expires_at) {
        (Some(code), Some(expires)) if code == &req.otp => {
            if expires < Utc::now() {
                return Err(ApiError::OtpExpired);
            }
        }
        _ => return Err(ApiError::OtpInvalid),
    }

    let new_hash = match &req.password {
        Some(p) => Some(hash_password(p)?),
        None => None,
    };

    // 验证码一次性使用，校验后立即清除
    sqlx::query(
        r#"
        UPDATE accounts
        SET otp_code = NULL, otp_expires_at = NULL, is_email_verified = TRUE,
            password_hash = COALESCE($1, password_hash), updated_at = NOW()
        WHERE id = $2
        "#,
    )
    .bind(&new_hash)
    .bind(row.id)
    .execute(&state.pool)
    .await?;

    let row = record_login(&state, row.id).await?;
    issue_session(&state, row).await
}

/// Google OAuth 回调查询参数
#[derive(Debug, Deserialize)]
pub struct GoogleCallbackQuery {
    pub code: String,
    #[serde(default)]
    pub state: Option<String>,
}

/// 跳转到 Google 授权页
///
/// GET /api/auth/google
pub async fn google_login(State(state): State<AppState>) -> Redirect {
    let url = state.google.authorize_url("login");
    Redirect::temporary(&url)
}

/// Google OAuth 回调
///
/// GET /api/auth/google/callback
///
/// 首次登录自动注册账号（默认 student 角色），之后按 google_id 匹配
pub async fn google_callback(
    State(state): State<AppState>,
    Query(query): Query<GoogleCallbackQuery>,
) -> Result<Response, ApiError> {
    let user = state.google.fetch_user(&query.code).await?;
    let email = user.email.to_lowercase();

    let existing = sqlx::query_as::<_, AccountRow>(&format!(
        "SELECT {} FROM accounts WHERE google_id = $1 OR email = $2",
        ACCOUNT_COLUMNS
    ))
    .bind(&user.id)
    .bind(&email)
    .fetch_optional(&state.pool)
    .await?;

    let row = match existing {
        Some(row) => {
            if !row.is_active {
                return Err(ApiError::AccountDisabled);
            }
            // 邮箱注册的老账号首次用 Google 登录时补全 google_id 和头像
            sqlx::query(
                r#"
                UPDATE accounts
                SET google_id = $1, is_email_verified = TRUE,
                    profile_picture = COALESCE(profile_picture, $2), updated_at = NOW()
                WHERE id = $3
                "#,
            )
            .bind(&user.id)
            .bind(&user.picture)
            .bind(row.id)
            .execute(&state.pool)
            .await?;
            row
        }
        None => {
            let first_name = user
                .given_name
                .clone()
                .unwrap_or_else(|| email.split('@').next().unwrap_or("用户").to_string());

            let row = sqlx::query_as::<_, AccountRow>(&format!(
                r#"
                INSERT INTO accounts (role, email, google_id, first_name, last_name, profile_picture, is_email_verified)
                VALUES ('student', $1, $2, $3, $4, $5, TRUE)
                RETURNING {}
                "#,
                ACCOUNT_COLUMNS
            ))
            .bind(&email)
            .bind(&user.id)
            .bind(&first_name)
            .bind(&user.family_name)
            .bind(&user.picture)
            .fetch_one(&state.pool)
            .await?;

            info!(account_id = row.id, "Google 登录自动注册账号");
            metrics::record_registration();
            row
        }
    };

    let row = record_login(&state, row.id).await?;

    // 浏览器在回调地址上，签发会话后跳回前端
    let (token, _expires_at) = state
        .jwt_manager
        .generate_token(row.id, row.role, &row.email)?;
    state
        .cache
        .set(
            &CacheKey::session(row.id),
            &"1",
            Duration::from_secs(state.auth_config.session_ttl_secs),
        )
        .await
        .map_err(|e| ApiError::Redis(e.to_string()))?;

    let mut response = Redirect::temporary(&state.auth_config.frontend_url).into_response();
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; Max-Age={}; SameSite=Lax",
        TOKEN_COOKIE,
        token,
        state.jwt_manager.expires_in_secs()
    );
    if let Ok(val) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(SET_COOKIE, val);
    }
    Ok(response)
}

/// 更新登录统计并重新加载账号
async fn record_login(state: &AppState, account_id: i64) -> Result<AccountRow, ApiError> {
    let row = sqlx::query_as::<_, AccountRow>(&format!(
        r#"
        UPDATE accounts
        SET login_count = login_count + 1, last_login_at = NOW(), updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        ACCOUNT_COLUMNS
    ))
    .bind(account_id)
    .fetch_one(&state.pool)
    .await?;

    metrics::record_login();
    Ok(row)
}

/// 签发 JWT、写入 Redis 会话标记并设置 Cookie
async fn issue_session(state: &AppState, row: AccountRow) -> Result<Response, ApiError> {
    let (token, expires_at) = state
        .jwt_manager
        .generate_token(row.id, row.role, &row.email)?;

    state
        .cache
        .set(
            &CacheKey::session(row.id),
            &"1",
            Duration::from_secs(state.auth_config.session_ttl_secs),
        )
        .await
        .map_err(|e| ApiError::Redis(e.to_string()))?;

    let payload = AuthPayload {
        account: row.into_dto(),
        token: token.clone(),
        expires_at,
    };

    let mut response = (
        StatusCode::OK,
        Json(ApiResponse::success_with_message(payload, "登录成功")),
    )
        .into_response();

    let cookie = format!(
        "{}={}; Path=/; HttpOnly; Max-Age={}; SameSite=Lax",
        TOKEN_COOKIE,
        token,
        state.jwt_manager.expires_in_secs()
    );
    if let Ok(val) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(SET_COOKIE, val);
    }

    Ok(response)
}

/// 返回响应头中 Set-Cookie 的 token 值，测试用
#[cfg(test)]
fn cookie_token(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(SET_COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|c| c.split(';').next())
        .and_then(|kv| kv.strip_prefix(&format!("{}=", TOKEN_COOKIE)).map(String::from))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderMap;

    use super::*;

    #[test]
    fn test_cookie_token_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            SET_COOKIE,
            HeaderValue::from_static("token=abc.def; Path=/; HttpOnly"),
        );
        assert_eq!(cookie_token(&headers).as_deref(), Some("abc.def"));
    }

    #[test]
    fn test_auth_payload_serializes_camel_case() {
        let payload = AuthPayload {
            account: AccountDto {
                id: 1,
                role: ActorType::Student,
                email: "a@example.com".to_string(),
                username: None,
                first_name: "A".to_string(),
                last_name: None,
                headline: None,
                location: None,
                profile_picture: None,
                cover_image: None,
                college_name: None,
                interested_field: None,
                is_email_verified: true,
                login_count: 1,
                last_login_at: None,
                created_at: Utc::now(),
            },
            token: "t".to_string(),
            expires_at: 0,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("expiresAt").is_some());
        assert_eq!(json["account"]["isEmailVerified"], true);
    }

    /// 重复邮箱注册被唯一约束拒绝且不产生第二行，
    /// 约束冲突映射为 EmailTaken（HTTP 400）
    #[tokio::test]
    #[ignore] // 需要数据库连接
    async fn test_duplicate_email_inserts_nothing() {
        let config = campus_shared::config::DatabaseConfig::default();
        let db = campus_shared::database::Database::connect(&config)
            .await
            .unwrap();
        db.run_migrations().await.unwrap();
        let pool = db.pool().clone();

        let email = format!("dup-{}@test.local", uuid::Uuid::now_v7());
        let insert = |pool: sqlx::PgPool, email: String| async move {
            sqlx::query(
                "INSERT INTO accounts (role, email, first_name, password_hash) \
                 VALUES ('student', $1, '张三', 'hash')",
            )
            .bind(email)
            .execute(&pool)
            .await
        };

        insert(pool.clone(), email.clone()).await.unwrap();
        let err = insert(pool.clone(), email.clone()).await.unwrap_err();

        // 与 register 相同的错误映射路径
        assert!(is_unique_violation(&err, "accounts_email_key"));
        let mapped = ApiError::EmailTaken;
        assert_eq!(mapped.status_code(), StatusCode::BAD_REQUEST);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE email = $1")
            .bind(&email)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
