//! 账号 API 处理器
//!
//! 当前账号信息读取与更新、他人公开主页。公开主页走旁路缓存，
//! 基本信息更新时同步删除缓存键。

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::Serialize;
use tracing::{info, warn};
use validator::Validate;

use campus_shared::cache::{CacheKey, PROFILE_CACHE_TTL};
use campus_shared::error::SharedError;

use crate::{
    auth::Claims,
    dto::{ApiResponse, CheckUsernameQuery, PublicAccountDto, UpdateAccountRequest},
    error::{ApiError, is_unique_violation},
    handlers::{PUBLIC_ACCOUNT_COLUMNS, PublicAccountRow},
    state::AppState,
};

/// 获取当前账号信息
///
/// GET /api/accounts/me
pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<crate::dto::AccountDto>>, ApiError> {
    let account_id = claims.account_id()?;

    let row = sqlx::query_as::<_, MeRow>(
        r#"
        SELECT id, role, email, username, first_name, last_name, headline, location,
               profile_picture, cover_image, college_name, interested_field,
               is_email_verified, login_count, last_login_at, created_at
        FROM accounts
        WHERE id = $1 AND is_active = TRUE
        "#,
    )
    .bind(account_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::AccountNotFound(account_id))?;

    Ok(Json(ApiResponse::success(row.into_dto())))
}

/// 更新当前账号基本信息
///
/// PUT /api/accounts/me
///
/// 仅更新请求中出现的字段（COALESCE 语义）
pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateAccountRequest>,
) -> Result<Json<ApiResponse<crate::dto::AccountDto>>, ApiError> {
    req.validate()?;
    let account_id = claims.account_id()?;

    let row = sqlx::query_as::<_, MeRow>(
        r#"
        UPDATE accounts
        SET first_name = COALESCE($1, first_name),
            last_name = COALESCE($2, last_name),
            username = COALESCE($3, username),
            headline = COALESCE($4, headline),
            location = COALESCE($5, location),
            college_name = COALESCE($6, college_name),
            interested_field = COALESCE($7, interested_field),
            profile_picture = COALESCE($8, profile_picture),
            cover_image = COALESCE($9, cover_image),
            updated_at = NOW()
        WHERE id = $10 AND is_active = TRUE
        RETURNING id, role, email, username, first_name, last_name, headline, location,
                  profile_picture, cover_image, college_name, interested_field,
                  is_email_verified, login_count, last_login_at, created_at
        "#,
    )
    .bind(&req.first_name)
    .bind(&req.last_name)
    .bind(&req.username)
    .bind(&req.headline)
    .bind(&req.location)
    .bind(&req.college_name)
    .bind(&req.interested_field)
    .bind(&req.profile_picture)
    .bind(&req.cover_image)
    .bind(account_id)
    .fetch_optional(&state.pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e, "accounts_username_key") {
            ApiError::UsernameTaken(req.username.clone().unwrap_or_default())
        } else {
            ApiError::Database(e)
        }
    })?
    .ok_or(ApiError::AccountNotFound(account_id))?;

    // 基本信息变化会影响公开主页缓存，删除失败仅记录日志（下次读取会重新回填）
    if let Err(e) = state
        .cache
        .delete(&CacheKey::public_profile(account_id))
        .await
    {
        warn!(error = %e, account_id, "删除公开主页缓存失败");
    }

    info!(account_id, "账号基本信息已更新");
    Ok(Json(ApiResponse::success(row.into_dto())))
}

/// 用户名可用性查询结果
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsernameAvailabilityDto {
    pub username: String,
    pub available: bool,
}

/// 检查用户名是否可用
///
/// GET /api/accounts/check-username?username=xxx
pub async fn check_username(
    State(state): State<AppState>,
    Query(query): Query<CheckUsernameQuery>,
) -> Result<Json<ApiResponse<UsernameAvailabilityDto>>, ApiError> {
    query.validate()?;

    let taken: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM accounts WHERE username = $1)")
            .bind(&query.username)
            .fetch_one(&state.pool)
            .await?;

    Ok(Json(ApiResponse::success(UsernameAvailabilityDto {
        username: query.username,
        available: !taken,
    })))
}

/// 查看公开主页
///
/// GET /api/accounts/{id}
///
/// 读路径走旁路缓存，TTL 300 秒
pub async fn get_public_profile(
    State(state): State<AppState>,
    Path(account_id): Path<i64>,
) -> Result<Json<ApiResponse<PublicAccountDto>>, ApiError> {
    let pool = state.pool.clone();
    // 缓存 Option：不存在的账号也短暂负缓存，挡住对同一无效 ID 的穿透
    let dto: Option<PublicAccountDto> = state
        .cache
        .get_or_set(
            &CacheKey::public_profile(account_id),
            PROFILE_CACHE_TTL,
            || async move {
                let row = sqlx::query_as::<_, PublicAccountRow>(&format!(
                    "SELECT {} FROM accounts WHERE id = $1 AND is_active = TRUE",
                    PUBLIC_ACCOUNT_COLUMNS
                ))
                .bind(account_id)
                .fetch_optional(&pool)
                .await
                .map_err(SharedError::from)?;
                Ok(row.map(PublicAccountDto::from))
            },
        )
        .await?;

    let dto = dto.ok_or(ApiError::AccountNotFound(account_id))?;
    Ok(Json(ApiResponse::success(dto)))
}

/// 当前账号查询行（不含认证敏感列）
#[derive(Debug, sqlx::FromRow)]
struct MeRow {
    id: i64,
    role: crate::models::ActorType,
    email: String,
    username: Option<String>,
    first_name: String,
    last_name: Option<String>,
    headline: Option<String>,
    location: Option<String>,
    profile_picture: Option<String>,
    cover_image: Option<String>,
    college_name: Option<String>,
    interested_field: Option<String>,
    is_email_verified: bool,
    login_count: i32,
    last_login_at: Option<chrono::DateTime<chrono::Utc>>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl MeRow {
    fn into_dto(self) -> crate::dto::AccountDto {
        crate::dto::AccountDto {
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
