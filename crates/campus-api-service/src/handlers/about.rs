//! 个人简介 API 处理器
//!
//! 简介是单行记录，写入即整体覆盖（UPSERT）

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use validator::Validate;

use campus_shared::cache::{CacheKey, PROFILE_CACHE_TTL};
use campus_shared::error::SharedError;

use crate::{
    auth::Claims,
    dto::{AboutDto, AboutRequest, ApiResponse},
    error::ApiError,
    state::AppState,
};

/// 查看某账号的个人简介
///
/// GET /api/accounts/{id}/about
///
/// 未填写过简介的账号返回空内容而不是 404
pub async fn get(
    State(state): State<AppState>,
    Path(account_id): Path<i64>,
) -> Result<Json<ApiResponse<AboutDto>>, ApiError> {
    let pool = state.pool.clone();
    let dto: AboutDto = state
        .cache
        .get_or_set(&CacheKey::about(account_id), PROFILE_CACHE_TTL, || async move {
            let row = sqlx::query_as::<_, AboutDto>(
                "SELECT account_id, content, updated_at FROM account_about WHERE account_id = $1",
            )
            .bind(account_id)
            .fetch_optional(&pool)
            .await
            .map_err(SharedError::from)?;

            Ok(row.unwrap_or(AboutDto {
                account_id,
                content: String::new(),
                updated_at: chrono::Utc::now(),
            }))
        })
        .await?;

    Ok(Json(ApiResponse::success(dto)))
}

/// 写入个人简介
///
/// PUT /api/accounts/me/about
pub async fn upsert(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AboutRequest>,
) -> Result<Json<ApiResponse<AboutDto>>, ApiError> {
    req.validate()?;
    let account_id = claims.account_id()?;

    let dto = sqlx::query_as::<_, AboutDto>(
        r#"
        INSERT INTO account_about (account_id, content, updated_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (account_id)
        DO UPDATE SET content = EXCLUDED.content, updated_at = NOW()
        RETURNING account_id, content, updated_at
        "#,
    )
    .bind(account_id)
    .bind(&req.content)
    .fetch_one(&state.pool)
    .await?;

    if let Err(e) = state.cache.delete(&CacheKey::about(account_id)).await {
        tracing::warn!(error = %e, account_id, "删除简介缓存失败");
    }

    Ok(Json(ApiResponse::success(dto)))
}
