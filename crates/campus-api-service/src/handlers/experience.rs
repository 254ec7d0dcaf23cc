//! 工作经历 API 处理器
//!
//! CRUD 操作仅允许本人，读取走旁路缓存，写操作同步删除缓存键

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::info;
use validator::Validate;

use campus_shared::cache::{CacheKey, PROFILE_CACHE_TTL};
use campus_shared::error::SharedError;

use crate::{
    auth::Claims,
    dto::{ApiResponse, CreateExperienceRequest, ExperienceDto, UpdateExperienceRequest},
    error::ApiError,
    state::AppState,
};

const ENTITY: &str = "experience";

const COLUMNS: &str = "id, account_id, title, company, employment_type, currently_working, \
     start_date, end_date, location, description, created_at, updated_at";

/// 查看某账号的工作经历列表
///
/// GET /api/accounts/{id}/experience
pub async fn list(
    State(state): State<AppState>,
    Path(account_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<ExperienceDto>>>, ApiError> {
    let pool = state.pool.clone();
    let items: Vec<ExperienceDto> = state
        .cache
        .get_or_set(
            &CacheKey::profile_entity(ENTITY, account_id),
            PROFILE_CACHE_TTL,
            || async move {
                sqlx::query_as::<_, ExperienceDto>(&format!(
                    "SELECT {} FROM account_experience WHERE account_id = $1 \
                     ORDER BY start_date DESC NULLS LAST, id DESC",
                    COLUMNS
                ))
                .bind(account_id)
                .fetch_all(&pool)
                .await
                .map_err(SharedError::from)
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(items)))
}

/// 新增工作经历
///
/// POST /api/accounts/me/experience
pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateExperienceRequest>,
) -> Result<Json<ApiResponse<ExperienceDto>>, ApiError> {
    req.validate()?;
    let account_id = claims.account_id()?;

    let dto = sqlx::query_as::<_, ExperienceDto>(&format!(
        r#"
        INSERT INTO account_experience
            (account_id, title, company, employment_type, currently_working,
             start_date, end_date, location, description)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {}
        "#,
        COLUMNS
    ))
    .bind(account_id)
    .bind(&req.title)
    .bind(&req.company)
    .bind(&req.employment_type)
    .bind(req.currently_working)
    .bind(req.start_date)
    .bind(req.end_date)
    .bind(&req.location)
    .bind(&req.description)
    .fetch_one(&state.pool)
    .await?;

    invalidate(&state, account_id).await;
    info!(account_id, experience_id = dto.id, "新增工作经历");
    Ok(Json(ApiResponse::success(dto)))
}

/// 更新工作经历
///
/// PUT /api/accounts/me/experience/{id}
pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateExperienceRequest>,
) -> Result<Json<ApiResponse<ExperienceDto>>, ApiError> {
    req.validate()?;
    let account_id = claims.account_id()?;

    let dto = sqlx::query_as::<_, ExperienceDto>(&format!(
        r#"
        UPDATE account_experience
        SET title = COALESCE($1, title),
            company = COALESCE($2, company),
            employment_type = COALESCE($3, employment_type),
            currently_working = COALESCE($4, currently_working),
            start_date = COALESCE($5, start_date),
            end_date = COALESCE($6, end_date),
            location = COALESCE($7, location),
            description = COALESCE($8, description),
            updated_at = NOW()
        WHERE id = $9 AND account_id = $10
        RETURNING {}
        "#,
        COLUMNS
    ))
    .bind(&req.title)
    .bind(&req.company)
    .bind(&req.employment_type)
    .bind(req.currently_working)
    .bind(req.start_date)
    .bind(req.end_date)
    .bind(&req.location)
    .bind(&req.description)
    .bind(id)
    .bind(account_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("工作经历 {} 不存在", id)))?;

    invalidate(&state, account_id).await;
    Ok(Json(ApiResponse::success(dto)))
}

/// 删除工作经历
///
/// DELETE /api/accounts/me/experience/{id}
pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let account_id = claims.account_id()?;

    let result = sqlx::query("DELETE FROM account_experience WHERE id = $1 AND account_id = $2")
        .bind(id)
        .bind(account_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("工作经历 {} 不存在", id)));
    }

    invalidate(&state, account_id).await;
    info!(account_id, experience_id = id, "删除工作经历");
    Ok(Json(ApiResponse::<()>::success_empty()))
}

/// 删除缓存键，失败仅记录日志（下次读取会重新回填）
async fn invalidate(state: &AppState, account_id: i64) {
    if let Err(e) = state
        .cache
        .delete(&CacheKey::profile_entity(ENTITY, account_id))
        .await
    {
        tracing::warn!(error = %e, account_id, "删除工作经历缓存失败");
    }
}
