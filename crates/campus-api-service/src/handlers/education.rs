//! 教育经历 API 处理器

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
    dto::{ApiResponse, CreateEducationRequest, EducationDto, UpdateEducationRequest},
    error::ApiError,
    state::AppState,
};

const ENTITY: &str = "education";

const COLUMNS: &str = "id, account_id, school, degree, field_of_study, grade, \
     start_date, end_date, description, created_at, updated_at";

/// 查看某账号的教育经历列表
///
/// GET /api/accounts/{id}/education
pub async fn list(
    State(state): State<AppState>,
    Path(account_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<EducationDto>>>, ApiError> {
    let pool = state.pool.clone();
    let items: Vec<EducationDto> = state
        .cache
        .get_or_set(
            &CacheKey::profile_entity(ENTITY, account_id),
            PROFILE_CACHE_TTL,
            || async move {
                sqlx::query_as::<_, EducationDto>(&format!(
                    "SELECT {} FROM account_education WHERE account_id = $1 \
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

/// 新增教育经历
///
/// POST /api/accounts/me/education
pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateEducationRequest>,
) -> Result<Json<ApiResponse<EducationDto>>, ApiError> {
    req.validate()?;
    let account_id = claims.account_id()?;

    let dto = sqlx::query_as::<_, EducationDto>(&format!(
        r#"
        INSERT INTO account_education
            (account_id, school, degree, field_of_study, grade, start_date, end_date, description)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {}
        "#,
        COLUMNS
    ))
    .bind(account_id)
    .bind(&req.school)
    .bind(&req.degree)
    .bind(&req.field_of_study)
    .bind(&req.grade)
    .bind(req.start_date)
    .bind(req.end_date)
    .bind(&req.description)
    .fetch_one(&state.pool)
    .await?;

    invalidate(&state, account_id).await;
    info!(account_id, education_id = dto.id, "新增教育经历");
    Ok(Json(ApiResponse::success(dto)))
}

/// 更新教育经历
///
/// PUT /api/accounts/me/education/{id}
pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateEducationRequest>,
) -> Result<Json<ApiResponse<EducationDto>>, ApiError> {
    req.validate()?;
    let account_id = claims.account_id()?;

    let dto = sqlx::query_as::<_, EducationDto>(&format!(
        r#"
        UPDATE account_education
        SET school = COALESCE($1, school),
            degree = COALESCE($2, degree),
            field_of_study = COALESCE($3, field_of_study),
            grade = COALESCE($4, grade),
            start_date = COALESCE($5, start_date),
            end_date = COALESCE($6, end_date),
            description = COALESCE($7, description),
            updated_at = NOW()
        WHERE id = $8 AND account_id = $9
        RETURNING {}
        "#,
        COLUMNS
    ))
    .bind(&req.school)
    .bind(&req.degree)
    .bind(&req.field_of_study)
    .bind(&req.grade)
    .bind(req.start_date)
    .bind(req.end_date)
    .bind(&req.description)
    .bind(id)
    .bind(account_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("教育经历 {} 不存在", id)))?;

    invalidate(&state, account_id).await;
    Ok(Json(ApiResponse::success(dto)))
}

/// 删除教育经历
///
/// DELETE /api/accounts/me/education/{id}
pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let account_id = claims.account_id()?;

    let result = sqlx::query("DELETE FROM account_education WHERE id = $1 AND account_id = $2")
        .bind(id)
        .bind(account_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("教育经历 {} 不存在", id)));
    }

    invalidate(&state, account_id).await;
    info!(account_id, education_id = id, "删除教育经历");
    Ok(Json(ApiResponse::<()>::success_empty()))
}

async fn invalidate(state: &AppState, account_id: i64) {
    if let Err(e) = state
        .cache
        .delete(&CacheKey::profile_entity(ENTITY, account_id))
        .await
    {
        tracing::warn!(error = %e, account_id, "删除教育经历缓存失败");
    }
}
