//! 项目 API 处理器

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
    dto::{ApiResponse, CreateProjectRequest, ProjectDto, UpdateProjectRequest},
    error::ApiError,
    state::AppState,
};

const ENTITY: &str = "projects";

const COLUMNS: &str =
    "id, account_id, title, description, project_url, start_date, end_date, created_at, updated_at";

/// 查看某账号的项目列表
///
/// GET /api/accounts/{id}/projects
pub async fn list(
    State(state): State<AppState>,
    Path(account_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<ProjectDto>>>, ApiError> {
    let pool = state.pool.clone();
    let items: Vec<ProjectDto> = state
        .cache
        .get_or_set(
            &CacheKey::profile_entity(ENTITY, account_id),
            PROFILE_CACHE_TTL,
            || async move {
                sqlx::query_as::<_, ProjectDto>(&format!(
                    "SELECT {} FROM account_projects WHERE account_id = $1 \
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

/// 新增项目
///
/// POST /api/accounts/me/projects
pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<Json<ApiResponse<ProjectDto>>, ApiError> {
    req.validate()?;
    let account_id = claims.account_id()?;

    let dto = sqlx::query_as::<_, ProjectDto>(&format!(
        r#"
        INSERT INTO account_projects (account_id, title, description, project_url, start_date, end_date)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {}
        "#,
        COLUMNS
    ))
    .bind(account_id)
    .bind(&req.title)
    .bind(&req.description)
    .bind(&req.project_url)
    .bind(req.start_date)
    .bind(req.end_date)
    .fetch_one(&state.pool)
    .await?;

    invalidate(&state, account_id).await;
    info!(account_id, project_id = dto.id, "新增项目");
    Ok(Json(ApiResponse::success(dto)))
}

/// 更新项目
///
/// PUT /api/accounts/me/projects/{id}
pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateProjectRequest>,
) -> Result<Json<ApiResponse<ProjectDto>>, ApiError> {
    req.validate()?;
    let account_id = claims.account_id()?;

    let dto = sqlx::query_as::<_, ProjectDto>(&format!(
        r#"
        UPDATE account_projects
        SET title = COALESCE($1, title),
            description = COALESCE($2, description),
            project_url = COALESCE($3, project_url),
            start_date = COALESCE($4, start_date),
            end_date = COALESCE($5, end_date),
            updated_at = NOW()
        WHERE id = $6 AND account_id = $7
        RETURNING {}
        "#,
        COLUMNS
    ))
    .bind(&req.title)
    .bind(&req.description)
    .bind(&req.project_url)
    .bind(req.start_date)
    .bind(req.end_date)
    .bind(id)
    .bind(account_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("项目 {} 不存在", id)))?;

    invalidate(&state, account_id).await;
    Ok(Json(ApiResponse::success(dto)))
}

/// 删除项目
///
/// DELETE /api/accounts/me/projects/{id}
pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let account_id = claims.account_id()?;

    let result = sqlx::query("DELETE FROM account_projects WHERE id = $1 AND account_id = $2")
        .bind(id)
        .bind(account_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("项目 {} 不存在", id)));
    }

    invalidate(&state, account_id).await;
    info!(account_id, project_id = id, "删除项目");
    Ok(Json(ApiResponse::<()>::success_empty()))
}

async fn invalidate(state: &AppState, account_id: i64) {
    if let Err(e) = state
        .cache
        .delete(&CacheKey::profile_entity(ENTITY, account_id))
        .await
    {
        tracing::warn!(error = %e, account_id, "删除项目缓存失败");
    }
}
