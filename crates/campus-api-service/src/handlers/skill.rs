//! 技能 API 处理器
//!
//! 技能只有新增和删除，没有更新语义

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
    dto::{ApiResponse, CreateSkillRequest, SkillDto},
    error::ApiError,
    state::AppState,
};

const ENTITY: &str = "skills";

/// 查看某账号的技能列表
///
/// GET /api/accounts/{id}/skills
pub async fn list(
    State(state): State<AppState>,
    Path(account_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<SkillDto>>>, ApiError> {
    let pool = state.pool.clone();
    let items: Vec<SkillDto> = state
        .cache
        .get_or_set(
            &CacheKey::profile_entity(ENTITY, account_id),
            PROFILE_CACHE_TTL,
            || async move {
                sqlx::query_as::<_, SkillDto>(
                    "SELECT id, account_id, name, proficiency, created_at \
                     FROM account_skills WHERE account_id = $1 ORDER BY id",
                )
                .bind(account_id)
                .fetch_all(&pool)
                .await
                .map_err(SharedError::from)
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(items)))
}

/// 新增技能
///
/// POST /api/accounts/me/skills
pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateSkillRequest>,
) -> Result<Json<ApiResponse<SkillDto>>, ApiError> {
    req.validate()?;
    let account_id = claims.account_id()?;

    let dto = sqlx::query_as::<_, SkillDto>(
        r#"
        INSERT INTO account_skills (account_id, name, proficiency)
        VALUES ($1, $2, $3)
        RETURNING id, account_id, name, proficiency, created_at
        "#,
    )
    .bind(account_id)
    .bind(&req.name)
    .bind(&req.proficiency)
    .fetch_one(&state.pool)
    .await?;

    invalidate(&state, account_id).await;
    info!(account_id, skill_id = dto.id, "新增技能");
    Ok(Json(ApiResponse::success(dto)))
}

/// 删除技能
///
/// DELETE /api/accounts/me/skills/{id}
pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let account_id = claims.account_id()?;

    let result = sqlx::query("DELETE FROM account_skills WHERE id = $1 AND account_id = $2")
        .bind(id)
        .bind(account_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("技能 {} 不存在", id)));
    }

    invalidate(&state, account_id).await;
    Ok(Json(ApiResponse::<()>::success_empty()))
}

async fn invalidate(state: &AppState, account_id: i64) {
    if let Err(e) = state
        .cache
        .delete(&CacheKey::profile_entity(ENTITY, account_id))
        .await
    {
        tracing::warn!(error = %e, account_id, "删除技能缓存失败");
    }
}
