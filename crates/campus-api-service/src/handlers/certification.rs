//! 证书 API 处理器

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
    dto::{ApiResponse, CertificationDto, CreateCertificationRequest, UpdateCertificationRequest},
    error::ApiError,
    state::AppState,
};

const ENTITY: &str = "certifications";

const COLUMNS: &str = "id, account_id, name, issuer, credential_id, credential_url, \
     issued_at, expires_at, created_at, updated_at";

/// 查看某账号的证书列表
///
/// GET /api/accounts/{id}/certifications
pub async fn list(
    State(state): State<AppState>,
    Path(account_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<CertificationDto>>>, ApiError> {
    let pool = state.pool.clone();
    let items: Vec<CertificationDto> = state
        .cache
        .get_or_set(
            &CacheKey::profile_entity(ENTITY, account_id),
            PROFILE_CACHE_TTL,
            || async move {
                sqlx::query_as::<_, CertificationDto>(&format!(
                    "SELECT {} FROM account_certifications WHERE account_id = $1 \
                     ORDER BY issued_at DESC NULLS LAST, id DESC",
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

/// 新增证书
///
/// POST /api/accounts/me/certifications
pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCertificationRequest>,
) -> Result<Json<ApiResponse<CertificationDto>>, ApiError> {
    req.validate()?;
    let account_id = claims.account_id()?;

    let dto = sqlx::query_as::<_, CertificationDto>(&format!(
        r#"
        INSERT INTO account_certifications
            (account_id, name, issuer, credential_id, credential_url, issued_at, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {}
        "#,
        COLUMNS
    ))
    .bind(account_id)
    .bind(&req.name)
    .bind(&req.issuer)
    .bind(&req.credential_id)
    .bind(&req.credential_url)
    .bind(req.issued_at)
    .bind(req.expires_at)
    .fetch_one(&state.pool)
    .await?;

    invalidate(&state, account_id).await;
    info!(account_id, certification_id = dto.id, "新增证书");
    Ok(Json(ApiResponse::success(dto)))
}

/// 更新证书
///
/// PUT /api/accounts/me/certifications/{id}
pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCertificationRequest>,
) -> Result<Json<ApiResponse<CertificationDto>>, ApiError> {
    req.validate()?;
    let account_id = claims.account_id()?;

    let dto = sqlx::query_as::<_, CertificationDto>(&format!(
        r#"
        UPDATE account_certifications
        SET name = COALESCE($1, name),
            issuer = COALESCE($2, issuer),
            credential_id = COALESCE($3, credential_id),
            credential_url = COALESCE($4, credential_url),
            issued_at = COALESCE($5, issued_at),
            expires_at = COALESCE($6, expires_at),
            updated_at = NOW()
        WHERE id = $7 AND account_id = $8
        RETURNING {}
        "#,
        COLUMNS
    ))
    .bind(&req.name)
    .bind(&req.issuer)
    .bind(&req.credential_id)
    .bind(&req.credential_url)
    .bind(req.issued_at)
    .bind(req.expires_at)
    .bind(id)
    .bind(account_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("证书 {} 不存在", id)))?;

    invalidate(&state, account_id).await;
    Ok(Json(ApiResponse::success(dto)))
}

/// 删除证书
///
/// DELETE /api/accounts/me/certifications/{id}
pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let account_id = claims.account_id()?;

    let result =
        sqlx::query("DELETE FROM account_certifications WHERE id = $1 AND account_id = $2")
            .bind(id)
            .bind(account_id)
            .execute(&state.pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("证书 {} 不存在", id)));
    }

    invalidate(&state, account_id).await;
    info!(account_id, certification_id = id, "删除证书");
    Ok(Json(ApiResponse::<()>::success_empty()))
}

async fn invalidate(state: &AppState, account_id: i64) {
    if let Err(e) = state
        .cache
        .delete(&CacheKey::profile_entity(ENTITY, account_id))
        .await
    {
        tracing::warn!(error = %e, account_id, "删除证书缓存失败");
    }
}
