//! 通知 API 处理器
//!
//! 站内通知列表、已读标记和 Web Push 订阅管理

use axum::{
    Extension, Json,
    extract::{Query, State},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use validator::Validate;

use crate::{
    auth::Claims,
    dto::{
        ApiResponse, MarkReadRequest, NotificationDto, PageResponse, PaginationParams,
        PublicAccountDto, SubscribeRequest, UnsubscribeRequest,
    },
    error::ApiError,
    models::{ActorRef, ActorType},
    state::AppState,
};

/// 通知查询行，带触发者公开信息
#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: i64,
    kind: String,
    reference_id: Option<i64>,
    body: String,
    is_read: bool,
    created_at: DateTime<Utc>,
    a_id: i64,
    a_role: ActorType,
    a_username: Option<String>,
    a_first_name: String,
    a_last_name: Option<String>,
    a_headline: Option<String>,
    a_location: Option<String>,
    a_profile_picture: Option<String>,
    a_college_name: Option<String>,
    a_interested_field: Option<String>,
}

impl NotificationRow {
    fn into_dto(self) -> NotificationDto {
        NotificationDto {
            id: self.id,
            kind: self.kind,
            actor: PublicAccountDto {
                id: self.a_id,
                role: self.a_role,
                username: self.a_username,
                first_name: self.a_first_name,
                last_name: self.a_last_name,
                headline: self.a_headline,
                location: self.a_location,
                profile_picture: self.a_profile_picture,
                college_name: self.a_college_name,
                interested_field: self.a_interested_field,
            },
            reference_id: self.reference_id,
            body: self.body,
            is_read: self.is_read,
            created_at: self.created_at,
        }
    }
}

/// 通知列表
///
/// GET /api/notifications
pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<NotificationDto>>>, ApiError> {
    let me = ActorRef::new(claims.account_id()?, claims.role);
    let (limit, offset) = page.clamp();

    let rows = sqlx::query_as::<_, NotificationRow>(
        r#"
        SELECT n.id, n.kind, n.reference_id, n.body, n.is_read, n.created_at,
               a.id AS a_id, a.role AS a_role, a.username AS a_username,
               a.first_name AS a_first_name, a.last_name AS a_last_name,
               a.headline AS a_headline, a.location AS a_location,
               a.profile_picture AS a_profile_picture, a.college_name AS a_college_name,
               a.interested_field AS a_interested_field
        FROM notifications n
        JOIN accounts a ON a.id = n.actor_id
        WHERE n.recipient_id = $1 AND n.recipient_type = $2
        ORDER BY n.created_at DESC, n.id DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(me.id)
    .bind(me.actor_type)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND recipient_type = $2",
    )
    .bind(me.id)
    .bind(me.actor_type)
    .fetch_one(&state.pool)
    .await?;

    let items = rows.into_iter().map(NotificationRow::into_dto).collect();
    Ok(Json(ApiResponse::success(PageResponse::new(
        items, total, limit, offset,
    ))))
}

/// 未读数
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountDto {
    pub unread: i64,
}

/// 未读通知数
///
/// GET /api/notifications/unread-count
pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<UnreadCountDto>>, ApiError> {
    let me = ActorRef::new(claims.account_id()?, claims.role);

    let unread: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications \
         WHERE recipient_id = $1 AND recipient_type = $2 AND is_read = FALSE",
    )
    .bind(me.id)
    .bind(me.actor_type)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(ApiResponse::success(UnreadCountDto { unread })))
}

/// 标记已读
///
/// POST /api/notifications/mark-read
///
/// ids 为空时标记全部未读通知
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MarkReadRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let me = ActorRef::new(claims.account_id()?, claims.role);

    let marked = if req.ids.is_empty() {
        sqlx::query(
            "UPDATE notifications SET is_read = TRUE \
             WHERE recipient_id = $1 AND recipient_type = $2 AND is_read = FALSE",
        )
        .bind(me.id)
        .bind(me.actor_type)
        .execute(&state.pool)
        .await?
    } else {
        sqlx::query(
            "UPDATE notifications SET is_read = TRUE \
             WHERE recipient_id = $1 AND recipient_type = $2 AND id = ANY($3)",
        )
        .bind(me.id)
        .bind(me.actor_type)
        .bind(&req.ids)
        .execute(&state.pool)
        .await?
    };

    info!(account_id = me.id, count = marked.rows_affected(), "通知已读");
    Ok(Json(ApiResponse::<()>::success_empty()))
}

/// 订阅 Web Push
///
/// POST /api/notifications/subscribe
///
/// 每个账号保留一条订阅，重复订阅覆盖旧的 endpoint
pub async fn subscribe(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubscribeRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    req.validate()?;
    let account_id = claims.account_id()?;

    sqlx::query(
        r#"
        INSERT INTO push_subscriptions (account_id, endpoint, p256dh, auth)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (account_id)
        DO UPDATE SET endpoint = EXCLUDED.endpoint, p256dh = EXCLUDED.p256dh,
                      auth = EXCLUDED.auth, updated_at = NOW()
        "#,
    )
    .bind(account_id)
    .bind(&req.endpoint)
    .bind(&req.p256dh)
    .bind(&req.auth)
    .execute(&state.pool)
    .await?;

    info!(account_id, "推送订阅已登记");
    Ok(Json(ApiResponse::<()>::success_with_message(
        (),
        "订阅成功",
    )))
}

/// 取消订阅
///
/// POST /api/notifications/unsubscribe
pub async fn unsubscribe(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UnsubscribeRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    req.validate()?;
    let account_id = claims.account_id()?;

    sqlx::query("DELETE FROM push_subscriptions WHERE account_id = $1 AND endpoint = $2")
        .bind(account_id)
        .bind(&req.endpoint)
        .execute(&state.pool)
        .await?;

    info!(account_id, "推送订阅已取消");
    Ok(Json(ApiResponse::<()>::success_empty()))
}
