//! 人脉网络 API 处理器
//!
//! 连接请求（ping）的发起、接受、拒绝、忽略和连接列表。
//! 同一对主体之间最多存在一条关系记录：pair_key 对无序主体对做
//! 规范编码并带唯一索引，并发重复发起会退化为约束冲突返回 409。

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use tracing::info;
use validator::Validate;

use campus_shared::observability::metrics;

use crate::{
    auth::Claims,
    dto::{
        ApiResponse, CreatePingRequest, PageResponse, PaginationParams, PingDto, PingStatusDto,
        PublicAccountDto,
    },
    error::{ApiError, is_unique_violation},
    handlers::{create_notification, fetch_public_account},
    models::{ActorRef, ActorType, NotificationKind, PingStatus, RelationshipKey},
    state::AppState,
};

/// 连接请求查询行，带双方公开信息
#[derive(Debug, sqlx::FromRow)]
struct PingRow {
    id: i64,
    status: PingStatus,
    accepted_at: Option<DateTime<Utc>>,
    declined_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    s_id: i64,
    s_role: ActorType,
    s_username: Option<String>,
    s_first_name: String,
    s_last_name: Option<String>,
    s_headline: Option<String>,
    s_location: Option<String>,
    s_profile_picture: Option<String>,
    s_college_name: Option<String>,
    s_interested_field: Option<String>,
    r_id: i64,
    r_role: ActorType,
    r_username: Option<String>,
    r_first_name: String,
    r_last_name: Option<String>,
    r_headline: Option<String>,
    r_location: Option<String>,
    r_profile_picture: Option<String>,
    r_college_name: Option<String>,
    r_interested_field: Option<String>,
}

const PING_SELECT: &str = r#"
SELECT pn.id, pn.status, pn.accepted_at, pn.declined_at, pn.created_at,
       s.id AS s_id, s.role AS s_role, s.username AS s_username,
       s.first_name AS s_first_name, s.last_name AS s_last_name,
       s.headline AS s_headline, s.location AS s_location,
       s.profile_picture AS s_profile_picture, s.college_name AS s_college_name,
       s.interested_field AS s_interested_field,
       r.id AS r_id, r.role AS r_role, r.username AS r_username,
       r.first_name AS r_first_name, r.last_name AS r_last_name,
       r.headline AS r_headline, r.location AS r_location,
       r.profile_picture AS r_profile_picture, r.college_name AS r_college_name,
       r.interested_field AS r_interested_field
FROM ping_networks pn
JOIN accounts s ON s.id = pn.sender_id
JOIN accounts r ON r.id = pn.receiver_id
"#;

impl PingRow {
    fn into_dto(self) -> PingDto {
        PingDto {
            id: self.id,
            sender: PublicAccountDto {
                id: self.s_id,
                role: self.s_role,
                username: self.s_username,
                first_name: self.s_first_name,
                last_name: self.s_last_name,
                headline: self.s_headline,
                location: self.s_location,
                profile_picture: self.s_profile_picture,
                college_name: self.s_college_name,
                interested_field: self.s_interested_field,
            },
            receiver: PublicAccountDto {
                id: self.r_id,
                role: self.r_role,
                username: self.r_username,
                first_name: self.r_first_name,
                last_name: self.r_last_name,
                headline: self.r_headline,
                location: self.r_location,
                profile_picture: self.r_profile_picture,
                college_name: self.r_college_name,
                interested_field: self.r_interested_field,
            },
            status: self.status,
            accepted_at: self.accepted_at,
            declined_at: self.declined_at,
            created_at: self.created_at,
        }
    }

    /// 发送方视角：忽略态伪装为待处理
    fn into_dto_for_sender(mut self) -> PingDto {
        self.status = self.status.as_seen_by_sender();
        self.into_dto()
    }
}

/// 发起连接请求
///
/// POST /api/network/pings
pub async fn send_ping(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePingRequest>,
) -> Result<Json<ApiResponse<PingDto>>, ApiError> {
    req.validate()?;
    let sender = ActorRef::new(claims.account_id()?, claims.role);

    if req.receiver_id == sender.id {
        return Err(ApiError::SelfPing);
    }

    let receiver_account = fetch_public_account(&state.pool, req.receiver_id).await?;
    let receiver = ActorRef::new(receiver_account.id, receiver_account.role);
    let pair_key = RelationshipKey::canonical(sender, receiver);

    let ping_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO ping_networks (sender_id, sender_type, receiver_id, receiver_type, pair_key)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(sender.id)
    .bind(sender.actor_type)
    .bind(receiver.id)
    .bind(receiver.actor_type)
    .bind(&pair_key)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e, "ping_networks_pair_key_key") {
            ApiError::PingAlreadyExists
        } else {
            ApiError::Database(e)
        }
    })?;

    info!(ping_id, sender_id = sender.id, receiver_id = receiver.id, "发起连接请求");
    metrics::record_ping_sent();

    let sender_account = fetch_public_account(&state.pool, sender.id).await?;
    create_notification(
        &state.pool,
        receiver,
        sender,
        NotificationKind::PingReceived,
        Some(ping_id),
        &format!("{} 向你发起了连接请求", sender_account.first_name),
    )
    .await?;

    let row = fetch_ping(&state, ping_id).await?;
    Ok(Json(ApiResponse::success_with_message(
        row.into_dto_for_sender(),
        "连接请求已发送",
    )))
}

/// 收到的待处理请求列表
///
/// GET /api/network/pings/received
///
/// 已忽略的请求不再出现在列表中
pub async fn list_received(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<PingDto>>>, ApiError> {
    let me = ActorRef::new(claims.account_id()?, claims.role);
    let (limit, offset) = page.clamp();

    let rows = sqlx::query_as::<_, PingRow>(&format!(
        "{} WHERE pn.receiver_id = $1 AND pn.receiver_type = $2 AND pn.status = 'pending' \
         ORDER BY pn.created_at DESC LIMIT $3 OFFSET $4",
        PING_SELECT
    ))
    .bind(me.id)
    .bind(me.actor_type)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM ping_networks \
         WHERE receiver_id = $1 AND receiver_type = $2 AND status = 'pending'",
    )
    .bind(me.id)
    .bind(me.actor_type)
    .fetch_one(&state.pool)
    .await?;

    let items = rows.into_iter().map(PingRow::into_dto).collect();
    Ok(Json(ApiResponse::success(PageResponse::new(
        items, total, limit, offset,
    ))))
}

/// 发出的请求列表
///
/// GET /api/network/pings/sent
pub async fn list_sent(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<PingDto>>>, ApiError> {
    let me = ActorRef::new(claims.account_id()?, claims.role);
    let (limit, offset) = page.clamp();

    let rows = sqlx::query_as::<_, PingRow>(&format!(
        "{} WHERE pn.sender_id = $1 AND pn.sender_type = $2 \
         ORDER BY pn.created_at DESC LIMIT $3 OFFSET $4",
        PING_SELECT
    ))
    .bind(me.id)
    .bind(me.actor_type)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM ping_networks WHERE sender_id = $1 AND sender_type = $2",
    )
    .bind(me.id)
    .bind(me.actor_type)
    .fetch_one(&state.pool)
    .await?;

    let items = rows.into_iter().map(PingRow::into_dto_for_sender).collect();
    Ok(Json(ApiResponse::success(PageResponse::new(
        items, total, limit, offset,
    ))))
}

/// 接受连接请求
///
/// POST /api/network/pings/{id}/accept
pub async fn accept_ping(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ping_id): Path<i64>,
) -> Result<Json<ApiResponse<PingDto>>, ApiError> {
    let dto = resolve_ping(&state, &claims, ping_id, PingStatus::Accepted).await?;

    // 接受后通知原发起方
    let me = ActorRef::new(claims.account_id()?, claims.role);
    let sender = ActorRef::new(dto.sender.id, dto.sender.role);
    create_notification(
        &state.pool,
        sender,
        me,
        NotificationKind::PingAccepted,
        Some(ping_id),
        &format!("{} 接受了你的连接请求", dto.receiver.first_name),
    )
    .await?;

    Ok(Json(ApiResponse::success_with_message(dto, "已接受连接请求")))
}

/// 拒绝连接请求
///
/// POST /api/network/pings/{id}/decline
pub async fn decline_ping(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ping_id): Path<i64>,
) -> Result<Json<ApiResponse<PingDto>>, ApiError> {
    let dto = resolve_ping(&state, &claims, ping_id, PingStatus::Declined).await?;
    Ok(Json(ApiResponse::success(dto)))
}

/// 忽略连接请求
///
/// POST /api/network/pings/{id}/ignore
///
/// 忽略对发送方不可见，发送方继续看到待处理状态
pub async fn ignore_ping(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ping_id): Path<i64>,
) -> Result<Json<ApiResponse<PingDto>>, ApiError> {
    let dto = resolve_ping(&state, &claims, ping_id, PingStatus::Ignored).await?;
    Ok(Json(ApiResponse::success(dto)))
}

/// 状态迁移通用实现
///
/// 仅接收方可操作；UPDATE 带 status = 'pending' 条件，已终结的请求
/// 不会被二次迁移，并发的两个接受/拒绝只有一个生效
async fn resolve_ping(
    state: &AppState,
    claims: &Claims,
    ping_id: i64,
    target: PingStatus,
) -> Result<PingDto, ApiError> {
    let me = ActorRef::new(claims.account_id()?, claims.role);

    if !PingStatus::Pending.can_transition_to(target) {
        return Err(ApiError::Internal(format!("非法的目标状态 {}", target.as_str())));
    }

    let timestamp_col = match target {
        PingStatus::Accepted => "accepted_at",
        PingStatus::Declined => "declined_at",
        PingStatus::Ignored => "ignored_at",
        PingStatus::Pending => unreachable!(),
    };

    let updated: Option<i64> = sqlx::query_scalar(&format!(
        "UPDATE ping_networks SET status = $1, {} = NOW(), updated_at = NOW() \
         WHERE id = $2 AND receiver_id = $3 AND receiver_type = $4 AND status = 'pending' \
         RETURNING id",
        timestamp_col
    ))
    .bind(target)
    .bind(ping_id)
    .bind(me.id)
    .bind(me.actor_type)
    .fetch_optional(&state.pool)
    .await?;

    if updated.is_none() {
        // 区分三种失败：不存在 / 非接收方 / 已终结
        let row = sqlx::query_as::<_, (i64, ActorType, PingStatus)>(
            "SELECT receiver_id, receiver_type, status FROM ping_networks WHERE id = $1",
        )
        .bind(ping_id)
        .fetch_optional(&state.pool)
        .await?;

        return Err(match row {
            None => ApiError::PingNotFound(ping_id),
            Some((rid, rtype, _)) if rid != me.id || rtype != me.actor_type => {
                ApiError::Forbidden("只有接收方可以处理该请求".to_string())
            }
            Some(_) => ApiError::PingAlreadyResolved,
        });
    }

    info!(ping_id, status = target.as_str(), "连接请求状态更新");

    let row = fetch_ping(state, ping_id).await?;
    Ok(row.into_dto())
}

/// 连接列表（已接受的关系，返回对端账号）
///
/// GET /api/network/connections
pub async fn list_connections(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<PublicAccountDto>>>, ApiError> {
    let me = ActorRef::new(claims.account_id()?, claims.role);
    let (limit, offset) = page.clamp();

    let rows = sqlx::query_as::<_, crate::handlers::PublicAccountRow>(
        r#"
        SELECT a.id, a.role, a.username, a.first_name, a.last_name, a.headline,
               a.location, a.profile_picture, a.college_name, a.interested_field
        FROM ping_networks pn
        JOIN accounts a ON a.id = CASE
            WHEN pn.sender_id = $1 AND pn.sender_type = $2 THEN pn.receiver_id
            ELSE pn.sender_id
        END
        WHERE pn.status = 'accepted'
          AND ((pn.sender_id = $1 AND pn.sender_type = $2)
               OR (pn.receiver_id = $1 AND pn.receiver_type = $2))
        ORDER BY pn.accepted_at DESC
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
        "SELECT COUNT(*) FROM ping_networks \
         WHERE status = 'accepted' \
           AND ((sender_id = $1 AND sender_type = $2) \
                OR (receiver_id = $1 AND receiver_type = $2))",
    )
    .bind(me.id)
    .bind(me.actor_type)
    .fetch_one(&state.pool)
    .await?;

    let items = rows.into_iter().map(PublicAccountDto::from).collect();
    Ok(Json(ApiResponse::success(PageResponse::new(
        items, total, limit, offset,
    ))))
}

/// 查询与某账号的连接状态
///
/// GET /api/network/status/{account_id}
pub async fn ping_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(other_id): Path<i64>,
) -> Result<Json<ApiResponse<PingStatusDto>>, ApiError> {
    let me = ActorRef::new(claims.account_id()?, claims.role);

    if other_id == me.id {
        return Err(ApiError::SelfPing);
    }

    let other_account = fetch_public_account(&state.pool, other_id).await?;
    let other = ActorRef::new(other_account.id, other_account.role);
    let pair_key = RelationshipKey::canonical(me, other);

    let row: Option<(i64, PingStatus)> =
        sqlx::query_as("SELECT sender_id, status FROM ping_networks WHERE pair_key = $1")
            .bind(&pair_key)
            .fetch_optional(&state.pool)
            .await?;

    let dto = match row {
        None => PingStatusDto {
            status: "none".to_string(),
            initiated_by_me: false,
        },
        Some((sender_id, status)) => {
            let initiated_by_me = sender_id == me.id;
            let visible = if initiated_by_me {
                status.as_seen_by_sender()
            } else {
                status
            };
            PingStatusDto {
                status: visible.as_str().to_string(),
                initiated_by_me,
            }
        }
    };

    Ok(Json(ApiResponse::success(dto)))
}

/// 按 ID 加载连接请求行
async fn fetch_ping(state: &AppState, ping_id: i64) -> Result<PingRow, ApiError> {
    sqlx::query_as::<_, PingRow>(&format!("{} WHERE pn.id = $1", PING_SELECT))
        .bind(ping_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(ApiError::PingNotFound(ping_id))
}
