//! 帖子互动 API 处理器
//!
//! 点赞、评论、分享、转发、收藏、举报。点赞/分享/收藏为幂等开关：
//! 已存在则删除，不存在则写入，响应返回最新状态。

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use validator::Validate;

use crate::{
    auth::Claims,
    dto::{
        ApiResponse, CommentDto, CommentRequest, PageResponse, PaginationParams, PostDto,
        PublicAccountDto, ReportPostRequest,
    },
    error::{ApiError, is_unique_violation},
    handlers::post::{POST_SELECT, PostRow, assemble_posts},
    models::{ActorRef, ActorType},
    state::AppState,
};

/// 开关类互动的响应：最新状态 + 计数
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleDto {
    pub active: bool,
    pub count: i64,
}

/// 确认帖子存在
async fn ensure_post_exists(pool: &sqlx::PgPool, post_id: i64) -> Result<(), ApiError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM posts WHERE post_id = $1)")
        .bind(post_id)
        .fetch_one(pool)
        .await?;
    if exists {
        Ok(())
    } else {
        Err(ApiError::PostNotFound(post_id))
    }
}

/// 点赞开关
///
/// POST /api/posts/{id}/react
pub async fn toggle_reaction(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<i64>,
) -> Result<Json<ApiResponse<ToggleDto>>, ApiError> {
    let actor = ActorRef::new(claims.account_id()?, claims.role);
    ensure_post_exists(&state.pool, post_id).await?;

    let dto = toggle(
        &state,
        "post_reactions",
        post_id,
        actor,
    )
    .await?;

    Ok(Json(ApiResponse::success(dto)))
}

/// 分享开关
///
/// POST /api/posts/{id}/share
pub async fn toggle_share(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<i64>,
) -> Result<Json<ApiResponse<ToggleDto>>, ApiError> {
    let actor = ActorRef::new(claims.account_id()?, claims.role);
    ensure_post_exists(&state.pool, post_id).await?;

    let dto = toggle(&state, "post_shares", post_id, actor).await?;
    Ok(Json(ApiResponse::success(dto)))
}

/// 收藏开关
///
/// POST /api/posts/{id}/save
pub async fn toggle_save(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<i64>,
) -> Result<Json<ApiResponse<ToggleDto>>, ApiError> {
    let actor = ActorRef::new(claims.account_id()?, claims.role);
    ensure_post_exists(&state.pool, post_id).await?;

    let dto = toggle(&state, "saved_posts", post_id, actor).await?;
    Ok(Json(ApiResponse::success(dto)))
}

/// 开关通用实现：先尝试删除，删不到再写入
///
/// 并发下两端写入撞唯一约束时按已激活处理
async fn toggle(
    state: &AppState,
    table: &str,
    post_id: i64,
    actor: ActorRef,
) -> Result<ToggleDto, ApiError> {
    let deleted = sqlx::query(&format!(
        "DELETE FROM {} WHERE post_id = $1 AND actor_id = $2 AND actor_type = $3",
        table
    ))
    .bind(post_id)
    .bind(actor.id)
    .bind(actor.actor_type)
    .execute(&state.pool)
    .await?;

    let active = if deleted.rows_affected() > 0 {
        false
    } else {
        sqlx::query(&format!(
            "INSERT INTO {} (post_id, actor_id, actor_type) VALUES ($1, $2, $3) \
             ON CONFLICT DO NOTHING",
            table
        ))
        .bind(post_id)
        .bind(actor.id)
        .bind(actor.actor_type)
        .execute(&state.pool)
        .await?;
        true
    };

    let count: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} WHERE post_id = $1",
        table
    ))
    .bind(post_id)
    .fetch_one(&state.pool)
    .await?;

    Ok(ToggleDto { active, count })
}

/// 评论
///
/// POST /api/posts/{id}/comments
pub async fn create_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<i64>,
    Json(req): Json<CommentRequest>,
) -> Result<Json<ApiResponse<CommentDto>>, ApiError> {
    req.validate()?;
    let actor = ActorRef::new(claims.account_id()?, claims.role);
    ensure_post_exists(&state.pool, post_id).await?;

    let row = sqlx::query_as::<_, CommentRow>(
        r#"
        WITH inserted AS (
            INSERT INTO post_comments (post_id, actor_id, actor_type, content)
            VALUES ($1, $2, $3, $4)
            RETURNING comment_id, post_id, actor_id, actor_type, content, created_at
        )
        SELECT i.comment_id, i.post_id, i.content, i.created_at,
               a.id, a.role, a.username, a.first_name, a.last_name, a.headline,
               a.location, a.profile_picture, a.college_name, a.interested_field
        FROM inserted i
        JOIN accounts a ON a.id = i.actor_id
        "#,
    )
    .bind(post_id)
    .bind(actor.id)
    .bind(actor.actor_type)
    .bind(&req.content)
    .fetch_one(&state.pool)
    .await?;

    info!(post_id, comment_id = row.comment_id, "新增评论");
    Ok(Json(ApiResponse::success(row.into_dto())))
}

/// 评论列表
///
/// GET /api/posts/{id}/comments
pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Query(page): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<CommentDto>>>, ApiError> {
    ensure_post_exists(&state.pool, post_id).await?;
    let (limit, offset) = page.clamp();

    let rows = sqlx::query_as::<_, CommentRow>(
        r#"
        SELECT c.comment_id, c.post_id, c.content, c.created_at,
               a.id, a.role, a.username, a.first_name, a.last_name, a.headline,
               a.location, a.profile_picture, a.college_name, a.interested_field
        FROM post_comments c
        JOIN accounts a ON a.id = c.actor_id
        WHERE c.post_id = $1
        ORDER BY c.created_at DESC, c.comment_id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(post_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_comments WHERE post_id = $1")
        .bind(post_id)
        .fetch_one(&state.pool)
        .await?;

    let items = rows.into_iter().map(CommentRow::into_dto).collect();
    Ok(Json(ApiResponse::success(PageResponse::new(
        items, total, limit, offset,
    ))))
}

/// 删除评论
///
/// DELETE /api/posts/{id}/comments/{comment_id}
///
/// 评论作者或帖子作者都可以删除
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((post_id, comment_id)): Path<(i64, i64)>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let actor = ActorRef::new(claims.account_id()?, claims.role);

    let deleted = sqlx::query(
        r#"
        DELETE FROM post_comments c
        USING posts p
        WHERE c.comment_id = $1 AND c.post_id = $2 AND p.post_id = c.post_id
          AND ((c.actor_id = $3 AND c.actor_type = $4)
               OR (p.author_id = $3 AND p.author_type = $4))
        "#,
    )
    .bind(comment_id)
    .bind(post_id)
    .bind(actor.id)
    .bind(actor.actor_type)
    .execute(&state.pool)
    .await?;

    if deleted.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("评论 {} 不存在", comment_id)));
    }

    Ok(Json(ApiResponse::<()>::success_empty()))
}

/// 转发
///
/// POST /api/posts/{id}/repost
///
/// 转发以一条 repost_of 指向原帖的新帖子落库，
/// 同一主体对同一帖子重复转发由唯一索引拦截
pub async fn repost(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<i64>,
) -> Result<Json<ApiResponse<PostDto>>, ApiError> {
    let actor = ActorRef::new(claims.account_id()?, claims.role);

    // 转发的转发指向原始帖子，避免链式引用
    let origin: Option<(i64, Option<i64>)> =
        sqlx::query_as("SELECT post_id, repost_of FROM posts WHERE post_id = $1")
            .bind(post_id)
            .fetch_optional(&state.pool)
            .await?;
    let (found_id, parent) = origin.ok_or(ApiError::PostNotFound(post_id))?;
    let root_id = parent.unwrap_or(found_id);

    let new_id: i64 = sqlx::query_scalar(
        "INSERT INTO posts (author_id, author_type, content, repost_of) \
         VALUES ($1, $2, '', $3) RETURNING post_id",
    )
    .bind(actor.id)
    .bind(actor.actor_type)
    .bind(root_id)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e, "uq_posts_repost_per_actor") {
            ApiError::AlreadyReposted
        } else {
            ApiError::Database(e)
        }
    })?;

    info!(post_id = new_id, origin = root_id, actor_id = actor.id, "转发帖子");

    let row = sqlx::query_as::<_, PostRow>(&format!("{} WHERE p.post_id = $3", POST_SELECT))
        .bind(actor.id)
        .bind(actor.actor_type)
        .bind(new_id)
        .fetch_one(&state.pool)
        .await?;

    let mut items = assemble_posts(&state.pool, vec![row]).await?;
    let dto = items
        .pop()
        .ok_or_else(|| ApiError::Internal("帖子拼装结果为空".to_string()))?;

    Ok(Json(ApiResponse::success_with_message(dto, "转发成功")))
}

/// 收藏列表
///
/// GET /api/posts/saved
pub async fn list_saved(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<PostDto>>>, ApiError> {
    let actor = ActorRef::new(claims.account_id()?, claims.role);
    let (limit, offset) = page.clamp();

    let rows = sqlx::query_as::<_, PostRow>(&format!(
        "{} JOIN saved_posts sv ON sv.post_id = p.post_id \
             AND sv.actor_id = $1 AND sv.actor_type = $2 \
         ORDER BY sv.created_at DESC LIMIT $3 OFFSET $4",
        POST_SELECT
    ))
    .bind(actor.id)
    .bind(actor.actor_type)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM saved_posts WHERE actor_id = $1 AND actor_type = $2",
    )
    .bind(actor.id)
    .bind(actor.actor_type)
    .fetch_one(&state.pool)
    .await?;

    let items = assemble_posts(&state.pool, rows).await?;
    Ok(Json(ApiResponse::success(PageResponse::new(
        items, total, limit, offset,
    ))))
}

/// 举报帖子
///
/// POST /api/posts/{id}/report
///
/// 举报后该帖子从举报者的信息流中隐藏
pub async fn report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<i64>,
    Json(req): Json<ReportPostRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    req.validate()?;
    let actor = ActorRef::new(claims.account_id()?, claims.role);
    ensure_post_exists(&state.pool, post_id).await?;

    sqlx::query(
        "INSERT INTO reported_posts (post_id, actor_id, actor_type, reason) VALUES ($1, $2, $3, $4)",
    )
    .bind(post_id)
    .bind(actor.id)
    .bind(actor.actor_type)
    .bind(&req.reason)
    .execute(&state.pool)
    .await?;

    info!(post_id, actor_id = actor.id, "帖子被举报");
    Ok(Json(ApiResponse::<()>::success_with_message(
        (),
        "举报已提交",
    )))
}

/// 评论查询行
#[derive(Debug, sqlx::FromRow)]
struct CommentRow {
    comment_id: i64,
    post_id: i64,
    content: String,
    created_at: DateTime<Utc>,
    id: i64,
    role: ActorType,
    username: Option<String>,
    first_name: String,
    last_name: Option<String>,
    headline: Option<String>,
    location: Option<String>,
    profile_picture: Option<String>,
    college_name: Option<String>,
    interested_field: Option<String>,
}

impl CommentRow {
    fn into_dto(self) -> CommentDto {
        CommentDto {
            comment_id: self.comment_id,
            post_id: self.post_id,
            author: PublicAccountDto {
                id: self.id,
                role: self.role,
                username: self.username,
                first_name: self.first_name,
                last_name: self.last_name,
                headline: self.headline,
                location: self.location,
                profile_picture: self.profile_picture,
                college_name: self.college_name,
                interested_field: self.interested_field,
            },
            content: self.content,
            created_at: self.created_at,
        }
    }
}
