//! 帖子 API 处理器
//!
//! 信息流、发帖、编辑和删除。帖子行带作者信息、互动计数和
//! 当前账号的互动状态，一次查询拼装完整的 PostDto。

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{info, warn};
use validator::Validate;

use crate::{
    auth::Claims,
    dto::{
        ApiResponse, CreatePostRequest, MediaDto, PageResponse, PaginationParams, PostDto,
        PublicAccountDto, UpdatePostRequest,
    },
    error::ApiError,
    models::{ActorRef, ActorType},
    state::AppState,
};

/// 帖子查询行：帖子本体 + 作者公开信息 + 计数 + 当前账号互动状态
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostRow {
    post_id: i64,
    content: String,
    repost_of: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    author_id: i64,
    author_role: ActorType,
    author_username: Option<String>,
    author_first_name: String,
    author_last_name: Option<String>,
    author_headline: Option<String>,
    author_location: Option<String>,
    author_profile_picture: Option<String>,
    author_college_name: Option<String>,
    author_interested_field: Option<String>,
    reaction_count: i64,
    comment_count: i64,
    share_count: i64,
    repost_count: i64,
    liked_by_me: bool,
    saved_by_me: bool,
}

/// 查询列片段。$1/$2 固定为当前账号的 (actor_id, actor_type)
pub(crate) const POST_SELECT: &str = r#"
SELECT p.post_id, p.content, p.repost_of, p.created_at, p.updated_at,
       a.id AS author_id, a.role AS author_role, a.username AS author_username,
       a.first_name AS author_first_name, a.last_name AS author_last_name,
       a.headline AS author_headline, a.location AS author_location,
       a.profile_picture AS author_profile_picture, a.college_name AS author_college_name,
       a.interested_field AS author_interested_field,
       (SELECT COUNT(*) FROM post_reactions r WHERE r.post_id = p.post_id) AS reaction_count,
       (SELECT COUNT(*) FROM post_comments c WHERE c.post_id = p.post_id) AS comment_count,
       (SELECT COUNT(*) FROM post_shares s WHERE s.post_id = p.post_id) AS share_count,
       (SELECT COUNT(*) FROM posts rp WHERE rp.repost_of = p.post_id) AS repost_count,
       EXISTS(SELECT 1 FROM post_reactions r
              WHERE r.post_id = p.post_id AND r.actor_id = $1 AND r.actor_type = $2) AS liked_by_me,
       EXISTS(SELECT 1 FROM saved_posts sp
              WHERE sp.post_id = p.post_id AND sp.actor_id = $1 AND sp.actor_type = $2) AS saved_by_me
FROM posts p
JOIN accounts a ON a.id = p.author_id AND a.is_active = TRUE
"#;

impl PostRow {
    fn into_dto(self, media: Vec<MediaDto>) -> PostDto {
        PostDto {
            post_id: self.post_id,
            author: PublicAccountDto {
                id: self.author_id,
                role: self.author_role,
                username: self.author_username,
                first_name: self.author_first_name,
                last_name: self.author_last_name,
                headline: self.author_headline,
                location: self.author_location,
                profile_picture: self.author_profile_picture,
                college_name: self.author_college_name,
                interested_field: self.author_interested_field,
            },
            content: self.content,
            repost_of: self.repost_of,
            media,
            reaction_count: self.reaction_count,
            comment_count: self.comment_count,
            share_count: self.share_count,
            repost_count: self.repost_count,
            liked_by_me: self.liked_by_me,
            saved_by_me: self.saved_by_me,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// 批量加载帖子媒体并按 post_id 分组
async fn load_media(pool: &PgPool, post_ids: &[i64]) -> Result<HashMap<i64, Vec<MediaDto>>, ApiError> {
    if post_ids.is_empty() {
        return Ok(HashMap::new());
    }

    #[derive(sqlx::FromRow)]
    struct MediaRow {
        post_id: i64,
        media_id: i64,
        media_url: String,
        media_type: String,
    }

    let rows = sqlx::query_as::<_, MediaRow>(
        "SELECT post_id, media_id, media_url, media_type FROM post_media \
         WHERE post_id = ANY($1) ORDER BY media_id",
    )
    .bind(post_ids)
    .fetch_all(pool)
    .await?;

    let mut grouped: HashMap<i64, Vec<MediaDto>> = HashMap::new();
    for row in rows {
        grouped.entry(row.post_id).or_default().push(MediaDto {
            media_id: row.media_id,
            media_url: row.media_url,
            media_type: row.media_type,
        });
    }
    Ok(grouped)
}

/// 将查询行拼装为 DTO 列表
pub(crate) async fn assemble_posts(
    pool: &PgPool,
    rows: Vec<PostRow>,
) -> Result<Vec<PostDto>, ApiError> {
    let ids: Vec<i64> = rows.iter().map(|r| r.post_id).collect();
    let mut media = load_media(pool, &ids).await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let items = media.remove(&row.post_id).unwrap_or_default();
            row.into_dto(items)
        })
        .collect())
}

/// 信息流
///
/// GET /api/posts
///
/// 按发布时间倒序的全站信息流，过滤当前账号举报过的帖子
pub async fn feed(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<PostDto>>>, ApiError> {
    let viewer = ActorRef::new(claims.account_id()?, claims.role);
    let (limit, offset) = page.clamp();

    let rows = sqlx::query_as::<_, PostRow>(&format!(
        "{} WHERE NOT EXISTS (SELECT 1 FROM reported_posts rep \
             WHERE rep.post_id = p.post_id AND rep.actor_id = $1 AND rep.actor_type = $2) \
         ORDER BY p.created_at DESC, p.post_id DESC LIMIT $3 OFFSET $4",
        POST_SELECT
    ))
    .bind(viewer.id)
    .bind(viewer.actor_type)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    // 总数与列表共用同一过滤条件，否则举报过帖子的账号会看到虚高的总数
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM posts p \
         WHERE NOT EXISTS (SELECT 1 FROM reported_posts rep \
             WHERE rep.post_id = p.post_id AND rep.actor_id = $1 AND rep.actor_type = $2)",
    )
    .bind(viewer.id)
    .bind(viewer.actor_type)
    .fetch_one(&state.pool)
    .await?;

    let items = assemble_posts(&state.pool, rows).await?;
    Ok(Json(ApiResponse::success(PageResponse::new(
        items, total, limit, offset,
    ))))
}

/// 查看单个帖子
///
/// GET /api/posts/{id}
pub async fn get(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<i64>,
) -> Result<Json<ApiResponse<PostDto>>, ApiError> {
    let viewer = ActorRef::new(claims.account_id()?, claims.role);

    let row = sqlx::query_as::<_, PostRow>(&format!("{} WHERE p.post_id = $3", POST_SELECT))
        .bind(viewer.id)
        .bind(viewer.actor_type)
        .bind(post_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(ApiError::PostNotFound(post_id))?;

    let mut items = assemble_posts(&state.pool, vec![row]).await?;
    // assemble_posts 对单行输入必然返回单个元素
    let dto = items
        .pop()
        .ok_or_else(|| ApiError::Internal("帖子拼装结果为空".to_string()))?;

    Ok(Json(ApiResponse::success(dto)))
}

/// 查看自己的帖子列表
///
/// GET /api/posts/mine
pub async fn list_mine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<PostDto>>>, ApiError> {
    let viewer = ActorRef::new(claims.account_id()?, claims.role);
    let (limit, offset) = page.clamp();

    let rows = sqlx::query_as::<_, PostRow>(&format!(
        "{} WHERE p.author_id = $1 AND p.author_type = $2 \
         ORDER BY p.created_at DESC, p.post_id DESC LIMIT $3 OFFSET $4",
        POST_SELECT
    ))
    .bind(viewer.id)
    .bind(viewer.actor_type)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE author_id = $1 AND author_type = $2")
            .bind(viewer.id)
            .bind(viewer.actor_type)
            .fetch_one(&state.pool)
            .await?;

    let items = assemble_posts(&state.pool, rows).await?;
    Ok(Json(ApiResponse::success(PageResponse::new(
        items, total, limit, offset,
    ))))
}

/// 查看某账号的帖子列表
///
/// GET /api/accounts/{id}/posts
pub async fn list_by_account(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(account_id): Path<i64>,
    Query(page): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<PostDto>>>, ApiError> {
    let viewer = ActorRef::new(claims.account_id()?, claims.role);
    let (limit, offset) = page.clamp();

    let rows = sqlx::query_as::<_, PostRow>(&format!(
        "{} WHERE p.author_id = $3 ORDER BY p.created_at DESC, p.post_id DESC LIMIT $4 OFFSET $5",
        POST_SELECT
    ))
    .bind(viewer.id)
    .bind(viewer.actor_type)
    .bind(account_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE author_id = $1")
        .bind(account_id)
        .fetch_one(&state.pool)
        .await?;

    let items = assemble_posts(&state.pool, rows).await?;
    Ok(Json(ApiResponse::success(PageResponse::new(
        items, total, limit, offset,
    ))))
}

/// 发帖
///
/// POST /api/posts
///
/// 帖子和媒体在同一事务中写入
pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePostRequest>,
) -> Result<Json<ApiResponse<PostDto>>, ApiError> {
    req.validate()?;
    let author = ActorRef::new(claims.account_id()?, claims.role);

    let mut tx = state.pool.begin().await?;

    let post_id: i64 = sqlx::query_scalar(
        "INSERT INTO posts (author_id, author_type, content) VALUES ($1, $2, $3) RETURNING post_id",
    )
    .bind(author.id)
    .bind(author.actor_type)
    .bind(&req.content)
    .fetch_one(&mut *tx)
    .await?;

    for item in &req.media {
        sqlx::query("INSERT INTO post_media (post_id, media_url, media_type) VALUES ($1, $2, $3)")
            .bind(post_id)
            .bind(&item.media_url)
            .bind(&item.media_type)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    info!(post_id, author_id = author.id, "发布帖子");

    let row = sqlx::query_as::<_, PostRow>(&format!("{} WHERE p.post_id = $3", POST_SELECT))
        .bind(author.id)
        .bind(author.actor_type)
        .bind(post_id)
        .fetch_one(&state.pool)
        .await?;

    let mut items = assemble_posts(&state.pool, vec![row]).await?;
    let dto = items
        .pop()
        .ok_or_else(|| ApiError::Internal("帖子拼装结果为空".to_string()))?;

    Ok(Json(ApiResponse::success_with_message(dto, "发布成功")))
}

/// 编辑帖子
///
/// PUT /api/posts/{id}
///
/// 仅作者本人可编辑
pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<i64>,
    Json(req): Json<UpdatePostRequest>,
) -> Result<Json<ApiResponse<PostDto>>, ApiError> {
    req.validate()?;
    let author = ActorRef::new(claims.account_id()?, claims.role);

    let updated = sqlx::query(
        "UPDATE posts SET content = $1, updated_at = NOW() \
         WHERE post_id = $2 AND author_id = $3 AND author_type = $4",
    )
    .bind(&req.content)
    .bind(post_id)
    .bind(author.id)
    .bind(author.actor_type)
    .execute(&state.pool)
    .await?;

    if updated.rows_affected() == 0 {
        // 区分不存在和无权限
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM posts WHERE post_id = $1)")
            .bind(post_id)
            .fetch_one(&state.pool)
            .await?;
        return Err(if exists {
            ApiError::Forbidden("只能编辑自己的帖子".to_string())
        } else {
            ApiError::PostNotFound(post_id)
        });
    }

    let row = sqlx::query_as::<_, PostRow>(&format!("{} WHERE p.post_id = $3", POST_SELECT))
        .bind(author.id)
        .bind(author.actor_type)
        .bind(post_id)
        .fetch_one(&state.pool)
        .await?;

    let mut items = assemble_posts(&state.pool, vec![row]).await?;
    let dto = items
        .pop()
        .ok_or_else(|| ApiError::Internal("帖子拼装结果为空".to_string()))?;

    Ok(Json(ApiResponse::success(dto)))
}

/// 删除帖子
///
/// DELETE /api/posts/{id}
///
/// 仅作者本人可删除，附属媒体和互动记录级联删除；
/// 数据库删除成功后尽力清理磁盘上的媒体文件
pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let author = ActorRef::new(claims.account_id()?, claims.role);

    // 先取媒体地址，级联删除后行就不存在了
    let media_urls: Vec<String> =
        sqlx::query_scalar("SELECT media_url FROM post_media WHERE post_id = $1")
            .bind(post_id)
            .fetch_all(&state.pool)
            .await?;

    let deleted =
        sqlx::query("DELETE FROM posts WHERE post_id = $1 AND author_id = $2 AND author_type = $3")
            .bind(post_id)
            .bind(author.id)
            .bind(author.actor_type)
            .execute(&state.pool)
            .await?;

    if deleted.rows_affected() == 0 {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM posts WHERE post_id = $1)")
            .bind(post_id)
            .fetch_one(&state.pool)
            .await?;
        return Err(if exists {
            ApiError::Forbidden("只能删除自己的帖子".to_string())
        } else {
            ApiError::PostNotFound(post_id)
        });
    }

    // 磁盘清理失败不影响删除结果，文件会成为孤儿，记录日志便于排查
    for url in &media_urls {
        if let Some(file_name) = local_upload_file_name(url, &state.upload_config.base_url) {
            let path = std::path::Path::new(&state.upload_config.dir).join(file_name);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(post_id, file = %path.display(), error = %e, "删除媒体文件失败");
            }
        }
    }

    info!(post_id, author_id = author.id, "删除帖子");
    Ok(Json(ApiResponse::<()>::success_empty()))
}

/// 从媒体 URL 中提取本地上传文件名
///
/// 只认本服务上传前缀下的地址，外链媒体不做磁盘清理。
/// 文件名中不允许出现路径分隔符，防止越出上传目录。
fn local_upload_file_name<'a>(url: &'a str, base_url: &str) -> Option<&'a str> {
    let rest = url.strip_prefix(base_url.trim_end_matches('/'))?;
    let name = rest.strip_prefix('/')?;
    if name.is_empty() || name.contains('/') || name.contains("..") {
        return None;
    }
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_upload_file_name() {
        let base = "http://localhost:8080/uploads";
        assert_eq!(
            local_upload_file_name("http://localhost:8080/uploads/abc.png", base),
            Some("abc.png")
        );
        // base_url 末尾带斜杠也能识别
        assert_eq!(
            local_upload_file_name("http://localhost:8080/uploads/abc.png", "http://localhost:8080/uploads/"),
            Some("abc.png")
        );
    }

    #[test]
    fn test_local_upload_file_name_rejects_external_and_traversal() {
        let base = "http://localhost:8080/uploads";
        assert_eq!(local_upload_file_name("https://cdn.example.com/x.png", base), None);
        assert_eq!(local_upload_file_name("http://localhost:8080/uploads/", base), None);
        assert_eq!(
            local_upload_file_name("http://localhost:8080/uploads/../etc/passwd", base),
            None
        );
        assert_eq!(
            local_upload_file_name("http://localhost:8080/uploads/a/b.png", base),
            None
        );
    }

    /// 举报过滤对总数和列表一致生效；删除帖子后附属行级联删除、
    /// 本地媒体文件被清理。两段共用同一条帖子，按顺序执行
    #[tokio::test]
    #[ignore] // 需要数据库连接
    async fn test_feed_report_filter_and_delete_cleanup() {
        use std::sync::Arc;

        use campus_shared::{
            cache::Cache,
            config::{DatabaseConfig, RedisConfig},
        };

        use crate::auth::{JwtConfig, JwtManager};

        let db = campus_shared::database::Database::connect(&DatabaseConfig::default())
            .await
            .unwrap();
        db.run_migrations().await.unwrap();
        let pool = db.pool().clone();

        let upload_dir = std::env::temp_dir().join(format!("campus-media-{}", uuid::Uuid::now_v7()));
        tokio::fs::create_dir_all(&upload_dir).await.unwrap();
        let upload_config = campus_shared::config::UploadConfig {
            dir: upload_dir.to_string_lossy().into_owned(),
            base_url: "http://localhost:8080/uploads".to_string(),
            ..Default::default()
        };
        let state = AppState::new(
            pool.clone(),
            Arc::new(Cache::new(&RedisConfig::default()).unwrap()),
            JwtManager::new(JwtConfig::default()),
            campus_shared::config::AuthConfig::default(),
            upload_config,
        );

        let new_account = |pool: PgPool, tag: &str| {
            let email = format!("post-{}-{}@test.local", tag, uuid::Uuid::now_v7());
            async move {
                sqlx::query_scalar::<_, i64>(
                    "INSERT INTO accounts (role, email, first_name, password_hash) \
                     VALUES ('student', $1, '李四', 'hash') RETURNING id",
                )
                .bind(email)
                .fetch_one(&pool)
                .await
                .unwrap()
            }
        };
        let author_id = new_account(pool.clone(), "author").await;
        let viewer_id = new_account(pool.clone(), "viewer").await;
        let claims_for = |id: i64| Claims {
            sub: id.to_string(),
            role: ActorType::Student,
            email: format!("{id}@test.local"),
            iat: Utc::now().timestamp(),
            exp: Utc::now().timestamp() + 3600,
            iss: "campus-api-service".to_string(),
        };

        let post_id: i64 = sqlx::query_scalar(
            "INSERT INTO posts (author_id, author_type, content) \
             VALUES ($1, 'student', '校园招聘分享') RETURNING post_id",
        )
        .bind(author_id)
        .fetch_one(&pool)
        .await
        .unwrap();

        // 媒体文件落盘 + 附属互动行
        let file_name = format!("{}.png", uuid::Uuid::now_v7());
        let file_path = upload_dir.join(&file_name);
        tokio::fs::write(&file_path, b"png-bytes").await.unwrap();
        sqlx::query(
            "INSERT INTO post_media (post_id, media_url, media_type) VALUES ($1, $2, 'image/png')",
        )
        .bind(post_id)
        .bind(format!("http://localhost:8080/uploads/{file_name}"))
        .execute(&pool)
        .await
        .unwrap();
        for sql in [
            "INSERT INTO post_reactions (post_id, actor_id, actor_type) VALUES ($1, $2, 'student')",
            "INSERT INTO post_comments (post_id, actor_id, actor_type, content) \
             VALUES ($1, $2, 'student', '有帮助')",
            "INSERT INTO saved_posts (post_id, actor_id, actor_type) VALUES ($1, $2, 'student')",
        ] {
            sqlx::query(sql)
                .bind(post_id)
                .bind(viewer_id)
                .execute(&pool)
                .await
                .unwrap();
        }

        // viewer 举报后，其信息流的列表和总数都不再包含该帖
        sqlx::query(
            "INSERT INTO reported_posts (post_id, actor_id, actor_type, reason) \
             VALUES ($1, $2, 'student', '垃圾信息')",
        )
        .bind(post_id)
        .bind(viewer_id)
        .execute(&pool)
        .await
        .unwrap();

        let feed_of = |state: AppState, claims: Claims| async move {
            feed(State(state), Extension(claims), Query(PaginationParams::default()))
                .await
                .unwrap()
                .0
                .data
                .unwrap()
        };
        let viewer_page = feed_of(state.clone(), claims_for(viewer_id)).await;
        let author_page = feed_of(state.clone(), claims_for(author_id)).await;
        assert!(viewer_page.items.iter().all(|p| p.post_id != post_id));
        assert_eq!(author_page.total, viewer_page.total + 1);

        // 作者删除：附属行清零，磁盘文件被移除
        delete(
            State(state.clone()),
            Extension(claims_for(author_id)),
            Path(post_id),
        )
        .await
        .unwrap();

        for table in ["post_media", "post_reactions", "post_comments", "saved_posts", "reported_posts"] {
            let count: i64 =
                sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE post_id = $1"))
                    .bind(post_id)
                    .fetch_one(&pool)
                    .await
                    .unwrap();
            assert_eq!(count, 0, "{table} 应随帖子级联删除");
        }
        assert!(tokio::fs::metadata(&file_path).await.is_err());

        tokio::fs::remove_dir_all(&upload_dir).await.ok();
        sqlx::query("DELETE FROM accounts WHERE id = ANY($1)")
            .bind(vec![author_id, viewer_id])
            .execute(&pool)
            .await
            .unwrap();
    }
}
