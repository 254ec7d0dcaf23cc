//! 搜索 API 处理器
//!
//! 按姓名、用户名、标题模糊搜索账号，结果按角色分组返回

use axum::{
    Json,
    extract::{Query, State},
};

use crate::{
    dto::{ApiResponse, SearchQuery, SearchResultsDto},
    error::ApiError,
    handlers::PublicAccountRow,
    models::ActorType,
    state::AppState,
};

/// 每个角色分组的结果上限
const GROUP_LIMIT: i64 = 10;

/// 触发搜索的最小关键词长度
const MIN_KEYWORD_LEN: usize = 2;

/// 搜索账号
///
/// GET /api/search?q=
///
/// 过短的关键词返回空结果而不是全量扫描
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<SearchResultsDto>>, ApiError> {
    let keyword = query.q.trim();
    if keyword.chars().count() < MIN_KEYWORD_LEN {
        return Ok(Json(ApiResponse::success(SearchResultsDto::default())));
    }

    // ILIKE 的 % 和 _ 是通配符，作为字面量转义
    let escaped = keyword.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    let pattern = format!("%{}%", escaped);

    let rows = sqlx::query_as::<_, PublicAccountRow>(
        r#"
        SELECT id, role, username, first_name, last_name, headline, location,
               profile_picture, college_name, interested_field
        FROM accounts
        WHERE is_active = TRUE
          AND (first_name ILIKE $1 OR last_name ILIKE $1 OR username ILIKE $1
               OR email ILIKE $1 OR headline ILIKE $1 OR location ILIKE $1
               OR college_name ILIKE $1 OR interested_field ILIKE $1)
        ORDER BY first_name, id
        LIMIT $2
        "#,
    )
    .bind(&pattern)
    .bind(GROUP_LIMIT * 4)
    .fetch_all(&state.pool)
    .await?;

    let mut results = SearchResultsDto::default();
    for row in rows {
        let bucket = match row.role {
            ActorType::Student => &mut results.students,
            ActorType::College => &mut results.colleges,
            ActorType::Startup => &mut results.startups,
            ActorType::Industry => &mut results.industries,
            // 管理账号不出现在搜索结果中
            ActorType::Admin => continue,
        };
        if (bucket.len() as i64) < GROUP_LIMIT {
            bucket.push(row.into());
        }
    }

    Ok(Json(ApiResponse::success(results)))
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_ilike_escaping() {
        let keyword = "50%_off\\";
        let escaped = keyword
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        assert_eq!(escaped, "50\\%\\_off\\\\");
    }
}
