//! 响应 DTO 定义
//!
//! 所有 REST API 的响应体结构

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ActorType, PingStatus};

/// API 统一响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// 创建成功响应
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: Some(data),
        }
    }

    /// 创建成功响应（无数据）
    pub fn success_empty() -> ApiResponse<()> {
        ApiResponse {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: None,
        }
    }

    /// 创建成功响应（自定义消息）
    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: message.into(),
            data: Some(data),
        }
    }
}

/// 分页响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl<T> PageResponse<T> {
    pub fn new(items: Vec<T>, total: i64, limit: i64, offset: i64) -> Self {
        Self {
            items,
            total,
            limit,
            offset,
        }
    }
}

// ============================================
// 账号
// ============================================

/// 当前账号 DTO（仅本人可见，含邮箱和登录信息）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDto {
    pub id: i64,
    pub role: ActorType,
    pub email: String,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub headline: Option<String>,
    pub location: Option<String>,
    pub profile_picture: Option<String>,
    pub cover_image: Option<String>,
    pub college_name: Option<String>,
    pub interested_field: Option<String>,
    pub is_email_verified: bool,
    pub login_count: i32,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// 公开账号 DTO（他人可见的子集）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAccountDto {
    pub id: i64,
    pub role: ActorType,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub headline: Option<String>,
    pub location: Option<String>,
    pub profile_picture: Option<String>,
    pub college_name: Option<String>,
    pub interested_field: Option<String>,
}

// ============================================
// 档案子实体
// ============================================

/// 工作经历 DTO
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceDto {
    pub id: i64,
    pub account_id: i64,
    pub title: String,
    pub company: Option<String>,
    pub employment_type: Option<String>,
    pub currently_working: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 教育经历 DTO
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EducationDto {
    pub id: i64,
    pub account_id: i64,
    pub school: String,
    pub degree: Option<String>,
    pub field_of_study: Option<String>,
    pub grade: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 技能 DTO
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SkillDto {
    pub id: i64,
    pub account_id: i64,
    pub name: String,
    pub proficiency: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 项目 DTO
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDto {
    pub id: i64,
    pub account_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub project_url: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 证书 DTO
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CertificationDto {
    pub id: i64,
    pub account_id: i64,
    pub name: String,
    pub issuer: Option<String>,
    pub credential_id: Option<String>,
    pub credential_url: Option<String>,
    pub issued_at: Option<NaiveDate>,
    pub expires_at: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 个人简介 DTO
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AboutDto {
    pub account_id: i64,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

// ============================================
// 动态
// ============================================

/// 帖子媒体 DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDto {
    pub media_id: i64,
    pub media_url: String,
    pub media_type: String,
}

/// 帖子 DTO（含作者信息、互动计数和当前用户的互动状态）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDto {
    pub post_id: i64,
    pub author: PublicAccountDto,
    pub content: String,
    pub repost_of: Option<i64>,
    pub media: Vec<MediaDto>,
    pub reaction_count: i64,
    pub comment_count: i64,
    pub share_count: i64,
    pub repost_count: i64,
    pub liked_by_me: bool,
    pub saved_by_me: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 评论 DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDto {
    pub comment_id: i64,
    pub post_id: i64,
    pub author: PublicAccountDto,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// ============================================
// 人脉网络
// ============================================

/// 连接请求 DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingDto {
    pub id: i64,
    pub sender: PublicAccountDto,
    pub receiver: PublicAccountDto,
    pub status: PingStatus,
    pub accepted_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// 与某主体的连接状态查询结果
///
/// none 表示双方尚无任何关系记录
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingStatusDto {
    pub status: String,
    /// 当前账号是否为该请求的发起方
    pub initiated_by_me: bool,
}

// ============================================
// 通知
// ============================================

/// 站内通知 DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDto {
    pub id: i64,
    pub kind: String,
    pub actor: PublicAccountDto,
    pub reference_id: Option<i64>,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================
// 搜索与上传
// ============================================

/// 搜索结果（按角色分组）
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultsDto {
    pub students: Vec<PublicAccountDto>,
    pub colleges: Vec<PublicAccountDto>,
    pub startups: Vec<PublicAccountDto>,
    pub industries: Vec<PublicAccountDto>,
}

/// 上传结果 DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDto {
    pub url: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_success_shape() {
        let resp = ApiResponse::success(42);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["code"], "SUCCESS");
        assert_eq!(json["data"], 42);
    }

    #[test]
    fn test_api_response_empty_omits_data() {
        let resp = ApiResponse::<()>::success_empty();
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], true);
        // data 为 None 时整个字段不序列化
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_page_response_shape() {
        let page = PageResponse::new(vec![1, 2, 3], 10, 3, 0);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["total"], 10);
        assert_eq!(json["items"].as_array().unwrap().len(), 3);
    }

    /// DTO 序列化后必须是 camelCase，这是前端契约
    #[test]
    fn test_dto_camel_case_keys() {
        let dto = ExperienceDto {
            id: 1,
            account_id: 2,
            title: "工程师".to_string(),
            company: None,
            employment_type: None,
            currently_working: true,
            start_date: None,
            end_date: None,
            location: None,
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&dto).unwrap();
        assert!(json.get("accountId").is_some());
        assert!(json.get("currentlyWorking").is_some());
        assert!(json.get("account_id").is_none());
    }

    /// 缓存命中走 JSON 反序列化，DTO 必须能无损往返
    #[test]
    fn test_dto_serde_roundtrip() {
        let dto = SkillDto {
            id: 5,
            account_id: 9,
            name: "Rust".to_string(),
            proficiency: Some("advanced".to_string()),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&dto).unwrap();
        let back: SkillDto = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, dto.id);
        assert_eq!(back.name, dto.name);
        assert_eq!(back.proficiency, dto.proficiency);
    }
}
