//! 请求 DTO 定义
//!
//! 所有 REST API 的请求体和查询参数结构，使用 validator 做字段校验

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use validator::Validate;

/// 用户名规则：字母开头，允许字母数字、下划线和点，3-32 位
static USERNAME_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[a-zA-Z][a-zA-Z0-9_.]{2,31}$").unwrap());

// ============================================
// 认证
// ============================================

/// 注册请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 128, message = "名字长度必须在 1-128 之间"))]
    pub first_name: String,
    #[validate(length(max = 128, message = "姓氏长度不能超过 128"))]
    pub last_name: Option<String>,
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: String,
    #[validate(length(min = 8, max = 100, message = "密码长度必须在 8-100 之间"))]
    pub password: String,
    #[validate(regex(path = *USERNAME_RE, message = "用户名格式不正确"))]
    pub username: Option<String>,
    /// 账号角色，默认 student
    pub role: Option<crate::models::ActorType>,
}

/// 登录请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: String,
    #[validate(length(min = 1, max = 100, message = "密码长度必须在 1-100 之间"))]
    pub password: String,
}

/// 请求发送验证码
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OtpRequestRequest {
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: String,
}

/// 验证码校验请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OtpVerifyRequest {
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: String,
    #[validate(length(equal = 6, message = "验证码为 6 位数字"))]
    pub otp: String,
    /// 验证通过后可同时设置密码
    #[validate(length(min = 8, max = 100, message = "密码长度必须在 8-100 之间"))]
    pub password: Option<String>,
}

// ============================================
// 账号与档案
// ============================================

/// 用户名可用性查询参数
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckUsernameQuery {
    #[validate(regex(path = *USERNAME_RE, message = "用户名格式不正确"))]
    pub username: String,
}

/// 更新基本信息请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    #[validate(length(min = 1, max = 128, message = "名字长度必须在 1-128 之间"))]
    pub first_name: Option<String>,
    #[validate(length(max = 128, message = "姓氏长度不能超过 128"))]
    pub last_name: Option<String>,
    #[validate(regex(path = *USERNAME_RE, message = "用户名格式不正确"))]
    pub username: Option<String>,
    #[validate(length(max = 255, message = "标题长度不能超过 255"))]
    pub headline: Option<String>,
    #[validate(length(max = 255, message = "地区长度不能超过 255"))]
    pub location: Option<String>,
    #[validate(length(max = 255))]
    pub college_name: Option<String>,
    #[validate(length(max = 255))]
    pub interested_field: Option<String>,
    #[validate(url(message = "头像必须为合法 URL"))]
    pub profile_picture: Option<String>,
    #[validate(url(message = "封面必须为合法 URL"))]
    pub cover_image: Option<String>,
}

/// 创建工作经历请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateExperienceRequest {
    #[validate(length(min = 1, max = 255, message = "职位名称长度必须在 1-255 之间"))]
    pub title: String,
    #[validate(length(max = 255))]
    pub company: Option<String>,
    #[validate(length(max = 64))]
    pub employment_type: Option<String>,
    #[serde(default)]
    pub currently_working: bool,
    pub start_date: Option<chrono::NaiveDate>,
    pub end_date: Option<chrono::NaiveDate>,
    #[validate(length(max = 255))]
    pub location: Option<String>,
    pub description: Option<String>,
}

/// 更新工作经历请求（全字段可选，COALESCE 语义）
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExperienceRequest {
    #[validate(length(min = 1, max = 255, message = "职位名称长度必须在 1-255 之间"))]
    pub title: Option<String>,
    #[validate(length(max = 255))]
    pub company: Option<String>,
    #[validate(length(max = 64))]
    pub employment_type: Option<String>,
    pub currently_working: Option<bool>,
    pub start_date: Option<chrono::NaiveDate>,
    pub end_date: Option<chrono::NaiveDate>,
    #[validate(length(max = 255))]
    pub location: Option<String>,
    pub description: Option<String>,
}

/// 创建教育经历请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEducationRequest {
    #[validate(length(min = 1, max = 255, message = "学校名称长度必须在 1-255 之间"))]
    pub school: String,
    #[validate(length(max = 255))]
    pub degree: Option<String>,
    #[validate(length(max = 255))]
    pub field_of_study: Option<String>,
    #[validate(length(max = 64))]
    pub grade: Option<String>,
    pub start_date: Option<chrono::NaiveDate>,
    pub end_date: Option<chrono::NaiveDate>,
    pub description: Option<String>,
}

/// 更新教育经历请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEducationRequest {
    #[validate(length(min = 1, max = 255, message = "学校名称长度必须在 1-255 之间"))]
    pub school: Option<String>,
    #[validate(length(max = 255))]
    pub degree: Option<String>,
    #[validate(length(max = 255))]
    pub field_of_study: Option<String>,
    #[validate(length(max = 64))]
    pub grade: Option<String>,
    pub start_date: Option<chrono::NaiveDate>,
    pub end_date: Option<chrono::NaiveDate>,
    pub description: Option<String>,
}

/// 创建技能请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSkillRequest {
    #[validate(length(min = 1, max = 128, message = "技能名称长度必须在 1-128 之间"))]
    pub name: String,
    #[validate(length(max = 64))]
    pub proficiency: Option<String>,
}

/// 创建项目请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 255, message = "项目名称长度必须在 1-255 之间"))]
    pub title: String,
    pub description: Option<String>,
    #[validate(url(message = "项目链接必须为合法 URL"))]
    pub project_url: Option<String>,
    pub start_date: Option<chrono::NaiveDate>,
    pub end_date: Option<chrono::NaiveDate>,
}

/// 更新项目请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    #[validate(length(min = 1, max = 255, message = "项目名称长度必须在 1-255 之间"))]
    pub title: Option<String>,
    pub description: Option<String>,
    #[validate(url(message = "项目链接必须为合法 URL"))]
    pub project_url: Option<String>,
    pub start_date: Option<chrono::NaiveDate>,
    pub end_date: Option<chrono::NaiveDate>,
}

/// 创建证书请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCertificationRequest {
    #[validate(length(min = 1, max = 255, message = "证书名称长度必须在 1-255 之间"))]
    pub name: String,
    #[validate(length(max = 255))]
    pub issuer: Option<String>,
    #[validate(length(max = 255))]
    pub credential_id: Option<String>,
    #[validate(url(message = "证书链接必须为合法 URL"))]
    pub credential_url: Option<String>,
    pub issued_at: Option<chrono::NaiveDate>,
    pub expires_at: Option<chrono::NaiveDate>,
}

/// 更新证书请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCertificationRequest {
    #[validate(length(min = 1, max = 255, message = "证书名称长度必须在 1-255 之间"))]
    pub name: Option<String>,
    #[validate(length(max = 255))]
    pub issuer: Option<String>,
    #[validate(length(max = 255))]
    pub credential_id: Option<String>,
    #[validate(url(message = "证书链接必须为合法 URL"))]
    pub credential_url: Option<String>,
    pub issued_at: Option<chrono::NaiveDate>,
    pub expires_at: Option<chrono::NaiveDate>,
}

/// 个人简介（写入即整体覆盖）
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AboutRequest {
    #[validate(length(max = 10000, message = "简介长度不能超过 10000"))]
    pub content: String,
}

// ============================================
// 动态
// ============================================

/// 发帖请求
///
/// media 为先前通过上传接口获得的 URL 列表
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 10000, message = "内容长度必须在 1-10000 之间"))]
    pub content: String,
    #[serde(default)]
    #[validate(length(max = 9, message = "单帖最多附带 9 个媒体文件"))]
    pub media: Vec<PostMediaItem>,
}

/// 帖子媒体项
#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PostMediaItem {
    #[validate(length(min = 1, max = 2048))]
    pub media_url: String,
    #[validate(length(min = 1, max = 64))]
    pub media_type: String,
}

/// 编辑帖子请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    #[validate(length(min = 1, max = 10000, message = "内容长度必须在 1-10000 之间"))]
    pub content: String,
}

/// 评论请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CommentRequest {
    #[validate(length(min = 1, max = 2000, message = "评论长度必须在 1-2000 之间"))]
    pub content: String,
}

/// 举报帖子请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReportPostRequest {
    #[validate(length(max = 2000, message = "举报理由长度不能超过 2000"))]
    pub reason: Option<String>,
}

// ============================================
// 人脉网络
// ============================================

/// 发起连接请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePingRequest {
    #[validate(range(min = 1, message = "receiverId 不合法"))]
    pub receiver_id: i64,
}

// ============================================
// 通知
// ============================================

/// 推送订阅请求（Web Push 订阅对象）
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    #[validate(length(min = 1, max = 2048, message = "endpoint 不能为空"))]
    pub endpoint: String,
    pub p256dh: Option<String>,
    pub auth: Option<String>,
}

/// 取消推送订阅请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeRequest {
    #[validate(length(min = 1, max = 2048, message = "endpoint 不能为空"))]
    pub endpoint: String,
}

/// 标记通知已读请求
///
/// ids 为空时标记当前账号全部未读通知
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    #[serde(default)]
    pub ids: Vec<i64>,
}

// ============================================
// 查询参数
// ============================================

/// 分页参数（limit/offset 风格，与信息流接口一致）
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    10
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl PaginationParams {
    /// 收敛到安全范围，防止一次性拉取过多数据
    pub fn clamp(&self) -> (i64, i64) {
        (self.limit.clamp(1, 50), self.offset.max(0))
    }
}

/// 搜索查询参数
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_validation() {
        let valid = RegisterRequest {
            first_name: "小明".to_string(),
            last_name: None,
            email: "xiaoming@example.com".to_string(),
            password: "secret-pass-123".to_string(),
            username: Some("xiaoming_7".to_string()),
            role: None,
        };
        assert!(valid.validate().is_ok());

        // 密码过短
        let invalid = RegisterRequest {
            first_name: "小明".to_string(),
            last_name: None,
            email: "xiaoming@example.com".to_string(),
            password: "short".to_string(),
            username: None,
            role: None,
        };
        assert!(invalid.validate().is_err());

        // 邮箱格式错误
        let invalid = RegisterRequest {
            first_name: "小明".to_string(),
            last_name: None,
            email: "not-an-email".to_string(),
            password: "secret-pass-123".to_string(),
            username: None,
            role: None,
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_username_regex() {
        let base = |username: Option<String>| RegisterRequest {
            first_name: "A".to_string(),
            last_name: None,
            email: "a@example.com".to_string(),
            password: "secret-pass-123".to_string(),
            username,
            role: None,
        };

        assert!(base(Some("alice".into())).validate().is_ok());
        assert!(base(Some("alice.w_01".into())).validate().is_ok());
        // 数字开头不允许
        assert!(base(Some("1alice".into())).validate().is_err());
        // 过短
        assert!(base(Some("ab".into())).validate().is_err());
        // 非法字符
        assert!(base(Some("alice!".into())).validate().is_err());
    }

    #[test]
    fn test_otp_verify_length() {
        let valid = OtpVerifyRequest {
            email: "a@example.com".to_string(),
            otp: "123456".to_string(),
            password: None,
        };
        assert!(valid.validate().is_ok());

        let invalid = OtpVerifyRequest {
            email: "a@example.com".to_string(),
            otp: "12345".to_string(),
            password: None,
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_pagination_clamp() {
        let p = PaginationParams {
            limit: 500,
            offset: -3,
        };
        assert_eq!(p.clamp(), (50, 0));

        let p = PaginationParams {
            limit: 0,
            offset: 20,
        };
        assert_eq!(p.clamp(), (1, 20));

        let p = PaginationParams::default();
        assert_eq!(p.clamp(), (10, 0));
    }

    #[test]
    fn test_create_post_media_limit() {
        let media = (0..10)
            .map(|i| PostMediaItem {
                media_url: format!("/uploads/{}.png", i),
                media_type: "image/png".to_string(),
            })
            .collect();
        let req = CreatePostRequest {
            content: "附图过多".to_string(),
            media,
        };
        assert!(req.validate().is_err());
    }
}
