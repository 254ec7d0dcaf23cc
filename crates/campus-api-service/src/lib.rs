//! 校园社交平台后端服务
//!
//! 面向学生、高校、创业公司和企业的社交平台 REST API。
//!
//! ## 核心功能
//!
//! - **认证**：密码登录、Google OAuth、邮箱 OTP 验证码，JWT + Redis 会话
//! - **档案**：工作经历、教育经历、技能、项目、证书、个人简介
//! - **动态**：信息流、发帖、点赞、评论、分享、转发、收藏、举报
//! - **人脉**：连接请求（ping）的发起与处理，关系去重由数据库唯一索引保证
//! - **通知**：站内通知 + 发件箱驱动的 Web Push 投递
//! - **搜索**：按姓名、用户名等模糊搜索账号，结果按角色分组
//!
//! ## 模块结构
//!
//! - `auth`: JWT、密码、OTP、Google OAuth
//! - `dto`: 请求和响应的数据传输对象
//! - `models`: 主体引用、连接请求状态机等领域模型
//! - `error`: 错误类型定义
//! - `handlers`: HTTP 请求处理器
//! - `middleware`: 认证与限流中间件
//! - `routes`: 路由配置
//! - `state`: 应用状态
//! - `worker`: 推送投递后台 Worker
//!
//! ## 技术栈
//!
//! - Web 框架：Axum
//! - 数据验证：validator
//! - 序列化：serde (camelCase)

pub mod auth;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod worker;

// 重新导出核心类型
pub use dto::{ApiResponse, PageResponse, PaginationParams};
pub use error::ApiError;
pub use models::{ActorRef, ActorType, NotificationKind, PingStatus, RelationshipKey};
pub use state::AppState;
