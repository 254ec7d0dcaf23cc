//! API 处理器模块
//!
//! 按业务域拆分：认证、账号档案、动态、人脉网络、通知、搜索、上传

pub mod about;
pub mod account;
pub mod auth;
pub mod certification;
pub mod education;
pub mod engagement;
pub mod experience;
pub mod network;
pub mod notification;
pub mod post;
pub mod project;
pub mod search;
pub mod skill;
pub mod upload;

use sqlx::PgPool;

use crate::dto::PublicAccountDto;
use crate::error::ApiError;
use crate::models::{ActorRef, ActorType, NotificationKind};

/// 账号公开信息查询行，多个处理器共用
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PublicAccountRow {
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

/// 公开信息列的 SELECT 片段，保持与 `PublicAccountRow` 字段一致
pub(crate) const PUBLIC_ACCOUNT_COLUMNS: &str = "id, role, username, first_name, last_name, \
     headline, location, profile_picture, college_name, interested_field";

impl From<PublicAccountRow> for PublicAccountDto {
    fn from(row: PublicAccountRow) -> Self {
        Self {
            id: row.id,
            role: row.role,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            headline: row.headline,
            location: row.location,
            profile_picture: row.profile_picture,
            college_name: row.college_name,
            interested_field: row.interested_field,
        }
    }
}

/// 按 ID 加载账号公开信息，不存在时返回 404
pub(crate) async fn fetch_public_account(
    pool: &PgPool,
    account_id: i64,
) -> Result<PublicAccountDto, ApiError> {
    let row = sqlx::query_as::<_, PublicAccountRow>(&format!(
        "SELECT {} FROM accounts WHERE id = $1 AND is_active = TRUE",
        PUBLIC_ACCOUNT_COLUMNS
    ))
    .bind(account_id)
    .fetch_optional(pool)
    .await?
    .ok_or(ApiError::AccountNotFound(account_id))?;

    Ok(row.into())
}

/// 写入站内通知并同步投递到推送发件箱
///
/// 两条写入在同一事务中提交，保证站内通知与推送不会只出现一条
pub(crate) async fn create_notification(
    pool: &PgPool,
    recipient: ActorRef,
    actor: ActorRef,
    kind: NotificationKind,
    reference_id: Option<i64>,
    body: &str,
) -> Result<(), ApiError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO notifications (recipient_id, recipient_type, kind, actor_id, actor_type, reference_id, body)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(recipient.id)
    .bind(recipient.actor_type)
    .bind(kind.as_str())
    .bind(actor.id)
    .bind(actor.actor_type)
    .bind(reference_id)
    .bind(body)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO notification_outbox (recipient_id, title, body)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(recipient.id)
    .bind(kind.push_title())
    .bind(body)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
