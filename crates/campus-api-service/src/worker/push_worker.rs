//! 推送投递 Worker
//!
//! 定期扫描 notification_outbox 中待投递的推送消息，按账号的订阅
//! endpoint 投递。使用 `FOR UPDATE SKIP LOCKED` 保证多实例部署时
//! 不会重复投递。投递行为通过 `PushSender` trait 抽象，当前提供
//! HTTP 直投和仅记录日志两种实现。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use sqlx::PgPool;
use tracing::{error, info, warn};

use campus_shared::observability::metrics;

/// 单次投递失败的错误
#[derive(Debug, thiserror::Error)]
#[error("推送投递失败: {0}")]
pub struct PushError(pub String);

/// 待投递的推送消息
#[derive(Debug, sqlx::FromRow)]
pub struct OutboxMessage {
    pub id: i64,
    pub recipient_id: i64,
    pub title: String,
    pub body: String,
    pub attempts: i32,
}

/// 账号的推送订阅
#[derive(Debug, sqlx::FromRow)]
pub struct Subscription {
    pub endpoint: String,
    pub p256dh: Option<String>,
    pub auth: Option<String>,
}

/// 推送发送器 trait
#[async_trait]
pub trait PushSender: Send + Sync {
    /// 向订阅 endpoint 投递一条消息
    async fn send(&self, subscription: &Subscription, title: &str, body: &str)
    -> Result<(), PushError>;
}

/// HTTP 直投发送器
///
/// 把消息以 JSON POST 到订阅 endpoint。生产环境替换为带 VAPID
/// 签名的 Web Push 协议实现时只需实现同一 trait。
pub struct HttpPushSender {
    http: reqwest::Client,
}

impl HttpPushSender {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpPushSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushSender for HttpPushSender {
    async fn send(
        &self,
        subscription: &Subscription,
        title: &str,
        body: &str,
    ) -> Result<(), PushError> {
        let payload = json!({ "title": title, "body": body });

        let resp = self
            .http
            .post(&subscription.endpoint)
            .json(&payload)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| PushError(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(PushError(format!("endpoint 返回 {}", resp.status())))
        }
    }
}

/// 模拟推送发送器（仅记录日志），测试和本地环境使用
pub struct LogPushSender;

#[async_trait]
impl PushSender for LogPushSender {
    async fn send(
        &self,
        subscription: &Subscription,
        title: &str,
        body: &str,
    ) -> Result<(), PushError> {
        info!(endpoint = %subscription.endpoint, title = %title, body = %body, "模拟推送投递");
        Ok(())
    }
}

/// 推送投递 Worker
///
/// 以固定间隔轮询发件箱，批量锁定并投递待发消息。
/// 设计为可在多实例环境中安全运行。
pub struct PushWorker {
    pool: PgPool,
    sender: Arc<dyn PushSender>,
    /// 轮询间隔（建议 10 秒）
    poll_interval: Duration,
    /// 每批处理的最大记录数
    batch_size: i64,
    /// 最大重试次数，超过后标记为 failed
    max_attempts: i32,
}

impl PushWorker {
    pub fn new(
        pool: PgPool,
        sender: Arc<dyn PushSender>,
        poll_interval_secs: u64,
        batch_size: i64,
        max_attempts: i32,
    ) -> Self {
        Self {
            pool,
            sender,
            poll_interval: Duration::from_secs(poll_interval_secs),
            batch_size,
            max_attempts,
        }
    }

    /// 使用默认配置创建 PushWorker
    pub fn with_defaults(pool: PgPool, sender: Arc<dyn PushSender>) -> Self {
        Self::new(pool, sender, 10, 100, 5)
    }

    /// 主循环：持续消费发件箱直到进程退出
    pub async fn run(&self) {
        info!(
            poll_interval = ?self.poll_interval,
            batch_size = self.batch_size,
            max_attempts = self.max_attempts,
            "PushWorker 已启动"
        );

        loop {
            match self.process_batch().await {
                Ok(0) => {}
                Ok(n) => info!(count = n, "本批推送处理完成"),
                Err(e) => error!(error = %e, "处理推送批次出错"),
            }

            metrics::set_worker_last_run("push_worker");

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// 认领并处理一批待投递消息，返回处理条数
    ///
    /// 认领是一条原子 UPDATE，行锁随语句结束立即释放；外部 HTTP
    /// 投递不在任何事务内进行，不会长时间占用连接和行锁，事务
    /// 中断也不会回滚已投递消息的 attempts 计数。投递途中崩溃的
    /// 实例留下的 processing 行在超时后会被重新认领（至多一次
    /// 重复投递，发件箱语义为 at-least-once）。
    pub async fn process_batch(&self) -> Result<usize, sqlx::Error> {
        let messages = sqlx::query_as::<_, OutboxMessage>(
            r#"
            UPDATE notification_outbox
            SET status = 'processing', updated_at = NOW()
            WHERE id IN (
                SELECT id FROM notification_outbox
                WHERE status = 'pending'
                   OR (status = 'processing' AND updated_at < NOW() - INTERVAL '5 minutes')
                ORDER BY created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT $1
            )
            RETURNING id, recipient_id, title, body, attempts
            "#,
        )
        .bind(self.batch_size)
        .fetch_all(&self.pool)
        .await?;

        let count = messages.len();

        for message in messages {
            self.deliver_one(message).await?;
        }

        Ok(count)
    }

    /// 投递单条消息并回写结果
    async fn deliver_one(&self, message: OutboxMessage) -> Result<(), sqlx::Error> {
        let subscription = sqlx::query_as::<_, Subscription>(
            "SELECT endpoint, p256dh, auth FROM push_subscriptions WHERE account_id = $1",
        )
        .bind(message.recipient_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(sub) = subscription else {
            // 没有订阅的账号不需要推送，直接标记完成
            sqlx::query(
                "UPDATE notification_outbox SET status = 'delivered', updated_at = NOW() \
                 WHERE id = $1",
            )
            .bind(message.id)
            .execute(&self.pool)
            .await?;
            return Ok(());
        };

        match self.sender.send(&sub, &message.title, &message.body).await {
            Ok(()) => {
                sqlx::query(
                    "UPDATE notification_outbox \
                     SET status = 'delivered', attempts = attempts + 1, updated_at = NOW() \
                     WHERE id = $1",
                )
                .bind(message.id)
                .execute(&self.pool)
                .await?;
                metrics::record_push_delivery(true);
            }
            Err(e) => {
                let exhausted = message.attempts + 1 >= self.max_attempts;
                let next_status = if exhausted { "failed" } else { "pending" };

                warn!(
                    outbox_id = message.id,
                    recipient_id = message.recipient_id,
                    attempts = message.attempts + 1,
                    error = %e,
                    "推送投递失败"
                );

                sqlx::query(
                    "UPDATE notification_outbox \
                     SET status = $1::outbox_status, attempts = attempts + 1, \
                         last_error = $2, updated_at = NOW() \
                     WHERE id = $3",
                )
                .bind(next_status)
                .bind(e.to_string())
                .bind(message.id)
                .execute(&self.pool)
                .await?;
                metrics::record_push_delivery(false);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 记录调用次数的测试发送器
    struct CountingSender {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PushSender for CountingSender {
        async fn send(
            &self,
            _subscription: &Subscription,
            _title: &str,
            _body: &str,
        ) -> Result<(), PushError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(PushError("模拟失败".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_log_sender_always_succeeds() {
        let sub = Subscription {
            endpoint: "https://push.example.com/ep".to_string(),
            p256dh: None,
            auth: None,
        };
        assert!(LogPushSender.send(&sub, "标题", "内容").await.is_ok());
    }

    #[tokio::test]
    async fn test_counting_sender() {
        let sender = CountingSender {
            calls: AtomicUsize::new(0),
            fail: true,
        };
        let sub = Subscription {
            endpoint: "https://push.example.com/ep".to_string(),
            p256dh: None,
            auth: None,
        };
        assert!(sender.send(&sub, "t", "b").await.is_err());
        assert_eq!(sender.calls.load(Ordering::SeqCst), 1);
    }

    /// 每条消息的投递结果独立落库：失败后行立即回到 pending（而不是
    /// 停留在 processing 或依赖批次末尾的提交），达到最大尝试次数后
    /// 收敛为 failed，不再重投
    #[tokio::test]
    #[ignore] // 需要数据库连接
    async fn test_delivery_outcome_recorded_per_message() {
        let config = campus_shared::config::DatabaseConfig::default();
        let db = campus_shared::database::Database::connect(&config)
            .await
            .unwrap();
        db.run_migrations().await.unwrap();
        let pool = db.pool().clone();

        sqlx::query("DELETE FROM notification_outbox")
            .execute(&pool)
            .await
            .unwrap();

        let account_id: i64 = sqlx::query_scalar(
            "INSERT INTO accounts (role, email, first_name) VALUES ('student', $1, '推送') RETURNING id",
        )
        .bind(format!("push-{}@test.local", uuid::Uuid::now_v7()))
        .fetch_one(&pool)
        .await
        .unwrap();

        sqlx::query(
            "INSERT INTO push_subscriptions (account_id, endpoint) VALUES ($1, 'https://push.example.com/ep')",
        )
        .bind(account_id)
        .execute(&pool)
        .await
        .unwrap();

        let outbox_id: i64 = sqlx::query_scalar(
            "INSERT INTO notification_outbox (recipient_id, title, body) VALUES ($1, '标题', '内容') RETURNING id",
        )
        .bind(account_id)
        .fetch_one(&pool)
        .await
        .unwrap();

        let sender = Arc::new(CountingSender {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let worker = PushWorker::new(pool.clone(), sender.clone(), 10, 100, 2);

        let status_of = |pool: PgPool, id: i64| async move {
            sqlx::query_as::<_, (String, i32)>(
                "SELECT status::text, attempts FROM notification_outbox WHERE id = $1",
            )
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap()
        };

        // 第一次失败：attempts 已计入，行回到 pending 等待重试
        assert_eq!(worker.process_batch().await.unwrap(), 1);
        let (status, attempts) = status_of(pool.clone(), outbox_id).await;
        assert_eq!(status, "pending");
        assert_eq!(attempts, 1);

        // 第二次失败达到 max_attempts：收敛为 failed
        assert_eq!(worker.process_batch().await.unwrap(), 1);
        let (status, attempts) = status_of(pool.clone(), outbox_id).await;
        assert_eq!(status, "failed");
        assert_eq!(attempts, 2);

        // failed 行不再被认领，投递次数不继续增长
        assert_eq!(worker.process_batch().await.unwrap(), 0);
        assert_eq!(sender.calls.load(Ordering::SeqCst), 2);

        // 没有订阅的账号的消息直接标记 delivered，不触发外部投递
        let nosub_id: i64 = sqlx::query_scalar(
            "INSERT INTO accounts (role, email, first_name) VALUES ('student', $1, '无订阅') RETURNING id",
        )
        .bind(format!("nosub-{}@test.local", uuid::Uuid::now_v7()))
        .fetch_one(&pool)
        .await
        .unwrap();
        let nosub_outbox_id: i64 = sqlx::query_scalar(
            "INSERT INTO notification_outbox (recipient_id, title, body) VALUES ($1, '标题', '内容') RETURNING id",
        )
        .bind(nosub_id)
        .fetch_one(&pool)
        .await
        .unwrap();

        assert_eq!(worker.process_batch().await.unwrap(), 1);
        let (status, _) = status_of(pool.clone(), nosub_outbox_id).await;
        assert_eq!(status, "delivered");
        // 外部投递次数没有增长
        assert_eq!(sender.calls.load(Ordering::SeqCst), 2);
    }
}
