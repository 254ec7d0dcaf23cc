//! Redis 缓存管理模块
//!
//! 提供 Redis 连接管理和常用缓存操作封装。读路径统一走 `get_or_set`
//! 旁路缓存助手，写路径通过 `delete` 做失效，避免在各 handler 重复实现。

use crate::config::RedisConfig;
use crate::error::{Result, SharedError};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::{info, instrument};

/// 档案类缓存的默认有效期（秒）
pub const PROFILE_CACHE_TTL: Duration = Duration::from_secs(300);

/// Redis 缓存客户端
#[derive(Clone)]
pub struct Cache {
    client: Client,
}

impl Cache {
    /// 创建 Redis 客户端
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        info!("Redis client created");
        Ok(Self { client })
    }

    /// 获取连接
    async fn get_conn(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(SharedError::from)
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.get_conn().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(SharedError::from)
    }

    /// 获取值
    #[instrument(skip(self))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.get_conn().await?;
        let value: Option<String> = conn.get(key).await?;

        match value {
            Some(v) => {
                let parsed: T = serde_json::from_str(&v).map_err(|e| {
                    SharedError::Internal(format!("Cache deserialization error: {}", e))
                })?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    /// 设置值
    #[instrument(skip(self, value))]
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let serialized = serde_json::to_string(value)
            .map_err(|e| SharedError::Internal(format!("Cache serialization error: {}", e)))?;

        let _: () = conn.set_ex(key, serialized, ttl.as_secs()).await?;
        Ok(())
    }

    /// 删除值
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    /// 批量删除（按模式）
    #[instrument(skip(self))]
    pub async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.get_conn().await?;
        let keys: Vec<String> = conn.keys(pattern).await?;

        if keys.is_empty() {
            return Ok(0);
        }

        let count: u64 = conn.del(keys).await?;
        Ok(count)
    }

    /// 检查键是否存在
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.get_conn().await?;
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    /// 获取或设置（读路径旁路缓存）
    ///
    /// 命中则直接返回缓存值；未命中时调用 loader 加载数据源并回填。
    /// 所有档案类读接口统一复用此方法，保证缓存命中与未命中返回同一形状。
    #[instrument(skip(self, loader))]
    pub async fn get_or_set<T, F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        if let Some(cached) = self.get::<T>(key).await? {
            return Ok(cached);
        }

        let value = loader().await?;

        self.set(key, &value, ttl).await?;

        Ok(value)
    }

    /// 增量操作
    pub async fn incr(&self, key: &str, delta: i64) -> Result<i64> {
        let mut conn = self.get_conn().await?;
        let result: i64 = conn.incr(key, delta).await?;
        Ok(result)
    }

    /// 设置过期时间
    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let _: () = conn.expire(key, ttl.as_secs() as i64).await?;
        Ok(())
    }
}

/// 缓存键生成器
///
/// 集中定义所有缓存键格式，避免各 handler 手写字符串导致失效漏删。
pub struct CacheKey;

impl CacheKey {
    /// 登录会话标记，存在即代表会话有效
    pub fn session(account_id: i64) -> String {
        format!("auth:session:{}", account_id)
    }

    /// 档案子实体列表（experience/education/skills/projects/certifications）
    pub fn profile_entity(entity: &str, account_id: i64) -> String {
        format!("profile:{}:{}", entity, account_id)
    }

    /// 个人简介（about）
    pub fn about(account_id: i64) -> String {
        format!("profile:about:{}", account_id)
    }

    /// 公开主页聚合
    pub fn public_profile(account_id: i64) -> String {
        format!("profile:public:{}", account_id)
    }

    /// 限流计数窗口
    pub fn rate_limit(scope: &str, window_start: u64) -> String {
        format!("rate:{}:{}", scope, window_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_cache_key_generation() {
        assert_eq!(CacheKey::session(42), "auth:session:42");
        assert_eq!(
            CacheKey::profile_entity("experience", 7),
            "profile:experience:7"
        );
        assert_eq!(CacheKey::about(7), "profile:about:7");
        assert_eq!(CacheKey::rate_limit("user:5:write", 100), "rate:user:5:write:100");
    }

    /// 未命中时调用 loader 并回填，命中后不再触发 loader；
    /// 两条路径返回的序列化形状完全一致
    #[tokio::test]
    #[ignore] // 需要 Redis 连接
    async fn test_get_or_set_loads_once_and_shapes_match() {
        let cache = Cache::new(&crate::config::RedisConfig::default()).unwrap();
        let key = format!("test:get_or_set:{}", uuid::Uuid::new_v4());
        let calls = AtomicUsize::new(0);

        let load = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(vec!["软件工程".to_string(), "分布式系统".to_string()]) }
        };

        let miss: Vec<String> = cache
            .get_or_set(&key, Duration::from_secs(30), load)
            .await
            .unwrap();
        let hit: Vec<String> = cache
            .get_or_set(&key, Duration::from_secs(30), load)
            .await
            .unwrap();

        // loader 只在未命中那一次被调用
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // 缓存命中与数据源读取返回同一形状
        assert_eq!(
            serde_json::to_value(&miss).unwrap(),
            serde_json::to_value(&hit).unwrap()
        );

        cache.delete(&key).await.unwrap();
    }
}
