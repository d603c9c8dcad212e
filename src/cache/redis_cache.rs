use crate::cache::{CacheError, RuleCache};
use crate::core::config::CacheConfig;
use async_trait::async_trait;
use log::{debug, info};
use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use std::future::Future;
use std::time::Duration;

const SCAN_BATCH: usize = 200;

impl From<RedisError> for CacheError {
    fn from(err: RedisError) -> Self {
        if err.is_timeout() {
            CacheError::Timeout(err.to_string())
        } else if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
            CacheError::Connection(err.to_string())
        } else {
            CacheError::Command(err.to_string())
        }
    }
}

/// Redis上のセットとPub/Subを使う実装。
/// 接続は起動時に1つ作られ、処理の間ずっと共有される。
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
    op_timeout: Duration,
}

impl RedisCache {
    pub async fn connect(config: &CacheConfig) -> Result<Self, CacheError> {
        let client = Client::open(config.url())?;
        let manager = tokio::time::timeout(config.connect_timeout(), ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout(format!("{}:{} への接続", config.host, config.port)))??;

        info!("キャッシュに接続しました: {}:{} db={}", config.host, config.port, config.db);
        Ok(Self {
            manager,
            op_timeout: config.op_timeout(),
        })
    }

    /// 操作ごとのタイムアウトを課す
    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, RedisError>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(CacheError::from),
            Err(_) => Err(CacheError::Timeout(op.to_string())),
        }
    }
}

#[async_trait]
impl RuleCache for RedisCache {
    async fn add_member(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        let mut conn = self.manager.clone();
        let added: i64 = self
            .bounded("SADD", redis::cmd("SADD").arg(key).arg(member).query_async(&mut conn))
            .await?;
        debug!("SADD {} {} -> {}", key, member, added);
        Ok(added > 0)
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        let mut conn = self.manager.clone();
        let removed: i64 = self
            .bounded("SREM", redis::cmd("SREM").arg(key).arg(member).query_async(&mut conn))
            .await?;
        debug!("SREM {} {} -> {}", key, member, removed);
        Ok(removed > 0)
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.manager.clone();
        self.bounded("SMEMBERS", redis::cmd("SMEMBERS").arg(key).query_async(&mut conn))
            .await
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        // KEYSはサーバーをブロックするのでSCANで辿る
        let mut conn = self.manager.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = self
                .bounded(
                    "SCAN",
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn),
                )
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let receivers: i64 = self
            .bounded(
                "PUBLISH",
                redis::cmd("PUBLISH").arg(channel).arg(message).query_async(&mut conn),
            )
            .await?;
        debug!("PUBLISH {} '{}' -> 受信者 {}", channel, message, receivers);
        Ok(())
    }
}
