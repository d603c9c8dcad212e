//! 状態ストア兼イベントバスとしての共有キャッシュ。

pub mod redis_cache;
pub mod unavailable;
#[cfg(test)]
pub mod memory;

pub use redis_cache::RedisCache;
pub use unavailable::UnavailableCache;

use crate::core::config::CacheConfig;
use async_trait::async_trait;
use log::error;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("キャッシュ接続エラー: {0}")]
    Connection(String),

    #[error("キャッシュ操作がタイムアウトしました: {0}")]
    Timeout(String),

    #[error("キャッシュコマンドエラー: {0}")]
    Command(String),
}

/// ルールのメンバーシップセットとイベントチャネルへのアクセス。
///
/// 各メソッドは単一キーに対してアトミック。複数キーにまたがる原子性はない。
#[async_trait]
pub trait RuleCache: Send + Sync {
    /// 追加されたら `true`、既に存在していたら `false`
    async fn add_member(&self, key: &str, member: &str) -> Result<bool, CacheError>;

    /// 削除されたら `true`、存在しなかったら `false`
    async fn remove_member(&self, key: &str, member: &str) -> Result<bool, CacheError>;

    async fn members(&self, key: &str) -> Result<Vec<String>, CacheError>;

    /// グロブパターンに一致するキーの列挙
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, CacheError>;

    async fn publish(&self, channel: &str, message: &str) -> Result<(), CacheError>;
}

/// 書き込み経路用の接続。失敗した場合は `UnavailableCache` に置き換えて処理を続ける。
pub async fn connect_or_unavailable(config: &CacheConfig) -> Arc<dyn RuleCache> {
    match RedisCache::connect(config).await {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            error!("キャッシュに接続できないため全操作をエラーとして記録します: {}", e);
            Arc::new(UnavailableCache::new(e.to_string()))
        }
    }
}
