use crate::cache::{CacheError, RuleCache};
use async_trait::async_trait;

/// 起動時に接続できなかったキャッシュの代わり。
///
/// 全操作が接続エラーを返すので、要求は通常どおり処理されて操作ごとに `ERR` として監査される。
pub struct UnavailableCache {
    reason: String,
}

impl UnavailableCache {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }

    fn refuse<T>(&self) -> Result<T, CacheError> {
        Err(CacheError::Connection(self.reason.clone()))
    }
}

#[async_trait]
impl RuleCache for UnavailableCache {
    async fn add_member(&self, _key: &str, _member: &str) -> Result<bool, CacheError> {
        self.refuse()
    }

    async fn remove_member(&self, _key: &str, _member: &str) -> Result<bool, CacheError> {
        self.refuse()
    }

    async fn members(&self, _key: &str) -> Result<Vec<String>, CacheError> {
        self.refuse()
    }

    async fn scan_keys(&self, _pattern: &str) -> Result<Vec<String>, CacheError> {
        self.refuse()
    }

    async fn publish(&self, _channel: &str, _message: &str) -> Result<(), CacheError> {
        self.refuse()
    }
}
