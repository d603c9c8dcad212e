use crate::cache::{CacheError, RuleCache};
use crate::rules::{ScopeName, ValidationError, KEY_PREFIX};
use log::info;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// ダッシュボードの選択肢に出すサーバーIDの一覧 (`fw:known_servers`)。
/// ルールの配布先とは独立しており、未登録のIDへのルールも書き込める。
pub struct ServerRegistry {
    cache: Arc<dyn RuleCache>,
    key: String,
}

impl ServerRegistry {
    pub fn new(cache: Arc<dyn RuleCache>) -> Self {
        Self {
            cache,
            key: format!("{}:known_servers", KEY_PREFIX),
        }
    }

    pub async fn list(&self) -> Result<Vec<String>, CacheError> {
        let mut servers = self.cache.members(&self.key).await?;
        servers.sort();
        Ok(servers)
    }

    /// 追加されたら `true`。登録済みなら `false`。
    pub async fn add(&self, server_id: &str) -> Result<bool, RegistryError> {
        let trimmed = server_id.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty("server_id").into());
        }
        let name = ScopeName::parse(trimmed).ok_or_else(|| ValidationError::InvalidScope {
            field: "server_id",
            value: trimmed.to_string(),
        })?;

        let added = self.cache.add_member(&self.key, name.as_str()).await?;
        if added {
            info!("サーバーを登録しました: {}", name);
        }
        Ok(added)
    }
}
