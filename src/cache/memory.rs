use crate::cache::{CacheError, RuleCache};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tokio::sync::Mutex;

#[derive(Default)]
struct State {
    sets: BTreeMap<String, BTreeSet<String>>,
    published: Vec<(String, String)>,
    failing_keys: HashSet<String>,
    failing_patterns: HashSet<String>,
    fail_publish: bool,
    down: bool,
}

/// テスト用のインメモリキャッシュ。キー単位で障害を注入できる。
#[derive(Default)]
pub struct MemoryCache {
    state: Mutex<State>,
}

fn glob_match(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => pattern == key,
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_key(&self, key: &str) {
        self.state.lock().await.failing_keys.insert(key.to_string());
    }

    pub async fn fail_scan(&self, pattern: &str) {
        self.state.lock().await.failing_patterns.insert(pattern.to_string());
    }

    pub async fn fail_publish(&self) {
        self.state.lock().await.fail_publish = true;
    }

    /// 全操作を接続エラーにする
    pub async fn set_down(&self, down: bool) {
        self.state.lock().await.down = down;
    }

    pub async fn set(&self, key: &str) -> BTreeSet<String> {
        self.state.lock().await.sets.get(key).cloned().unwrap_or_default()
    }

    /// 空でないセットを持つキー
    pub async fn populated_keys(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .sets
            .iter()
            .filter(|(_, members)| !members.is_empty())
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub async fn published(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.published.iter().map(|(_, msg)| msg.clone()).collect()
    }

    pub async fn published_on(&self, channel: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .published
            .iter()
            .filter(|(ch, _)| ch == channel)
            .map(|(_, msg)| msg.clone())
            .collect()
    }
}

impl State {
    fn check(&self, key: &str) -> Result<(), CacheError> {
        if self.down {
            return Err(CacheError::Connection("connection refused".to_string()));
        }
        if self.failing_keys.contains(key) {
            return Err(CacheError::Command(format!("{} への書き込みに失敗", key)));
        }
        Ok(())
    }
}

#[async_trait]
impl RuleCache for MemoryCache {
    async fn add_member(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        let mut state = self.state.lock().await;
        state.check(key)?;
        Ok(state
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        let mut state = self.state.lock().await;
        state.check(key)?;
        // 空になってもキーは残す
        Ok(state
            .sets
            .get_mut(key)
            .map(|members| members.remove(member))
            .unwrap_or(false))
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, CacheError> {
        let state = self.state.lock().await;
        state.check(key)?;
        Ok(state
            .sets
            .get(key)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let state = self.state.lock().await;
        if state.down || state.failing_patterns.contains(pattern) {
            return Err(CacheError::Command(format!("SCAN {} に失敗", pattern)));
        }
        Ok(state
            .sets
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect())
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;
        if state.down || state.fail_publish {
            return Err(CacheError::Connection("publish failed".to_string()));
        }
        state.published.push((channel.to_string(), message.to_string()));
        Ok(())
    }
}
