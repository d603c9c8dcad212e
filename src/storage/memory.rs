use crate::storage::models::{AuditRecord, AuditStats, AuditStatus};
use crate::storage::{AuditError, AuditStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tokio::sync::Mutex;

/// テスト用のインメモリ監査ストア
#[derive(Default)]
pub struct MemoryAuditStore {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    records: Vec<AuditRecord>,
    next_id: i64,
    fail_insert: bool,
    fail_read: bool,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_insert(&self, fail: bool) {
        self.state.lock().await.fail_insert = fail;
    }

    pub async fn fail_read(&self, fail: bool) {
        self.state.lock().await.fail_read = fail;
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.state.lock().await.records.clone()
    }

    fn newest_first(mut records: Vec<AuditRecord>) -> Vec<AuditRecord> {
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        records
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn insert(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut state = self.state.lock().await;
        if state.fail_insert {
            return Err(AuditError::Write("insert refused".to_string()));
        }
        state.next_id += 1;
        let mut record = record.clone();
        record.id = Some(state.next_id);
        state.records.push(record);
        Ok(())
    }

    async fn creation_history(&self) -> Result<Vec<AuditRecord>, AuditError> {
        let state = self.state.lock().await;
        if state.fail_read {
            return Err(AuditError::Read("history unavailable".to_string()));
        }
        let history = state
            .records
            .iter()
            .filter(|r| r.verb().map(|verb| verb.is_creating()).unwrap_or(false))
            .cloned()
            .collect();
        Ok(Self::newest_first(history))
    }

    async fn recent(&self, actor: Option<i64>, limit: i64) -> Result<Vec<AuditRecord>, AuditError> {
        let state = self.state.lock().await;
        if state.fail_read {
            return Err(AuditError::Read("recent unavailable".to_string()));
        }
        let records = state
            .records
            .iter()
            .filter(|r| actor.map(|id| r.actor_user_id == id).unwrap_or(true))
            .cloned()
            .collect();
        let mut records = Self::newest_first(records);
        records.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(records)
    }

    async fn stats_since(
        &self,
        since: DateTime<Utc>,
        actor: Option<i64>,
    ) -> Result<AuditStats, AuditError> {
        let state = self.state.lock().await;
        if state.fail_read {
            return Err(AuditError::Read("stats unavailable".to_string()));
        }
        let window: Vec<&AuditRecord> = state
            .records
            .iter()
            .filter(|r| r.created_at > since)
            .filter(|r| actor.map(|id| r.actor_user_id == id).unwrap_or(true))
            .collect();
        let count = |status: AuditStatus| window.iter().filter(|r| r.status == status).count() as i64;
        Ok(AuditStats {
            total_actions: window.len() as i64,
            success_count: count(AuditStatus::Ok),
            error_count: count(AuditStatus::Err),
            unique_ips: window.iter().map(|r| r.actor_ip.as_str()).collect::<BTreeSet<_>>().len() as i64,
        })
    }
}
