//! 誰が何をしたかを記録する永続的な監査ログ。

use crate::storage::models::{AuditRecord, AuditStats};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod migrations;
pub mod models;
pub mod repository;
pub mod schema;
#[cfg(test)]
pub mod memory;

pub use repository::PostgresAuditStore;
pub use schema::AuditSchema;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("監査ログの書き込みに失敗しました: {0}")]
    Write(String),

    #[error("監査ログの読み込みに失敗しました: {0}")]
    Read(String),
}

/// 追記専用の監査ストア。変更系の経路では `insert` しか使わない。
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert(&self, record: &AuditRecord) -> Result<(), AuditError>;

    /// 作成系アクションのレコードを結果を問わず新しい順に返す (所有者の導出に使う)
    async fn creation_history(&self) -> Result<Vec<AuditRecord>, AuditError>;

    /// 直近のレコード。`actor` を指定するとその操作者のものだけ。
    async fn recent(&self, actor: Option<i64>, limit: i64) -> Result<Vec<AuditRecord>, AuditError>;

    async fn stats_since(
        &self,
        since: DateTime<Utc>,
        actor: Option<i64>,
    ) -> Result<AuditStats, AuditError>;
}
