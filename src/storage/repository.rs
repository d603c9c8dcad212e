use crate::database::{Database, ExecuteQuery};
use crate::rules::{AuditScope, Verb};
use crate::storage::models::{AuditRecord, AuditStats, AuditStatus};
use crate::storage::{AuditError, AuditSchema, AuditStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

const INSERT_BASE: &str = "INSERT INTO firewall_logs
    (action, target_ip, target_port, comment, target_server, target_servers, target_group, target_groups,
     actor_user_id, actor_name, actor_ip, user_agent, status, error_msg, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)";

const INSERT_WITH_RANGE: &str = "INSERT INTO firewall_logs
    (action, target_ip, target_port, comment, target_server, target_servers, target_group, target_groups,
     actor_user_id, actor_name, actor_ip, user_agent, status, error_msg, created_at,
     target_port_from, target_port_to)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)";

const SELECT_BASE: &str = "SELECT id, action, target_ip, target_port,
    NULL::INTEGER AS target_port_from, NULL::INTEGER AS target_port_to,
    comment, target_server, target_servers, target_group, target_groups,
    actor_user_id, actor_name, actor_ip, user_agent, status, error_msg, created_at
    FROM firewall_logs";

const SELECT_WITH_RANGE: &str = "SELECT id, action, target_ip, target_port,
    target_port_from, target_port_to,
    comment, target_server, target_servers, target_group, target_groups,
    actor_user_id, actor_name, actor_ip, user_agent, status, error_msg, created_at
    FROM firewall_logs";

/// PostgreSQLの `firewall_logs` テーブルへの監査ストア。
/// 挿入文は起動時に検出したスキーマに合わせて選ぶ。
pub struct PostgresAuditStore {
    db: Database,
    schema: AuditSchema,
}

impl PostgresAuditStore {
    pub fn new(db: Database, schema: AuditSchema) -> Self {
        Self { db, schema }
    }

    fn insert_statement(schema: AuditSchema) -> &'static str {
        if schema.has_port_range {
            INSERT_WITH_RANGE
        } else {
            INSERT_BASE
        }
    }

    fn select_statement(schema: AuditSchema) -> &'static str {
        if schema.has_port_range {
            SELECT_WITH_RANGE
        } else {
            SELECT_BASE
        }
    }

    /// 範囲列がない場合、範囲の情報が失われないようコメントに残す
    fn stored_comment(record: &AuditRecord, schema: AuditSchema) -> String {
        match (record.target_port_from, record.target_port_to) {
            (Some(from), Some(to)) if !schema.has_port_range => {
                let range = format!("(range: {}-{})", from, to);
                if record.comment.is_empty() {
                    range
                } else {
                    format!("{} {}", record.comment, range)
                }
            }
            _ => record.comment.clone(),
        }
    }

    fn record_from_row(row: &Row) -> AuditRecord {
        let status: String = row.get("status");
        AuditRecord {
            id: Some(row.get("id")),
            action: row.get("action"),
            target_ip: row.get("target_ip"),
            target_port: row.get("target_port"),
            target_port_from: row.get("target_port_from"),
            target_port_to: row.get("target_port_to"),
            comment: row.get::<_, Option<String>>("comment").unwrap_or_default(),
            scope: AuditScope {
                target_server: row.get("target_server"),
                target_servers: row.get("target_servers"),
                target_group: row.get("target_group"),
                target_groups: row.get("target_groups"),
            },
            actor_user_id: row.get("actor_user_id"),
            actor_name: row.get("actor_name"),
            actor_ip: row.get("actor_ip"),
            user_agent: row.get("user_agent"),
            status: AuditStatus::parse(&status),
            error_msg: row.get("error_msg"),
            created_at: row.get("created_at"),
        }
    }

    fn creating_actions() -> Vec<String> {
        Verb::all()
            .filter(Verb::is_creating)
            .map(|verb| verb.as_str().to_string())
            .collect()
    }
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    async fn insert(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let comment = Self::stored_comment(record, self.schema);
        let status = record.status.as_str();

        let mut params: Vec<&(dyn ToSql + Sync)> = vec![
            &record.action,
            &record.target_ip,
            &record.target_port,
            &comment,
            &record.scope.target_server,
            &record.scope.target_servers,
            &record.scope.target_group,
            &record.scope.target_groups,
            &record.actor_user_id,
            &record.actor_name,
            &record.actor_ip,
            &record.user_agent,
            &status,
            &record.error_msg,
            &record.created_at,
        ];
        if self.schema.has_port_range {
            params.push(&record.target_port_from);
            params.push(&record.target_port_to);
        }

        self.db
            .execute(Self::insert_statement(self.schema), &params)
            .await
            .map_err(|e| AuditError::Write(e.to_string()))?;

        debug!("監査ログを記録しました: {} {}", record.action, record.status.as_str());
        Ok(())
    }

    async fn creation_history(&self) -> Result<Vec<AuditRecord>, AuditError> {
        let actions = Self::creating_actions();
        let query = format!(
            "{} WHERE action = ANY($1) ORDER BY created_at DESC, id DESC",
            Self::select_statement(self.schema)
        );
        let rows = self
            .db
            .query(&query, &[&actions])
            .await
            .map_err(|e| AuditError::Read(e.to_string()))?;
        Ok(rows.iter().map(Self::record_from_row).collect())
    }

    async fn recent(&self, actor: Option<i64>, limit: i64) -> Result<Vec<AuditRecord>, AuditError> {
        let query = format!(
            "{} WHERE ($1::BIGINT IS NULL OR actor_user_id = $1)
             ORDER BY created_at DESC, id DESC LIMIT $2",
            Self::select_statement(self.schema)
        );
        let rows = self
            .db
            .query(&query, &[&actor, &limit])
            .await
            .map_err(|e| AuditError::Read(e.to_string()))?;
        Ok(rows.iter().map(Self::record_from_row).collect())
    }

    async fn stats_since(
        &self,
        since: DateTime<Utc>,
        actor: Option<i64>,
    ) -> Result<AuditStats, AuditError> {
        let row = self
            .db
            .query_one(
                "SELECT COUNT(*),
                        COUNT(*) FILTER (WHERE status = 'OK'),
                        COUNT(*) FILTER (WHERE status = 'ERR'),
                        COUNT(DISTINCT actor_ip)
                 FROM firewall_logs
                 WHERE created_at > $1 AND ($2::BIGINT IS NULL OR actor_user_id = $2)",
                &[&since, &actor],
            )
            .await
            .map_err(|e| AuditError::Read(e.to_string()))?;

        Ok(AuditStats {
            total_actions: row.get(0),
            success_count: row.get(1),
            error_count: row.get(2),
            unique_ips: row.get(3),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(comment: &str, range: Option<(i32, i32)>) -> AuditRecord {
        AuditRecord {
            id: None,
            action: "unblock_port".to_string(),
            target_ip: None,
            target_port: None,
            target_port_from: range.map(|r| r.0),
            target_port_to: range.map(|r| r.1),
            comment: comment.to_string(),
            scope: AuditScope::default(),
            actor_user_id: 1,
            actor_name: "admin".to_string(),
            actor_ip: "cli".to_string(),
            user_agent: "cli".to_string(),
            status: AuditStatus::Ok,
            error_msg: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_statement_follows_schema() {
        let base = PostgresAuditStore::insert_statement(AuditSchema::BASE);
        let extended = PostgresAuditStore::insert_statement(AuditSchema::WITH_PORT_RANGE);
        assert!(!base.contains("target_port_from"));
        assert!(base.contains("$15)"));
        assert!(extended.contains("target_port_from, target_port_to"));
        assert!(extended.contains("$17)"));
    }

    #[test]
    fn test_range_kept_in_comment_without_extension() {
        let r = record("maintenance", Some((20000, 30000)));
        assert_eq!(
            PostgresAuditStore::stored_comment(&r, AuditSchema::BASE),
            "maintenance (range: 20000-30000)"
        );
        assert_eq!(
            PostgresAuditStore::stored_comment(&r, AuditSchema::WITH_PORT_RANGE),
            "maintenance"
        );
        let r = record("", Some((1, 2)));
        assert_eq!(PostgresAuditStore::stored_comment(&r, AuditSchema::BASE), "(range: 1-2)");
        let r = record("plain", None);
        assert_eq!(PostgresAuditStore::stored_comment(&r, AuditSchema::BASE), "plain");
    }

    #[test]
    fn test_creating_actions() {
        let actions = PostgresAuditStore::creating_actions();
        assert_eq!(actions.len(), 5);
        assert!(actions.contains(&"ban_ip".to_string()));
        assert!(!actions.iter().any(|a| a.starts_with("un")));
    }
}
