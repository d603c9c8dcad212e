use crate::database::{Database, DbError, ExecuteQuery};
use log::info;

/// 監査テーブルの任意拡張の有無。起動時に一度だけ検出し、ストアに注入する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditSchema {
    /// `target_port_from` / `target_port_to` 列が存在するか
    pub has_port_range: bool,
}

impl AuditSchema {
    pub const BASE: AuditSchema = AuditSchema { has_port_range: false };
    pub const WITH_PORT_RANGE: AuditSchema = AuditSchema { has_port_range: true };

    pub async fn detect(db: &Database) -> Result<Self, DbError> {
        let row = db
            .query_one(
                "SELECT COUNT(*) FROM information_schema.columns
                 WHERE table_name = 'firewall_logs'
                   AND column_name IN ('target_port_from', 'target_port_to')",
                &[],
            )
            .await?;
        let columns: i64 = row.get(0);
        let schema = if columns == 2 {
            Self::WITH_PORT_RANGE
        } else {
            Self::BASE
        };
        info!("監査テーブルのポート範囲列: {}", if schema.has_port_range { "あり" } else { "なし" });
        Ok(schema)
    }
}
