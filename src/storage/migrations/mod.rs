use crate::database::{Database, DbError};

pub async fn run_migrations(db: &Database) -> Result<(), DbError> {
    let client = db.client().await?;
    client
        .batch_execute(
            r#"
            -- 監査ログテーブル
            CREATE TABLE IF NOT EXISTS firewall_logs (
                id BIGSERIAL PRIMARY KEY,
                action TEXT NOT NULL,
                target_ip TEXT,
                target_port INTEGER,
                comment TEXT NOT NULL DEFAULT '',
                target_server TEXT,
                target_servers TEXT,
                target_group TEXT,
                target_groups TEXT,
                actor_user_id BIGINT NOT NULL,
                actor_name TEXT NOT NULL,
                actor_ip TEXT NOT NULL,
                user_agent TEXT NOT NULL,
                status TEXT NOT NULL,
                error_msg TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );

            -- ポート範囲の拡張列 (後から追加されたもの)
            ALTER TABLE firewall_logs ADD COLUMN IF NOT EXISTS target_port_from INTEGER;
            ALTER TABLE firewall_logs ADD COLUMN IF NOT EXISTS target_port_to INTEGER;

            -- インデックス
            CREATE INDEX IF NOT EXISTS idx_firewall_logs_created_at ON firewall_logs (created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_firewall_logs_actor ON firewall_logs (actor_user_id);
            CREATE INDEX IF NOT EXISTS idx_firewall_logs_action ON firewall_logs (action);
            "#,
        )
        .await?;

    Ok(())
}
