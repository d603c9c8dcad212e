use crate::core::config::DatabaseConfig;
use crate::database::error::DbError;
use bb8::{Pool, PooledConnection};
use bb8_postgres::PostgresConnectionManager;
use log::info;
use std::time::Duration;
use tokio_postgres::NoTls;

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// 監査ログを保持するPostgreSQLへのコネクションプール。
/// 起動時に1つ作り、監査ストアに渡す。
#[derive(Clone)]
pub struct Database {
    pub pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DbError> {
        let manager =
            PostgresConnectionManager::new_from_stringlike(config.connection_string(), NoTls)?;
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .connection_timeout(CONNECTION_TIMEOUT)
            .build(manager)
            .await?;

        info!(
            "データベースに接続しました: {}:{}/{}",
            config.host, config.port, config.database
        );
        Ok(Self { pool })
    }

    pub async fn client(
        &self,
    ) -> Result<PooledConnection<'_, PostgresConnectionManager<NoTls>>, DbError> {
        Ok(self.pool.get().await?)
    }
}
