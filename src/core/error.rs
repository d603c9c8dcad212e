use crate::cache::CacheError;
use crate::database::error::DbError;
use crate::storage::AuditError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InitProcessError {
    #[error("ロガーのセットアップに失敗しました: {0}")]
    LoggerError(String),

    #[error("データベース接続エラー: {0}")]
    DatabaseConnectionError(String),

    #[error("キャッシュ接続エラー: {0}")]
    CacheConnectionError(String),

    #[error("スキーマ検出エラー: {0}")]
    SchemaDetectionError(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("初期化エラー: {0}")]
    Init(#[from] InitProcessError),

    #[error("キャッシュエラー: {0}")]
    Cache(#[from] CacheError),

    #[error("監査ログエラー: {0}")]
    Audit(#[from] AuditError),

    #[error("データベースエラー: {0}")]
    Database(#[from] DbError),

    #[error("JSON出力エラー: {0}")]
    Output(#[from] serde_json::Error),
}

pub type AppResult<T> = Result<T, AppError>;
