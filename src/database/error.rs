use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("データベースエラー: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("コネクションプールエラー: {0}")]
    Pool(#[from] bb8::RunError<tokio_postgres::Error>),
}
