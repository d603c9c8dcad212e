use thiserror::Error;

/// 書き込み前に検出される入力エラー。
///
/// 表示文字列はそのままJSONレスポンスの `err` に載る機械向けコード。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid {field}: {value}")]
    InvalidScope { field: &'static str, value: String },

    #[error("invalid target_value for {0}")]
    InvalidTargetValue(String),

    #[error("invalid ip: {0}")]
    InvalidIp(String),

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("invalid pair: {0}")]
    InvalidPair(String),

    #[error("invalid entries: {0}")]
    InvalidEntries(String),

    #[error("unknown verb: {0}")]
    UnknownVerb(String),

    #[error("empty {0}")]
    Empty(&'static str),

    #[error("no entries")]
    NoEntries,
}
