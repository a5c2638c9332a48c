//! エラー型定義

use thiserror::Error;

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown group: {0}")]
    UnknownGroup(String),

    #[error("Rules error: {0}")]
    Rules(String),

    #[error("Table error: {0}")]
    Table(String),

    #[error("Missing columns in {table}: {missing:?}")]
    MissingColumns { table: String, missing: Vec<String> },
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;
