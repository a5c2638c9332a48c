use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetaError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("フォルダが見つかりません: {0}")]
    FolderNotFound(String),

    #[error("カタログが不正: {0}")]
    InvalidCatalog(String),

    #[error("ルールファイルが不正: {0}")]
    InvalidRules(String),

    #[error("キー検証エラー ({} 件): {}", .0.len(), .0.join("; "))]
    Validation(Vec<String>),

    #[error("バックアップ作成に失敗（カタログは未変更）: {0}")]
    Backup(String),

    #[error("出力先が既に存在します: {0}（--force で上書き）")]
    AlreadyExists(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] anatomy_meta_common::Error),
}

pub type Result<T> = std::result::Result<T, MetaError>;
