use thiserror::Error;

#[derive(Error, Debug)]
pub enum SceneSyncError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("フォルダが見つかりません: {0}")]
    FolderNotFound(String),

    #[error("画像が見つかりません: {0}")]
    NoImagesFound(String),

    #[error("画像読み込みエラー: {0}")]
    Image(#[from] image::ImageError),

    #[error("特徴量抽出エラー: {0}")]
    Extraction(String),

    #[error("特徴量抽出がタイムアウトしました ({seconds}秒): {path}")]
    Timeout { path: String, seconds: u64 },

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] scene_sync_common::Error),
}

pub type Result<T> = std::result::Result<T, SceneSyncError>;
