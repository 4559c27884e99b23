//! エラー型定義

use std::fmt;
use thiserror::Error;

/// 照合対象のプール種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// フィルム写真（照合元）
    Query,
    /// 現場写真（照合先）
    Candidate,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKind::Query => write!(f, "query"),
            PoolKind::Candidate => write!(f, "candidate"),
        }
    }
}

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Empty {pool} pool: nothing to match")]
    EmptyPool { pool: PoolKind },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Feature extraction failed for {item}: {reason}")]
    Extraction { item: String, reason: String },
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;
