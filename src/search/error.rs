//! Search errors / 搜索错误

use thiserror::Error;

use super::dialect::DialectKind;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("database error: {0}")]
    Backend(#[from] sqlx::Error),

    #[error("query rendered for {expected:?} cannot run on a {actual:?} connection")]
    DialectMismatch {
        expected: DialectKind,
        actual: DialectKind,
    },

    #[error("search cancelled")]
    Cancelled,

    #[error("malformed tag list: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SearchError>;
