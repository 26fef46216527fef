use thiserror::Error;

use crate::types::DataType;

/// Canonical FSQ error taxonomy used across crates.
///
/// Classification guidance:
/// - [`FsqError::Parse`]: SQL syntax failures, reported before planning
/// - [`FsqError::Schema`]: unknown columns / type mismatches found at plan time
/// - [`FsqError::Type`]: incompatible operand types detected at runtime
/// - [`FsqError::Io`] / [`FsqError::Auth`]: file/HTTP/S3 access failures
/// - [`FsqError::Data`]: malformed records a reader cannot degrade to nulls
#[derive(Debug, Error)]
pub enum FsqError {
    /// SQL syntax error with the byte offset and a source snippet.
    #[error("parse error at offset {offset}: {message} (near `{snippet}`)")]
    Parse {
        /// What went wrong.
        message: String,
        /// Byte offset of the offending token in the query text.
        offset: usize,
        /// Short excerpt of the query around the offset.
        snippet: String,
    },

    /// A source locator could not be bound to any reader.
    #[error("unknown source format: {0}")]
    UnknownFormat(String),

    /// Unknown column reference or plan-time type mismatch.
    #[error("schema error: {0}")]
    Schema(String),

    /// Runtime type incompatibility in a comparison or arithmetic op.
    #[error("type error: cannot apply `{op}` to {left} and {right}")]
    Type {
        /// Operator that failed.
        op: String,
        /// Left operand type.
        left: DataType,
        /// Right operand type.
        right: DataType,
    },

    /// Hash join received a non-equi or otherwise unsupported condition.
    #[error("unsupported join condition: {0}")]
    UnsupportedJoinCondition(String),

    /// File, HTTP, or S3 access failure.
    #[error("io error on '{path}': {message}")]
    Io {
        /// Source path or URL that failed.
        path: String,
        /// Underlying cause, rendered.
        message: String,
    },

    /// Missing or rejected credentials for a remote store.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Malformed record the reader could not recover from.
    #[error("data error: {0}")]
    Data(String),
}

impl FsqError {
    /// Builds an [`FsqError::Io`] from a path and any displayable cause.
    pub fn io(path: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.into(),
            message: cause.to_string(),
        }
    }

    /// Builds an [`FsqError::Type`] for a failed binary operation.
    pub fn type_mismatch(op: impl Into<String>, left: DataType, right: DataType) -> Self {
        Self::Type {
            op: op.into(),
            left,
            right,
        }
    }
}

/// Standard FSQ result alias.
pub type Result<T> = std::result::Result<T, FsqError>;
