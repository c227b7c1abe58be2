use std::fmt;

use serde::Serialize;

use crate::content::ContentError;
use crate::filter::FilterError;
use crate::slug::SlugError;
use crate::store::StoreError;
use crate::token::TokenError;
use crate::upstream::UpstreamError;

pub type Result<T, E = ArchiveError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Code {
    InvalidArgument,
    NotFound,
    PermissionDenied,
    AlreadyExists,
    Unauthenticated,
    Unimplemented,
    Internal,
}

impl Code {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::PermissionDenied => "permission_denied",
            Self::AlreadyExists => "already_exists",
            Self::Unauthenticated => "unauthenticated",
            Self::Unimplemented => "unimplemented",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by every archive service operation. The code is the
/// contract with callers; the message is diagnostic only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ArchiveError {
    code: Code,
    message: String,
}

impl ArchiveError {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(Code::PermissionDenied, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(Code::AlreadyExists, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(Code::Unauthenticated, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<SlugError> for ArchiveError {
    fn from(err: SlugError) -> Self {
        Self::invalid_argument(err.to_string())
    }
}

impl From<TokenError> for ArchiveError {
    fn from(err: TokenError) -> Self {
        tracing::debug!(error = ?err, "rejected pagination token");
        Self::invalid_argument(err.to_string())
    }
}

impl From<FilterError> for ArchiveError {
    fn from(err: FilterError) -> Self {
        Self::invalid_argument(err.to_string())
    }
}

impl From<StoreError> for ArchiveError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::not_found(err.to_string()),
            StoreError::AlreadyExists => Self::already_exists(err.to_string()),
            StoreError::InvalidUsername => Self::invalid_argument(err.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<UpstreamError> for ArchiveError {
    fn from(err: UpstreamError) -> Self {
        if err.is_not_found() {
            Self::not_found(err.to_string())
        } else {
            Self::internal(err.to_string())
        }
    }
}

impl From<ContentError> for ArchiveError {
    fn from(err: ContentError) -> Self {
        Self::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_codes() {
        assert_eq!(
            ArchiveError::from(StoreError::NotFound).code(),
            Code::NotFound
        );
        assert_eq!(
            ArchiveError::from(StoreError::AlreadyExists).code(),
            Code::AlreadyExists
        );
        assert_eq!(
            ArchiveError::from(StoreError::InvalidUsername).code(),
            Code::InvalidArgument
        );
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = ArchiveError::permission_denied("not yours");
        assert_eq!(err.to_string(), "permission_denied: not yours");
    }
}
