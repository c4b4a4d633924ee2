use thiserror::Error;

/// Why a login or token check was refused.
///
/// `NotFound` and `InvalidCredential` stay distinct for logging; the HTTP
/// layer renders both with the same body so callers cannot tell which
/// accounts exist.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no account matches the identifier")]
    NotFound,
    #[error("invalid credential")]
    InvalidCredential,
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(String),
}

impl From<crate::store::StoreError> for AuthError {
    fn from(err: crate::store::StoreError) -> Self {
        Self::UpstreamUnavailable(err.to_string())
    }
}
