//! Route handlers and the pieces they share: response bodies, the
//! [`AuthError`] to HTTP mapping and the bearer token middleware.

pub mod health;
pub mod login;
pub mod protected;
pub mod root;

use crate::{
    auth::{AuthError, CredentialVerifier},
    store::AccountRecord,
};
use axum::{
    extract::{Extension, Request},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;

pub const INVALID_CREDENTIALS: &str = "Invalid email address or password";
pub const LOGIN_FAILED: &str = "An error occurred while logging in.";
pub const NO_TOKEN: &str = "No token, authorization denied";
pub const TOKEN_ERROR: &str = "Token error";

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message: String,
}

impl Message {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenError {
    pub message: String,
    pub error: String,
}

/// Account record of the caller, set by [`require_token`].
#[derive(Debug, Clone)]
pub struct Identity(pub AccountRecord);

pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound | Self::InvalidCredential => {
                (StatusCode::UNAUTHORIZED, Json(Message::new(INVALID_CREDENTIALS))).into_response()
            }
            Self::UpstreamUnavailable(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(Message::new(LOGIN_FAILED)))
                    .into_response()
            }
            Self::MissingToken => {
                (StatusCode::UNAUTHORIZED, Json(Message::new(NO_TOKEN))).into_response()
            }
            Self::InvalidToken(reason) => (
                StatusCode::FORBIDDEN,
                Json(TokenError {
                    message: TOKEN_ERROR.to_string(),
                    error: reason,
                }),
            )
                .into_response(),
        }
    }
}

/// Reject requests without a valid bearer token; otherwise attach [`Identity`].
pub async fn require_token(
    Extension(verifier): Extension<Arc<CredentialVerifier>>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match verifier.authorize(header) {
        Ok(record) => {
            request.extensions_mut().insert(Identity(record));
            next.run(request).await
        }
        Err(err) => {
            debug!("Token rejected: {}", err);
            err.into_response()
        }
    }
}
