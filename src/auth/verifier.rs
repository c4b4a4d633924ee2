use super::{AuthError, TokenSigner};
use crate::store::{AccountRecord, AccountStore};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

/// Field holding an explicitly set password.
pub const SECRET_FIELD: &str = "password";

/// Field used when no explicit password is set.
pub const FALLBACK_SECRET_FIELD: &str = "studentNo";

pub const DEFAULT_MIN_SECRET_LENGTH: usize = 4;

/// Successful login: a signed token and the record it was issued for.
#[derive(Debug, Clone)]
pub struct Login {
    pub token: String,
    pub user: AccountRecord,
}

/// The value a candidate secret must equal for `record`, if any.
#[must_use]
pub fn effective_secret(record: &AccountRecord) -> Option<String> {
    record
        .text(SECRET_FIELD)
        .filter(|secret| !secret.is_empty())
        .or_else(|| record.text(FALLBACK_SECRET_FIELD))
        .filter(|secret| !secret.is_empty())
}

/// Extract the token from an `Authorization: <scheme> <token>` header value.
///
/// The scheme word is not checked: whatever follows it is handed to
/// validation, so `Basic abc` ends up as an invalid token.
///
/// # Errors
/// Returns [`AuthError::MissingToken`] when there is no header or no second
/// word.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    header
        .and_then(|value| value.split_whitespace().nth(1))
        .ok_or(AuthError::MissingToken)
}

/// Looks accounts up, checks the candidate secret and issues tokens.
#[derive(Clone)]
pub struct CredentialVerifier {
    store: Arc<dyn AccountStore>,
    signer: Arc<TokenSigner>,
    min_secret_length: usize,
}

impl std::fmt::Debug for CredentialVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVerifier")
            .field("signer", &self.signer)
            .field("min_secret_length", &self.min_secret_length)
            .finish_non_exhaustive()
    }
}

impl CredentialVerifier {
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>, signer: TokenSigner) -> Self {
        Self {
            store,
            signer: Arc::new(signer),
            min_secret_length: DEFAULT_MIN_SECRET_LENGTH,
        }
    }

    #[must_use]
    pub const fn with_min_secret_length(mut self, length: usize) -> Self {
        self.min_secret_length = length;
        self
    }

    #[must_use]
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Verify `candidate` for `identifier` and issue a token on success.
    ///
    /// # Errors
    /// - [`AuthError::NotFound`] if no record carries the identifier
    /// - [`AuthError::InvalidCredential`] if no matching record accepts the secret
    /// - [`AuthError::UpstreamUnavailable`] if the store or signing fails
    #[instrument(skip(self, candidate))]
    pub async fn login(&self, identifier: &str, candidate: &str) -> Result<Login, AuthError> {
        if candidate.chars().count() < self.min_secret_length {
            debug!("Candidate secret shorter than {}", self.min_secret_length);
            return Err(AuthError::InvalidCredential);
        }

        let records = self
            .store
            .find_by_identifier(identifier)
            .await
            .map_err(|e| {
                error!("Account lookup failed: {}", e);
                AuthError::from(e)
            })?;

        if records.is_empty() {
            debug!("No matching account");
            return Err(AuthError::NotFound);
        }

        if records.len() > 1 {
            warn!("{} accounts share the identifier", records.len());
        }

        let user = records
            .into_iter()
            .find(|record| effective_secret(record).is_some_and(|secret| secret == candidate))
            .ok_or_else(|| {
                debug!("Secret mismatch");
                AuthError::InvalidCredential
            })?;

        let token = self.signer.issue(&user).map_err(|e| {
            error!("Token issuance failed: {}", e);
            e
        })?;

        debug!("Login successful");

        Ok(Login { token, user })
    }

    /// Validate the bearer token in an `Authorization` header value.
    ///
    /// # Errors
    /// Returns [`AuthError::MissingToken`] or [`AuthError::InvalidToken`].
    pub fn authorize(&self, header: Option<&str>) -> Result<AccountRecord, AuthError> {
        let token = bearer_token(header)?;
        self.signer.validate(token)
    }
}
