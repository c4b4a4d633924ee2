//! HS256 bearer tokens carrying the account record as claims.

use super::AuthError;
use crate::store::AccountRecord;
use jsonwebtoken::{
    errors::{Error as JwtError, ErrorKind},
    Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

pub const DEFAULT_TOKEN_TTL_SECONDS: u64 = 60 * 60;

const RESERVED_CLAIMS: [&str; 2] = ["iat", "exp"];

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iat: i64,
    exp: i64,
    #[serde(flatten)]
    record: Map<String, Value>,
}

/// Signs and validates tokens with the process-wide secret.
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("secret", &"***")
            .field("ttl", &self.ttl)
            .finish()
    }
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}

/// Short reason shown to callers in the `403` body.
fn reason(err: &JwtError) -> String {
    match err.kind() {
        ErrorKind::ExpiredSignature => "jwt expired".to_string(),
        ErrorKind::InvalidSignature => "invalid signature".to_string(),
        ErrorKind::InvalidAlgorithm => "invalid algorithm".to_string(),
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => "jwt malformed".to_string(),
        ErrorKind::MissingRequiredClaim(claim) => format!("jwt missing {claim}"),
        _ => err.to_string(),
    }
}

impl TokenSigner {
    #[must_use]
    pub fn new(secret: &SecretString, ttl: Duration) -> Self {
        let key = secret.expose_secret().as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        // record fields such as `aud` are profile data, not registered claims
        validation.validate_aud = false;

        Self {
            encoding: EncodingKey::from_secret(key),
            decoding: DecodingKey::from_secret(key),
            validation,
            ttl,
        }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token valid from now for the configured window.
    ///
    /// # Errors
    /// Returns [`AuthError::UpstreamUnavailable`] if signing fails.
    pub fn issue(&self, record: &AccountRecord) -> Result<String, AuthError> {
        self.issue_at(record, unix_now())
    }

    /// Issue a token as if the current time were `now` (unix seconds).
    ///
    /// # Errors
    /// Returns [`AuthError::UpstreamUnavailable`] if signing fails.
    pub fn issue_at(&self, record: &AccountRecord, now: i64) -> Result<String, AuthError> {
        let mut fields = record.fields().clone();
        for claim in RESERVED_CLAIMS {
            if fields.remove(claim).is_some() {
                warn!("account field {} is reserved and was replaced", claim);
            }
        }

        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            iat: now,
            exp: now.saturating_add(ttl),
            record: fields,
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::UpstreamUnavailable(format!("failed to sign token: {e}")))
    }

    /// Check signature and expiry, returning the embedded account record.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidToken`] for tampered, malformed or expired tokens.
    pub fn validate(&self, token: &str) -> Result<AccountRecord, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| AuthError::InvalidToken(reason(&e)))?;

        Ok(AccountRecord::new(data.claims.record))
    }
}
