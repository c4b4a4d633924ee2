//! Credential verification and token issuance.
//!
//! A login looks the identifier up in the account store, compares the
//! candidate against the record's effective secret (explicit `password`, or
//! `studentNo` when that is empty) and, on the first matching record, signs a
//! token whose claims are the record itself. Tokens are stateless and expire
//! by time only.

mod error;
pub mod token;
mod verifier;

pub use self::error::AuthError;
pub use self::token::{TokenSigner, DEFAULT_TOKEN_TTL_SECONDS};
pub use self::verifier::{
    bearer_token, effective_secret, CredentialVerifier, Login, DEFAULT_MIN_SECRET_LENGTH,
    FALLBACK_SECRET_FIELD, SECRET_FIELD,
};
