//! # sapgate
//!
//! Student login gateway for the PLM SAP portal. Students sign in with their
//! institutional email address and password; the gateway checks them against
//! the account records in a hosted document store and hands back a signed,
//! one-hour bearer token whose claims are the student's own record.
//!
//! ## Credential rule
//!
//! An account's effective password is its `password` field when that is set
//! and non-empty, otherwise its `studentNo`. Comparison is exact. Unknown
//! accounts and wrong passwords produce the same `401` so accounts cannot be
//! enumerated.
//!
//! ## Tokens
//!
//! Tokens are HS256 JWTs signed with a secret supplied at startup. They carry
//! no server-side state: there is no session table and no revocation; a token
//! is valid until its `exp`.
//!
//! ## Account store
//!
//! Lookups go through [`store::AccountStore`]. Firestore (REST) and Postgres
//! (JSONB documents) backends are provided; every query runs under an explicit
//! timeout with a bounded retry on transient failures.

pub mod auth;
pub mod cli;
pub mod sapgate;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
