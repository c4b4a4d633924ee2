//! Account store capability.
//!
//! The verifier only ever needs one question answered: which records carry a
//! given identifier? Backends implement [`AccountStore`] and are wrapped in a
//! [`GuardedStore`] that applies the per-attempt timeout and the bounded retry
//! policy before anything reaches the verifier.

pub mod firestore;
pub mod memory;
pub mod postgres;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{future::Future, pin::Pin, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

pub use firestore::{FirestoreConfig, FirestoreStore};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;

const DEFAULT_TIMEOUT_SECONDS: u64 = 5;
const DEFAULT_RETRIES: u32 = 2;
const DEFAULT_BACKOFF_BASE_MILLIS: u64 = 100;

/// A stored profile, kept as the raw document the store returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountRecord(Map<String, Value>);

impl AccountRecord {
    #[must_use]
    pub const fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Field value as text. Strings are returned as-is and numbers by their
    /// decimal form; anything else yields `None`.
    #[must_use]
    pub fn text(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::String(value) => Some(value.clone()),
            Value::Number(value) => Some(value.to_string()),
            _ => None,
        }
    }

    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for AccountRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl TryFrom<Value> for AccountRecord {
    type Error = StoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(StoreError::Malformed(format!(
                "expected a document object, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request timed out after {0:?}")]
    Timeout(Duration),
    #[error("store transport error: {0}")]
    Transport(String),
    #[error("store rejected the request: {0}")]
    Rejected(String),
    #[error("malformed store response: {0}")]
    Malformed(String),
}

impl StoreError {
    /// Only transient failures are worth another attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transport(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Malformed(err.to_string())
        } else if err.is_status() {
            Self::Rejected(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Tls(_) => Self::Transport(err.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::Malformed(err.to_string())
            }
            _ => Self::Rejected(err.to_string()),
        }
    }
}

pub type StoreFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<AccountRecord>, StoreError>> + Send + 'a>>;

/// Exact-match lookup on the identifier field.
pub trait AccountStore: Send + Sync {
    fn find_by_identifier<'a>(&'a self, identifier: &'a str) -> StoreFuture<'a>;
}

impl<S: AccountStore + ?Sized> AccountStore for Arc<S> {
    fn find_by_identifier<'a>(&'a self, identifier: &'a str) -> StoreFuture<'a> {
        (**self).find_by_identifier(identifier)
    }
}

/// Timeout and retry settings applied around every store query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    timeout: Duration,
    retries: u32,
    backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            retries: DEFAULT_RETRIES,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MILLIS),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub const fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.retries
    }

    /// Exponential backoff scaled to 70-90% to spread concurrent retries.
    fn backoff(&self, attempt: u32, rng: &mut StdRng) -> Duration {
        let exp = self
            .backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let factor: u32 = rng.gen_range(70..90);
        exp.saturating_mul(factor) / 100
    }
}

/// Wraps a backend with the [`RetryPolicy`].
pub struct GuardedStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: AccountStore> GuardedStore<S> {
    #[must_use]
    pub const fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn query(&self, identifier: &str) -> Result<Vec<AccountRecord>, StoreError> {
        let mut rng = StdRng::from_entropy();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = match timeout(
                self.policy.timeout,
                self.inner.find_by_identifier(identifier),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(self.policy.timeout)),
            };

            match result {
                Ok(records) => {
                    debug!("store returned {} record(s)", records.len());
                    return Ok(records);
                }
                Err(err) if err.is_retryable() && attempt <= self.policy.retries => {
                    let wait = self.policy.backoff(attempt, &mut rng);
                    warn!(
                        "store attempt {} failed: {}, retrying in {}ms",
                        attempt,
                        err,
                        wait.as_millis()
                    );
                    sleep(wait).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl<S: AccountStore> AccountStore for GuardedStore<S> {
    fn find_by_identifier<'a>(&'a self, identifier: &'a str) -> StoreFuture<'a> {
        Box::pin(self.query(identifier))
    }
}
