//! Postgres backend: one JSONB document per row, matched on a top-level key.
//!
//! ```sql
//! CREATE TABLE users (id BIGSERIAL PRIMARY KEY, data JSONB NOT NULL);
//! CREATE INDEX users_email_idx ON users ((data ->> 'PLM Email Address'));
//! ```

use super::{AccountRecord, AccountStore, StoreError, StoreFuture};
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};
use std::time::Duration;
use tracing::{info_span, instrument, Instrument};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    query: String,
    identifier_field: String,
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
fn valid_table_name(table: &str) -> bool {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").is_ok_and(|re| re.is_match(table))
}

fn lookup_query(table: &str) -> String {
    format!("SELECT data FROM {table} WHERE data ->> $1 = $2")
}

impl PostgresStore {
    /// Connect a small pool and prepare the lookup for `table`.
    ///
    /// # Errors
    /// Returns an error if the table name is not a plain identifier or the
    /// database cannot be reached.
    pub async fn connect(dsn: &str, table: &str, identifier_field: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .acquire_timeout(Duration::from_secs(5))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;

        Self::from_pool(pool, table, identifier_field)
    }

    /// # Errors
    /// Returns an error if the table name is not a plain identifier.
    pub fn from_pool(pool: PgPool, table: &str, identifier_field: &str) -> Result<Self> {
        if !valid_table_name(table) {
            return Err(anyhow!("Invalid table name: {table}"));
        }

        Ok(Self {
            pool,
            query: lookup_query(table),
            identifier_field: identifier_field.to_string(),
        })
    }

    #[instrument(skip(self))]
    async fn query(&self, identifier: &str) -> Result<Vec<AccountRecord>, StoreError> {
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");

        let rows: Vec<Json<Value>> = sqlx::query_scalar(&self.query)
            .bind(&self.identifier_field)
            .bind(identifier)
            .fetch_all(&self.pool)
            .instrument(span)
            .await?;

        rows.into_iter()
            .map(|Json(value)| AccountRecord::try_from(value))
            .collect()
    }
}

impl AccountStore for PostgresStore {
    fn find_by_identifier<'a>(&'a self, identifier: &'a str) -> StoreFuture<'a> {
        Box::pin(self.query(identifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_plain_identifiers() {
        assert!(valid_table_name("users"));
        assert!(valid_table_name("_accounts2"));
        assert!(!valid_table_name("users; DROP TABLE users"));
        assert!(!valid_table_name("2users"));
        assert!(!valid_table_name("public.users"));
        assert!(!valid_table_name(""));
    }

    #[test]
    fn lookup_query_binds_field_and_value() {
        assert_eq!(
            lookup_query("users"),
            "SELECT data FROM users WHERE data ->> $1 = $2"
        );
    }
}
