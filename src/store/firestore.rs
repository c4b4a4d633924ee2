//! Firestore backend over the REST `runQuery` endpoint.
//!
//! Authenticates as a Google service account: a short RS256 assertion is
//! exchanged at the token URI for an OAuth access token, which is cached until
//! shortly before it expires. With an emulator host configured, requests go
//! out unauthenticated over plain HTTP.

use super::{AccountRecord, AccountStore, StoreError, StoreFuture};
use crate::{auth::token::unix_now, APP_USER_AGENT};
use anyhow::{anyhow, Context, Result};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use regex::Regex;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Number, Value};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, instrument};

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";
const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
const ASSERTION_TTL_SECONDS: i64 = 3600;
const TOKEN_REFRESH_MARGIN_SECONDS: u64 = 60;
const QUERY_LIMIT: u32 = 10;

#[derive(Clone)]
pub struct ServiceAccount {
    pub client_email: String,
    pub private_key: SecretString,
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("client_email", &self.client_email)
            .field("private_key", &"***")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    project_id: String,
    collection: String,
    identifier_field: String,
    base_url: String,
    service_account: Option<ServiceAccount>,
}

impl FirestoreConfig {
    #[must_use]
    pub fn new(project_id: String, collection: String, identifier_field: String) -> Self {
        Self {
            project_id,
            collection,
            identifier_field,
            base_url: FIRESTORE_BASE_URL.to_string(),
            service_account: None,
        }
    }

    #[must_use]
    pub fn with_service_account(mut self, account: ServiceAccount) -> Self {
        self.service_account = Some(account);
        self
    }

    /// Point at a local emulator (`host:port`), which needs no credentials.
    #[must_use]
    pub fn with_emulator_host(mut self, host: &str) -> Self {
        self.base_url = format!("http://{}/v1", host.trim_end_matches('/'));
        self.service_account = None;
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn run_query_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents:runQuery",
            self.base_url.trim_end_matches('/'),
            self.project_id
        )
    }
}

struct Credentials {
    client_email: String,
    token_uri: String,
    key: EncodingKey,
}

struct CachedToken {
    token: SecretString,
    refresh_at: Instant,
}

pub struct FirestoreStore {
    client: Client,
    config: FirestoreConfig,
    credentials: Option<Credentials>,
    token: RwLock<Option<CachedToken>>,
}

impl std::fmt::Debug for FirestoreStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreStore")
            .field("config", &self.config)
            .field("authenticated", &self.credentials.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct Assertion<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct RunQueryItem {
    document: Option<Document>,
}

#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    fields: Map<String, Value>,
}

/// Keys pasted into env files usually carry literal `\n` sequences.
fn normalize_pem(key: &str) -> String {
    key.replace("\\n", "\n")
}

/// Field paths that are not plain identifiers must be quoted with backticks.
fn field_path(field: &str) -> String {
    let simple = Regex::new(r"^[A-Za-z_][A-Za-z_0-9]*$").is_ok_and(|re| re.is_match(field));
    if simple {
        field.to_string()
    } else {
        format!("`{}`", field.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

fn query_body(collection: &str, identifier_field: &str, identifier: &str) -> Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": collection }],
            "where": {
                "fieldFilter": {
                    "field": { "fieldPath": field_path(identifier_field) },
                    "op": "EQUAL",
                    "value": { "stringValue": identifier },
                }
            },
            "limit": QUERY_LIMIT,
        }
    })
}

/// Flatten a Firestore typed value (`{"stringValue": "x"}`) into plain JSON.
fn decode_value(value: &Value) -> Value {
    let Some((kind, inner)) = value.as_object().and_then(|object| object.iter().next()) else {
        return Value::Null;
    };

    match kind.as_str() {
        "integerValue" => inner
            .as_str()
            .and_then(|raw| raw.parse::<i64>().ok())
            .map_or_else(|| inner.clone(), |n| Value::Number(Number::from(n))),
        "mapValue" => Value::Object(decode_fields(
            inner.get("fields").and_then(Value::as_object),
        )),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        "nullValue" => Value::Null,
        // stringValue, booleanValue, doubleValue, timestampValue, referenceValue,
        // bytesValue and geoPointValue already have a usable JSON shape
        _ => inner.clone(),
    }
}

fn decode_fields(fields: Option<&Map<String, Value>>) -> Map<String, Value> {
    fields
        .map(|fields| {
            fields
                .iter()
                .map(|(key, value)| (key.clone(), decode_value(value)))
                .collect()
        })
        .unwrap_or_default()
}

fn decode_response(items: Vec<RunQueryItem>) -> Vec<AccountRecord> {
    items
        .into_iter()
        .filter_map(|item| item.document)
        .map(|document| AccountRecord::new(decode_fields(Some(&document.fields))))
        .collect()
}

fn status_error(status: StatusCode, body: &str) -> StoreError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        StoreError::Transport(format!("{status}: {body}"))
    } else {
        StoreError::Rejected(format!("{status}: {body}"))
    }
}

impl FirestoreStore {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built or the service
    /// account key is not a valid RSA PEM.
    pub fn new(config: FirestoreConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .build()
            .context("Failed to build Firestore HTTP client")?;

        let credentials = config
            .service_account
            .as_ref()
            .map(|account| -> Result<Credentials> {
                let pem = normalize_pem(account.private_key.expose_secret());
                let key = EncodingKey::from_rsa_pem(pem.as_bytes())
                    .map_err(|e| anyhow!("Invalid service account private key: {e}"))?;
                Ok(Credentials {
                    client_email: account.client_email.clone(),
                    token_uri: account.token_uri.clone(),
                    key,
                })
            })
            .transpose()?;

        Ok(Self {
            client,
            config,
            credentials,
            token: RwLock::new(None),
        })
    }

    async fn access_token(&self) -> Result<Option<SecretString>, StoreError> {
        let Some(credentials) = &self.credentials else {
            return Ok(None);
        };

        if let Some(cached) = self.token.read().await.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok(Some(cached.token.clone()));
            }
        }

        let mut slot = self.token.write().await;

        // another request may have refreshed while we waited for the lock
        if let Some(cached) = slot.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok(Some(cached.token.clone()));
            }
        }

        let fresh = self.exchange_assertion(credentials).await?;
        let token = fresh.token.clone();
        *slot = Some(fresh);

        Ok(Some(token))
    }

    #[instrument(skip(self, credentials), fields(client_email = %credentials.client_email))]
    async fn exchange_assertion(
        &self,
        credentials: &Credentials,
    ) -> Result<CachedToken, StoreError> {
        let iat = unix_now();
        let claims = Assertion {
            iss: &credentials.client_email,
            scope: DATASTORE_SCOPE,
            aud: &credentials.token_uri,
            iat,
            exp: iat + ASSERTION_TTL_SECONDS,
        };

        let assertion =
            jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &credentials.key)
                .map_err(|e| StoreError::Rejected(format!("failed to sign assertion: {e}")))?;

        let response = self
            .client
            .post(&credentials.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Access token exchange failed: {}", status);
            return Err(status_error(status, &body));
        }

        let token: TokenResponse = response.json().await?;
        debug!("Access token valid for {} seconds", token.expires_in);

        Ok(CachedToken {
            token: SecretString::from(token.access_token),
            refresh_at: Instant::now()
                + Duration::from_secs(
                    token
                        .expires_in
                        .saturating_sub(TOKEN_REFRESH_MARGIN_SECONDS),
                ),
        })
    }

    #[instrument(skip(self))]
    async fn run_query(&self, identifier: &str) -> Result<Vec<AccountRecord>, StoreError> {
        let body = query_body(
            &self.config.collection,
            &self.config.identifier_field,
            identifier,
        );

        let mut request = self.client.post(self.config.run_query_url()).json(&body);
        if let Some(token) = self.access_token().await? {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Firestore query failed: {}", status);
            return Err(status_error(status, &body));
        }

        let items: Vec<RunQueryItem> = response.json().await?;

        Ok(decode_response(items))
    }
}

impl AccountStore for FirestoreStore {
    fn find_by_identifier<'a>(&'a self, identifier: &'a str) -> StoreFuture<'a> {
        Box::pin(self.run_query(identifier))
    }
}
