use anyhow::{ensure, Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use sapgate::{
    auth::{CredentialVerifier, TokenSigner},
    sapgate::app,
    store::{
        AccountRecord, AccountStore, GuardedStore, MemoryStore, RetryPolicy, StoreError,
        StoreFuture,
    },
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;

const IDENTIFIER_FIELD: &str = "PLM Email Address";
const ORIGIN: &str = "https://plm-sap.vercel.app";

struct DownStore;

impl AccountStore for DownStore {
    fn find_by_identifier<'a>(&'a self, _identifier: &'a str) -> StoreFuture<'a> {
        Box::pin(async { Err(StoreError::Transport("connection refused".to_string())) })
    }
}

fn student() -> Result<AccountRecord> {
    let fields = json!({
        "PLM Email Address": "a@b.com",
        "password": "",
        "studentNo": "2021-0001",
        "name": "Juan Dela Cruz"
    })
    .as_object()
    .cloned()
    .context("record literal is an object")?;

    Ok(AccountRecord::from(fields))
}

fn verifier_with(store: Arc<dyn AccountStore>) -> Arc<CredentialVerifier> {
    let signer = TokenSigner::new(
        &SecretString::from("integration-secret"),
        Duration::from_secs(3600),
    );
    Arc::new(CredentialVerifier::new(store, signer))
}

fn gateway() -> Result<(Router, Arc<CredentialVerifier>)> {
    let store = MemoryStore::new(IDENTIFIER_FIELD).with_record(student()?);
    let verifier = verifier_with(Arc::new(store));
    let router = app(verifier.clone(), &[ORIGIN.to_string()])?;
    Ok((router, verifier))
}

async fn send(router: Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
    let response = router.oneshot(request).await?;
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
    };
    Ok((status, value))
}

fn login_request(email: &str, password: &str) -> Result<Request<Body>> {
    let body = json!({ "plmEmailAddress": email, "password": password });
    Ok(Request::builder()
        .method(Method::POST)
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))?)
}

fn protected_request(authorization: Option<&str>) -> Result<Request<Body>> {
    let mut builder = Request::builder().uri("/protected");
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    Ok(builder.body(Body::empty())?)
}

#[tokio::test]
async fn login_with_student_number_issues_token() -> Result<()> {
    let (router, verifier) = gateway()?;

    let (status, body) = send(router, login_request("a@b.com", "2021-0001")?).await?;
    ensure!(status == StatusCode::OK, "unexpected status {status}: {body}");

    let token = body["token"].as_str().context("token missing")?;
    ensure!(body["user"]["studentNo"] == "2021-0001");
    ensure!(body["user"]["PLM Email Address"] == "a@b.com");

    let claims = verifier.signer().validate(token)?;
    ensure!(claims.text("studentNo").as_deref() == Some("2021-0001"));
    ensure!(claims.text("name").as_deref() == Some("Juan Dela Cruz"));

    Ok(())
}

#[tokio::test]
async fn wrong_password_and_unknown_email_look_the_same() -> Result<()> {
    let (router, _) = gateway()?;
    let (wrong_status, wrong_body) =
        send(router.clone(), login_request("a@b.com", "wrong")?).await?;
    let (unknown_status, unknown_body) =
        send(router, login_request("x@y.com", "2021-0001")?).await?;

    ensure!(wrong_status == StatusCode::UNAUTHORIZED);
    ensure!(unknown_status == StatusCode::UNAUTHORIZED);
    ensure!(wrong_body == unknown_body);
    ensure!(wrong_body["message"] == "Invalid email address or password");

    Ok(())
}

#[tokio::test]
async fn login_rejects_missing_body_and_bad_email() -> Result<()> {
    let (router, _) = gateway()?;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/login")
        .body(Body::empty())?;
    let (status, _) = send(router.clone(), request).await?;
    ensure!(status == StatusCode::BAD_REQUEST);

    let (status, body) = send(router, login_request("not-an-email", "2021-0001")?).await?;
    ensure!(status == StatusCode::BAD_REQUEST);
    ensure!(body["message"] == "Invalid email address");

    Ok(())
}

#[tokio::test]
async fn oversized_login_body_is_refused() -> Result<()> {
    let (router, _) = gateway()?;

    // valid credentials padded past the 16 KiB body limit
    let body = json!({
        "plmEmailAddress": "a@b.com",
        "password": "2021-0001",
        "padding": "x".repeat(32 * 1024),
    });
    let request = Request::builder()
        .method(Method::POST)
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))?;

    let (status, body) = send(router, request).await?;
    ensure!(status == StatusCode::BAD_REQUEST, "unexpected status {status}: {body}");
    ensure!(body.get("token").is_none());

    Ok(())
}

#[tokio::test]
async fn store_outage_is_a_server_error() -> Result<()> {
    let policy = RetryPolicy::new()
        .with_retries(1)
        .with_backoff_base(Duration::from_millis(1));
    let verifier = verifier_with(Arc::new(GuardedStore::new(DownStore, policy)));
    let router = app(verifier, &[ORIGIN.to_string()])?;

    let (status, body) = send(router, login_request("a@b.com", "2021-0001")?).await?;
    ensure!(status == StatusCode::INTERNAL_SERVER_ERROR);
    ensure!(body["message"] == "An error occurred while logging in.");

    Ok(())
}

#[tokio::test]
async fn protected_route_requires_valid_bearer_token() -> Result<()> {
    let (router, _) = gateway()?;

    let (_, body) = send(router.clone(), login_request("a@b.com", "2021-0001")?).await?;
    let token = body["token"].as_str().context("token missing")?.to_string();

    let (status, body) =
        send(router.clone(), protected_request(Some(&format!("Bearer {token}")))?).await?;
    ensure!(status == StatusCode::OK, "unexpected status {status}: {body}");
    ensure!(body["message"] == "Access granted to protected route");

    let (status, body) = send(router.clone(), protected_request(None)?).await?;
    ensure!(status == StatusCode::UNAUTHORIZED);
    ensure!(body["message"] == "No token, authorization denied");

    let (status, body) = send(router.clone(), protected_request(Some("Bearer garbage"))?).await?;
    ensure!(status == StatusCode::FORBIDDEN);
    ensure!(body["message"] == "Token error");
    ensure!(body["error"].is_string());

    let (status, body) = send(router, protected_request(Some("Basic abc"))?).await?;
    ensure!(status == StatusCode::FORBIDDEN, "unexpected status {status}: {body}");
    ensure!(body["message"] == "Token error");

    Ok(())
}

#[tokio::test]
async fn token_from_another_secret_is_forbidden() -> Result<()> {
    let (router, _) = gateway()?;

    let foreign = TokenSigner::new(&SecretString::from("other-secret"), Duration::from_secs(60))
        .issue(&student()?)?;

    let (status, _) =
        send(router, protected_request(Some(&format!("Bearer {foreign}")))?).await?;
    ensure!(status == StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn greeting_and_health_routes() -> Result<()> {
    let (router, _) = gateway()?;

    for path in ["/", "/test-api"] {
        let request = Request::builder().uri(path).body(Body::empty())?;
        let (status, body) = send(router.clone(), request).await?;
        ensure!(status == StatusCode::OK);
        ensure!(body == Value::String("Hello from Rust server!".to_string()));
    }

    let request = Request::builder().uri("/health").body(Body::empty())?;
    let response = router.oneshot(request).await?;
    ensure!(response.status() == StatusCode::OK);
    ensure!(response.headers().contains_key("x-app"));
    ensure!(response.headers().contains_key("x-request-id"));

    let body = to_bytes(response.into_body(), usize::MAX).await?;
    let health: Value = serde_json::from_slice(&body)?;
    ensure!(health["name"] == env!("CARGO_PKG_NAME"));

    Ok(())
}

#[tokio::test]
async fn cors_preflight_allows_configured_origin() -> Result<()> {
    let (router, _) = gateway()?;

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/login")
        .header(header::ORIGIN, ORIGIN)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())?;
    let response = router.oneshot(request).await?;

    ensure!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok())
            == Some(ORIGIN)
    );
    ensure!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .and_then(|v| v.to_str().ok())
            == Some("true")
    );

    Ok(())
}
