use super::{Identity, Message, TokenError};
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use tracing::debug;

#[utoipa::path(
    get,
    path= "/protected",
    responses (
        (status = 200, description = "Token accepted", body = Message),
        (status = 401, description = "Missing bearer token", body = Message),
        (status = 403, description = "Invalid or expired token", body = TokenError),
    ),
    security(("bearer" = [])),
    tag= "protected"
)]
pub async fn protected(Extension(identity): Extension<Identity>) -> impl IntoResponse {
    debug!("Access granted, {} profile fields", identity.0.fields().len());

    (
        StatusCode::OK,
        Json(Message::new("Access granted to protected route")),
    )
}
