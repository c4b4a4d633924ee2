use super::{valid_email, Message};
use crate::{auth::CredentialVerifier, store::AccountRecord};
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[schema(example = "juan.delacruz@plm.edu.ph")]
    pub plm_email_address: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("plm_email_address", &self.plm_email_address)
            .field("password", &"***")
            .finish()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub token: String,
    #[schema(value_type = Object)]
    pub user: AccountRecord,
}

#[utoipa::path(
    post,
    path= "/login",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Login successful", body = LoginResponse, content_type = "application/json"),
        (status = 400, description = "Missing payload or malformed email address", body = Message),
        (status = 401, description = "Unknown account or wrong password", body = Message),
        (status = 500, description = "Account store unavailable", body = Message),
    ),
    tag= "login"
)]
#[instrument(skip(verifier))]
pub async fn login(
    verifier: Extension<Arc<CredentialVerifier>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, Json(Message::new("Missing payload"))).into_response();
    };

    if !valid_email(&request.plm_email_address) {
        debug!("Invalid email address");

        return (
            StatusCode::BAD_REQUEST,
            Json(Message::new("Invalid email address")),
        )
            .into_response();
    }

    match verifier
        .login(&request.plm_email_address, &request.password)
        .await
    {
        Ok(login) => (
            StatusCode::OK,
            Json(LoginResponse {
                token: login.token,
                user: login.user,
            }),
        )
            .into_response(),

        Err(err) => err.into_response(),
    }
}
