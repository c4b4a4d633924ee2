use super::handlers::{
    self,
    health::Health,
    login::{LoginRequest, LoginResponse},
    Message, TokenError,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::root::root,
        handlers::root::test_api,
        handlers::health::health,
        handlers::login::login,
        handlers::protected::protected,
    ),
    components(schemas(Health, LoginRequest, LoginResponse, Message, TokenError)),
    modifiers(&BearerAuth),
    tags(
        (name = "login", description = "Student login and token issuance"),
        (name = "protected", description = "Routes that require a bearer token"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
