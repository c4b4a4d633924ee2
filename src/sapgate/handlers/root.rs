pub const GREETING: &str = "Hello from Rust server!";

#[utoipa::path(
    get,
    path= "/",
    responses (
        (status = 200, description = "Greeting", body = String, content_type = "text/plain"),
    ),
    tag= "root"
)]
pub async fn root() -> &'static str {
    GREETING
}

#[utoipa::path(
    get,
    path= "/test-api",
    responses (
        (status = 200, description = "Greeting", body = String, content_type = "text/plain"),
    ),
    tag= "root"
)]
pub async fn test_api() -> &'static str {
    GREETING
}
