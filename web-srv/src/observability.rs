use axum::response::Response;
use axum::{extract::Request, middleware::Next};
use std::time::Instant;
use tracing::info;

/// Log every request with its status and duration
pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let uri = parts.uri.clone();
    info!("request method={} uri={uri}", parts.method);
    let begin = Instant::now();
    let response = next.run(Request::from_parts(parts, body)).await;
    let duration = begin.elapsed();
    info!(
        "response status={} uri={uri} duration_ms={}",
        response.status(),
        duration.as_millis()
    );
    response
}
