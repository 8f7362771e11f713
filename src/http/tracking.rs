//! Request accounting middleware.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::observability::metrics;

/// Count and time every API request.
pub async fn track_requests(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    metrics::record_http_request(&method, status, start);
    if response.status().is_server_error() {
        tracing::warn!(method = %method, path = %path, status, "Request failed");
    } else {
        tracing::debug!(method = %method, path = %path, status, elapsed = ?start.elapsed(), "Request handled");
    }
    response
}
