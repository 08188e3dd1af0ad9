use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Logging middleware: tags each request with an id (echoed as
/// `X-Request-Id`) and logs completion at a level chosen by status class.
/// Health checks are passed through untouched.
pub async fn logging_middleware(req: Request<Body>, next: Next) -> Response {
    let path = req.uri().path().to_string();

    if path == "/health" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let request_id = Uuid::new_v4().to_string();
    let span = info_span!("request", request_id = %request_id);
    let start = Instant::now();

    let mut response = next.run(req).instrument(span.clone()).await;

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis();

    span.in_scope(|| match status {
        500.. => error!(method, path, status, duration_ms, "request"),
        400..=499 => warn!(method, path, status, duration_ms, "request"),
        _ => info!(method, path, status, duration_ms, "request"),
    });

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
