use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Logging middleware for request/response tracking.
///
/// Reuses the caller's `x-request-id` when present and echoes it back.
pub async fn logging_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request_id(&request);
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        request.headers_mut().insert(REQUEST_ID_HEADER.clone(), value);
    }

    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();

    info!(
        target: "authguard::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        "Incoming request"
    );

    let mut response = next.run(request).await;

    info!(
        target: "authguard::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER.clone(), value);
    }

    response
}

fn request_id(request: &Request) -> String {
    request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_from_header() {
        let mut request = Request::new(axum::body::Body::empty());
        request
            .headers_mut()
            .insert("x-request-id", HeaderValue::from_static("abc-123"));

        assert_eq!(request_id(&request), "abc-123");
    }

    #[test]
    fn test_request_id_generated() {
        let request = Request::new(axum::body::Body::empty());
        let id = request_id(&request);
        assert!(Uuid::parse_str(&id).is_ok());
    }
}
