// /saree-store/services/order-service/src/middleware/security.rs

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::AppState;

const CSP: &str = "default-src 'self'; img-src 'self' data: https:; frame-ancestors 'none';";

/// Security headers untuk semua responses
pub async fn security_headers_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let sensitive = is_sensitive_path(req.uri().path());

    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("strict-origin-when-cross-origin"));
    headers.insert(header::CONTENT_SECURITY_POLICY, HeaderValue::from_static(CSP));
    headers.insert(
        "permissions-policy",
        HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
    );

    if state.config.is_production() {
        headers.insert(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }

    // order dan payment data tidak boleh di-cache
    if sensitive {
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
        );
    }

    response
}

fn is_sensitive_path(path: &str) -> bool {
    path.starts_with("/api/orders") || path.starts_with("/api/admin") || path.starts_with("/api/payment")
}
