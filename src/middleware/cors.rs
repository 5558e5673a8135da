use axum::http::{header, Method};
use tower_http::cors::{Any, CorsLayer};

/// Browser clients of the exam UI call from another origin with a bearer header.
pub fn exam_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(Any)
}
