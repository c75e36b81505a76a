use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;

use super::TestContext;
use crate::AppState;

/// Build the full router against the test database.
pub fn test_app(ctx: &TestContext) -> Router {
    let state = Arc::new(AppState {
        db_pool: ctx.db_pool.clone(),
    });
    crate::app(state, CorsLayer::new())
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("failed to build request")
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("failed to build request")
}

pub fn delete_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .expect("failed to build request")
}

/// Send one request through the router and decode the JSON body.
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("request failed");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("failed to read body")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response was not valid JSON")
    };
    (status, body)
}

/// Parse a Decimal out of a JSON field that rust_decimal serialized as a string.
pub fn decimal_field(value: &Value, field: &str) -> rust_decimal::Decimal {
    value[field]
        .as_str()
        .unwrap_or_else(|| panic!("field {} missing or not a string", field))
        .parse()
        .unwrap_or_else(|_| panic!("field {} was not a decimal", field))
}
