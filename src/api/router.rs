//! API router: routes, body limit, access log and cache headers.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Uri};
use axum::routing::{get, post};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

use super::endpoints;
use super::error::ApiError;
use super::middleware;
use super::types::AppState;

/// Headroom over the text cap for JSON framing and option fields.
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;
const MAX_UTF8_BYTES_PER_CHAR: usize = 4;

/// Build the API router with the full middleware stack.
pub fn api_router(state: AppState) -> Router {
    let body_limit = state
        .max_text_chars
        .saturating_mul(MAX_UTF8_BYTES_PER_CHAR)
        .saturating_add(BODY_OVERHEAD_BYTES);

    // NOTE: layers wrap everything added before them, so the cache header
    // and access log also cover the fallback.
    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/parse", post(endpoints::parse::parse_json))
        .route("/parse/text", post(endpoints::parse::parse_text))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .fallback(not_found)
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::pipeline::structuring::{ScriptedReply, ScriptedTransport};

    const SYLLABUS: &str = "CS101 Fall 2025\n\
        Assignment 1: Hello World - Due September 15, 2025\n\
        Midterm Exam on October 20, 2025 in Room 204\n";

    fn test_router(config: AppConfig, replies: Vec<ScriptedReply>) -> (Router, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(replies));
        let state = AppState::with_transport(&config, transport.clone());
        (api_router(state), transport)
    }

    fn default_router() -> Router {
        test_router(AppConfig::default(), vec![]).0
    }

    fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_fallback_state() {
        let response = default_router()
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("cache-control").unwrap(), "no-store");
        let json = read_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], crate::config::APP_VERSION);
        assert_eq!(json["fallbackConfigured"], false);
    }

    #[tokio::test]
    async fn parse_returns_events_and_diagnostics() {
        let response = default_router()
            .oneshot(json_post(
                "/api/parse",
                serde_json::json!({ "text": SYLLABUS, "courseCode": "CS101" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = read_json(response).await;
        let events = json["events"].as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["type"], "ASSIGNMENT");
        assert_eq!(events[0]["start"], "2025-09-15T00:00:00.000");
        assert_eq!(events[0]["courseCode"], "CS101");
        assert_eq!(events[1]["type"], "MIDTERM");
        assert_eq!(json["diagnostics"]["source"], "heuristics");
        assert_eq!(json["diagnostics"]["datesFound"], 2);
    }

    #[tokio::test]
    async fn parse_text_accepts_raw_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/parse/text?courseCode=CS101&termStart=2025-09-01&termEnd=2025-12-20")
            .header("content-type", "text/plain")
            .body(Body::from(SYLLABUS))
            .unwrap();
        let response = default_router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = read_json(response).await;
        assert_eq!(json["events"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn parse_text_rejects_binary_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/parse/text")
            .body(Body::from(vec![0xff_u8, 0xfe, 0x00, 0x41]))
            .unwrap();
        let response = default_router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(read_json(response).await["error"]["code"], "NOT_TEXT");
    }

    #[tokio::test]
    async fn malformed_json_is_invalid_request() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/parse")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = default_router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["error"]["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn non_string_text_is_invalid_request() {
        let response = default_router()
            .oneshot(json_post("/api/parse", serde_json::json!({ "text": 42 })))
            .await
            .unwrap();
        assert_eq!(read_json(response).await["error"]["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn missing_text_is_invalid_request() {
        let response = default_router()
            .oneshot(json_post("/api/parse", serde_json::json!({ "courseCode": "CS101" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["error"]["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn blank_text_is_empty_text() {
        let response = default_router()
            .oneshot(json_post("/api/parse", serde_json::json!({ "text": "   " })))
            .await
            .unwrap();
        assert_eq!(read_json(response).await["error"]["code"], "EMPTY_TEXT");
    }

    #[tokio::test]
    async fn inverted_term_is_rejected() {
        let response = default_router()
            .oneshot(json_post(
                "/api/parse",
                serde_json::json!({
                    "text": SYLLABUS,
                    "termStart": "2025-12-20",
                    "termEnd": "2025-09-01",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["error"]["code"], "INVALID_TERM_WINDOW");
    }

    #[tokio::test]
    async fn oversized_text_is_rejected() {
        let config = AppConfig {
            max_text_chars: 20,
            ..AppConfig::default()
        };
        let (router, _) = test_router(config, vec![]);
        let response = router
            .oneshot(json_post("/api/parse", serde_json::json!({ "text": SYLLABUS })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(read_json(response).await["error"]["code"], "TEXT_TOO_LARGE");
    }

    #[tokio::test]
    async fn client_header_feeds_cost_guard() {
        let mut config = AppConfig::default();
        config.fallback.api_key = Some("sk-test".into());
        config.fallback.max_retries = 0;
        config.cost_limits.per_client_daily_calls = 1;
        let (router, transport) = test_router(
            config,
            vec![ScriptedReply::status(500, "down"), ScriptedReply::status(500, "down")],
        );

        let call = |client: &'static str| {
            Request::builder()
                .method("POST")
                .uri("/api/parse")
                .header("content-type", "application/json")
                .header("x-client-id", client)
                .body(Body::from(serde_json::json!({ "text": "Welcome!" }).to_string()))
                .unwrap()
        };

        let first = read_json(router.clone().oneshot(call("alice")).await.unwrap()).await;
        assert_eq!(first["diagnostics"]["fallback"]["attempted"], true);

        let second = read_json(router.clone().oneshot(call("alice")).await.unwrap()).await;
        assert_eq!(second["diagnostics"]["fallback"]["attempted"], false);
        assert_eq!(second["diagnostics"]["fallback"]["denialCode"], "client-cap-reached");

        let other = read_json(router.oneshot(call("bob")).await.unwrap()).await;
        assert_eq!(other["diagnostics"]["fallback"]["attempted"], true);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn unknown_route_is_structured_404() {
        let response = default_router()
            .oneshot(Request::builder().uri("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers().get("cache-control").unwrap(), "no-store");
        assert_eq!(read_json(response).await["error"]["code"], "NOT_FOUND");
    }
}
