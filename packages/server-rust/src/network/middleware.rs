//! Transport layers wrapped around every route.
//!
//! Listed outermost first. The request id is stamped before tracing so the
//! HTTP span and the submission span share the same `x-request-id`.
//!
//! The body limit is axum's [`DefaultBodyLimit`]: it is enforced by the
//! `Bytes` extractor, so `/process_email` answers 413 without buffering an
//! oversized payload and response bodies keep their type.

use axum::extract::DefaultBodyLimit;
use axum::http::header::HeaderName;
use axum::http::{Method, StatusCode};
use tower::layer::util::{Identity, Stack};
use tower::ServiceBuilder;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

type TraceHttp = TraceLayer<SharedClassifier<ServerErrorsAsFailures>>;

type HttpLayers = Stack<
    PropagateRequestIdLayer,
    Stack<
        DefaultBodyLimit,
        Stack<
            TimeoutLayer,
            Stack<
                CorsLayer,
                Stack<
                    CompressionLayer,
                    Stack<TraceHttp, Stack<SetRequestIdLayer<MakeRequestUuid>, Identity>>,
                >,
            >,
        >,
    >,
>;

/// Request id, tracing, compression, CORS, request timeout (408), body
/// limit (413), then request id echoed onto the response.
///
/// Handler timeouts and load shedding are not here; they apply per operation
/// inside the service pipeline.
#[must_use]
pub fn build_http_layers(config: &NetworkConfig) -> HttpLayers {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer(&config.cors_origins))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(PropagateRequestIdLayer::new(request_id))
        .into_inner()
}

/// `"*"` anywhere in the list opens CORS to every origin; unparseable
/// entries are skipped.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|origin| origin.parse().ok()))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}
