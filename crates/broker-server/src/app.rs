use axum::http::Request;
use axum::{Router, body::Body, routing::get};
use tower_http::{classify::ServerErrorsFailureClass, trace::TraceLayer};

use crate::routes::{producer_handler, viewer_handler};
use crate::state::AppState;

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions/{session_id}/producer", get(producer_handler))
        .route("/sessions/{session_id}/viewer", get(viewer_handler))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    let path = request.uri().path();
                    if path == "/health" {
                        return tracing::Span::none();
                    }
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %path,
                    )
                })
                .on_request(|request: &Request<Body>, _span: &tracing::Span| {
                    if request.uri().path() == "/health" {
                        return;
                    }
                    tracing::info!(method = %request.method(), path = %request.uri().path(), "http_request_started");
                })
                .on_response(
                    |response: &axum::http::Response<Body>, latency: std::time::Duration, span: &tracing::Span| {
                        if span.is_disabled() {
                            return;
                        }
                        tracing::info!(
                            parent: span,
                            http_status = %response.status().as_u16(),
                            latency_ms = %latency.as_millis(),
                            "http_request_finished"
                        );
                    },
                )
                .on_failure(
                    |failure_class: ServerErrorsFailureClass, latency: std::time::Duration, span: &tracing::Span| {
                        if span.is_disabled() {
                            return;
                        }
                        tracing::error!(
                            parent: span,
                            failure_class = ?failure_class,
                            latency_ms = %latency.as_millis(),
                            "http_request_failed"
                        );
                    },
                ),
        )
}

async fn health() -> &'static str {
    "ok"
}
