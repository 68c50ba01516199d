use crate::core::error;
use crate::core::state::AppState;
use crate::routes::tokens;
use crate::store::Store;
use axum::error_handling::HandleErrorLayer;
use axum::{
    Router,
    extract::{MatchedPath, Request},
    routing::{delete, get, post},
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info_span;

pub(crate) fn routes<S: Store>(state: AppState<S>, handler_timeout: Duration) -> Router {
    // /tokens/...
    let token_router = Router::new()
        .route("/generate", post(tokens::generate::<S>))
        .route("/assign", post(tokens::assign::<S>))
        .route("/keepalive/{token}", post(tokens::keepalive::<S>))
        .route("/unblock/{token}", post(tokens::unblock::<S>))
        .route("/reconcile", post(tokens::reconcile::<S>))
        .route("/available", get(tokens::available::<S>))
        .route("/assigned", get(tokens::assigned::<S>))
        .route("/{token}", delete(tokens::delete::<S>));

    Router::new()
        .route("/", get(|| async { "OK" }))
        .nest("/tokens", token_router)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                        let matched_path = request
                            .extensions()
                            .get::<MatchedPath>()
                            .map(MatchedPath::as_str);

                        info_span!(
                            "request",
                            method = ?request.method(),
                            matched_path,
                        )
                    }),
                )
                .layer(HandleErrorLayer::new(error::handle_middleware_errors))
                .timeout(handler_timeout)
                .layer(CorsLayer::permissive()),
        )
}
