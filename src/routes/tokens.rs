use crate::core::error::Error;
use crate::core::state::AppState;
use crate::store::Store;
use crate::types::response;
use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use tracing::instrument;

#[instrument(skip(state))]
pub(crate) async fn generate<S: Store>(
    State(state): State<AppState<S>>,
) -> Result<impl IntoResponse, Error> {
    let token = state.controller.generate().await?;

    Ok(Json(response::Token { token }))
}

#[instrument(skip(state))]
pub(crate) async fn assign<S: Store>(
    State(state): State<AppState<S>>,
) -> Result<impl IntoResponse, Error> {
    let token = state.controller.assign().await?;

    Ok(Json(response::Token { token }))
}

#[instrument(skip(state))]
pub(crate) async fn keepalive<S: Store>(
    State(state): State<AppState<S>>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, Error> {
    state.controller.renew(&token).await?;

    Ok(Json(response::Message {
        message: "Token kept alive",
    }))
}

#[instrument(skip(state))]
pub(crate) async fn unblock<S: Store>(
    State(state): State<AppState<S>>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, Error> {
    state.controller.release(&token).await?;

    Ok(Json(response::Message {
        message: "Token unblocked successfully",
    }))
}

#[instrument(skip(state))]
pub(crate) async fn delete<S: Store>(
    State(state): State<AppState<S>>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, Error> {
    state.controller.delete(&token).await?;

    Ok(Json(response::Message {
        message: "Token deleted successfully",
    }))
}

#[instrument(skip(state))]
pub(crate) async fn available<S: Store>(
    State(state): State<AppState<S>>,
) -> Result<impl IntoResponse, Error> {
    let available_tokens = state.controller.list_available().await?;

    Ok(Json(response::AvailableTokens { available_tokens }))
}

#[instrument(skip(state))]
pub(crate) async fn assigned<S: Store>(
    State(state): State<AppState<S>>,
) -> Result<impl IntoResponse, Error> {
    let assigned_tokens = state.controller.list_assigned().await?;

    Ok(Json(response::AssignedTokens { assigned_tokens }))
}

#[instrument(skip(state))]
pub(crate) async fn reconcile<S: Store>(State(state): State<AppState<S>>) -> impl IntoResponse {
    let reconciliation = state.controller.reconcile().await;

    Json(response::ReconcileSummary::from(reconciliation))
}
