use axum::BoxError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Database migration error: {0}")]
    DatabaseMigration(#[from] sqlx::migrate::MigrateError),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("Invalid lease settings: {0}")]
    InvalidLeaseSettings(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no available tokens in pool")]
    NoAvailableTokens,
    #[error("token not found in any pool")]
    TokenNotFound,
    #[error("token not found in assigned tokens")]
    TokenNotAssigned,
    #[error("token already in use")]
    TokenAlreadyInUse,
    #[error("failed to keep token alive")]
    FailedKeepAlive,
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("Store error: {0}")]
    Store(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Error::NoAvailableTokens => StatusCode::SERVICE_UNAVAILABLE,
            Error::TokenNotFound => StatusCode::NOT_FOUND,
            Error::TokenNotAssigned => StatusCode::CONFLICT,
            Error::TokenAlreadyInUse => StatusCode::LOCKED,
            Error::FailedKeepAlive => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Sql(_) | Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("{:?}", self);
        } else {
            tracing::debug!("{}", self);
        }

        let message = match self {
            Error::Sql(_) | Error::Store(_) => "Internal server error".to_string(),
            e => e.to_string(),
        };

        (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub(crate) async fn handle_middleware_errors(err: BoxError) -> (StatusCode, &'static str) {
    if err.is::<tower::timeout::error::Elapsed>() {
        tracing::warn!("Request timed out");
        return (StatusCode::REQUEST_TIMEOUT, "Request timed out");
    }

    tracing::error!("Unhandled error: {:?}", err);
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}
