use axum::{
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, info};

use crate::provider::ProviderError;

/// Everything a request can fail with. Responses never carry a body; the
/// detail only goes to the log.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("malformed request body: {0}")]
    MalformedRequest(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("no route for {0}")]
    UnknownRoute(String),

    #[error("{method} not allowed on {path}")]
    MethodNotAllowed {
        method: Method,
        path: String,
        allow: &'static str,
    },
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            WebhookError::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WebhookError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            WebhookError::UnknownRoute(_) => StatusCode::NOT_FOUND,
            WebhookError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            WebhookError::Provider(e) => error!(%status, "provider call failed: {e}"),
            other => info!(%status, "rejected request: {other}"),
        }

        match self {
            WebhookError::MethodNotAllowed { allow, .. } => {
                (status, [(header::ALLOW, allow)]).into_response()
            }
            _ => status.into_response(),
        }
    }
}
