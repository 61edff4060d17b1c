use axum::{
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Json},
};
use tracing::{debug, info};

use crate::{
    app::AppState,
    dns::{Changes, Endpoint, PropertyValuesEqualRequest, PropertyValuesEqualResponse},
    error::WebhookError,
    extract::Payload,
};

/// Media type advertised by the negotiation route.
pub const PLUGIN_MEDIA_TYPE: &str = "application/external.dns.plugin+json;version=1";

// ── GET / ─────────────────────────────────────────────────────────────────────
// Protocol negotiation. Any request body is ignored.

pub async fn negotiate() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::VARY, "Content-Type"),
            (header::CONTENT_TYPE, PLUGIN_MEDIA_TYPE),
        ],
    )
}

// ── GET /records ──────────────────────────────────────────────────────────────

pub async fn get_records(
    State(state): State<AppState>,
) -> Result<Json<Vec<Endpoint>>, WebhookError> {
    let endpoints = state.provider.records().await?;
    info!("GET /records → {} endpoint(s)", endpoints.len());
    Ok(Json(endpoints))
}

// ── POST /records ─────────────────────────────────────────────────────────────

pub async fn apply_changes(
    State(state): State<AppState>,
    Payload(changes): Payload<Changes>,
) -> Result<StatusCode, WebhookError> {
    info!(
        create = changes.create.len(),
        update = changes.update_new.len(),
        delete = changes.delete.len(),
        "POST /records"
    );
    state.provider.apply_changes(changes).await?;
    Ok(StatusCode::OK)
}

// ── GET /propertyvaluesequals ─────────────────────────────────────────────────

pub async fn property_values_equals(
    State(state): State<AppState>,
    Payload(req): Payload<PropertyValuesEqualRequest>,
) -> Json<PropertyValuesEqualResponse> {
    let equals = state
        .provider
        .property_values_equal(&req.name, &req.previous, &req.current);
    debug!(name = %req.name, previous = %req.previous, current = %req.current, equals, "GET /propertyvaluesequals");
    Json(PropertyValuesEqualResponse { equals })
}

// ── GET /adjustendpoints ──────────────────────────────────────────────────────

pub async fn adjust_endpoints(
    State(state): State<AppState>,
    Payload(endpoints): Payload<Vec<Endpoint>>,
) -> Json<Vec<Endpoint>> {
    let submitted = endpoints.len();
    let adjusted = state.provider.adjust_endpoints(endpoints);
    debug!("GET /adjustendpoints: {submitted} in, {} out", adjusted.len());
    Json(adjusted)
}

// ── fallbacks ─────────────────────────────────────────────────────────────────

pub async fn unknown_route(method: Method, uri: Uri) -> WebhookError {
    WebhookError::UnknownRoute(format!("{method} {}", uri.path()))
}

pub fn method_not_allowed(allow: &'static str, method: Method, uri: &Uri) -> WebhookError {
    WebhookError::MethodNotAllowed {
        method,
        path: uri.path().to_string(),
        allow,
    }
}
