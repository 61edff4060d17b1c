use std::sync::Arc;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Request},
    http::{Method, Uri},
    middleware::{self, Next},
    response::Response,
    routing::{get, MethodRouter},
    Router,
};
use http_body_util::BodyExt;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, Level};

use crate::{handlers, provider::Provider};

// ─────────────────────────────────────────────────────────────────────────────
// Shared application state
// ─────────────────────────────────────────────────────────────────────────────

/// Handlers only ever read this; all mutable state lives behind the provider.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn Provider>,
}

impl AppState {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }
}

/// The plugin protocol routes. Other methods on these paths get 405 with an
/// `Allow` header, anything else 404.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", allow("GET, HEAD", get(handlers::negotiate)))
        .route(
            "/records",
            allow(
                "GET, HEAD, POST",
                get(handlers::get_records).post(handlers::apply_changes),
            ),
        )
        .route(
            "/propertyvaluesequals",
            allow("GET, HEAD", get(handlers::property_values_equals)),
        )
        .route(
            "/adjustendpoints",
            allow("GET, HEAD", get(handlers::adjust_endpoints)),
        )
        .fallback(handlers::unknown_route)
        // body size is capped by `Server`, see `ServerConfig::max_body_bytes`
        .layer(DefaultBodyLimit::disable())
        // log_request_body runs before handlers; only logs at DEBUG level
        .layer(middleware::from_fn(log_request_body))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn allow(methods: &'static str, route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.fallback(move |method: Method, uri: Uri| async move {
        handlers::method_not_allowed(methods, method, &uri)
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Request body logging middleware
//
// Only buffers when DEBUG is enabled: reads the full body, logs it, then puts
// it back so the handler can still decode it.
// ─────────────────────────────────────────────────────────────────────────────

async fn log_request_body(req: Request, next: Next) -> Response {
    if !tracing::enabled!(Level::DEBUG) {
        return next.run(req).await;
    }

    let (parts, body) = req.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!("failed to read request body: {e}");
            return next.run(Request::from_parts(parts, Body::empty())).await;
        }
    };

    if !bytes.is_empty() {
        let shown = match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(v) => serde_json::to_string_pretty(&v).unwrap_or_default(),
            Err(_) => String::from_utf8_lossy(&bytes).into_owned(),
        };
        debug!(
            method = %parts.method,
            path   = %parts.uri.path(),
            body   = %shown,
            "← request body"
        );
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
