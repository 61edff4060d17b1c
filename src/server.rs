// Listener bootstrap.
//
// `Server::bind` returns once the socket is listening; from then on
// connections queue in the kernel backlog even before `run` is awaited.
//
// Timeouts and the body size limit are enforced here, around the router, not
// inside the handlers:
//   read  – reading the request body; exceeded → 408
//   size  – request body larger than `max_body_bytes` → 413
//   write – dispatch to finished response; exceeded → 408, the in-flight
//           provider call is dropped
// The time spent reading request headers is not bounded.

use std::{future::Future, io, net::SocketAddr, time::Duration};

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};

use crate::error::WebhookError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_body_bytes: usize,
}

/// Limits applied to every request body before it reaches the router.
#[derive(Debug, Clone, Copy)]
struct BodyLimits {
    read_timeout: Duration,
    max_bytes: usize,
}

pub struct Server {
    listener: TcpListener,
    app: Router,
}

impl Server {
    /// Bind the listening socket and wrap `app` in the configured timeouts.
    pub async fn bind(cfg: &ServerConfig, app: Router) -> io::Result<Self> {
        let listener = TcpListener::bind(cfg.addr).await?;
        let app = app.layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn_with_state(
                    BodyLimits {
                        read_timeout: cfg.read_timeout,
                        max_bytes: cfg.max_body_bytes,
                    },
                    read_body,
                ))
                .layer(TimeoutLayer::new(cfg.write_timeout)),
        );
        info!(
            addr = %listener.local_addr()?,
            read_timeout = ?cfg.read_timeout,
            write_timeout = ?cfg.write_timeout,
            max_body_bytes = cfg.max_body_bytes,
            "accepting connections"
        );
        Ok(Self { listener, app })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` resolves, then let in-flight requests finish.
    pub async fn run<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.app.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await
    }
}

async fn read_body(State(limits): State<BodyLimits>, req: Request, next: Next) -> Response {
    let (parts, body) = req.into_parts();
    let too_large = WebhookError::PayloadTooLarge {
        limit: limits.max_bytes,
    };

    let declared = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limits.max_bytes as u64) {
        return too_large.into_response();
    }

    let limited = Limited::new(body, limits.max_bytes);
    let bytes = match tokio::time::timeout(limits.read_timeout, limited.collect()).await {
        Ok(Ok(collected)) => collected.to_bytes(),
        Ok(Err(e)) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return too_large.into_response();
        }
        Ok(Err(e)) => {
            warn!(path = %parts.uri.path(), "failed to read request body: {e}");
            return StatusCode::BAD_REQUEST.into_response();
        }
        Err(_) => {
            warn!(path = %parts.uri.path(), limit = ?limits.read_timeout, "request body not received in time");
            return StatusCode::REQUEST_TIMEOUT.into_response();
        }
    };
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
