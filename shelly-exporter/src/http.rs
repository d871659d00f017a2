//! HTTP server for the Prometheus metrics endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{RawQuery, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::validate_target;
use crate::model::Target;
use crate::scrape::Exporter;

/// Content type of the exposition format.
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Body returned for every path other than `/metrics`.
pub const NOT_FOUND_BODY: &str = "Not Found. Only /metrics request supported";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    exporter: Arc<Exporter>,
    default_targets: Arc<[Target]>,
}

/// Create the HTTP router.
pub fn create_router(exporter: Arc<Exporter>, default_targets: Vec<Target>) -> Router {
    let state = AppState {
        exporter,
        default_targets: default_targets.into(),
    };

    Router::new()
        .route("/metrics", get(metrics_handler))
        .fallback(not_found_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handler for the /metrics endpoint.
async fn metrics_handler(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    let started = Instant::now();
    let targets =
        requested_targets(query.as_deref()).unwrap_or_else(|| state.default_targets.to_vec());

    let (body, summary) = state.exporter.scrape(&targets).await;

    info!(
        targets = targets.len(),
        succeeded = summary.succeeded,
        failed = summary.failed,
        elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
        "GET /metrics finished"
    );

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)],
        body,
    )
        .into_response()
}

/// Handler for everything else.
async fn not_found_handler() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        NOT_FOUND_BODY,
    )
        .into_response()
}

/// Targets named by `target` query parameters, in order.
///
/// `None` only when the query has no non-blank `target` value, so the
/// defaults apply. Malformed addresses are logged and dropped; if all of
/// them are malformed the result is an empty list, not the defaults.
pub fn requested_targets(query: Option<&str>) -> Option<Vec<Target>> {
    let named: Vec<Target> = url::form_urlencoded::parse(query?.as_bytes())
        .filter(|(key, value)| key == "target" && !value.is_empty())
        .map(|(_, value)| Target::new(value.into_owned()))
        .collect();

    if named.is_empty() {
        return None;
    }

    let targets = named
        .into_iter()
        .filter(|target| match validate_target(target) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Ignoring target parameter");
                false
            }
        })
        .collect();

    Some(targets)
}

/// HTTP server configuration.
pub struct HttpServer {
    exporter: Arc<Exporter>,
    listen_addr: SocketAddr,
    default_targets: Vec<Target>,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(
        exporter: Arc<Exporter>,
        listen_addr: SocketAddr,
        default_targets: Vec<Target>,
    ) -> Self {
        Self {
            exporter,
            listen_addr,
            default_targets,
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let default_targets: Vec<String> =
            self.default_targets.iter().map(ToString::to_string).collect();
        let router = create_router(self.exporter, self.default_targets);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(
            addr = %self.listen_addr,
            default_targets = ?default_targets,
            "HTTP server listening"
        );

        // Run server with graceful shutdown
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
