//! # recongw: upload gateway for document reconciliation
//!
//! `recongw` sits between a browser UI and an external document-reconciliation service. The user
//! submits a batch of PDF remittances, EML payment advices and one XLSX ledger; the gateway
//! forwards them to the service in a single multipart request and turns whatever comes back into
//! one stable result.
//!
//! ## Why a gateway
//!
//! The reconciliation service does not have a fixed reply format. Depending on version and
//! outcome it answers with a CSV file, opaque bytes, a JSON envelope pointing at a download URL,
//! a JSON error, or an HTML error page from a proxy in front of it. Transport failures add
//! refused connections, certificate problems and timeouts. The browser should see none of that
//! variety: every request ends in exactly one [`gateway::ProcessResult`], rendered as the
//! [`ProcessResponse`](api::models::process::ProcessResponse) JSON contract.
//!
//! ## Request Flow
//!
//! 1. `POST /api/process-files` streams the upload, enforcing the limits in
//!    [`config::UploadConfig`], and builds a [`gateway::FileBatch`].
//! 2. [`gateway::assemble`] turns the batch into the outbound multipart payload. An empty batch
//!    stops here without any network call.
//! 3. An [`gateway::Upstream`] sends it. The production implementation is
//!    [`gateway::ReqwestUpstream`].
//! 4. [`gateway::normalize`] classifies a reply; [`gateway::classify`] maps a transport failure.
//!
//! No state is kept between requests.
//!
//! ## Configuration
//!
//! See [`config`]. At minimum the upstream URL must be set, e.g. `UPSTREAM_URL=http://localhost:5000`.

pub mod api;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod openapi;
pub mod telemetry;

#[cfg(test)]
mod test_utils;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;
use config::CorsOrigin;
use gateway::{ReqwestUpstream, Upstream};
use openapi::ApiDoc;

/// Application state shared across all request handlers.
///
/// Both fields are immutable for the lifetime of the process; cloning is cheap.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub upstream: Arc<dyn Upstream>,
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.security.cors;

    let mut cors = if cors_config
        .allowed_origins
        .iter()
        .any(|origin| matches!(origin, CorsOrigin::Wildcard))
    {
        CorsLayer::new().allow_origin(Any)
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.origin().ascii_serialization().parse::<HeaderValue>()?);
            }
        }
        CorsLayer::new().allow_origin(origins)
    };

    cors = cors
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(vec![axum::http::header::CONTENT_DISPOSITION]);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// - `POST /api/process-files` with a body limit derived from the upload limits
/// - `GET /healthz`
/// - `GET /api-docs/openapi.json` and the Scalar UI at `/docs`
/// - `GET /internal/metrics` when `enable_metrics` is set
/// - CORS and tracing layers
///
/// # Errors
///
/// Returns an error if the CORS configuration cannot be turned into header values.
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let api_routes = Router::new()
        .route("/process-files", post(api::handlers::process::process_files))
        .layer(DefaultBodyLimit::max(state.config.uploads.max_request_size()));

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api", api_routes)
        .with_state(state.clone())
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let cors_layer = create_cors_layer(&state.config)?;
    let mut router = router.layer(cors_layer);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application talking to the configured upstream service
    pub fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting gateway with configuration: {:#?}", config);

        let upstream = ReqwestUpstream::new(&config.upstream)?;
        info!("Forwarding uploads to {}", upstream.endpoint());

        Self::with_upstream(config, Arc::new(upstream))
    }

    /// Create an application around any [`Upstream`] implementation
    pub fn with_upstream(config: Config, upstream: Arc<dyn Upstream>) -> anyhow::Result<Self> {
        let app_state = AppState::builder().config(config.clone()).upstream(upstream).build();
        let router = build_router(&app_state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Gateway listening on http://{}, available at http://localhost:{}", bind_addr, self.config.port);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Gateway stopped");
        Ok(())
    }
}
