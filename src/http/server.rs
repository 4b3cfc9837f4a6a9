//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the gateway's routes
//! - Attach the admission pipelines (full for `/api`, public for `/`)
//! - Wire up cross-cutting layers (request ID, tracing, timeout, CORS,
//!   security headers)
//! - Run background tasks: rate-limit janitor and config reload
//!
//! # Layer order (outermost first)
//! ```text
//! set X-Request-ID → propagate X-Request-ID → TraceLayer
//!     → security headers → TimeoutLayer → CORS
//!     → routes:
//!         GET /health            (no admission)
//!         GET /                  (public pipeline)
//!         /api/*                 (full pipeline → downstream router)
//!         fallback               (404 envelope)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware::from_fn_with_state, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{ConfigError, GatewayConfig};
use crate::http::handlers::{echo_router, health, not_found, root};
use crate::http::middleware::{admission_middleware, AdmissionState};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::shutdown::wait_for;
use crate::pipeline::AdmissionComponents;
use crate::security::headers::{cors_layer, with_security_headers};

/// HTTP server for the gateway.
pub struct HttpServer {
    config: GatewayConfig,
    components: Arc<AdmissionComponents>,
    downstream: Router,
}

impl HttpServer {
    /// Build the admission components from `config`. Fails on invalid config.
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        let components = Arc::new(AdmissionComponents::from_config(&config)?);
        Ok(Self::from_parts(config, components))
    }

    /// Use pre-built components, e.g. with a manual clock.
    pub fn from_parts(config: GatewayConfig, components: Arc<AdmissionComponents>) -> Self {
        Self {
            config,
            components,
            downstream: echo_router(),
        }
    }

    /// Replace the router that admitted `/api` requests are handed to.
    pub fn with_downstream(mut self, downstream: Router) -> Self {
        self.downstream = downstream;
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn components(&self) -> &Arc<AdmissionComponents> {
        &self.components
    }

    /// The complete application router.
    pub fn router(&self) -> Router {
        build_router(&self.config, &self.components, self.downstream.clone())
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Validated configs arriving on `config_updates` swap the API keys and
    /// the IP allow-list. Returns after `shutdown` fires and in-flight
    /// requests have drained.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            environment = ?self.config.environment,
            api_keys = self.components.key_store.len(),
            "HTTP server starting"
        );

        if self.components.key_store.is_empty() {
            tracing::warn!("No API keys configured; every /api request will be rejected");
        }

        let janitor = spawn_janitor(self.components.clone(), shutdown.resubscribe());
        let reloader = spawn_reloader(
            self.components.clone(),
            config_updates,
            shutdown.resubscribe(),
        );

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(wait_for(shutdown))
            .await?;

        janitor.abort();
        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
fn build_router(
    config: &GatewayConfig,
    components: &AdmissionComponents,
    downstream: Router,
) -> Router {
    let api_state = AdmissionState {
        pipeline: Arc::new(components.api_pipeline()),
        max_body_bytes: config.payload.max_body_bytes,
        trust_proxy: config.access.trust_proxy,
        development: config.is_development(),
    };
    let public_state = AdmissionState {
        pipeline: Arc::new(components.public_pipeline()),
        ..api_state.clone()
    };

    // Unknown /api paths are admitted like known ones, so a missing key is
    // reported before a missing route.
    let api_fallback = Router::new()
        .fallback(not_found)
        .layer(from_fn_with_state(api_state.clone(), admission_middleware));
    let api = downstream
        .route_layer(from_fn_with_state(api_state, admission_middleware))
        .fallback_service(api_fallback);

    let public = Router::new()
        .route("/", get(root))
        .route_layer(from_fn_with_state(public_state, admission_middleware));

    let routes = Router::new()
        .merge(public)
        .route("/health", get(health))
        .nest("/api", api)
        .fallback(not_found)
        .layer(cors_layer(&config.access))
        .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

    with_security_headers(routes)
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id_layer())
        .layer(set_request_id_layer())
}

/// Sweep idle rate-limit entries once per window until shutdown.
fn spawn_janitor(
    components: Arc<AdmissionComponents>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let period = components.sweep_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let removed = components.sweep();
                    tracing::debug!(removed, "Rate-limit janitor sweep");
                }
                _ = shutdown.recv() => break,
            }
        }
    })
}

/// Apply hot-reloadable settings from the config watcher.
fn spawn_reloader(
    components: Arc<AdmissionComponents>,
    mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Some(config) => {
                        if config.auth.api_keys.is_empty() {
                            tracing::warn!("Reloaded config has no API keys; every /api request will be rejected");
                        }
                        components.apply_reload(&config);
                        tracing::info!(
                            api_keys = config.auth.api_keys.len(),
                            allowed_ips = config.access.allowed_ips.len(),
                            "Reloaded credentials and IP allow-list"
                        );
                    }
                    None => break,
                },
                _ = shutdown.recv() => break,
            }
        }
    })
}
