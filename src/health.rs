//! Health server for Kubernetes health checks, Prometheus metrics, and cache operations.
//!
//! Provides:
//! - `/healthz` - Liveness check (always returns 200 if server is running)
//! - `/readyz` - Readiness check (returns 200 when ready to serve traffic)
//! - `/metrics` - Prometheus metrics endpoint
//! - `POST /capabilities/refresh` - Rebuild the capability cache from the provider

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::capabilities::CapabilityCache;

/// Labels for admission request counters
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct RequestLabels {
    pub kind: String,
    pub operation: String,
    pub outcome: String,
}

impl EncodeLabelSet for RequestLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        ("operation", self.operation.as_str()).encode(encoder.encode_label())?;
        ("outcome", self.outcome.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for denial counters
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct DenialLabels {
    pub kind: String,
    pub reason: String,
}

impl EncodeLabelSet for DenialLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        ("reason", self.reason.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for admission latency
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct DurationLabels {
    pub kind: String,
    pub operation: String,
}

impl EncodeLabelSet for DurationLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        ("operation", self.operation.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the admission controller
pub struct Metrics {
    /// Admission requests by outcome
    pub requests_total: Family<RequestLabels, Counter>,
    /// Denials by reason code
    pub denials_total: Family<DenialLabels, Counter>,
    /// Admission latency histogram
    pub duration_seconds: Family<DurationLabels, Histogram>,
    /// Cached capability records
    pub capability_cache_entries: Gauge,
    /// Upstream capability fetches since startup
    pub capability_fetches: Gauge,
    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let requests_total = Family::<RequestLabels, Counter>::default();
        registry.register(
            "azure_admission_requests",
            "Total number of admission requests",
            requests_total.clone(),
        );

        let denials_total = Family::<DenialLabels, Counter>::default();
        registry.register(
            "azure_admission_denials",
            "Total number of denied admission requests",
            denials_total.clone(),
        );

        let duration_seconds = Family::<DurationLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.0005, 2.0, 15))
        });
        registry.register(
            "azure_admission_duration_seconds",
            "Duration of admission request handling in seconds",
            duration_seconds.clone(),
        );

        let capability_cache_entries = Gauge::default();
        registry.register(
            "azure_admission_capability_cache_entries",
            "Number of instance types in the capability cache",
            capability_cache_entries.clone(),
        );

        let capability_fetches = Gauge::default();
        registry.register(
            "azure_admission_capability_fetches",
            "Number of capability fetches issued to the provider",
            capability_fetches.clone(),
        );

        Self {
            requests_total,
            denials_total,
            duration_seconds,
            capability_cache_entries,
            capability_fetches,
            registry,
        }
    }

    /// Record a handled admission request
    pub fn record_request(&self, kind: &str, operation: &str, outcome: &str, duration_secs: f64) {
        self.requests_total
            .get_or_create(&RequestLabels {
                kind: kind.to_string(),
                operation: operation.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
        self.duration_seconds
            .get_or_create(&DurationLabels {
                kind: kind.to_string(),
                operation: operation.to_string(),
            })
            .observe(duration_secs);
    }

    /// Record a denial with its reason code
    pub fn record_denial(&self, kind: &str, reason: &str) {
        self.denials_total
            .get_or_create(&DenialLabels {
                kind: kind.to_string(),
                reason: reason.to_string(),
            })
            .inc();
    }

    /// Copy cache counters into the gauges
    pub fn observe_cache(&self, cache: &CapabilityCache) {
        let stats = cache.stats();
        self.capability_cache_entries
            .set(i64::try_from(stats.entries).unwrap_or(i64::MAX));
        self.capability_fetches
            .set(i64::try_from(stats.fetches).unwrap_or(i64::MAX));
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether the webhook is ready to serve admission requests
    ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
    /// Capability cache exposed to operational endpoints
    capabilities: Option<Arc<CapabilityCache>>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
            capabilities: None,
        }
    }

    /// Attach the capability cache for metrics and refresh
    pub fn with_capabilities(mut self, cache: Arc<CapabilityCache>) -> Self {
        self.capabilities = Some(cache);
        self
    }

    /// Mark the webhook as ready or not ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the webhook is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }

    pub fn capabilities(&self) -> Option<&Arc<CapabilityCache>> {
        self.capabilities.as_ref()
    }
}

/// Liveness check handler
///
/// Returns 200 OK if the process is alive.
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness check handler
///
/// Returns 200 OK once the webhook server is up, 503 before.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    if let Some(cache) = state.capabilities() {
        state.metrics.observe_cache(cache);
    }
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Capability refresh handler
///
/// Returns 502 when the provider listing cannot be loaded; the cache keeps
/// its previous contents in that case.
async fn refresh_capabilities(State(state): State<Arc<HealthState>>) -> Response {
    let Some(cache) = state.capabilities() else {
        return (StatusCode::NOT_FOUND, "capability cache not configured").into_response();
    };

    match cache.refresh().await {
        Ok(count) => {
            state.metrics.observe_cache(cache);
            (
                StatusCode::OK,
                format!("refreshed {} instance types", count),
            )
                .into_response()
        }
        Err(e) => {
            warn!(error = %e, "Capability refresh failed");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .route("/capabilities/refresh", post(refresh_capabilities))
        .with_state(state)
}

/// Run the health server
///
/// Binds to 0.0.0.0 on `port` and serves health, metrics and cache endpoints.
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
