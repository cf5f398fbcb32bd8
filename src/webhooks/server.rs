//! Admission webhook server.
//!
//! Serves `POST /validate` and `POST /mutate` for AzureCluster and
//! AzureMachinePool. Register both paths in a Validating- and
//! MutatingWebhookConfiguration and mount the TLS secret at
//! `/etc/webhook/certs/`.
//!
//! Any failure to evaluate a request denies it (fail closed). Denials carry
//! `"[Reason] message"` in `status.message`.

use std::sync::Arc;
use std::time::Duration;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::post};
use kube::core::DynamicObject;
use kube::core::admission::{
    AdmissionRequest, AdmissionResponse, AdmissionReview, Operation as AdmissionOperation,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::error::AdmissionError;
use crate::health::HealthState;
use crate::webhooks::dispatcher::AdmissionDispatcher;
use crate::webhooks::policies::Decision;
use crate::webhooks::request::{AdmissionInput, Operation, ResourceKind};

/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "/etc/webhook/certs/tls.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "/etc/webhook/certs/tls.key";

/// Which chain a review is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionMode {
    Validate,
    Mutate,
}

/// Shared state for webhook handlers
pub struct WebhookState {
    pub dispatcher: AdmissionDispatcher,
    /// Per-request evaluation budget
    pub timeout: Duration,
    pub health: Arc<HealthState>,
}

impl WebhookState {
    pub fn new(
        dispatcher: AdmissionDispatcher,
        timeout: Duration,
        health: Arc<HealthState>,
    ) -> Self {
        Self {
            dispatcher,
            timeout,
            health,
        }
    }
}

/// Create a denial response with reason embedded in message.
/// kube-rs deny() only sets status.message, so we format as "[reason] message"
fn deny_with_reason(
    request: &AdmissionRequest<DynamicObject>,
    message: &str,
    reason: &str,
) -> AdmissionResponse {
    AdmissionResponse::from(request).deny(format!("[{}] {}", reason, message))
}

fn operation_label(operation: &AdmissionOperation) -> &'static str {
    match operation {
        AdmissionOperation::Create => "CREATE",
        AdmissionOperation::Update => "UPDATE",
        AdmissionOperation::Delete => "DELETE",
        AdmissionOperation::Connect => "CONNECT",
    }
}

/// Create the webhook router
pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/validate", post(validate))
        .route("/mutate", post(mutate))
        .with_state(state)
}

async fn validate(
    State(state): State<Arc<WebhookState>>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> impl IntoResponse {
    let (status, review) = handle_review(&state, review, AdmissionMode::Validate).await;
    (status, Json(review))
}

async fn mutate(
    State(state): State<Arc<WebhookState>>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> impl IntoResponse {
    let (status, review) = handle_review(&state, review, AdmissionMode::Mutate).await;
    (status, Json(review))
}

/// Evaluate one AdmissionReview and build the reply.
pub async fn handle_review(
    state: &WebhookState,
    review: AdmissionReview<DynamicObject>,
    mode: AdmissionMode,
) -> (StatusCode, AdmissionReview<DynamicObject>) {
    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to extract admission request");
            return (
                StatusCode::BAD_REQUEST,
                AdmissionResponse::invalid(format!("Invalid AdmissionReview: {}", e))
                    .into_review(),
            );
        }
    };

    let started = std::time::Instant::now();
    let response = admit(state, &request, mode).await;

    let kind = request.kind.kind.as_str();
    let operation = operation_label(&request.operation);
    let outcome = if response.allowed { "allowed" } else { "denied" };
    state.health.metrics.record_request(
        kind,
        operation,
        outcome,
        started.elapsed().as_secs_f64(),
    );

    (StatusCode::OK, response.into_review())
}

async fn admit(
    state: &WebhookState,
    request: &AdmissionRequest<DynamicObject>,
    mode: AdmissionMode,
) -> AdmissionResponse {
    let uid = &request.uid;
    let raw_kind = request.kind.kind.as_str();
    debug!(
        uid = %uid,
        kind = %raw_kind,
        operation = ?request.operation,
        namespace = ?request.namespace,
        name = %request.name,
        mode = ?mode,
        "Processing admission request"
    );

    // DELETE and CONNECT are always allowed
    let Some(operation) = Operation::from_admission(&request.operation) else {
        info!(uid = %uid, operation = ?request.operation, "Admission request allowed (no chain)");
        return AdmissionResponse::from(request);
    };

    let input = match build_input(state, request, operation) {
        Ok(input) => input,
        Err(e) => return deny_error(state, request, &e),
    };

    match mode {
        AdmissionMode::Validate => match state.dispatcher.validate(&input).await {
            Ok(Decision::Allow) => {
                info!(uid = %uid, kind = %input.kind, "Admission request allowed");
                AdmissionResponse::from(request)
            }
            Ok(Decision::Deny(denial)) => {
                let reason = denial.reason.code();
                warn!(
                    uid = %uid,
                    kind = %input.kind,
                    rule = denial.rule,
                    reason = %reason,
                    message = %denial.message,
                    "Admission request denied"
                );
                state.health.metrics.record_denial(input.kind.as_str(), reason);
                deny_with_reason(
                    request,
                    &format!("{}: {}", denial.rule, denial.message),
                    reason,
                )
            }
            Err(e) => deny_error(state, request, &e),
        },
        AdmissionMode::Mutate => match state.dispatcher.mutate(&input).await {
            Ok(patch) if patch.is_empty() => {
                info!(uid = %uid, kind = %input.kind, "Admission request allowed without patch");
                AdmissionResponse::from(request)
            }
            Ok(patch) => {
                info!(
                    uid = %uid,
                    kind = %input.kind,
                    operations = patch.len(),
                    "Applying patch to object"
                );
                match AdmissionResponse::from(request).with_patch(json_patch::Patch(patch)) {
                    Ok(response) => response,
                    Err(e) => {
                        error!(uid = %uid, error = %e, "Failed to serialize patch");
                        state.health.metrics.record_denial(input.kind.as_str(), "PatchError");
                        deny_with_reason(
                            request,
                            &format!("patch serialization error: {}", e),
                            "PatchError",
                        )
                    }
                }
            }
            Err(e) => deny_error(state, request, &e),
        },
    }
}

fn build_input(
    state: &WebhookState,
    request: &AdmissionRequest<DynamicObject>,
    operation: Operation,
) -> Result<AdmissionInput, AdmissionError> {
    let kind = ResourceKind::from_kind(&request.kind.kind)
        .ok_or_else(|| AdmissionError::UnsupportedKind(request.kind.kind.clone()))?;
    let encode = |object: &DynamicObject| {
        serde_json::to_vec(object).map_err(|source| AdmissionError::Decode { kind, source })
    };

    let new_payload = match &request.object {
        Some(object) => encode(object)?,
        // Decodes as a schema mismatch below
        None => b"null".to_vec(),
    };
    let old_payload = request.old_object.as_ref().map(encode).transpose()?;

    Ok(AdmissionInput {
        kind,
        operation,
        new_payload,
        old_payload,
        deadline: tokio::time::Instant::now() + state.timeout,
    })
}

fn deny_error(
    state: &WebhookState,
    request: &AdmissionRequest<DynamicObject>,
    err: &AdmissionError,
) -> AdmissionResponse {
    let reason = err.reason();
    if err.is_upstream() {
        warn!(uid = %request.uid, reason = %reason, error = %err, "Admission failed closed");
    } else {
        warn!(uid = %request.uid, reason = %reason, error = %err, "Admission request rejected");
    }
    state
        .health
        .metrics
        .record_denial(&request.kind.kind, reason);
    deny_with_reason(request, &err.to_string(), reason)
}

/// Errors that can occur when running the webhook server
#[derive(Error, Debug)]
pub enum WebhookError {
    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),
    /// Server error
    #[error("Webhook server error: {0}")]
    Server(String),
}

/// Run the webhook server with TLS
///
/// Binds to 0.0.0.0 on `port` and serves `/validate` and `/mutate`.
///
/// # Arguments
/// * `state` - Dispatcher, timeout and metrics shared by the handlers
/// * `port` - Listen port
/// * `cert_path` - Path to TLS certificate file (PEM format)
/// * `key_path` - Path to TLS private key file (PEM format)
pub async fn run_webhook_server(
    state: Arc<WebhookState>,
    port: u16,
    cert_path: &str,
    key_path: &str,
) -> Result<(), WebhookError> {
    use axum_server::tls_rustls::RustlsConfig;
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let app = create_webhook_router(state);

    let config = RustlsConfig::from_pem_file(PathBuf::from(cert_path), PathBuf::from(key_path))
        .await
        .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Webhook server listening with TLS");

    axum_server::bind_rustls(addr, config)
        .serve(app.into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    Ok(())
}
