//! Admission webhooks for AzureCluster and AzureMachinePool.
//!
//! A request flows through:
//! - `request`/`snapshot`: decode old and new objects and diff them
//! - `dispatcher`: pick the chains registered for (kind, operation)
//! - `policies`: ordered validation rules, first denial wins
//! - `mutations`: ordered defaulting rules producing a JSON patch

pub mod dispatcher;
pub mod mutations;
pub mod policies;
pub mod request;
mod server;
pub mod snapshot;

pub use dispatcher::{AdmissionDispatcher, mutation_chain, validation_chain};
pub use policies::{Decision, Denial, DenyReason, ValidationContext, ValidationRule};
pub use request::{AdmissionInput, Operation, ResourceKind};
pub use server::{
    AdmissionMode, WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WebhookError, WebhookState,
    create_webhook_router, handle_review, run_webhook_server,
};
pub use snapshot::{Diff, Field, FieldChange, FieldValue, ResourceSnapshot};

// Re-export kube-rs admission types for contract testing
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
