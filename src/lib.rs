//! azure-admission-controller library crate
//!
//! Admission policies for Cluster API Azure resources: immutability and
//! capability checks on AzureCluster and AzureMachinePool updates, plus
//! defaulting and version labelling on create.

pub mod capabilities;
pub mod config;
pub mod crd;
pub mod error;
pub mod health;
pub mod release;
pub mod webhooks;

pub use capabilities::{CapabilityCache, CapabilityProvider, SkuFileProvider, SkuTable};
pub use config::AdmissionConfig;
pub use error::AdmissionError;
pub use health::HealthState;
pub use release::{KubeReleaseResolver, ReleaseVersionResolver, StaticReleases};
pub use webhooks::{
    AdmissionDispatcher, WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WebhookError, WebhookState,
    run_webhook_server,
};
