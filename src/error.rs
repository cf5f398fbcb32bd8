//! Error types for the admission pipeline.
//!
//! Domain violations are not errors: validators return a denial
//! [`Decision`](crate::webhooks::policies::Decision). The variants here cover
//! conditions the pipeline cannot evaluate at all. The transport turns each of
//! them into a fail-closed denial tagged with [`AdmissionError::reason`].

use thiserror::Error;

use crate::capabilities::CapabilityError;
use crate::release::ReleaseError;
use crate::webhooks::request::ResourceKind;

/// Error type for admission evaluation
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// Object payload does not match the kind's schema
    #[error("failed to decode {kind}: {source}")]
    Decode {
        kind: ResourceKind,
        #[source]
        source: serde_json::Error,
    },

    /// UPDATE request without the stored object
    #[error("UPDATE request for {kind} carries no old object")]
    MissingOldObject { kind: ResourceKind },

    /// Old and new object are not the same resource
    #[error("old object {old} and new object {new} are different resources")]
    IdentityMismatch { old: String, new: String },

    /// No chain is registered for this kind
    #[error("kind {0} has no registered admission chain")]
    UnsupportedKind(String),

    /// Capability lookup failed
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// Release version lookup failed
    #[error(transparent)]
    Release(#[from] ReleaseError),

    /// A mutator produced a patch that does not apply to the object
    #[error("generated patch does not apply: {0}")]
    Patch(#[from] json_patch::PatchError),
}

impl AdmissionError {
    /// Stable reason code surfaced in the denial message
    pub fn reason(&self) -> &'static str {
        match self {
            AdmissionError::Decode { .. }
            | AdmissionError::MissingOldObject { .. }
            | AdmissionError::IdentityMismatch { .. } => "DecodeError",
            AdmissionError::UnsupportedKind(_) => "UnsupportedKind",
            AdmissionError::Capability(CapabilityError::ProviderLookup { .. }) => {
                "ProviderLookupError"
            }
            AdmissionError::Capability(CapabilityError::ProviderTimeout { .. }) => {
                "ProviderTimeout"
            }
            AdmissionError::Capability(CapabilityError::Parse { .. }) => "ParseError",
            AdmissionError::Release(_) => "ReleaseLookupError",
            AdmissionError::Patch(_) => "PatchError",
        }
    }

    /// Upstream failures, as opposed to a request that can never be admitted
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            AdmissionError::Capability(_) | AdmissionError::Release(_)
        )
    }
}

/// Result type alias for admission operations
pub type Result<T> = std::result::Result<T, AdmissionError>;
