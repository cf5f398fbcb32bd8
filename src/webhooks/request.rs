//! Structured admission input handed from the transport to the dispatcher.

use std::fmt;

use tokio::time::Instant;

use crate::error::AdmissionError;
use crate::webhooks::snapshot::ResourceSnapshot;

/// Resource kinds with registered admission chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    AzureCluster,
    AzureMachinePool,
}

impl ResourceKind {
    /// Resolve the `kind` of an admission request.
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "AzureCluster" => Some(ResourceKind::AzureCluster),
            "AzureMachinePool" => Some(ResourceKind::AzureMachinePool),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::AzureCluster => "AzureCluster",
            ResourceKind::AzureMachinePool => "AzureMachinePool",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations the policy chains evaluate. Delete and Connect are admitted
/// by the transport without reaching the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
}

impl Operation {
    /// Map a kube admission operation; `None` for operations that bypass the chains.
    pub fn from_admission(operation: &kube::core::admission::Operation) -> Option<Self> {
        use kube::core::admission::Operation as AdmissionOperation;
        match operation {
            AdmissionOperation::Create => Some(Operation::Create),
            AdmissionOperation::Update => Some(Operation::Update),
            AdmissionOperation::Delete | AdmissionOperation::Connect => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "CREATE",
            Operation::Update => "UPDATE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One admission request, reduced to what the policy pipeline needs.
#[derive(Debug, Clone)]
pub struct AdmissionInput {
    pub kind: ResourceKind,
    pub operation: Operation,
    /// Serialized object being admitted
    pub new_payload: Vec<u8>,
    /// Serialized object currently stored (UPDATE only)
    pub old_payload: Option<Vec<u8>>,
    /// Provider lookups made on behalf of this request give up at this instant
    pub deadline: Instant,
}

impl AdmissionInput {
    pub fn create(kind: ResourceKind, new_payload: Vec<u8>, deadline: Instant) -> Self {
        Self {
            kind,
            operation: Operation::Create,
            new_payload,
            old_payload: None,
            deadline,
        }
    }

    pub fn update(
        kind: ResourceKind,
        new_payload: Vec<u8>,
        old_payload: Vec<u8>,
        deadline: Instant,
    ) -> Self {
        Self {
            kind,
            operation: Operation::Update,
            new_payload,
            old_payload: Some(old_payload),
            deadline,
        }
    }

    /// Decode the new object.
    pub fn decode_new(&self) -> Result<ResourceSnapshot, AdmissionError> {
        ResourceSnapshot::decode(self.kind, &self.new_payload)
    }

    /// Decode the old object; required for UPDATE, ignored for CREATE.
    pub fn decode_old(&self) -> Result<Option<ResourceSnapshot>, AdmissionError> {
        match (self.operation, &self.old_payload) {
            (Operation::Create, _) => Ok(None),
            (Operation::Update, Some(raw)) => ResourceSnapshot::decode(self.kind, raw).map(Some),
            (Operation::Update, None) => Err(AdmissionError::MissingOldObject { kind: self.kind }),
        }
    }
}
