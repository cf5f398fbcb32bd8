//! Routes admission input to the chains registered for its kind and operation.
//!
//! The registry is static: rule order and content are fixed per
//! (kind, operation). The dispatcher resolves the capability records each
//! rule reads before running it, so the rules themselves stay pure.

use std::sync::Arc;

use json_patch::PatchOperation;
use tracing::debug;

use crate::capabilities::{CapabilityCache, ResolvedCapabilities};
use crate::error::AdmissionError;
use crate::release::ReleaseVersionResolver;
use crate::webhooks::mutations::{self, MutationRule};
use crate::webhooks::policies::{Decision, ValidationContext, ValidationRule};
use crate::webhooks::request::{AdmissionInput, Operation, ResourceKind};
use crate::webhooks::snapshot::{Diff, Field};

const CLUSTER_UPDATE_VALIDATION: &[ValidationRule] = &[
    ValidationRule::ImmutableField(Field::ControlPlaneHost),
    ValidationRule::ImmutableField(Field::ControlPlanePort),
    ValidationRule::ImmutableField(Field::Location),
];

const MACHINE_POOL_UPDATE_VALIDATION: &[ValidationRule] = &[
    ValidationRule::AcceleratedNetworkingUnchanged,
    ValidationRule::VmSizeSupportsAcceleratedNetworking,
    ValidationRule::VmSizeKeepsPremiumStorage,
    ValidationRule::ImmutableField(Field::StorageAccountType),
    ValidationRule::ImmutableField(Field::DataDisks),
    ValidationRule::ImmutableField(Field::Location),
];

const MACHINE_POOL_CREATE_VALIDATION: &[ValidationRule] = &[
    ValidationRule::AcceleratedNetworkingSupported,
    ValidationRule::PremiumStorageSupported,
];

const CLUSTER_MUTATION: &[MutationRule] = &[MutationRule::ComponentVersionLabel];

const MACHINE_POOL_CREATE_MUTATION: &[MutationRule] = &[
    MutationRule::DefaultStorageAccountType,
    MutationRule::DefaultDataDisks,
    MutationRule::ComponentVersionLabel,
];

const MACHINE_POOL_UPDATE_MUTATION: &[MutationRule] = &[MutationRule::ComponentVersionLabel];

/// Validation rules for (kind, operation), in evaluation order
pub fn validation_chain(kind: ResourceKind, operation: Operation) -> &'static [ValidationRule] {
    match (kind, operation) {
        (ResourceKind::AzureCluster, Operation::Create) => &[],
        (ResourceKind::AzureCluster, Operation::Update) => CLUSTER_UPDATE_VALIDATION,
        (ResourceKind::AzureMachinePool, Operation::Create) => MACHINE_POOL_CREATE_VALIDATION,
        (ResourceKind::AzureMachinePool, Operation::Update) => MACHINE_POOL_UPDATE_VALIDATION,
    }
}

/// Mutation rules for (kind, operation), in evaluation order
pub fn mutation_chain(kind: ResourceKind, operation: Operation) -> &'static [MutationRule] {
    match (kind, operation) {
        (ResourceKind::AzureCluster, _) => CLUSTER_MUTATION,
        (ResourceKind::AzureMachinePool, Operation::Create) => MACHINE_POOL_CREATE_MUTATION,
        (ResourceKind::AzureMachinePool, Operation::Update) => MACHINE_POOL_UPDATE_MUTATION,
    }
}

/// Runs the registered chains against decoded requests.
#[derive(Clone)]
pub struct AdmissionDispatcher {
    capabilities: Arc<CapabilityCache>,
    releases: Arc<dyn ReleaseVersionResolver>,
}

impl AdmissionDispatcher {
    pub fn new(
        capabilities: Arc<CapabilityCache>,
        releases: Arc<dyn ReleaseVersionResolver>,
    ) -> Self {
        Self {
            capabilities,
            releases,
        }
    }

    pub fn capabilities(&self) -> &Arc<CapabilityCache> {
        &self.capabilities
    }

    /// Run the validation chain for `input`.
    pub async fn validate(&self, input: &AdmissionInput) -> Result<Decision, AdmissionError> {
        let rules = validation_chain(input.kind, input.operation);
        let new = input.decode_new()?;
        let old = input.decode_old()?;
        let diff = Diff::new(old.as_ref(), &new)?;

        if let Some(old) = diff.old() {
            debug!(
                kind = %input.kind,
                object = %old.identity(),
                changed = ?diff.changed_fields(),
                "Validating update"
            );
        }

        // Records are fetched rule by rule, so a lookup failure never masks
        // a denial from an earlier rule.
        let mut capabilities = ResolvedCapabilities::default();
        for rule in rules {
            let instance_types = rule.instance_types(&diff);
            self.capabilities
                .resolve_into(
                    &mut capabilities,
                    instance_types.iter().map(String::as_str),
                    input.deadline,
                )
                .await?;

            let ctx = ValidationContext {
                diff,
                capabilities: &capabilities,
            };
            let decision = rule.evaluate(&ctx);
            if let Decision::Deny(denial) = &decision {
                debug!(rule = rule.name(), reason = %denial.reason, "Validation rule denied");
                return Ok(decision);
            }
        }
        Ok(Decision::Allow)
    }

    /// Run the mutation chain for `input`.
    pub async fn mutate(
        &self,
        input: &AdmissionInput,
    ) -> Result<Vec<PatchOperation>, AdmissionError> {
        let rules = mutation_chain(input.kind, input.operation);
        let new = input.decode_new()?;

        let instance_types: Vec<String> = rules
            .iter()
            .flat_map(|rule| rule.instance_types(&new))
            .collect();
        let capabilities = self.resolve(instance_types, input).await?;

        mutations::run_chain(
            rules,
            &new,
            &capabilities,
            self.releases.as_ref(),
            input.deadline,
        )
        .await
    }

    async fn resolve(
        &self,
        instance_types: Vec<String>,
        input: &AdmissionInput,
    ) -> Result<ResolvedCapabilities, AdmissionError> {
        if instance_types.is_empty() {
            return Ok(ResolvedCapabilities::default());
        }
        let resolved = self
            .capabilities
            .resolve(instance_types.iter().map(String::as_str), input.deadline)
            .await?;
        Ok(resolved)
    }
}
