//! Validation policies for AzureCluster and AzureMachinePool admission.
//!
//! Each rule is a pure predicate over the old/new diff and the capability
//! records resolved for the request. Rules run in a fixed order per
//! (kind, operation) and the first denial wins:
//! - Immutability: fields that cannot change after creation
//! - Accelerated networking: the flag is fixed, and a VM size change must keep it supported
//! - Storage: a VM size change must keep premium storage supported

pub mod accelerated_networking;
pub mod immutability;
pub mod storage;

use std::fmt;

use tracing::debug;

use crate::capabilities::ResolvedCapabilities;
use crate::webhooks::snapshot::{Diff, Field};

/// Stable reason codes of policy denials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    ControlPlaneEndpointWasChanged,
    LocationWasChanged,
    StorageAccountWasChanged,
    DatadisksFieldIsSet,
    /// Immutable field without a dedicated code
    ImmutableFieldChanged,
    AcceleratedNetworkingChanged,
    VmSizeCapabilityMismatch,
    StorageCapabilityLost,
    AcceleratedNetworkingNotSupported,
    PremiumStorageNotSupported,
}

impl DenyReason {
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::ControlPlaneEndpointWasChanged => "ControlPlaneEndpointWasChanged",
            DenyReason::LocationWasChanged => "LocationWasChanged",
            DenyReason::StorageAccountWasChanged => "StorageAccountWasChanged",
            DenyReason::DatadisksFieldIsSet => "DatadisksFieldIsSet",
            DenyReason::ImmutableFieldChanged => "ImmutableFieldChanged",
            DenyReason::AcceleratedNetworkingChanged => "AcceleratedNetworkingChanged",
            DenyReason::VmSizeCapabilityMismatch => "VmSizeCapabilityMismatch",
            DenyReason::StorageCapabilityLost => "StorageCapabilityLost",
            DenyReason::AcceleratedNetworkingNotSupported => "AcceleratedNetworkingNotSupported",
            DenyReason::PremiumStorageNotSupported => "PremiumStorageNotSupported",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Why a request was denied, and by which rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub rule: &'static str,
    pub reason: DenyReason,
    pub message: String,
}

/// Outcome of a validation rule or chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(Denial),
}

impl Decision {
    pub fn deny(rule: &'static str, reason: DenyReason, message: impl Into<String>) -> Self {
        Decision::Deny(Denial {
            rule,
            reason,
            message: message.into(),
        })
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Decision::Allow => None,
            Decision::Deny(denial) => Some(denial),
        }
    }
}

/// Context for validation
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    /// Old/new pairing; `old` is absent on CREATE
    pub diff: Diff<'a>,
    /// Capability records fetched for this request
    pub capabilities: &'a ResolvedCapabilities,
}

/// Registered validation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationRule {
    ImmutableField(Field),
    AcceleratedNetworkingUnchanged,
    VmSizeSupportsAcceleratedNetworking,
    VmSizeKeepsPremiumStorage,
    AcceleratedNetworkingSupported,
    PremiumStorageSupported,
}

impl ValidationRule {
    pub fn name(&self) -> &'static str {
        match self {
            ValidationRule::ImmutableField(_) => "ImmutableField",
            ValidationRule::AcceleratedNetworkingUnchanged => "AcceleratedNetworkingUnchanged",
            ValidationRule::VmSizeSupportsAcceleratedNetworking => {
                "VmSizeSupportsAcceleratedNetworking"
            }
            ValidationRule::VmSizeKeepsPremiumStorage => "VmSizeKeepsPremiumStorage",
            ValidationRule::AcceleratedNetworkingSupported => "AcceleratedNetworkingSupported",
            ValidationRule::PremiumStorageSupported => "PremiumStorageSupported",
        }
    }

    /// Instance types whose capability records the rule reads for this diff.
    pub fn instance_types(&self, diff: &Diff<'_>) -> Vec<String> {
        match self {
            ValidationRule::ImmutableField(_) | ValidationRule::AcceleratedNetworkingUnchanged => {
                Vec::new()
            }
            ValidationRule::VmSizeSupportsAcceleratedNetworking => {
                accelerated_networking::vm_size_change_lookups(diff)
            }
            ValidationRule::VmSizeKeepsPremiumStorage => storage::vm_size_change_lookups(diff),
            ValidationRule::AcceleratedNetworkingSupported => {
                accelerated_networking::create_lookups(diff)
            }
            ValidationRule::PremiumStorageSupported => storage::create_lookups(diff),
        }
    }

    pub fn evaluate(&self, ctx: &ValidationContext<'_>) -> Decision {
        match self {
            ValidationRule::ImmutableField(field) => immutability::validate_field(ctx, *field),
            ValidationRule::AcceleratedNetworkingUnchanged => {
                accelerated_networking::validate_unchanged(ctx)
            }
            ValidationRule::VmSizeSupportsAcceleratedNetworking => {
                accelerated_networking::validate_vm_size_change(ctx)
            }
            ValidationRule::VmSizeKeepsPremiumStorage => storage::validate_vm_size_change(ctx),
            ValidationRule::AcceleratedNetworkingSupported => {
                accelerated_networking::validate_create(ctx)
            }
            ValidationRule::PremiumStorageSupported => storage::validate_create(ctx),
        }
    }
}

/// Run `rules` in order, stopping at the first denial.
pub fn run_chain(rules: &[ValidationRule], ctx: &ValidationContext<'_>) -> Decision {
    for rule in rules {
        let decision = rule.evaluate(ctx);
        if let Decision::Deny(denial) = &decision {
            debug!(rule = rule.name(), reason = %denial.reason, "Validation rule denied");
            return decision;
        }
    }
    Decision::Allow
}

/// Capability of `instance_type` from the resolved view.
///
/// A record missing from the view reads as `None`; callers decide which way
/// that fails.
pub(crate) fn capability(
    ctx: &ValidationContext<'_>,
    instance_type: &str,
    capability: &str,
) -> Option<bool> {
    ctx.capabilities.supports(instance_type, capability)
}
