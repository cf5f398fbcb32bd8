//! Immutability validation policy.
//!
//! UPDATE only: fields fixed at creation cannot change. Setting a field that
//! was unset, or clearing one that was set, is a change.

use super::{Decision, DenyReason, ValidationContext};
use crate::webhooks::snapshot::{Field, FieldChange, describe};

/// Reason code reported when `field` changes
pub fn reason_for(field: Field) -> DenyReason {
    match field {
        Field::ControlPlaneHost | Field::ControlPlanePort => {
            DenyReason::ControlPlaneEndpointWasChanged
        }
        Field::Location => DenyReason::LocationWasChanged,
        Field::StorageAccountType => DenyReason::StorageAccountWasChanged,
        Field::DataDisks => DenyReason::DatadisksFieldIsSet,
        Field::AcceleratedNetworking => DenyReason::AcceleratedNetworkingChanged,
        Field::VmSize | Field::Labels => DenyReason::ImmutableFieldChanged,
    }
}

/// Deny if `field` differs between the old and new object
pub fn validate_field(ctx: &ValidationContext<'_>, field: Field) -> Decision {
    if ctx.diff.is_create() {
        return Decision::Allow;
    }

    match ctx.diff.change(field) {
        FieldChange::Unchanged | FieldChange::NotPresentInEither => Decision::Allow,
        FieldChange::Changed { old, new } => Decision::deny(
            "ImmutableField",
            reason_for(field),
            format!(
                "{} is immutable: changing it from {} to {} is not allowed",
                field.path(),
                describe(old),
                describe(new)
            ),
        ),
    }
}
