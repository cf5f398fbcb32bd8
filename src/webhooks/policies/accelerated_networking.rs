//! Accelerated networking policies for machine pools.
//!
//! The flag is fixed once the scale set exists: the NICs are created with or
//! without it. A VM size change is allowed only if the new size supports the
//! flag the pool already runs with.

use super::{Decision, DenyReason, ValidationContext, capability};
use crate::capabilities::ACCELERATED_NETWORKING;
use crate::webhooks::snapshot::{Diff, Field, FieldChange, describe};

fn enabled_vm_size<'a>(diff: &Diff<'a>) -> Option<&'a str> {
    let new = diff.new_snapshot();
    match new.flag(Field::AcceleratedNetworking) {
        Some(true) => new.text(Field::VmSize),
        _ => None,
    }
}

pub(super) fn vm_size_change_lookups(diff: &Diff<'_>) -> Vec<String> {
    if diff.is_create() || !diff.is_changed(Field::VmSize) {
        return Vec::new();
    }
    enabled_vm_size(diff).map(str::to_string).into_iter().collect()
}

pub(super) fn create_lookups(diff: &Diff<'_>) -> Vec<String> {
    if !diff.is_create() {
        return Vec::new();
    }
    enabled_vm_size(diff).map(str::to_string).into_iter().collect()
}

/// Deny any change of the flag, including to or from unset
pub fn validate_unchanged(ctx: &ValidationContext<'_>) -> Decision {
    if ctx.diff.is_create() {
        return Decision::Allow;
    }

    match ctx.diff.change(Field::AcceleratedNetworking) {
        FieldChange::Changed { old, new } => Decision::deny(
            "AcceleratedNetworkingUnchanged",
            DenyReason::AcceleratedNetworkingChanged,
            format!(
                "{} cannot be changed after creation (from {} to {})",
                Field::AcceleratedNetworking.path(),
                describe(old),
                describe(new)
            ),
        ),
        _ => Decision::Allow,
    }
}

/// Deny a VM size change to a size without accelerated networking while it is enabled
pub fn validate_vm_size_change(ctx: &ValidationContext<'_>) -> Decision {
    if ctx.diff.is_create() || !ctx.diff.is_changed(Field::VmSize) {
        return Decision::Allow;
    }
    let Some(vm_size) = enabled_vm_size(&ctx.diff) else {
        return Decision::Allow;
    };

    // Unresolved records fail closed
    if capability(ctx, vm_size, ACCELERATED_NETWORKING) == Some(true) {
        return Decision::Allow;
    }

    let old_vm_size = ctx
        .diff
        .old()
        .and_then(|old| old.text(Field::VmSize))
        .unwrap_or("<unset>");
    Decision::deny(
        "VmSizeSupportsAcceleratedNetworking",
        DenyReason::VmSizeCapabilityMismatch,
        format!(
            "{} cannot change from {} to {}: {} does not support accelerated networking, \
             which is enabled for this pool",
            Field::VmSize.path(),
            old_vm_size,
            vm_size,
            vm_size
        ),
    )
}

/// On create, deny enabling accelerated networking on a VM size without support
pub fn validate_create(ctx: &ValidationContext<'_>) -> Decision {
    if !ctx.diff.is_create() {
        return Decision::Allow;
    }
    let Some(vm_size) = enabled_vm_size(&ctx.diff) else {
        return Decision::Allow;
    };

    if capability(ctx, vm_size, ACCELERATED_NETWORKING) == Some(true) {
        return Decision::Allow;
    }
    Decision::deny(
        "AcceleratedNetworkingSupported",
        DenyReason::AcceleratedNetworkingNotSupported,
        format!(
            "{} is enabled but VM size {} does not support accelerated networking",
            Field::AcceleratedNetworking.path(),
            vm_size
        ),
    )
}
