//! Premium storage policies for machine pools.
//!
//! `Premium_*` storage account types need a VM size reporting `PremiumIO`.

use super::{Decision, DenyReason, ValidationContext, capability};
use crate::capabilities::PREMIUM_IO;
use crate::crd::is_premium_storage;
use crate::webhooks::snapshot::{Diff, Field};

fn premium_storage(diff: &Diff<'_>) -> Option<String> {
    diff.new_snapshot()
        .text(Field::StorageAccountType)
        .filter(|s| is_premium_storage(s))
        .map(str::to_string)
}

pub(super) fn vm_size_change_lookups(diff: &Diff<'_>) -> Vec<String> {
    if diff.is_create() || !diff.is_changed(Field::VmSize) || premium_storage(diff).is_none() {
        return Vec::new();
    }
    let old = diff.old().and_then(|s| s.text(Field::VmSize));
    let new = diff.new_snapshot().text(Field::VmSize);
    old.into_iter().chain(new).map(str::to_string).collect()
}

pub(super) fn create_lookups(diff: &Diff<'_>) -> Vec<String> {
    if !diff.is_create() || premium_storage(diff).is_none() {
        return Vec::new();
    }
    diff.new_snapshot()
        .text(Field::VmSize)
        .map(str::to_string)
        .into_iter()
        .collect()
}

/// Deny a VM size change that loses premium IO while premium storage is in use
pub fn validate_vm_size_change(ctx: &ValidationContext<'_>) -> Decision {
    if ctx.diff.is_create() || !ctx.diff.is_changed(Field::VmSize) {
        return Decision::Allow;
    }
    let Some(storage) = premium_storage(&ctx.diff) else {
        return Decision::Allow;
    };
    let Some(new_vm_size) = ctx.diff.new_snapshot().text(Field::VmSize) else {
        return Decision::Allow;
    };
    let old_vm_size = ctx.diff.old().and_then(|s| s.text(Field::VmSize));

    // An unresolved old record counts as premium, an unresolved new one as not
    let old_premium = old_vm_size
        .is_none_or(|vm| capability(ctx, vm, PREMIUM_IO).unwrap_or(true));
    let new_premium = capability(ctx, new_vm_size, PREMIUM_IO).unwrap_or(false);

    if !old_premium || new_premium {
        return Decision::Allow;
    }
    Decision::deny(
        "VmSizeKeepsPremiumStorage",
        DenyReason::StorageCapabilityLost,
        format!(
            "{} cannot change from {} to {}: {} does not support premium storage, \
             which is required by storage account type {}",
            Field::VmSize.path(),
            old_vm_size.unwrap_or("<unset>"),
            new_vm_size,
            new_vm_size,
            storage
        ),
    )
}

/// On create, deny premium storage on a VM size without premium IO
pub fn validate_create(ctx: &ValidationContext<'_>) -> Decision {
    if !ctx.diff.is_create() {
        return Decision::Allow;
    }
    let Some(storage) = premium_storage(&ctx.diff) else {
        return Decision::Allow;
    };
    let Some(vm_size) = ctx.diff.new_snapshot().text(Field::VmSize) else {
        return Decision::Allow;
    };

    if capability(ctx, vm_size, PREMIUM_IO) == Some(true) {
        return Decision::Allow;
    }
    Decision::deny(
        "PremiumStorageSupported",
        DenyReason::PremiumStorageNotSupported,
        format!(
            "{} {} requires premium IO, which VM size {} does not support",
            Field::StorageAccountType.path(),
            storage,
            vm_size
        ),
    )
}
