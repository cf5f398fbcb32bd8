//! Defaults for machine pools created without storage or data disk settings.

use json_patch::PatchOperation;
use serde_json::Value;

use super::{MutationContext, add_nested};
use crate::capabilities::PREMIUM_IO;
use crate::crd::{DataDisk, STORAGE_PREMIUM_LRS, STORAGE_STANDARD_LRS};
use crate::webhooks::snapshot::{Field, ResourceSnapshot};

/// Size of each default data disk
pub const DEFAULT_DATA_DISK_SIZE_GB: i32 = 100;
/// LUN of the container runtime disk
pub const DOCKER_DISK_LUN: i32 = 21;
/// LUN of the kubelet disk
pub const KUBELET_DISK_LUN: i32 = 22;

pub fn default_data_disks() -> Vec<DataDisk> {
    vec![
        DataDisk::new("docker", DEFAULT_DATA_DISK_SIZE_GB, DOCKER_DISK_LUN),
        DataDisk::new("kubelet", DEFAULT_DATA_DISK_SIZE_GB, KUBELET_DISK_LUN),
    ]
}

pub(super) fn storage_lookups(snapshot: &ResourceSnapshot) -> Vec<String> {
    if snapshot.contains(Field::StorageAccountType) {
        return Vec::new();
    }
    snapshot
        .text(Field::VmSize)
        .map(str::to_string)
        .into_iter()
        .collect()
}

/// Premium storage where the VM size supports it, standard otherwise.
pub fn storage_account_type(ctx: &MutationContext<'_>) -> Vec<PatchOperation> {
    if ctx.snapshot.contains(Field::StorageAccountType) {
        return Vec::new();
    }
    let Some(vm_size) = ctx.snapshot.text(Field::VmSize) else {
        return Vec::new();
    };

    // Unresolved sizes get standard storage, which every size accepts
    let storage = match ctx.capabilities.supports(vm_size, PREMIUM_IO) {
        Some(true) => STORAGE_PREMIUM_LRS,
        _ => STORAGE_STANDARD_LRS,
    };
    vec![add_nested(
        ctx.document,
        &["spec", "template", "osDisk", "managedDisk", "storageAccountType"],
        Value::String(storage.to_string()),
    )]
}

/// Docker and kubelet disks when the pool declares none.
pub fn data_disks(ctx: &MutationContext<'_>) -> Vec<PatchOperation> {
    if ctx.snapshot.contains(Field::DataDisks) {
        return Vec::new();
    }
    vec![add_nested(
        ctx.document,
        &["spec", "template", "dataDisks"],
        serde_json::to_value(default_data_disks()).unwrap_or_default(),
    )]
}
