//! AzureMachinePool Custom Resource Definition.
//!
//! A node pool backed by an Azure virtual machine scale set. Only the fields
//! the admission policies inspect or default are modelled.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::null_as_default;

/// Storage account type prefix shared by all premium SSD tiers.
pub const PREMIUM_STORAGE_PREFIX: &str = "Premium_";
/// Locally redundant premium SSD storage.
pub const STORAGE_PREMIUM_LRS: &str = "Premium_LRS";
/// Locally redundant standard HDD storage.
pub const STORAGE_STANDARD_LRS: &str = "Standard_LRS";

/// AzureMachinePool is a pool of identically configured Azure VMs.
///
/// Example:
/// ```yaml
/// apiVersion: exp.infrastructure.cluster.x-k8s.io/v1alpha3
/// kind: AzureMachinePool
/// metadata:
///   name: nodepool-0
/// spec:
///   location: westeurope
///   template:
///     vmSize: Standard_D4s_v3
///     acceleratedNetworking: true
///     osDisk:
///       osType: Linux
///       diskSizeGB: 50
///       managedDisk:
///         storageAccountType: Premium_LRS
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "exp.infrastructure.cluster.x-k8s.io",
    version = "v1alpha3",
    kind = "AzureMachinePool",
    plural = "azuremachinepools",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AzureMachinePoolSpec {
    /// Azure region of the scale set.
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: String,

    /// Template for the VMs of the pool.
    #[serde(default, deserialize_with = "null_as_default")]
    pub template: AzureMachineTemplate,

    /// Provider IDs of the pool's instances, maintained by the provider.
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub provider_id_list: Vec<String>,

    /// Extra tags applied to the scale set.
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub additional_tags: BTreeMap<String, String>,
}

/// VM template of a machine pool.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AzureMachineTemplate {
    /// Azure VM size (instance type), e.g. `Standard_D4s_v3`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub vm_size: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub os_disk: OsDisk,

    /// Extra disks attached to every VM. `None` and an empty list are equivalent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_disks: Option<Vec<DataDisk>>,

    /// Unset means "let the provider decide", which differs from `false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerated_networking: Option<bool>,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub ssh_public_key: String,
}

/// Operating system disk configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OsDisk {
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub os_type: String,

    #[serde(default, rename = "diskSizeGB", deserialize_with = "null_as_default")]
    pub disk_size_gb: i32,

    #[serde(default, deserialize_with = "null_as_default")]
    pub managed_disk: ManagedDisk,
}

/// Managed disk parameters of the OS disk.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedDisk {
    /// `Premium_LRS`, `Standard_LRS`, ...
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub storage_account_type: String,
}

/// A data disk attached to every VM of the pool.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DataDisk {
    pub name_suffix: String,

    #[serde(rename = "diskSizeGB")]
    pub disk_size_gb: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lun: Option<i32>,
}

impl DataDisk {
    pub fn new(name_suffix: &str, disk_size_gb: i32, lun: i32) -> Self {
        Self {
            name_suffix: name_suffix.to_string(),
            disk_size_gb,
            lun: Some(lun),
        }
    }
}

/// Whether a storage account type requires premium IO support from the VM size.
pub fn is_premium_storage(storage_account_type: &str) -> bool {
    storage_account_type.starts_with(PREMIUM_STORAGE_PREFIX)
}
