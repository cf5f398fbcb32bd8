//! Custom Resource Definitions (CRDs) admitted by the webhooks.
//!
//! - `AzureCluster`: Cluster API Azure cluster infrastructure
//! - `AzureMachinePool`: Cluster API Azure node pool (experimental API group)
//! - `Release`: release catalog entry used to resolve component versions

mod azure_cluster;
mod azure_machine_pool;
mod release;

pub use azure_cluster::*;
pub use azure_machine_pool::*;
pub use release::*;

use serde::{Deserialize, Deserializer};

/// Deserialize an explicit `null` the same way as an absent field.
///
/// Pair with `#[serde(default)]`, which covers the absent case.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
