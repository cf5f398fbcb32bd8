//! AzureCluster Custom Resource Definition.
//!
//! Mirrors the subset of the Cluster API Azure provider's `AzureCluster`
//! schema that admission policies read. Unknown fields are ignored on decode.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::null_as_default;

/// AzureCluster describes the Azure infrastructure backing a workload cluster.
///
/// Example:
/// ```yaml
/// apiVersion: infrastructure.cluster.x-k8s.io/v1alpha3
/// kind: AzureCluster
/// metadata:
///   name: ab123
///   labels:
///     release.giantswarm.io/version: "13.1.0"
/// spec:
///   location: westeurope
///   resourceGroup: ab123
///   controlPlaneEndpoint:
///     host: api.ab123.k8s.test.westeurope.azure.gigantic.io
///     port: 443
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1alpha3",
    kind = "AzureCluster",
    plural = "azureclusters",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AzureClusterSpec {
    /// Azure region the cluster lives in.
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: String,

    /// Resource group holding the cluster's Azure resources.
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub resource_group: String,

    /// Endpoint used to reach the control plane.
    #[serde(default, deserialize_with = "null_as_default")]
    pub control_plane_endpoint: ApiEndpoint,

    /// Extra tags applied to every Azure resource of the cluster.
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub additional_tags: BTreeMap<String, String>,
}

/// Host and port of the Kubernetes API server.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpoint {
    #[serde(default, deserialize_with = "null_as_default")]
    pub host: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub port: i32,
}
