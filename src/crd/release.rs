//! Release Custom Resource Definition.
//!
//! A cluster-scoped catalog entry naming the component versions that make up
//! one platform release. Admission only reads `spec.components`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Label carrying the platform release an object belongs to.
pub const RELEASE_VERSION_LABEL: &str = "release.giantswarm.io/version";

/// Label carrying the azure-operator version that reconciles an object.
pub const AZURE_OPERATOR_VERSION_LABEL: &str = "azure-operator.giantswarm.io/version";

/// Component name of azure-operator inside a release.
pub const AZURE_OPERATOR_COMPONENT: &str = "azure-operator";

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "release.giantswarm.io",
    version = "v1alpha1",
    kind = "Release",
    plural = "releases"
)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSpec {
    #[serde(default)]
    pub components: Vec<ReleaseComponent>,
}

/// One versioned component of a release.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ReleaseComponent {
    pub name: String,
    pub version: String,
}

impl ReleaseSpec {
    /// Version of the named component, if the release ships it.
    pub fn component_version(&self, component: &str) -> Option<&str> {
        self.components
            .iter()
            .find(|c| c.name == component)
            .map(|c| c.version.as_str())
    }
}

/// Release resources are named `v<semver>`; labels sometimes omit the `v`.
pub fn release_resource_name(label_value: &str) -> String {
    if label_value.starts_with('v') {
        label_value.to_string()
    } else {
        format!("v{}", label_value)
    }
}
