//! Release version resolution.
//!
//! Mutators stamp objects with the version of the component that reconciles
//! them. The version comes from the cluster-scoped `Release` resource named by
//! the object's release label.

use std::collections::HashMap;

use async_trait::async_trait;
use kube::{Api, Client};
use thiserror::Error;
use tracing::debug;

use crate::crd::{Release, release_resource_name};

/// Errors raised while resolving a component version
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// No Release resource with this name
    #[error("release {0} not found")]
    ReleaseNotFound(String),

    /// The release exists but does not ship the component
    #[error("release {release} has no component {component}")]
    ComponentNotFound { release: String, component: String },

    /// The lookup did not finish before the request deadline
    #[error("lookup of release {0} exceeded the request deadline")]
    Timeout(String),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

/// Resolves the version of a component shipped in a release.
#[async_trait]
pub trait ReleaseVersionResolver: Send + Sync {
    /// `release` is the raw label value; a missing `v` prefix is tolerated.
    async fn component_version(&self, release: &str, component: &str)
    -> Result<String, ReleaseError>;
}

/// Reads `Release` resources from the API server.
#[derive(Clone)]
pub struct KubeReleaseResolver {
    api: Api<Release>,
}

impl KubeReleaseResolver {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl ReleaseVersionResolver for KubeReleaseResolver {
    async fn component_version(
        &self,
        release: &str,
        component: &str,
    ) -> Result<String, ReleaseError> {
        let name = release_resource_name(release);
        debug!(release = %name, component = %component, "Looking up release component");

        let found = match self.api.get(&name).await {
            Ok(found) => found,
            Err(kube::Error::Api(e)) if e.code == 404 => {
                return Err(ReleaseError::ReleaseNotFound(name));
            }
            Err(e) => return Err(e.into()),
        };

        found
            .spec
            .component_version(component)
            .map(str::to_string)
            .ok_or(ReleaseError::ComponentNotFound {
                release: name,
                component: component.to_string(),
            })
    }
}

/// In-memory release catalog, keyed by resource name (`v13.1.0`).
#[derive(Debug, Clone, Default)]
pub struct StaticReleases {
    releases: HashMap<String, HashMap<String, String>>,
}

impl StaticReleases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one component version of a release.
    pub fn with_component(mut self, release: &str, component: &str, version: &str) -> Self {
        self.releases
            .entry(release_resource_name(release))
            .or_default()
            .insert(component.to_string(), version.to_string());
        self
    }
}

#[async_trait]
impl ReleaseVersionResolver for StaticReleases {
    async fn component_version(
        &self,
        release: &str,
        component: &str,
    ) -> Result<String, ReleaseError> {
        let name = release_resource_name(release);
        let components = self
            .releases
            .get(&name)
            .ok_or_else(|| ReleaseError::ReleaseNotFound(name.clone()))?;
        components
            .get(component)
            .cloned()
            .ok_or(ReleaseError::ComponentNotFound {
                release: name,
                component: component.to_string(),
            })
    }
}
