//! Capability table providers.
//!
//! [`CapabilityProvider`] is the seam to the cloud: the cache asks it for one
//! instance type's table on a miss, and for the whole listing on refresh.
//! Tables use the shape of `az vm list-skus --output json`.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Resource type of VM sizes in a SKU listing; other SKUs (disks, ...) are ignored.
const VIRTUAL_MACHINES_RESOURCE_TYPE: &str = "virtualMachines";

/// Errors reported by a capability provider
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider has no such instance type
    #[error("instance type {0} not found")]
    NotFound(String),

    /// The provider could not be reached or answered with an error
    #[error("transient provider error: {0}")]
    Transient(String),

    /// The provider answered with a table that could not be decoded
    #[error("malformed capability listing: {0}")]
    Malformed(String),
}

/// One `{name, value}` capability entry as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RawCapability {
    pub name: String,
    pub value: String,
}

impl RawCapability {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// Capability table of one SKU.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceTypeCapabilities {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<RawCapability>,
}

impl InstanceTypeCapabilities {
    pub fn new(name: &str, capabilities: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            resource_type: Some(VIRTUAL_MACHINES_RESOURCE_TYPE.to_string()),
            capabilities: capabilities
                .iter()
                .map(|(name, value)| RawCapability::new(name, value))
                .collect(),
        }
    }

    fn is_vm_size(&self) -> bool {
        self.resource_type
            .as_deref()
            .is_none_or(|t| t == VIRTUAL_MACHINES_RESOURCE_TYPE)
    }
}

/// Source of provider-reported capability tables.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Capability table of a single instance type
    async fn capabilities(&self, instance_type: &str) -> Result<Vec<RawCapability>, ProviderError>;

    /// Every instance type the provider knows about
    async fn all_capabilities(&self) -> Result<Vec<InstanceTypeCapabilities>, ProviderError>;
}

/// In-memory SKU table, keyed case-insensitively by instance type.
#[derive(Debug, Clone, Default)]
pub struct SkuTable {
    skus: HashMap<String, InstanceTypeCapabilities>,
}

impl SkuTable {
    pub fn new(skus: impl IntoIterator<Item = InstanceTypeCapabilities>) -> Self {
        let skus = skus
            .into_iter()
            .filter(InstanceTypeCapabilities::is_vm_size)
            .map(|sku| (sku.name.to_ascii_lowercase(), sku))
            .collect();
        Self { skus }
    }

    /// Decode an `az vm list-skus` JSON document.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ProviderError> {
        let skus: Vec<InstanceTypeCapabilities> =
            serde_json::from_slice(bytes).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        Ok(Self::new(skus))
    }

    pub fn len(&self) -> usize {
        self.skus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skus.is_empty()
    }
}

#[async_trait]
impl CapabilityProvider for SkuTable {
    async fn capabilities(&self, instance_type: &str) -> Result<Vec<RawCapability>, ProviderError> {
        self.skus
            .get(&instance_type.to_ascii_lowercase())
            .map(|sku| sku.capabilities.clone())
            .ok_or_else(|| ProviderError::NotFound(instance_type.to_string()))
    }

    async fn all_capabilities(&self) -> Result<Vec<InstanceTypeCapabilities>, ProviderError> {
        Ok(self.skus.values().cloned().collect())
    }
}

/// SKU table read from a JSON file on every call.
///
/// The file is typically a mounted ConfigMap, so an updated listing becomes
/// visible to the next cache refresh without restarting the process.
#[derive(Debug, Clone)]
pub struct SkuFileProvider {
    path: PathBuf,
}

impl SkuFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<SkuTable, ProviderError> {
        debug!(path = %self.path.display(), "Reading SKU capability table");
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            ProviderError::Transient(format!("reading {}: {}", self.path.display(), e))
        })?;
        SkuTable::from_json(&bytes)
    }
}

#[async_trait]
impl CapabilityProvider for SkuFileProvider {
    async fn capabilities(&self, instance_type: &str) -> Result<Vec<RawCapability>, ProviderError> {
        self.load().await?.capabilities(instance_type).await
    }

    async fn all_capabilities(&self) -> Result<Vec<InstanceTypeCapabilities>, ProviderError> {
        self.load().await?.all_capabilities().await
    }
}
