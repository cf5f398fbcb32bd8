//! Instance type capability lookups.
//!
//! The provider reports, per VM size, a flat table of `{name, value}` pairs
//! (`AcceleratedNetworkingEnabled=True`, `vCPUs=4`, ...). This module parses
//! those tables into immutable [`CapabilityRecord`]s and memoizes them in a
//! process-wide [`CapabilityCache`].

mod cache;
pub mod provider;

pub use cache::{CacheStats, CapabilityCache, ResolvedCapabilities};
pub use provider::{
    CapabilityProvider, InstanceTypeCapabilities, ProviderError, RawCapability, SkuFileProvider,
    SkuTable,
};

use std::collections::BTreeMap;

use thiserror::Error;

/// Whether the VM size supports accelerated networking.
pub const ACCELERATED_NETWORKING: &str = "AcceleratedNetworkingEnabled";
/// Whether the VM size can attach premium SSD storage.
pub const PREMIUM_IO: &str = "PremiumIO";
/// Number of virtual CPUs.
pub const VCPUS: &str = "vCPUs";
/// Memory in GiB.
pub const MEMORY_GB: &str = "MemoryGB";

/// Errors raised while obtaining capability records.
#[derive(Error, Debug)]
pub enum CapabilityError {
    /// The provider does not know the instance type, or failed to answer
    #[error("capability lookup for instance type {instance_type} failed: {message}")]
    ProviderLookup {
        instance_type: String,
        message: String,
    },

    /// The request deadline passed before the provider answered
    #[error("timed out fetching capabilities for instance type {instance_type}")]
    ProviderTimeout { instance_type: String },

    /// The provider's capability table could not be parsed
    #[error("malformed capability table for instance type {instance_type}: {message}")]
    Parse {
        instance_type: String,
        message: String,
    },
}

impl CapabilityError {
    pub(crate) fn from_provider(instance_type: &str, err: ProviderError) -> Self {
        match err {
            ProviderError::Malformed(message) => CapabilityError::Parse {
                instance_type: instance_type.to_string(),
                message,
            },
            other => CapabilityError::ProviderLookup {
                instance_type: instance_type.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Typed capability value.
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityValue {
    Bool(bool),
    Number(f64),
    /// Values that are neither boolean nor numeric, e.g. `HyperVGenerations=V1,V2`
    Text(String),
}

impl CapabilityValue {
    fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("true") {
            CapabilityValue::Bool(true)
        } else if raw.eq_ignore_ascii_case("false") {
            CapabilityValue::Bool(false)
        } else if let Ok(n) = raw.parse::<f64>() {
            CapabilityValue::Number(n)
        } else {
            CapabilityValue::Text(raw.to_string())
        }
    }

    /// `true` for boolean true or any non-zero number.
    pub fn is_enabled(&self) -> bool {
        match self {
            CapabilityValue::Bool(b) => *b,
            CapabilityValue::Number(n) => *n != 0.0,
            CapabilityValue::Text(_) => false,
        }
    }
}

/// Capability names compare case-insensitively.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Static capability set of one instance type.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityRecord {
    instance_type: String,
    values: BTreeMap<String, CapabilityValue>,
}

impl CapabilityRecord {
    /// Parse a provider capability table.
    ///
    /// Missing capabilities are fine (they read as unsupported). Empty names or
    /// values, and a name reported twice with different values, are rejected.
    pub fn parse(instance_type: &str, raw: &[RawCapability]) -> Result<Self, CapabilityError> {
        let malformed = |message: String| CapabilityError::Parse {
            instance_type: instance_type.to_string(),
            message,
        };

        let mut values = BTreeMap::new();
        for capability in raw {
            let name = normalize_name(&capability.name);
            if name.is_empty() {
                return Err(malformed("capability with empty name".to_string()));
            }
            if capability.value.trim().is_empty() {
                return Err(malformed(format!("capability {} has no value", capability.name)));
            }
            let value = CapabilityValue::parse(&capability.value);
            if let Some(existing) = values.get(&name)
                && *existing != value
            {
                return Err(malformed(format!(
                    "capability {} reported with conflicting values",
                    capability.name
                )));
            }
            values.insert(name, value);
        }

        Ok(Self {
            instance_type: instance_type.to_string(),
            values,
        })
    }

    pub fn instance_type(&self) -> &str {
        &self.instance_type
    }

    pub fn get(&self, capability: &str) -> Option<&CapabilityValue> {
        self.values.get(&normalize_name(capability))
    }

    /// Absent capabilities are unsupported.
    pub fn supports(&self, capability: &str) -> bool {
        self.get(capability).is_some_and(CapabilityValue::is_enabled)
    }

    pub fn number(&self, capability: &str) -> Option<f64> {
        match self.get(capability)? {
            CapabilityValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
