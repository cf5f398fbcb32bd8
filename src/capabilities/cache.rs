//! Process-wide capability cache.
//!
//! Records are populated lazily, one provider fetch per instance type, and
//! never expire: a VM size's capabilities are static. `refresh` rebuilds the
//! whole mapping from the provider's listing and swaps it in atomically.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::sync::OnceCell;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use super::{CapabilityError, CapabilityProvider, CapabilityRecord};

/// Per-instance-type slot. The `OnceCell` makes concurrent misses share one fetch.
type Slot = Arc<OnceCell<Arc<CapabilityRecord>>>;

/// Instance type keys compare case-insensitively, like Azure VM sizes.
fn cache_key(instance_type: &str) -> String {
    instance_type.trim().to_ascii_lowercase()
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Instance types with a populated record
    pub entries: usize,
    /// Upstream fetches issued since startup (refreshes excluded)
    pub fetches: u64,
}

/// Memoizing capability lookup shared by every admission request.
pub struct CapabilityCache {
    provider: Arc<dyn CapabilityProvider>,
    entries: ArcSwap<DashMap<String, Slot>>,
    fetches: AtomicU64,
}

impl CapabilityCache {
    pub fn new(provider: Arc<dyn CapabilityProvider>) -> Self {
        Self {
            provider,
            entries: ArcSwap::from_pointee(DashMap::new()),
            fetches: AtomicU64::new(0),
        }
    }

    /// Capability record of an instance type, fetching it on first use.
    ///
    /// Concurrent callers missing the same instance type wait on a single
    /// upstream fetch. A failed fetch is not cached; the next caller retries.
    /// Waiting, cached or not, is bounded by `deadline`.
    pub async fn get(
        &self,
        instance_type: &str,
        deadline: Instant,
    ) -> Result<Arc<CapabilityRecord>, CapabilityError> {
        let key = cache_key(instance_type);
        let slot = self.slot(&key);
        if let Some(record) = slot.get() {
            return Ok(Arc::clone(record));
        }

        let populate = slot.get_or_try_init(|| self.fetch(instance_type));
        match timeout_at(deadline, populate).await {
            Ok(Ok(record)) => Ok(Arc::clone(record)),
            Ok(Err(e)) => {
                self.evict_empty(&key, &slot);
                Err(e)
            }
            Err(_) => {
                warn!(instance_type, "Capability fetch exceeded request deadline");
                Err(CapabilityError::ProviderTimeout {
                    instance_type: instance_type.to_string(),
                })
            }
        }
    }

    /// Whether `instance_type` supports `capability`.
    ///
    /// A capability missing from an otherwise valid record is `false`, not an error.
    pub async fn supports(
        &self,
        instance_type: &str,
        capability: &str,
        deadline: Instant,
    ) -> Result<bool, CapabilityError> {
        Ok(self.get(instance_type, deadline).await?.supports(capability))
    }

    /// Fetch every listed instance type into a request-local view.
    pub async fn resolve<'a, I>(
        &self,
        instance_types: I,
        deadline: Instant,
    ) -> Result<ResolvedCapabilities, CapabilityError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut resolved = ResolvedCapabilities::default();
        self.resolve_into(&mut resolved, instance_types, deadline).await?;
        Ok(resolved)
    }

    /// Add every listed instance type missing from `resolved`.
    pub async fn resolve_into<'a, I>(
        &self,
        resolved: &mut ResolvedCapabilities,
        instance_types: I,
        deadline: Instant,
    ) -> Result<(), CapabilityError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for instance_type in instance_types {
            if resolved.get(instance_type).is_some() {
                continue;
            }
            let record = self.get(instance_type, deadline).await?;
            resolved.insert(record);
        }
        Ok(())
    }

    /// Re-list the provider and atomically replace the whole mapping.
    ///
    /// On any failure the current mapping stays in place.
    pub async fn refresh(&self) -> Result<usize, CapabilityError> {
        let listing = self
            .provider
            .all_capabilities()
            .await
            .map_err(|e| CapabilityError::from_provider("*", e))?;

        let entries = DashMap::with_capacity(listing.len());
        for sku in &listing {
            let record = CapabilityRecord::parse(&sku.name, &sku.capabilities)?;
            let slot = OnceCell::new_with(Some(Arc::new(record)));
            entries.insert(cache_key(&sku.name), Arc::new(slot));
        }

        let count = entries.len();
        self.entries.store(Arc::new(entries));
        info!(instance_types = count, "Capability cache refreshed");
        Ok(count)
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.load();
        CacheStats {
            entries: entries.iter().filter(|e| e.value().initialized()).count(),
            fetches: self.fetches.load(Ordering::Relaxed),
        }
    }

    fn slot(&self, key: &str) -> Slot {
        let entries = self.entries.load();
        if let Some(slot) = entries.get(key) {
            return Arc::clone(slot.value());
        }
        Arc::clone(entries.entry(key.to_string()).or_default().value())
    }

    /// Drop `slot` if it is still the empty slot stored under `key`.
    fn evict_empty(&self, key: &str, slot: &Slot) {
        self.entries
            .load()
            .remove_if(key, |_, current| Arc::ptr_eq(current, slot) && !current.initialized());
    }

    async fn fetch(&self, instance_type: &str) -> Result<Arc<CapabilityRecord>, CapabilityError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        debug!(instance_type, "Fetching instance type capabilities from provider");

        let raw = self
            .provider
            .capabilities(instance_type)
            .await
            .map_err(|e| {
                warn!(instance_type, error = %e, "Capability provider lookup failed");
                CapabilityError::from_provider(instance_type, e)
            })?;
        let record = CapabilityRecord::parse(instance_type, &raw)?;

        info!(
            instance_type,
            capabilities = record.len(),
            "Cached instance type capabilities"
        );
        Ok(Arc::new(record))
    }
}

/// Capability records resolved for one admission request.
///
/// Validators read this view instead of the cache so they never block.
#[derive(Debug, Clone, Default)]
pub struct ResolvedCapabilities {
    records: HashMap<String, Arc<CapabilityRecord>>,
}

impl ResolvedCapabilities {
    pub fn insert(&mut self, record: Arc<CapabilityRecord>) {
        self.records.insert(cache_key(record.instance_type()), record);
    }

    pub fn get(&self, instance_type: &str) -> Option<&CapabilityRecord> {
        self.records.get(&cache_key(instance_type)).map(Arc::as_ref)
    }

    /// `None` when the instance type was not resolved for this request.
    pub fn supports(&self, instance_type: &str, capability: &str) -> Option<bool> {
        self.get(instance_type).map(|r| r.supports(capability))
    }
}
