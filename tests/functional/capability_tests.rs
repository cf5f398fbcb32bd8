//! Capability cache behaviour seen through the dispatcher.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use azure_admission_controller::capabilities::{
    CapabilityCache, CapabilityProvider, InstanceTypeCapabilities, ProviderError, RawCapability,
    SkuTable,
};
use azure_admission_controller::webhooks::{AdmissionDispatcher, AdmissionInput, ResourceKind};
use tokio::time::Instant;

use crate::{AzureMachinePoolBuilder, payload, releases, sku_table};

/// Provider wrapper that counts lookups and answers after a delay.
struct SlowProvider {
    table: SkuTable,
    delay: Duration,
    lookups: AtomicUsize,
}

impl SlowProvider {
    fn new(table: SkuTable, delay: Duration) -> Self {
        Self {
            table,
            delay,
            lookups: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CapabilityProvider for SlowProvider {
    async fn capabilities(&self, instance_type: &str) -> Result<Vec<RawCapability>, ProviderError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.table.capabilities(instance_type).await
    }

    async fn all_capabilities(&self) -> Result<Vec<InstanceTypeCapabilities>, ProviderError> {
        self.table.all_capabilities().await
    }
}

fn resize_input(deadline: Instant) -> AdmissionInput {
    let old = AzureMachinePoolBuilder::new("np1")
        .vm_size("Standard_D4_v3")
        .accelerated_networking(Some(true))
        .storage_account_type("Standard_LRS")
        .build();
    let new = AzureMachinePoolBuilder::new("np1")
        .vm_size("Standard_D8_v3")
        .accelerated_networking(Some(true))
        .storage_account_type("Standard_LRS")
        .build();
    AdmissionInput::update(
        ResourceKind::AzureMachinePool,
        payload(&new),
        payload(&old),
        deadline,
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_one_fetch() {
    let provider = Arc::new(SlowProvider::new(sku_table(), Duration::from_millis(50)));
    let cache = Arc::new(CapabilityCache::new(provider.clone()));
    let dispatcher = AdmissionDispatcher::new(cache.clone(), Arc::new(releases()));

    let deadline = Instant::now() + Duration::from_secs(5);
    let requests = (0..16).map(|_| {
        let dispatcher = dispatcher.clone();
        async move { dispatcher.validate(&resize_input(deadline)).await }
    });
    let decisions = futures::future::join_all(requests).await;

    for decision in decisions {
        assert!(decision.unwrap().is_allowed());
    }
    assert_eq!(provider.lookups.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().entries, 1);
    assert_eq!(cache.stats().fetches, 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_provider_times_out() {
    let provider = Arc::new(SlowProvider::new(sku_table(), Duration::from_secs(30)));
    let cache = Arc::new(CapabilityCache::new(provider));
    let dispatcher = AdmissionDispatcher::new(cache, Arc::new(releases()));

    let deadline = Instant::now() + Duration::from_secs(2);
    let err = dispatcher
        .validate(&resize_input(deadline))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "ProviderTimeout");
}

#[tokio::test]
async fn test_malformed_table_is_parse_error() {
    let table = SkuTable::new([InstanceTypeCapabilities::new(
        "Standard_D8_v3",
        &[("AcceleratedNetworkingEnabled", "True"), ("", "True")],
    )]);
    let cache = Arc::new(CapabilityCache::new(Arc::new(table)));
    let dispatcher = AdmissionDispatcher::new(cache, Arc::new(releases()));

    let err = dispatcher
        .validate(&resize_input(Instant::now() + Duration::from_secs(5)))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "ParseError");
}

#[tokio::test]
async fn test_refresh_preloads_everything() {
    let provider = Arc::new(SlowProvider::new(sku_table(), Duration::ZERO));
    let cache = Arc::new(CapabilityCache::new(provider.clone()));

    assert_eq!(cache.refresh().await.unwrap(), 4);
    let dispatcher = AdmissionDispatcher::new(cache.clone(), Arc::new(releases()));
    let decision = dispatcher
        .validate(&resize_input(Instant::now() + Duration::from_secs(5)))
        .await
        .unwrap();

    assert!(decision.is_allowed());
    assert_eq!(provider.lookups.load(Ordering::SeqCst), 0);
    assert_eq!(cache.stats().entries, 4);
}

#[tokio::test]
async fn test_rules_not_needing_capabilities_skip_provider() {
    let provider = Arc::new(SlowProvider::new(sku_table(), Duration::ZERO));
    let cache = Arc::new(CapabilityCache::new(provider.clone()));
    let dispatcher = AdmissionDispatcher::new(cache, Arc::new(releases()));

    let old = AzureMachinePoolBuilder::new("np1").build();
    let new = AzureMachinePoolBuilder::new("np1").location("northeurope").build();
    let decision = dispatcher
        .validate(&AdmissionInput::update(
            ResourceKind::AzureMachinePool,
            payload(&new),
            payload(&old),
            Instant::now() + Duration::from_secs(5),
        ))
        .await
        .unwrap();

    assert!(!decision.is_allowed());
    assert_eq!(provider.lookups.load(Ordering::SeqCst), 0);
}
