//! Mutation scenarios: version labels and machine pool defaults.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use azure_admission_controller::crd::{
    AZURE_OPERATOR_VERSION_LABEL, DataDisk, RELEASE_VERSION_LABEL,
};
use azure_admission_controller::release::{ReleaseError, ReleaseVersionResolver};
use azure_admission_controller::webhooks::{ResourceKind, ResourceSnapshot};
use azure_admission_controller::{AdmissionDispatcher, CapabilityCache};
use serde_json::{Value, json};
use tokio::time::Instant;

use crate::{
    AzureClusterBuilder, AzureMachinePoolBuilder, create_input, dispatcher, payload, releases,
    sku_table, update_input,
};

fn apply(object: Value, patch: &[json_patch::PatchOperation]) -> Value {
    let mut object = object;
    json_patch::patch(&mut object, patch).unwrap();
    object
}

#[tokio::test]
async fn test_cluster_version_label_updated() {
    let dispatcher = dispatcher();
    let cluster = AzureClusterBuilder::new("ab123")
        .label(RELEASE_VERSION_LABEL, "v13.1.0")
        .label(AZURE_OPERATOR_VERSION_LABEL, "4.2.0")
        .build();

    let patch = dispatcher
        .mutate(&update_input(ResourceKind::AzureCluster, &cluster, &cluster))
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(&patch).unwrap(),
        json!([{
            "op": "add",
            "path": "/metadata/labels/azure-operator.giantswarm.io~1version",
            "value": "5.1.0"
        }])
    );
}

#[tokio::test]
async fn test_cluster_without_release_label_untouched() {
    let dispatcher = dispatcher();
    let cluster = AzureClusterBuilder::new("ab123").build();

    let patch = dispatcher
        .mutate(&create_input(ResourceKind::AzureCluster, &cluster))
        .await
        .unwrap();
    assert!(patch.is_empty());
}

#[tokio::test]
async fn test_unknown_release_fails_closed() {
    let dispatcher = dispatcher();
    let cluster = AzureClusterBuilder::new("ab123")
        .label(RELEASE_VERSION_LABEL, "v99.0.0")
        .build();

    let err = dispatcher
        .mutate(&create_input(ResourceKind::AzureCluster, &cluster))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "ReleaseLookupError");
}

#[tokio::test]
async fn test_machine_pool_create_defaults() {
    let dispatcher = dispatcher();
    let pool = AzureMachinePoolBuilder::new("np1")
        .vm_size("Standard_D4_v3")
        .storage_account_type("")
        .label(RELEASE_VERSION_LABEL, "13.1.0")
        .build();

    let patch = dispatcher
        .mutate(&create_input(ResourceKind::AzureMachinePool, &pool))
        .await
        .unwrap();
    assert_eq!(patch.len(), 3);

    let patched = apply(serde_json::to_value(&pool).unwrap(), &patch);
    assert_eq!(
        patched.pointer("/spec/template/osDisk/managedDisk/storageAccountType"),
        Some(&json!("Standard_LRS"))
    );
    assert_eq!(
        patched.pointer("/spec/template/dataDisks/1/nameSuffix"),
        Some(&json!("kubelet"))
    );
    assert_eq!(
        patched.pointer("/metadata/labels/azure-operator.giantswarm.io~1version"),
        Some(&json!("5.1.0"))
    );
}

#[tokio::test]
async fn test_machine_pool_mutation_is_idempotent() {
    let dispatcher = dispatcher();
    let pool = AzureMachinePoolBuilder::new("np1")
        .storage_account_type("")
        .label(RELEASE_VERSION_LABEL, "v13.1.0")
        .build();

    let patch = dispatcher
        .mutate(&create_input(ResourceKind::AzureMachinePool, &pool))
        .await
        .unwrap();
    let patched = apply(serde_json::to_value(&pool).unwrap(), &patch);

    let input = azure_admission_controller::webhooks::AdmissionInput::create(
        ResourceKind::AzureMachinePool,
        serde_json::to_vec(&patched).unwrap(),
        crate::deadline(),
    );
    let again = dispatcher.mutate(&input).await.unwrap();
    assert!(again.is_empty(), "second pass produced {:?}", again);

    // The patched object also passes create validation
    let decision = dispatcher.validate(&input).await.unwrap();
    assert!(decision.is_allowed());
}

#[tokio::test]
async fn test_machine_pool_update_keeps_disks() {
    let dispatcher = dispatcher();
    let pool = AzureMachinePoolBuilder::new("np1")
        .data_disks(vec![DataDisk::new("docker", 30, 21)])
        .build();

    let patch = dispatcher
        .mutate(&update_input(ResourceKind::AzureMachinePool, &pool, &pool))
        .await
        .unwrap();
    assert!(patch.is_empty());

    let snapshot =
        ResourceSnapshot::decode(ResourceKind::AzureMachinePool, &payload(&pool)).unwrap();
    assert!(snapshot.label(AZURE_OPERATOR_VERSION_LABEL).is_none());
}

/// Release catalog that answers only after `delay`.
struct SlowReleases {
    delay: Duration,
}

#[async_trait]
impl ReleaseVersionResolver for SlowReleases {
    async fn component_version(
        &self,
        release: &str,
        component: &str,
    ) -> Result<String, ReleaseError> {
        tokio::time::sleep(self.delay).await;
        releases().component_version(release, component).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_stalled_release_lookup_fails_by_deadline() {
    let cache = Arc::new(CapabilityCache::new(Arc::new(sku_table())));
    let slow = SlowReleases {
        delay: Duration::from_secs(300),
    };
    let dispatcher = AdmissionDispatcher::new(cache, Arc::new(slow));
    let cluster = AzureClusterBuilder::new("ab123")
        .label(RELEASE_VERSION_LABEL, "v13.1.0")
        .build();

    let started = Instant::now();
    let err = dispatcher
        .mutate(&update_input(ResourceKind::AzureCluster, &cluster, &cluster))
        .await
        .unwrap_err();

    assert_eq!(err.reason(), "ReleaseLookupError");
    assert!(err.is_upstream());
    assert!(started.elapsed() < Duration::from_secs(6));
}
