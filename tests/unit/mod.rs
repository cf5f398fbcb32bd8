//! Unit tests for azure-admission-controller.
//!
//! These tests run without a Kubernetes cluster and exercise the public API
//! of individual components in isolation.

mod crd_tests {
    use azure_admission_controller::crd::{
        AzureCluster, AzureMachinePool, is_premium_storage, release_resource_name,
    };

    #[test]
    fn test_decode_machine_pool_manifest() {
        let pool: AzureMachinePool = serde_json::from_value(serde_json::json!({
            "apiVersion": "exp.infrastructure.cluster.x-k8s.io/v1alpha3",
            "kind": "AzureMachinePool",
            "metadata": {"name": "nodepool-0", "namespace": "org-giantswarm"},
            "spec": {
                "location": "westeurope",
                "template": {
                    "vmSize": "Standard_D4s_v3",
                    "acceleratedNetworking": false,
                    "osDisk": {
                        "osType": "Linux",
                        "diskSizeGB": 50,
                        "managedDisk": {"storageAccountType": "Premium_LRS"}
                    },
                    "dataDisks": [{"nameSuffix": "docker", "diskSizeGB": 100, "lun": 21}]
                }
            }
        }))
        .unwrap();

        let template = &pool.spec.template;
        assert_eq!(template.vm_size, "Standard_D4s_v3");
        assert_eq!(template.accelerated_networking, Some(false));
        assert_eq!(template.os_disk.managed_disk.storage_account_type, "Premium_LRS");
        assert_eq!(template.data_disks.as_ref().unwrap()[0].lun, Some(21));
    }

    #[test]
    fn test_decode_cluster_ignores_unknown_fields() {
        let cluster: AzureCluster = serde_json::from_value(serde_json::json!({
            "apiVersion": "infrastructure.cluster.x-k8s.io/v1alpha3",
            "kind": "AzureCluster",
            "metadata": {"name": "ab123"},
            "spec": {
                "location": "westeurope",
                "controlPlaneEndpoint": {"host": "api.example.io", "port": 443},
                "networkSpec": {"vnet": {"name": "ab123-vnet"}}
            }
        }))
        .unwrap();
        assert_eq!(cluster.spec.control_plane_endpoint.port, 443);
    }

    #[test]
    fn test_premium_storage_prefix() {
        assert!(is_premium_storage("Premium_LRS"));
        assert!(is_premium_storage("Premium_ZRS"));
        assert!(!is_premium_storage("StandardSSD_LRS"));
        assert!(!is_premium_storage(""));
    }

    #[test]
    fn test_release_name_prefix() {
        assert_eq!(release_resource_name("13.1.0"), "v13.1.0");
    }
}

mod snapshot_tests {
    use azure_admission_controller::webhooks::{Field, FieldValue, ResourceKind, ResourceSnapshot};

    #[test]
    fn test_empty_values_are_absent() {
        let raw = serde_json::json!({
            "apiVersion": "infrastructure.cluster.x-k8s.io/v1alpha3",
            "kind": "AzureCluster",
            "metadata": {"name": "ab123", "labels": {}},
            "spec": {"location": "", "controlPlaneEndpoint": {"host": "", "port": 0}}
        });
        let snapshot =
            ResourceSnapshot::decode(ResourceKind::AzureCluster, &serde_json::to_vec(&raw).unwrap())
                .unwrap();

        assert!(snapshot.get(Field::Location).is_none());
        assert!(snapshot.get(Field::ControlPlaneHost).is_none());
        assert!(snapshot.get(Field::ControlPlanePort).is_none());
        assert!(snapshot.get(Field::Labels).is_none());
    }

    #[test]
    fn test_null_flag_is_absent() {
        let raw = serde_json::json!({
            "apiVersion": "exp.infrastructure.cluster.x-k8s.io/v1alpha3",
            "kind": "AzureMachinePool",
            "metadata": {"name": "np1"},
            "spec": {"template": {"vmSize": "Standard_D4_v3", "acceleratedNetworking": null}}
        });
        let snapshot = ResourceSnapshot::decode(
            ResourceKind::AzureMachinePool,
            &serde_json::to_vec(&raw).unwrap(),
        )
        .unwrap();

        assert_eq!(snapshot.flag(Field::AcceleratedNetworking), None);
        assert_eq!(
            snapshot.get(Field::VmSize),
            Some(&FieldValue::Text("Standard_D4_v3".to_string()))
        );
    }

    #[test]
    fn test_field_paths() {
        assert_eq!(Field::VmSize.path(), "spec.template.vmSize");
        assert_eq!(Field::DataDisks.to_string(), "spec.template.dataDisks");
        assert_eq!(Field::ControlPlanePort.path(), "spec.controlPlaneEndpoint.port");
    }
}

mod capability_tests {
    use azure_admission_controller::capabilities::{
        ACCELERATED_NETWORKING, CapabilityRecord, CapabilityValue, PREMIUM_IO, RawCapability,
        SkuTable,
    };

    #[test]
    fn test_record_from_listing_entry() {
        let record = CapabilityRecord::parse(
            "Standard_D4s_v3",
            &[
                RawCapability::new("AcceleratedNetworkingEnabled", "True"),
                RawCapability::new("PremiumIO", "True"),
                RawCapability::new("vCPUs", "4"),
            ],
        )
        .unwrap();
        assert!(record.supports(ACCELERATED_NETWORKING));
        assert!(record.supports(PREMIUM_IO));
        assert_eq!(record.get("VCPUS"), Some(&CapabilityValue::Number(4.0)));
        assert_eq!(record.instance_type(), "Standard_D4s_v3");
    }

    #[test]
    fn test_sku_listing_decodes() {
        let listing = br#"[{
            "name": "Standard_D16_v3",
            "resourceType": "virtualMachines",
            "locations": ["westeurope"],
            "capabilities": [{"name": "AcceleratedNetworkingEnabled", "value": "False"}]
        }]"#;
        let table = SkuTable::from_json(listing).unwrap();
        assert_eq!(table.len(), 1);
    }
}

mod config_tests {
    use std::time::Duration;

    use azure_admission_controller::AdmissionConfig;

    #[test]
    fn test_partial_environment() {
        let config = AdmissionConfig::from_lookup(|key| match key {
            "ADMISSION_TIMEOUT_SECS" => Some("12".to_string()),
            _ => None,
        });
        assert_eq!(config.admission_timeout, Duration::from_secs(12));
        assert_eq!(config.health_port, 8080);
    }
}

mod registry_tests {
    use azure_admission_controller::webhooks::{
        Field, Operation, ResourceKind, ValidationRule, validation_chain,
    };

    #[test]
    fn test_cluster_update_chain() {
        assert_eq!(
            validation_chain(ResourceKind::AzureCluster, Operation::Update),
            &[
                ValidationRule::ImmutableField(Field::ControlPlaneHost),
                ValidationRule::ImmutableField(Field::ControlPlanePort),
                ValidationRule::ImmutableField(Field::Location),
            ]
        );
    }

    #[test]
    fn test_machine_pool_create_chain() {
        assert_eq!(
            validation_chain(ResourceKind::AzureMachinePool, Operation::Create),
            &[
                ValidationRule::AcceleratedNetworkingSupported,
                ValidationRule::PremiumStorageSupported,
            ]
        );
    }
}
