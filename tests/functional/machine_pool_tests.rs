//! AzureMachinePool validation scenarios.

use azure_admission_controller::crd::{AzureMachinePool, DataDisk};
use azure_admission_controller::webhooks::{Decision, DenyReason, ResourceKind};

use crate::{AzureMachinePoolBuilder, create_input, dispatcher, update_input};

struct UpdateCase {
    name: &'static str,
    old: AzureMachinePool,
    new: AzureMachinePool,
    expected: Option<DenyReason>,
}

fn pool(vm_size: &str, accelerated_networking: Option<bool>) -> AzureMachinePoolBuilder {
    AzureMachinePoolBuilder::new("np1")
        .vm_size(vm_size)
        .accelerated_networking(accelerated_networking)
}

fn update_cases() -> Vec<UpdateCase> {
    vec![
        UpdateCase {
            name: "case 0: accelerated networking stays enabled",
            old: pool("Standard_D4_v3", Some(true)).build(),
            new: pool("Standard_D4_v3", Some(true)).build(),
            expected: None,
        },
        UpdateCase {
            name: "case 1: accelerated networking stays disabled",
            old: pool("Standard_D4_v3", Some(false)).build(),
            new: pool("Standard_D4_v3", Some(false)).build(),
            expected: None,
        },
        UpdateCase {
            name: "case 2: disabling accelerated networking",
            old: pool("Standard_D4_v3", Some(true)).build(),
            new: pool("Standard_D4_v3", Some(false)).build(),
            expected: Some(DenyReason::AcceleratedNetworkingChanged),
        },
        UpdateCase {
            name: "case 3: resize to a size supporting accelerated networking",
            old: pool("Standard_D4_v3", Some(true)).storage_account_type("Standard_LRS").build(),
            new: pool("Standard_D8_v3", Some(true)).storage_account_type("Standard_LRS").build(),
            expected: None,
        },
        UpdateCase {
            name: "case 4: resize to a size without accelerated networking",
            old: pool("Standard_D4_v3", Some(true)).build(),
            new: pool("Standard_D16_v3", Some(true)).build(),
            expected: Some(DenyReason::VmSizeCapabilityMismatch),
        },
        UpdateCase {
            name: "case 5: enabling accelerated networking",
            old: pool("Standard_D4_v3", Some(false)).build(),
            new: pool("Standard_D4_v3", Some(true)).build(),
            expected: Some(DenyReason::AcceleratedNetworkingChanged),
        },
        UpdateCase {
            name: "case 6: unset to enabled",
            old: pool("Standard_D4_v3", None).build(),
            new: pool("Standard_D4_v3", Some(true)).build(),
            expected: Some(DenyReason::AcceleratedNetworkingChanged),
        },
        UpdateCase {
            name: "case 7: enabled to unset",
            old: pool("Standard_D4_v3", Some(true)).build(),
            new: pool("Standard_D4_v3", None).build(),
            expected: Some(DenyReason::AcceleratedNetworkingChanged),
        },
        UpdateCase {
            name: "case 8: unset to disabled",
            old: pool("Standard_D4_v3", None).build(),
            new: pool("Standard_D4_v3", Some(false)).build(),
            expected: Some(DenyReason::AcceleratedNetworkingChanged),
        },
        UpdateCase {
            name: "case 9: disabled to unset",
            old: pool("Standard_D4_v3", Some(false)).build(),
            new: pool("Standard_D4_v3", None).build(),
            expected: Some(DenyReason::AcceleratedNetworkingChanged),
        },
        UpdateCase {
            name: "case 10: resize loses premium storage support",
            old: pool("Standard_D4s_v3", Some(true)).build(),
            new: pool("Standard_D4_v3", Some(true)).build(),
            expected: Some(DenyReason::StorageCapabilityLost),
        },
        UpdateCase {
            name: "case 11: resize gains premium storage support",
            old: pool("Standard_D4_v3", Some(true)).storage_account_type("Standard_LRS").build(),
            new: pool("Standard_D4s_v3", Some(true)).storage_account_type("Standard_LRS").build(),
            expected: None,
        },
        UpdateCase {
            name: "case 12: storage account type changed",
            old: pool("Standard_D4s_v3", Some(true)).storage_account_type("Standard_LRS").build(),
            new: pool("Standard_D4s_v3", Some(true)).storage_account_type("Premium_LRS").build(),
            expected: Some(DenyReason::StorageAccountWasChanged),
        },
        UpdateCase {
            name: "case 13: data disks set",
            old: pool("Standard_D4s_v3", Some(true)).build(),
            new: pool("Standard_D4s_v3", Some(true))
                .data_disks(vec![
                    DataDisk::new("docker", 30, 21),
                    DataDisk::new("kubelet", 50, 22),
                ])
                .build(),
            expected: Some(DenyReason::DatadisksFieldIsSet),
        },
        UpdateCase {
            name: "case 14: location changed",
            old: pool("Standard_D4s_v3", Some(true)).build(),
            new: pool("Standard_D4s_v3", Some(true)).location("northeastitaly").build(),
            expected: Some(DenyReason::LocationWasChanged),
        },
    ]
}

#[tokio::test]
async fn test_machine_pool_update_cases() {
    let dispatcher = dispatcher();

    for case in update_cases() {
        let input = update_input(ResourceKind::AzureMachinePool, &case.old, &case.new);
        let decision = dispatcher
            .validate(&input)
            .await
            .unwrap_or_else(|e| panic!("{}: unexpected error {}", case.name, e));

        let reason = decision.denial().map(|d| d.reason);
        assert_eq!(reason, case.expected, "{}", case.name);
    }
}

#[tokio::test]
async fn test_denial_names_rule_and_values() {
    let dispatcher = dispatcher();
    let old = pool("Standard_D4_v3", Some(true)).build();
    let new = pool("Standard_D16_v3", Some(true)).build();

    let decision = dispatcher
        .validate(&update_input(ResourceKind::AzureMachinePool, &old, &new))
        .await
        .unwrap();
    let Decision::Deny(denial) = decision else {
        panic!("resize to Standard_D16_v3 should be denied");
    };
    assert_eq!(denial.rule, "VmSizeSupportsAcceleratedNetworking");
    assert!(denial.message.contains("spec.template.vmSize"));
    assert!(denial.message.contains("Standard_D4_v3"));
    assert!(denial.message.contains("Standard_D16_v3"));
}

#[tokio::test]
async fn test_unknown_vm_size_fails_closed() {
    let dispatcher = dispatcher();
    let old = pool("Standard_D4_v3", Some(true)).build();
    let new = pool("Standard_X99_v9", Some(true)).build();

    let err = dispatcher
        .validate(&update_input(ResourceKind::AzureMachinePool, &old, &new))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "ProviderLookupError");
}

#[tokio::test]
async fn test_earlier_denial_wins_over_unknown_vm_size() {
    let dispatcher = dispatcher();
    let old = pool("Standard_D4_v3", Some(false)).build();
    let new = pool("Standard_Bogus_v1", Some(true)).build();

    let decision = dispatcher
        .validate(&update_input(ResourceKind::AzureMachinePool, &old, &new))
        .await
        .unwrap();
    assert_eq!(
        decision.denial().map(|d| d.reason),
        Some(DenyReason::AcceleratedNetworkingChanged)
    );
}

#[tokio::test]
async fn test_machine_pool_create_cases() {
    let dispatcher = dispatcher();
    let cases = [
        (
            "supported accelerated networking",
            pool("Standard_D4s_v3", Some(true)).build(),
            None,
        ),
        (
            "accelerated networking on an unsupported size",
            pool("Standard_D16_v3", Some(true))
                .storage_account_type("Standard_LRS")
                .build(),
            Some(DenyReason::AcceleratedNetworkingNotSupported),
        ),
        (
            "premium storage without premium IO",
            pool("Standard_D4_v3", None).build(),
            Some(DenyReason::PremiumStorageNotSupported),
        ),
        (
            "standard storage on any size",
            pool("Standard_D16_v3", Some(false))
                .storage_account_type("Standard_LRS")
                .build(),
            None,
        ),
    ];

    for (name, object, expected) in cases {
        let decision = dispatcher
            .validate(&create_input(ResourceKind::AzureMachinePool, &object))
            .await
            .unwrap();
        assert_eq!(decision.denial().map(|d| d.reason), expected, "{}", name);
    }
}

#[tokio::test]
async fn test_malformed_payload_is_decode_error() {
    let dispatcher = dispatcher();
    let old = pool("Standard_D4_v3", Some(true)).build();
    let mut input = update_input(ResourceKind::AzureMachinePool, &old, &old);
    input.new_payload = br#"{"spec": {"template": {"acceleratedNetworking": "yes"}}}"#.to_vec();

    let err = dispatcher.validate(&input).await.unwrap_err();
    assert_eq!(err.reason(), "DecodeError");
}

#[tokio::test]
async fn test_renamed_object_is_decode_error() {
    let dispatcher = dispatcher();
    let old = AzureMachinePoolBuilder::new("np1").build();
    let new = AzureMachinePoolBuilder::new("np2").build();

    let err = dispatcher
        .validate(&update_input(ResourceKind::AzureMachinePool, &old, &new))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "DecodeError");
}
