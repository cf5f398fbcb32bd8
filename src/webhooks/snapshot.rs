//! Decoded resource snapshots and the old/new diff the policies read.
//!
//! A snapshot flattens one object version into the fields admission rules
//! care about. Absent, `null`, and empty values (empty string, zero port,
//! empty list or map) are all "not present"; an explicit `false` flag is
//! present, so `unset -> false` shows up as a change.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::crd::{AzureCluster, AzureMachinePool, DataDisk};
use crate::error::AdmissionError;
use crate::webhooks::request::ResourceKind;

/// Fields recognized by the admission rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    VmSize,
    AcceleratedNetworking,
    Location,
    ControlPlaneHost,
    ControlPlanePort,
    StorageAccountType,
    DataDisks,
    Labels,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::VmSize,
        Field::AcceleratedNetworking,
        Field::Location,
        Field::ControlPlaneHost,
        Field::ControlPlanePort,
        Field::StorageAccountType,
        Field::DataDisks,
        Field::Labels,
    ];

    /// Dotted path of the field in the object, used in denial messages.
    pub fn path(&self) -> &'static str {
        match self {
            Field::VmSize => "spec.template.vmSize",
            Field::AcceleratedNetworking => "spec.template.acceleratedNetworking",
            Field::Location => "spec.location",
            Field::ControlPlaneHost => "spec.controlPlaneEndpoint.host",
            Field::ControlPlanePort => "spec.controlPlaneEndpoint.port",
            Field::StorageAccountType => "spec.template.osDisk.managedDisk.storageAccountType",
            Field::DataDisks => "spec.template.dataDisks",
            Field::Labels => "metadata.labels",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Typed value of a recognized field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Flag(bool),
    Disks(Vec<DataDisk>),
    Labels(BTreeMap<String, String>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{:?}", s),
            FieldValue::Int(n) => write!(f, "{}", n),
            FieldValue::Flag(b) => write!(f, "{}", b),
            FieldValue::Disks(disks) => {
                let disks: Vec<String> = disks
                    .iter()
                    .map(|d| match d.lun {
                        Some(lun) => {
                            format!("{}({}GB, lun {})", d.name_suffix, d.disk_size_gb, lun)
                        }
                        None => format!("{}({}GB)", d.name_suffix, d.disk_size_gb),
                    })
                    .collect();
                write!(f, "[{}]", disks.join(", "))
            }
            FieldValue::Labels(labels) => {
                let labels: Vec<String> =
                    labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                write!(f, "{{{}}}", labels.join(", "))
            }
        }
    }
}

/// Render an optional value for messages.
pub fn describe(value: Option<&FieldValue>) -> String {
    value.map_or_else(|| "<unset>".to_string(), ToString::to_string)
}

/// Immutable decoded view of one object version.
#[derive(Debug, Clone)]
pub struct ResourceSnapshot {
    kind: ResourceKind,
    name: Option<String>,
    namespace: Option<String>,
    fields: BTreeMap<Field, FieldValue>,
    document: Value,
}

impl ResourceSnapshot {
    /// Decode a serialized object of the given kind.
    pub fn decode(kind: ResourceKind, raw: &[u8]) -> Result<Self, AdmissionError> {
        let decode_err = |source| AdmissionError::Decode { kind, source };
        let document: Value = serde_json::from_slice(raw).map_err(decode_err)?;

        let mut snapshot = match kind {
            ResourceKind::AzureCluster => {
                let cluster: AzureCluster =
                    serde_json::from_value(document.clone()).map_err(decode_err)?;
                Self::cluster_fields(&cluster)
            }
            ResourceKind::AzureMachinePool => {
                let pool: AzureMachinePool =
                    serde_json::from_value(document.clone()).map_err(decode_err)?;
                Self::machine_pool_fields(&pool)
            }
        };
        snapshot.document = document;
        Ok(snapshot)
    }

    /// Snapshot of a typed cluster, with the document it serializes to.
    pub fn from_cluster(cluster: &AzureCluster) -> Result<Self, AdmissionError> {
        let mut snapshot = Self::cluster_fields(cluster);
        snapshot.document = serde_json::to_value(cluster).map_err(|source| {
            AdmissionError::Decode {
                kind: ResourceKind::AzureCluster,
                source,
            }
        })?;
        Ok(snapshot)
    }

    /// Snapshot of a typed machine pool, with the document it serializes to.
    pub fn from_machine_pool(pool: &AzureMachinePool) -> Result<Self, AdmissionError> {
        let mut snapshot = Self::machine_pool_fields(pool);
        snapshot.document = serde_json::to_value(pool).map_err(|source| {
            AdmissionError::Decode {
                kind: ResourceKind::AzureMachinePool,
                source,
            }
        })?;
        Ok(snapshot)
    }

    fn cluster_fields(cluster: &AzureCluster) -> Self {
        let mut snapshot = Self::empty(
            ResourceKind::AzureCluster,
            cluster.metadata.name.clone(),
            cluster.metadata.namespace.clone(),
        );
        let spec = &cluster.spec;
        snapshot.insert_text(Field::Location, &spec.location);
        snapshot.insert_text(Field::ControlPlaneHost, &spec.control_plane_endpoint.host);
        if spec.control_plane_endpoint.port != 0 {
            snapshot.insert(
                Field::ControlPlanePort,
                FieldValue::Int(i64::from(spec.control_plane_endpoint.port)),
            );
        }
        snapshot.insert_labels(cluster.metadata.labels.as_ref());
        snapshot
    }

    fn machine_pool_fields(pool: &AzureMachinePool) -> Self {
        let mut snapshot = Self::empty(
            ResourceKind::AzureMachinePool,
            pool.metadata.name.clone(),
            pool.metadata.namespace.clone(),
        );
        let template = &pool.spec.template;
        snapshot.insert_text(Field::Location, &pool.spec.location);
        snapshot.insert_text(Field::VmSize, &template.vm_size);
        if let Some(enabled) = template.accelerated_networking {
            snapshot.insert(Field::AcceleratedNetworking, FieldValue::Flag(enabled));
        }
        snapshot.insert_text(
            Field::StorageAccountType,
            &template.os_disk.managed_disk.storage_account_type,
        );
        if let Some(disks) = template.data_disks.as_ref().filter(|d| !d.is_empty()) {
            snapshot.insert(Field::DataDisks, FieldValue::Disks(disks.clone()));
        }
        snapshot.insert_labels(pool.metadata.labels.as_ref());
        snapshot
    }

    fn empty(kind: ResourceKind, name: Option<String>, namespace: Option<String>) -> Self {
        Self {
            kind,
            name: name.filter(|n| !n.is_empty()),
            namespace: namespace.filter(|n| !n.is_empty()),
            fields: BTreeMap::new(),
            document: Value::Null,
        }
    }

    fn insert(&mut self, field: Field, value: FieldValue) {
        self.fields.insert(field, value);
    }

    fn insert_text(&mut self, field: Field, value: &str) {
        if !value.is_empty() {
            self.insert(field, FieldValue::Text(value.to_string()));
        }
    }

    fn insert_labels(&mut self, labels: Option<&BTreeMap<String, String>>) {
        if let Some(labels) = labels.filter(|l| !l.is_empty()) {
            self.insert(Field::Labels, FieldValue::Labels(labels.clone()));
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// `namespace/name` for logs and messages.
    pub fn identity(&self) -> String {
        format!(
            "{}/{}",
            self.namespace().unwrap_or(""),
            self.name().unwrap_or("")
        )
    }

    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn text(&self, field: Field) -> Option<&str> {
        match self.get(field)? {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn flag(&self, field: Field) -> Option<bool> {
        match self.get(field)? {
            FieldValue::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        match self.get(Field::Labels)? {
            FieldValue::Labels(labels) => labels.get(key).map(String::as_str),
            _ => None,
        }
    }

    /// The object as received, for mutators that must address its JSON layout.
    pub fn document(&self) -> &Value {
        &self.document
    }
}

/// Classification of one field across an update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldChange<'a> {
    Unchanged,
    Changed {
        old: Option<&'a FieldValue>,
        new: Option<&'a FieldValue>,
    },
    NotPresentInEither,
}

/// Old/new pairing of one resource. `old == None` denotes a create.
#[derive(Debug, Clone, Copy)]
pub struct Diff<'a> {
    old: Option<&'a ResourceSnapshot>,
    new: &'a ResourceSnapshot,
}

impl<'a> Diff<'a> {
    /// Pair two snapshots, rejecting versions of different resources.
    ///
    /// Identities are compared only where both sides carry one, since a
    /// create may arrive with `generateName` and no name yet.
    pub fn new(
        old: Option<&'a ResourceSnapshot>,
        new: &'a ResourceSnapshot,
    ) -> Result<Self, AdmissionError> {
        if let Some(old) = old {
            let differs = |a: Option<&str>, b: Option<&str>| {
                matches!((a, b), (Some(a), Some(b)) if a != b)
            };
            if old.kind != new.kind
                || differs(old.name(), new.name())
                || differs(old.namespace(), new.namespace())
            {
                return Err(AdmissionError::IdentityMismatch {
                    old: old.identity(),
                    new: new.identity(),
                });
            }
        }
        Ok(Self { old, new })
    }

    pub fn create(new: &'a ResourceSnapshot) -> Self {
        Self { old: None, new }
    }

    pub fn is_create(&self) -> bool {
        self.old.is_none()
    }

    pub fn old(&self) -> Option<&'a ResourceSnapshot> {
        self.old
    }

    pub fn new_snapshot(&self) -> &'a ResourceSnapshot {
        self.new
    }

    /// Three-way classification of `field`. On create every present field is Changed.
    pub fn change(&self, field: Field) -> FieldChange<'a> {
        let old = self.old.and_then(|s| s.get(field));
        let new = self.new.get(field);
        match (old, new) {
            (None, None) => FieldChange::NotPresentInEither,
            (Some(o), Some(n)) if o == n => FieldChange::Unchanged,
            (old, new) => FieldChange::Changed { old, new },
        }
    }

    pub fn is_changed(&self, field: Field) -> bool {
        matches!(self.change(field), FieldChange::Changed { .. })
    }

    pub fn changed_fields(&self) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|f| self.is_changed(*f))
            .collect()
    }
}
