//! Mutation policies for AzureCluster and AzureMachinePool admission.
//!
//! Mutators read only the new object and emit JSON patch operations. They are
//! idempotent: run against their own patched output, they emit nothing.
//! The chain applies each mutator's patch to a working copy of the object so
//! later mutators see earlier defaults and never emit overlapping paths.

pub mod component_version;
pub mod defaults;

use json_patch::{AddOperation, PatchOperation};
use jsonptr::PointerBuf;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::debug;

use crate::capabilities::ResolvedCapabilities;
use crate::error::AdmissionError;
use crate::release::ReleaseVersionResolver;
use crate::webhooks::snapshot::ResourceSnapshot;

/// Context for mutation
pub struct MutationContext<'a> {
    /// Decoded new object
    pub snapshot: &'a ResourceSnapshot,
    /// Object as patched by the mutators that already ran
    pub document: &'a Value,
    /// Capability records fetched for this request
    pub capabilities: &'a ResolvedCapabilities,
    pub releases: &'a dyn ReleaseVersionResolver,
    /// Bound on release lookups
    pub deadline: Instant,
}

/// Registered mutation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationRule {
    ComponentVersionLabel,
    DefaultStorageAccountType,
    DefaultDataDisks,
}

impl MutationRule {
    pub fn name(&self) -> &'static str {
        match self {
            MutationRule::ComponentVersionLabel => "ComponentVersionLabel",
            MutationRule::DefaultStorageAccountType => "DefaultStorageAccountType",
            MutationRule::DefaultDataDisks => "DefaultDataDisks",
        }
    }

    /// Instance types whose capability records the rule reads for this object.
    pub fn instance_types(&self, snapshot: &ResourceSnapshot) -> Vec<String> {
        match self {
            MutationRule::DefaultStorageAccountType => defaults::storage_lookups(snapshot),
            MutationRule::ComponentVersionLabel | MutationRule::DefaultDataDisks => Vec::new(),
        }
    }

    pub async fn apply(
        &self,
        ctx: &MutationContext<'_>,
    ) -> Result<Vec<PatchOperation>, AdmissionError> {
        match self {
            MutationRule::ComponentVersionLabel => component_version::mutate(ctx).await,
            MutationRule::DefaultStorageAccountType => Ok(defaults::storage_account_type(ctx)),
            MutationRule::DefaultDataDisks => Ok(defaults::data_disks(ctx)),
        }
    }
}

/// Run `rules` in order and concatenate their patches.
pub async fn run_chain(
    rules: &[MutationRule],
    snapshot: &ResourceSnapshot,
    capabilities: &ResolvedCapabilities,
    releases: &dyn ReleaseVersionResolver,
    deadline: Instant,
) -> Result<Vec<PatchOperation>, AdmissionError> {
    let mut document = snapshot.document().clone();
    let mut patch = Vec::new();

    for rule in rules {
        let ops = {
            let ctx = MutationContext {
                snapshot,
                document: &document,
                capabilities,
                releases,
                deadline,
            };
            rule.apply(&ctx).await?
        };
        if ops.is_empty() {
            continue;
        }
        debug!(rule = rule.name(), operations = ops.len(), "Mutation rule patched object");
        json_patch::patch(&mut document, &ops)?;
        patch.extend(ops);
    }

    Ok(patch)
}

/// JSON pointer from unescaped tokens; `/` and `~` inside a token are escaped.
pub fn pointer(tokens: &[&str]) -> PointerBuf {
    PointerBuf::from_tokens(tokens.iter().copied())
}

/// `add` operation at `tokens`.
pub fn add(tokens: &[&str], value: Value) -> PatchOperation {
    PatchOperation::Add(AddOperation {
        path: pointer(tokens),
        value,
    })
}

/// `add` operation at `tokens` that also creates missing parent objects.
///
/// JSON patch `add` fails when the parent does not exist, so the operation is
/// placed at the deepest existing object and the value wrapped accordingly.
pub fn add_nested(document: &Value, tokens: &[&str], value: Value) -> PatchOperation {
    let Some((_, parents)) = tokens.split_last() else {
        return add(tokens, value);
    };

    let mut current = document;
    let mut existing = 0;
    for token in parents {
        match current.get(*token) {
            Some(next @ Value::Object(_)) => {
                current = next;
                existing += 1;
            }
            _ => break,
        }
    }

    let (target, missing) = tokens.split_at(existing + 1);
    let value = missing.iter().rev().fold(value, |inner, token| {
        let mut object = Map::new();
        object.insert((*token).to_string(), inner);
        Value::Object(object)
    });
    add(target, value)
}
