//! Stamp objects with the azure-operator version of their release.
//!
//! Objects labelled with a platform release get the version of the
//! azure-operator shipped in that release, so the matching operator instance
//! picks them up.

use json_patch::PatchOperation;
use serde_json::Value;
use tokio::time::timeout_at;
use tracing::{debug, warn};

use super::{MutationContext, add_nested};
use crate::crd::{AZURE_OPERATOR_COMPONENT, AZURE_OPERATOR_VERSION_LABEL, RELEASE_VERSION_LABEL};
use crate::error::AdmissionError;
use crate::release::ReleaseError;

pub async fn mutate(ctx: &MutationContext<'_>) -> Result<Vec<PatchOperation>, AdmissionError> {
    let Some(release) = ctx.snapshot.label(RELEASE_VERSION_LABEL) else {
        return Ok(Vec::new());
    };

    let lookup = ctx
        .releases
        .component_version(release, AZURE_OPERATOR_COMPONENT);
    let version = match timeout_at(ctx.deadline, lookup).await {
        Ok(version) => version?,
        Err(_) => {
            warn!(release = %release, "Release lookup exceeded request deadline");
            return Err(ReleaseError::Timeout(release.to_string()).into());
        }
    };

    let current = ctx.snapshot.label(AZURE_OPERATOR_VERSION_LABEL);
    if current == Some(version.as_str()) {
        return Ok(Vec::new());
    }

    debug!(
        release = %release,
        current = ?current,
        version = %version,
        "Setting azure-operator version label"
    );
    Ok(vec![add_nested(
        ctx.document,
        &["metadata", "labels", AZURE_OPERATOR_VERSION_LABEL],
        Value::String(version),
    )])
}
