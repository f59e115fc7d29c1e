//! Parsing of multi-document YAML manifests into dynamic Kubernetes objects.

use kube::api::{DynamicObject, GroupVersionKind};
use serde::Deserialize;

use crate::error::{ApplyError, Result};

/// A single object taken from a manifest, with its resolved type.
#[derive(Debug, Clone)]
pub struct ManifestObject {
    /// The object as it will be sent to the API server.
    pub object: DynamicObject,
    /// Group, version and kind parsed from `apiVersion` and `kind`.
    pub gvk: GroupVersionKind,
    /// `metadata.name` of the object.
    pub name: String,
}

impl ManifestObject {
    /// `Kind/name` label used in logs and errors.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{}/{}", self.gvk.kind, self.name)
    }

    /// Namespace declared in the object's metadata, if any.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.object.metadata.namespace.as_deref()
    }
}

/// Split a manifest into its objects, in document order.
///
/// Empty documents (for example a leading `---`) are skipped.
///
/// # Errors
///
/// Returns [`ApplyError::InvalidManifest`] if a document is not valid YAML,
/// lacks `apiVersion`/`kind`, or has no `metadata.name`.
pub fn parse_manifest(manifest: &str) -> Result<Vec<ManifestObject>> {
    let mut objects = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(manifest).enumerate() {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| ApplyError::InvalidManifest(format!("document {index}: {e}")))?;
        if value.is_null() {
            continue;
        }

        let json = serde_json::to_value(&value)
            .map_err(|e| ApplyError::InvalidManifest(format!("document {index}: {e}")))?;
        let object: DynamicObject = serde_json::from_value(json)
            .map_err(|e| ApplyError::InvalidManifest(format!("document {index}: {e}")))?;

        let types = object.types.as_ref().ok_or_else(|| {
            ApplyError::InvalidManifest(format!("document {index}: missing apiVersion or kind"))
        })?;
        let gvk = parse_gvk(&types.api_version, &types.kind);
        let name = object.metadata.name.clone().ok_or_else(|| {
            ApplyError::InvalidManifest(format!(
                "document {index}: {} has no metadata.name",
                types.kind
            ))
        })?;

        objects.push(ManifestObject { object, gvk, name });
    }

    Ok(objects)
}

/// Core resources use a bare version (`v1`); everything else is `group/version`.
fn parse_gvk(api_version: &str, kind: &str) -> GroupVersionKind {
    match api_version.split_once('/') {
        Some((group, version)) => GroupVersionKind::gvk(group, version, kind),
        None => GroupVersionKind::gvk("", api_version, kind),
    }
}
