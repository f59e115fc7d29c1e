//! Types for the applier crate.

use serde::{Deserialize, Serialize};

/// Configuration for the Kubernetes manifest applier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplierConfig {
    /// Namespace for namespaced objects that don't name one.
    pub default_namespace: String,
    /// Field manager recorded for server-side apply.
    pub field_manager: String,
}

impl Default for ApplierConfig {
    fn default() -> Self {
        Self {
            default_namespace: "cattle-system".to_string(),
            field_manager: "rancher-integrator".to_string(),
        }
    }
}

impl ApplierConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `MANIFEST_NAMESPACE`: namespace for namespaced objects without one
    /// - `FIELD_MANAGER`: field manager name for server-side apply
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("MANIFEST_NAMESPACE") {
            config.default_namespace = val;
        }
        if let Ok(val) = std::env::var("FIELD_MANAGER") {
            config.field_manager = val;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_cattle_system() {
        let config = ApplierConfig::default();
        assert_eq!(config.default_namespace, "cattle-system");
        assert_eq!(config.field_manager, "rancher-integrator");
    }
}
