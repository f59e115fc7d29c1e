//! Domain types stored in the database.

use chrono::{DateTime, Utc};
use rancher_integrator_core::ClusterName;
use serde::{Deserialize, Serialize};

/// The durable registration record.
///
/// `registered == true` implies both `cluster_name` and `manifest` are set.
/// The store does not enforce this; the controller validates it when it loads
/// the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    /// Name the cluster is (or is about to be) registered under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<ClusterName>,

    /// Import manifest returned by the remote platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,

    /// Whether a register completed and has not been undone.
    #[serde(default)]
    pub registered: bool,

    /// Last modification timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RegistrationRecord {
    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cluster_name.is_none() && self.manifest.is_none() && !self.registered
    }

    /// Returns the record with `updated_at` set to now.
    #[must_use]
    pub fn touched(mut self) -> Self {
        self.updated_at = Some(Utc::now());
        self
    }
}
