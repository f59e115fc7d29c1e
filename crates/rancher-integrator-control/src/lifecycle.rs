//! Registration lifecycle.
//!
//! Each state is its own type and transitions consume the state they leave,
//! so an operation that is invalid in a state has no method to call.
//!
//! # State Machine
//!
//! ```text
//!     ┌──────────────┐   begin    ┌──────────────┐   stage    ┌──────────┐
//!     │ Unregistered │───────────▶│ Registering  │───────────▶│  Staged  │
//!     └──────────────┘            └──────────────┘            └────┬─────┘
//!        ▲    ▲   ▲                 │ rollback │ fail              │
//!        │    │   └─────────────────┘          │                   │ commit
//!        │    └────────────────────────────────┘                   │
//!        │             abandon (from Staged)                       ▼
//!        │                                                   ┌────────────┐
//!        └───────────────────── unregister ──────────────────│ Registered │
//!                                                            └────────────┘
//! ```
//!
//! Only [`Unregistered`] and [`Registered`] are persisted as resting states;
//! [`Registering`] and [`Staged`] exist while a register action runs.

use rancher_integrator_core::ClusterName;
use rancher_integrator_store::RegistrationRecord;
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};

/// Coarse phase, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPhase {
    /// No registration in effect.
    #[default]
    Unregistered,
    /// A register action is in progress.
    Registering,
    /// The cluster is registered.
    Registered,
}

/// Not registered. May carry a pinned name (while an attempt is under way)
/// and a manifest left by an earlier attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Unregistered {
    pinned: Option<ClusterName>,
    manifest: Option<String>,
}

impl Unregistered {
    /// Name the next registration will use, if one is pinned.
    #[must_use]
    pub fn pinned(&self) -> Option<&ClusterName> {
        self.pinned.as_ref()
    }

    /// Manifest left by an earlier attempt.
    #[must_use]
    pub fn manifest(&self) -> Option<&str> {
        self.manifest.as_deref()
    }

    /// Start registering. `requested` is pinned only if nothing is pinned yet.
    #[must_use]
    pub fn begin(self, requested: Option<ClusterName>) -> Registering {
        let name = self.pinned.clone().or(requested);
        Registering {
            previous: self,
            name,
        }
    }

    /// Record form of this state.
    #[must_use]
    pub fn to_record(&self) -> RegistrationRecord {
        RegistrationRecord {
            cluster_name: self.pinned.clone(),
            manifest: self.manifest.clone(),
            registered: false,
            updated_at: None,
        }
    }
}

/// A register action is running; the sidecar may have been asked to register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registering {
    previous: Unregistered,
    name: Option<ClusterName>,
}

impl Registering {
    /// Name in use for this attempt.
    #[must_use]
    pub fn name(&self) -> Option<&ClusterName> {
        self.name.as_ref()
    }

    /// Undo the attempt as if it never started.
    #[must_use]
    pub fn rollback(self) -> Unregistered {
        self.previous
    }

    /// The attempt failed. The name is released so the next attempt can
    /// choose again; a manifest from an earlier attempt is kept.
    #[must_use]
    pub fn fail(self) -> Unregistered {
        Unregistered {
            pinned: None,
            manifest: self.previous.manifest,
        }
    }

    /// The manifest arrived. The name derived from the artifact wins over the
    /// pinned one.
    #[must_use]
    pub fn stage(self, name: ClusterName, manifest: String) -> Staged {
        Staged { name, manifest }
    }

    /// Record form of this state.
    #[must_use]
    pub fn to_record(&self) -> RegistrationRecord {
        RegistrationRecord {
            cluster_name: self.name.clone(),
            manifest: self.previous.manifest.clone(),
            registered: false,
            updated_at: None,
        }
    }
}

/// The manifest is known but not yet applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staged {
    name: ClusterName,
    manifest: String,
}

impl Staged {
    /// Name the cluster is being registered under.
    #[must_use]
    pub fn name(&self) -> &ClusterName {
        &self.name
    }

    /// Manifest to apply.
    #[must_use]
    pub fn manifest(&self) -> &str {
        &self.manifest
    }

    /// The manifest was applied.
    #[must_use]
    pub fn commit(self) -> Registered {
        Registered {
            name: self.name,
            manifest: self.manifest,
        }
    }

    /// Applying failed. The name is released, the manifest is kept.
    #[must_use]
    pub fn abandon(self) -> Unregistered {
        Unregistered {
            pinned: None,
            manifest: Some(self.manifest),
        }
    }

    /// Record form of this state.
    #[must_use]
    pub fn to_record(&self) -> RegistrationRecord {
        RegistrationRecord {
            cluster_name: Some(self.name.clone()),
            manifest: Some(self.manifest.clone()),
            registered: false,
            updated_at: None,
        }
    }
}

/// Registered; name and manifest are always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registered {
    name: ClusterName,
    manifest: String,
}

impl Registered {
    /// Name the cluster is registered under.
    #[must_use]
    pub fn name(&self) -> &ClusterName {
        &self.name
    }

    /// Manifest that was applied.
    #[must_use]
    pub fn manifest(&self) -> &str {
        &self.manifest
    }

    /// Begin unregistering.
    ///
    /// Returns the manifest to delete alongside the new state; name and
    /// manifest are cleared whether or not the deletion succeeds.
    #[must_use]
    pub fn unregister(self) -> (Unregistered, String) {
        (Unregistered::default(), self.manifest)
    }

    /// Record form of this state.
    #[must_use]
    pub fn to_record(&self) -> RegistrationRecord {
        RegistrationRecord {
            cluster_name: Some(self.name.clone()),
            manifest: Some(self.manifest.clone()),
            registered: true,
            updated_at: None,
        }
    }
}

/// Resting state of the registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// Not registered.
    Unregistered(Unregistered),
    /// Registered.
    Registered(Registered),
}

impl Default for Registration {
    fn default() -> Self {
        Self::Unregistered(Unregistered::default())
    }
}

impl Registration {
    /// Rebuild the state from a persisted record.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::CorruptState`] if the record claims to be
    /// registered without a name or manifest.
    pub fn from_record(record: &RegistrationRecord) -> Result<Self> {
        if !record.registered {
            return Ok(Self::Unregistered(Unregistered {
                pinned: record.cluster_name.clone(),
                manifest: record.manifest.clone(),
            }));
        }

        match (&record.cluster_name, &record.manifest) {
            (Some(name), Some(manifest)) if !manifest.is_empty() => {
                Ok(Self::Registered(Registered {
                    name: name.clone(),
                    manifest: manifest.clone(),
                }))
            }
            (None, _) => Err(ControlError::CorruptState(
                "registered without a cluster name".to_string(),
            )),
            _ => Err(ControlError::CorruptState(
                "registered without a manifest".to_string(),
            )),
        }
    }

    /// Record form of this state.
    #[must_use]
    pub fn to_record(&self) -> RegistrationRecord {
        match self {
            Self::Unregistered(state) => state.to_record(),
            Self::Registered(state) => state.to_record(),
        }
    }

    /// Reporting phase.
    #[must_use]
    pub const fn phase(&self) -> RegistrationPhase {
        match self {
            Self::Unregistered(_) => RegistrationPhase::Unregistered,
            Self::Registered(_) => RegistrationPhase::Registered,
        }
    }

    /// Current cluster name: the registered one or the pinned one.
    #[must_use]
    pub fn cluster_name(&self) -> Option<&ClusterName> {
        match self {
            Self::Unregistered(state) => state.pinned(),
            Self::Registered(state) => Some(state.name()),
        }
    }

    /// Returns true if registered.
    #[must_use]
    pub const fn is_registered(&self) -> bool {
        matches!(self, Self::Registered(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ClusterName {
        ClusterName::new(s).unwrap()
    }

    #[test]
    fn requested_name_is_pinned_when_none_is() {
        let registering = Unregistered::default().begin(Some(name("alpha")));
        assert_eq!(registering.name(), Some(&name("alpha")));
    }

    #[test]
    fn pinned_name_beats_requested_name() {
        let unregistered = Unregistered {
            pinned: Some(name("alpha")),
            manifest: None,
        };
        let registering = unregistered.begin(Some(name("beta")));
        assert_eq!(registering.name(), Some(&name("alpha")));
    }

    #[test]
    fn rollback_drops_requested_name() {
        let unregistered = Unregistered::default().begin(Some(name("alpha"))).rollback();
        assert_eq!(unregistered.pinned(), None);
    }

    #[test]
    fn failure_releases_name_and_keeps_manifest() {
        let previous = Unregistered {
            pinned: None,
            manifest: Some("old".to_string()),
        };
        let unregistered = previous.begin(Some(name("alpha"))).fail();
        assert_eq!(unregistered.pinned(), None);
        assert_eq!(unregistered.manifest(), Some("old"));

        let again = unregistered.begin(Some(name("beta")));
        assert_eq!(again.name(), Some(&name("beta")));
    }

    #[test]
    fn derived_name_wins_at_staging() {
        let staged = Unregistered::default()
            .begin(Some(name("requested")))
            .stage(name("derived"), "kind: List".to_string());
        assert_eq!(staged.name(), &name("derived"));

        let registered = staged.commit();
        let record = registered.to_record();
        assert!(record.registered);
        assert_eq!(record.cluster_name, Some(name("derived")));
        assert_eq!(record.manifest.as_deref(), Some("kind: List"));
    }

    #[test]
    fn abandon_keeps_manifest_and_releases_name() {
        let unregistered = Unregistered::default()
            .begin(None)
            .stage(name("c1"), "m".to_string())
            .abandon();
        let record = unregistered.to_record();
        assert!(!record.registered);
        assert_eq!(record.manifest.as_deref(), Some("m"));
        assert_eq!(record.cluster_name, None);
    }

    #[test]
    fn unregister_clears_everything() {
        let registered = Unregistered::default()
            .begin(None)
            .stage(name("c1"), "m".to_string())
            .commit();
        let (unregistered, manifest) = registered.unregister();
        assert_eq!(manifest, "m");
        assert!(unregistered.to_record().is_empty());
    }

    #[test]
    fn record_round_trip_preserves_phase() {
        let registered = Registration::Registered(
            Unregistered::default()
                .begin(None)
                .stage(name("c1"), "m".to_string())
                .commit(),
        );
        let restored = Registration::from_record(&registered.to_record()).unwrap();
        assert_eq!(restored, registered);
        assert_eq!(restored.phase(), RegistrationPhase::Registered);
        assert_eq!(restored.cluster_name(), Some(&name("c1")));

        let empty = Registration::from_record(&RegistrationRecord::default()).unwrap();
        assert_eq!(empty.phase(), RegistrationPhase::Unregistered);
    }

    #[test]
    fn registered_record_without_manifest_is_corrupt() {
        let record = RegistrationRecord {
            cluster_name: Some(name("c1")),
            manifest: None,
            registered: true,
            updated_at: None,
        };
        assert!(matches!(
            Registration::from_record(&record),
            Err(ControlError::CorruptState(_))
        ));

        let record = RegistrationRecord {
            cluster_name: None,
            manifest: Some("m".to_string()),
            registered: true,
            updated_at: None,
        };
        assert!(matches!(
            Registration::from_record(&record),
            Err(ControlError::CorruptState(_))
        ));
    }
}
