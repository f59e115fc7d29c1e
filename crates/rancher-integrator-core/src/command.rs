//! Commands understood by the registration sidecar.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The operation the sidecar is asked to run to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SidecarCommand {
    /// Check connectivity and credentials against the remote platform.
    Verify,
    /// Register this cluster and write its import manifest.
    Register,
    /// Remove this cluster from the remote platform.
    Unregister,
}

impl SidecarCommand {
    /// The verb passed on the sidecar's command line.
    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Verify => "verify",
            Self::Register => "register",
            Self::Unregister => "delete",
        }
    }
}

impl fmt::Display for SidecarCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Verify => "verify",
            Self::Register => "register",
            Self::Unregister => "unregister",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregister_maps_to_delete_verb() {
        assert_eq!(SidecarCommand::Verify.verb(), "verify");
        assert_eq!(SidecarCommand::Register.verb(), "register");
        assert_eq!(SidecarCommand::Unregister.verb(), "delete");
        assert_eq!(SidecarCommand::Unregister.to_string(), "unregister");
    }
}
