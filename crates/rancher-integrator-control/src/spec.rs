//! Process specification of the sidecar.
//!
//! A [`ProcessSpec`] is derived from the current configuration, the pinned
//! cluster name and the command to run. It is never persisted: every
//! reconciliation rebuilds it and compares it with what the supervisor holds.

use std::collections::BTreeMap;

use rancher_integrator_core::{ClusterName, IntegratorConfig, SidecarCommand};
use serde::{Deserialize, Serialize};

/// Prefix of every environment variable the sidecar reads.
pub const ENV_PREFIX: &str = "RANCHER_INTEGRATOR_";

/// Environment keys, without [`ENV_PREFIX`].
pub mod keys {
    /// Always `True`: the sidecar waits for the remote platform to settle.
    pub const WAIT: &str = "WAIT";
    /// Certificate verification flag, passed through verbatim.
    pub const CERT_CHECK: &str = "CERT_CHECK";
    /// Address of the remote platform.
    pub const URL: &str = "URL";
    /// First half of the bearer token.
    pub const USERNAME: &str = "USERNAME";
    /// Second half of the bearer token.
    pub const PASSWORD: &str = "PASSWORD";
    /// Name the cluster is registered under.
    pub const CLUSTER_NAME: &str = "CLUSTER_NAME";
}

/// Command and environment of the sidecar process.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// What the sidecar is asked to do.
    pub command: SidecarCommand,
    /// Full environment, keys including [`ENV_PREFIX`].
    pub environment: BTreeMap<String, String>,
}

impl ProcessSpec {
    /// Look up an environment value by its unprefixed key.
    #[must_use]
    pub fn env(&self, key: &str) -> Option<&str> {
        self.environment
            .get(&format!("{ENV_PREFIX}{key}"))
            .map(String::as_str)
    }

    /// Shell command line that runs this spec with the given entrypoint.
    #[must_use]
    pub fn command_line(&self, entrypoint: &str) -> String {
        format!("{entrypoint} {}", self.command.verb())
    }
}

impl std::fmt::Debug for ProcessSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let password_key = format!("{ENV_PREFIX}{}", keys::PASSWORD);
        let environment: BTreeMap<&str, &str> = self
            .environment
            .iter()
            .map(|(k, v)| {
                let shown = if *k == password_key { "<redacted>" } else { v.as_str() };
                (k.as_str(), shown)
            })
            .collect();

        f.debug_struct("ProcessSpec")
            .field("command", &self.command)
            .field("environment", &environment)
            .finish()
    }
}

/// Build the sidecar specification for a command.
///
/// Credentials are only emitted when the bearer token splits into exactly
/// two parts; optional values are left out rather than set to empty strings.
#[must_use]
pub fn build_process_spec(
    config: &IntegratorConfig,
    cluster_name: Option<&ClusterName>,
    command: SidecarCommand,
) -> ProcessSpec {
    let mut environment = BTreeMap::new();
    let mut set = |key: &str, value: &str| {
        environment.insert(format!("{ENV_PREFIX}{key}"), value.to_string());
    };

    set(keys::WAIT, "True");
    set(keys::CERT_CHECK, &config.cert_verify);
    if let Some(url) = &config.url {
        set(keys::URL, url);
    }
    if let Some(credentials) = config.credentials() {
        set(keys::USERNAME, &credentials.username);
        set(keys::PASSWORD, &credentials.password);
    }
    if let Some(name) = cluster_name {
        set(keys::CLUSTER_NAME, name.as_str());
    }

    ProcessSpec {
        command,
        environment,
    }
}
