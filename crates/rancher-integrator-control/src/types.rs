//! Configuration and request/response types for the controller.

use std::path::PathBuf;
use std::time::Duration;

use rancher_integrator_kube::ApplierConfig;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Request body of the register action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Name to register the cluster under. Ignored if a name is already pinned.
    #[serde(default)]
    pub name: Option<String>,
}

/// Response returned when an action has been queued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionAccepted {
    /// Identifier to poll the action with.
    pub id: u64,
}

/// Configuration for the controller daemon.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Address the HTTP surface binds to.
    pub listen_addr: String,
    /// Directory of the registration database.
    pub data_dir: PathBuf,
    /// Directory the sidecar writes the import manifest into.
    pub artifact_dir: PathBuf,
    /// File the sidecar writes its errors to.
    pub error_log_path: PathBuf,
    /// Number of polls for the import manifest before giving up.
    pub retrieval_max_attempts: u32,
    /// Pause between two polls (milliseconds).
    pub retrieval_interval_ms: u64,
    /// Delay before a deferred trigger is delivered again (milliseconds).
    pub defer_delay_ms: u64,
    /// Kubernetes applier settings.
    pub applier: ApplierConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            data_dir: PathBuf::from("/data"),
            artifact_dir: PathBuf::from("/usr/src/app/import_manifest"),
            error_log_path: PathBuf::from("/usr/src/app/error.log"),
            retrieval_max_attempts: 5,
            retrieval_interval_ms: 1000,
            defer_delay_ms: 5000,
            applier: ApplierConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `LISTEN_ADDR`: HTTP listen address
    /// - `DATA_DIR`: registration database directory
    /// - `ARTIFACT_DIR`: directory polled for `import_<name>.yaml`
    /// - `ERROR_LOG_PATH`: sidecar error log
    /// - `RETRIEVAL_MAX_ATTEMPTS`: manifest polls before timing out
    /// - `RETRIEVAL_INTERVAL_MS`: pause between polls
    /// - `DEFER_DELAY_MS`: re-delivery delay for deferred triggers
    /// - `MANIFEST_NAMESPACE`, `FIELD_MANAGER`: see [`ApplierConfig::from_env`]
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self {
            applier: ApplierConfig::from_env(),
            ..Self::default()
        };

        if let Ok(val) = std::env::var("LISTEN_ADDR") {
            config.listen_addr = val;
        }
        if let Ok(val) = std::env::var("DATA_DIR") {
            config.data_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("ARTIFACT_DIR") {
            config.artifact_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("ERROR_LOG_PATH") {
            config.error_log_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("RETRIEVAL_MAX_ATTEMPTS") {
            if let Ok(n) = val.parse() {
                config.retrieval_max_attempts = n;
            }
        }
        if let Ok(val) = std::env::var("RETRIEVAL_INTERVAL_MS") {
            if let Ok(n) = val.parse() {
                config.retrieval_interval_ms = n;
            }
        }
        if let Ok(val) = std::env::var("DEFER_DELAY_MS") {
            if let Ok(n) = val.parse() {
                config.defer_delay_ms = n;
            }
        }

        config
    }

    /// Retry policy of the manifest retrieval loop.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retrieval_max_attempts,
            Duration::from_millis(self.retrieval_interval_ms),
        )
    }

    /// Delay before a deferred trigger is delivered again.
    #[must_use]
    pub const fn defer_delay(&self) -> Duration {
        Duration::from_millis(self.defer_delay_ms)
    }
}

/// Configuration of the locally supervised sidecar process.
#[derive(Debug, Clone)]
pub struct SidecarConfig {
    /// Command the sidecar verb is appended to.
    pub entrypoint: String,
    /// Working directory of the sidecar.
    pub workdir: PathBuf,
    /// How long to wait after starting before the error log is read (milliseconds).
    pub startup_grace_ms: u64,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            entrypoint: "python3 ./rancher-integrator.py".to_string(),
            workdir: PathBuf::from("/usr/src/app"),
            startup_grace_ms: 2000,
        }
    }
}

impl SidecarConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `SIDECAR_ENTRYPOINT`: command line prefix of the sidecar
    /// - `SIDECAR_WORKDIR`: working directory of the sidecar
    /// - `SIDECAR_STARTUP_GRACE_MS`: wait after start before reading errors
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SIDECAR_ENTRYPOINT") {
            config.entrypoint = val;
        }
        if let Ok(val) = std::env::var("SIDECAR_WORKDIR") {
            config.workdir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("SIDECAR_STARTUP_GRACE_MS") {
            if let Ok(n) = val.parse() {
                config.startup_grace_ms = n;
            }
        }

        config
    }

    /// Startup grace period.
    #[must_use]
    pub const fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_config_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.retrieval_max_attempts, 5);
        assert_eq!(config.retrieval_interval_ms, 1000);
        assert_eq!(
            config.artifact_dir,
            PathBuf::from("/usr/src/app/import_manifest")
        );
        assert_eq!(config.applier.default_namespace, "cattle-system");

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.interval, Duration::from_secs(1));
    }

    #[test]
    fn sidecar_config_defaults() {
        let config = SidecarConfig::default();
        assert_eq!(config.entrypoint, "python3 ./rancher-integrator.py");
        assert_eq!(config.startup_grace(), Duration::from_secs(2));
    }

    #[test]
    fn register_request_name_is_optional() {
        let req: RegisterRequest = serde_json::from_str("{}").unwrap();
        assert!(req.name.is_none());

        let req: RegisterRequest = serde_json::from_str(r#"{"name":"mycluster"}"#).unwrap();
        assert_eq!(req.name.as_deref(), Some("mycluster"));
    }
}
