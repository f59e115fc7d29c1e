//! Error types for the applier crate.

use thiserror::Error;

/// Instruction shown to the operator when the controller lacks permission to
/// install the import manifest.
pub const PERMISSION_REMEDIATION: &str = "the controller's service account needs \
    cluster-scoped permissions to install the import manifest; grant it cluster-wide \
    trust (for example a ClusterRoleBinding to cluster-admin) and run register again";

/// Errors that can occur while applying or deleting a manifest.
#[derive(Error, Debug)]
pub enum ApplyError {
    /// The API server refused the request (HTTP 403).
    #[error("permission denied for {resource}: {message}")]
    Forbidden {
        /// The object the request was about, as `Kind/name`.
        resource: String,
        /// Message returned by the API server.
        message: String,
    },

    /// The API server rejected the request with a non-permission status.
    #[error("Kubernetes API rejected {resource} ({code}): {message}")]
    Rejected {
        /// The object the request was about, as `Kind/name`.
        resource: String,
        /// HTTP status code.
        code: u16,
        /// Message returned by the API server.
        message: String,
    },

    /// The request did not produce an API response (transport, discovery, ...).
    #[error("Kubernetes API error for {resource}: {source}")]
    Api {
        /// The object the request was about, as `Kind/name`.
        resource: String,
        /// Underlying client error.
        #[source]
        source: kube::Error,
    },

    /// The manifest could not be parsed into Kubernetes objects.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
}

impl ApplyError {
    /// Classify a client error raised while handling `resource`.
    #[must_use]
    pub fn from_kube(resource: impl Into<String>, err: kube::Error) -> Self {
        let resource = resource.into();
        match err {
            kube::Error::Api(response) if response.code == 403 => Self::Forbidden {
                resource,
                message: response.message,
            },
            kube::Error::Api(response) => Self::Rejected {
                resource,
                code: response.code,
                message: response.message,
            },
            source => Self::Api { resource, source },
        }
    }

    /// Check if this error is a permission failure.
    #[must_use]
    pub const fn is_permission_denied(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }

    /// Remediation the operator should follow, if there is a specific one.
    #[must_use]
    pub const fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::Forbidden { .. } => Some(PERMISSION_REMEDIATION),
            _ => None,
        }
    }

    /// Check if this error is retriable.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Api { .. } => true,
            Self::Rejected { code, .. } => *code >= 500 || *code == 429,
            Self::Forbidden { .. } | Self::InvalidManifest(_) => false,
        }
    }
}

/// A specialized Result type for applier operations.
pub type Result<T> = std::result::Result<T, ApplyError>;

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("status {code}"),
            reason: "Test".to_string(),
            code,
        })
    }

    #[test]
    fn forbidden_is_classified() {
        let err = ApplyError::from_kube("ClusterRole/cattle-admin", api_error(403));
        assert!(err.is_permission_denied());
        assert_eq!(err.remediation(), Some(PERMISSION_REMEDIATION));
        assert!(!err.is_retriable());
    }

    #[test]
    fn other_status_is_rejected() {
        let err = ApplyError::from_kube("Deployment/cattle-cluster-agent", api_error(422));
        match &err {
            ApplyError::Rejected { code, resource, .. } => {
                assert_eq!(*code, 422);
                assert_eq!(resource, "Deployment/cattle-cluster-agent");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
        assert!(err.remediation().is_none());
        assert!(!err.is_retriable());

        assert!(ApplyError::from_kube("Namespace/x", api_error(503)).is_retriable());
    }
}
