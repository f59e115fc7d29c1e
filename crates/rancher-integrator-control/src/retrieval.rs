//! Polling for the import manifest.
//!
//! After a register command the sidecar writes `import_<name>.yaml` into the
//! artifact directory at some point. The loop polls until exactly one such
//! file exists, then reads it and derives the cluster name from its file name.

use std::path::{Path, PathBuf};

use rancher_integrator_core::{ClusterName, NameError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::retry::{Attempt, RetryError, RetryPolicy};
use crate::supervisor::{ArtifactFile, ArtifactPattern, Supervisor, SupervisorError};

/// Errors of the retrieval loop.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// No single matching artifact appeared in time.
    #[error("import manifest not available after {attempts} attempts")]
    Timeout {
        /// Number of polls made.
        attempts: u32,
    },

    /// Listing or reading the artifact failed.
    #[error("cannot read import manifest: {0}")]
    Io(#[source] SupervisorError),

    /// The artifact name does not yield a valid cluster name.
    #[error("artifact {file} does not name a valid cluster: {source}")]
    InvalidName {
        /// Offending file name.
        file: String,
        /// Why the derived name was rejected.
        #[source]
        source: NameError,
    },
}

/// The artifact found by the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedManifest {
    /// File content.
    pub content: String,
    /// Cluster name derived from the file name.
    pub cluster_name: ClusterName,
    /// Where the file was found.
    pub path: PathBuf,
}

/// Poll `dir` for exactly one file matching `pattern`.
///
/// Zero matches, several matches and a single blank file are all "not yet":
/// the loop sleeps one interval and polls again until the policy runs out.
///
/// # Errors
///
/// Returns [`RetrievalError::Timeout`] when the attempts run out,
/// [`RetrievalError::Io`] on the first listing or read failure, and
/// [`RetrievalError::InvalidName`] if the file name cannot name a cluster.
pub async fn retrieve_manifest(
    supervisor: &dyn Supervisor,
    dir: &Path,
    pattern: &ArtifactPattern,
    policy: &RetryPolicy,
) -> Result<RetrievedManifest, RetrievalError> {
    let (file, content) = policy
        .run(move |attempt| poll_once(supervisor, dir, pattern, attempt))
        .await
        .map_err(|e| match e {
            RetryError::Exhausted { attempts } => RetrievalError::Timeout { attempts },
            RetryError::Fatal(e) => e,
        })?;

    let stem = pattern.stem(&file.name).unwrap_or(&file.name);
    let cluster_name =
        ClusterName::from_artifact_stem(stem).map_err(|source| RetrievalError::InvalidName {
            file: file.name.clone(),
            source,
        })?;

    info!(
        path = %file.path.display(),
        cluster_name = %cluster_name,
        bytes = content.len(),
        "Retrieved import manifest"
    );

    Ok(RetrievedManifest {
        content,
        cluster_name,
        path: file.path,
    })
}

async fn poll_once(
    supervisor: &dyn Supervisor,
    dir: &Path,
    pattern: &ArtifactPattern,
    attempt: u32,
) -> Attempt<(ArtifactFile, String), RetrievalError> {
    let files = match supervisor.list_files(dir, pattern).await {
        Ok(files) => files,
        Err(e) => return Attempt::Fatal(RetrievalError::Io(e)),
    };

    match files.as_slice() {
        [file] => match supervisor.read_file(&file.path).await {
            Ok(content) if content.trim().is_empty() => {
                debug!(attempt, path = %file.path.display(), "Import manifest still empty");
                Attempt::Pending
            }
            Ok(content) => Attempt::Ready((file.clone(), content)),
            Err(e) => Attempt::Fatal(RetrievalError::Io(e)),
        },
        [] => {
            debug!(attempt, %pattern, "Import manifest not written yet");
            Attempt::Pending
        }
        many => {
            warn!(
                attempt,
                matches = many.len(),
                %pattern,
                "Several import manifests found, waiting for exactly one"
            );
            Attempt::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::supervisor::mock::MockSupervisor;

    const DIR: &str = "/usr/src/app/import_manifest";

    fn policy() -> RetryPolicy {
        RetryPolicy::new(5, Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn single_match_is_returned_with_derived_name() {
        let supervisor = MockSupervisor::new();
        supervisor.set_file(format!("{DIR}/import_mycluster.yaml"), "manifest-bytes");

        let found = retrieve_manifest(
            &supervisor,
            Path::new(DIR),
            &ArtifactPattern::import_manifest(),
            &policy(),
        )
        .await
        .unwrap();

        assert_eq!(found.content, "manifest-bytes");
        assert_eq!(found.cluster_name.as_str(), "mycluster");
        assert_eq!(supervisor.list_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_match_times_out() {
        let supervisor = MockSupervisor::new();

        let err = retrieve_manifest(
            &supervisor,
            Path::new(DIR),
            &ArtifactPattern::import_manifest(),
            &policy(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RetrievalError::Timeout { attempts: 5 }));
        assert_eq!(supervisor.list_calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn multiple_matches_keep_polling() {
        let supervisor = MockSupervisor::new();
        supervisor.set_file(format!("{DIR}/import_a.yaml"), "a");
        supervisor.set_file(format!("{DIR}/import_b.yaml"), "b");

        let err = retrieve_manifest(
            &supervisor,
            Path::new(DIR),
            &ArtifactPattern::import_manifest(),
            &policy(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RetrievalError::Timeout { .. }));
        assert_eq!(supervisor.list_calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_file_keeps_polling() {
        let supervisor = MockSupervisor::new();
        supervisor.set_file(format!("{DIR}/import_mycluster.yaml"), " \n");

        let err = retrieve_manifest(
            &supervisor,
            Path::new(DIR),
            &ArtifactPattern::import_manifest(),
            &policy(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RetrievalError::Timeout { attempts: 5 }));
        assert_eq!(supervisor.list_calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn listing_error_aborts_immediately() {
        let supervisor = MockSupervisor::new();
        supervisor.set_list_error(true);

        let err = retrieve_manifest(
            &supervisor,
            Path::new(DIR),
            &ArtifactPattern::import_manifest(),
            &policy(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RetrievalError::Io(_)));
        assert_eq!(supervisor.list_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unrelated_files_are_ignored() {
        let supervisor = MockSupervisor::new();
        supervisor.set_file(format!("{DIR}/README.md"), "docs");
        supervisor.set_file(format!("{DIR}/import_edge-01.yaml"), "kind: List");

        let found = retrieve_manifest(
            &supervisor,
            Path::new(DIR),
            &ArtifactPattern::import_manifest(),
            &policy(),
        )
        .await
        .unwrap();

        assert_eq!(found.cluster_name.as_str(), "edge-01");
    }
}
