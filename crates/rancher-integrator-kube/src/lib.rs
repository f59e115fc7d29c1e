//! Kubernetes manifest applier for rancher-integrator.
//!
//! This crate provides the [`ManifestApplier`] trait and the [`KubeApplier`]
//! implementation that installs (and removes) the import manifest handed out
//! by the remote platform. It handles:
//!
//! - Splitting multi-document YAML into individual objects
//! - Resolving each object's resource type through API discovery
//! - Server-side apply, with namespaced objects defaulting to `cattle-system`
//! - Classifying failures so that permission problems get a remediation hint
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   Registration Controller                        │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │ apply / delete
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        KubeApplier                               │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────────┐   │
//! │  │  Manifest   │ │  Discovery  │ │    Server-side apply    │   │
//! │  │  parser     │ │  (pinned)   │ │    / delete             │   │
//! │  └─────────────┘ └─────────────┘ └─────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Kubernetes API Server                         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use rancher_integrator_kube::{ApplierConfig, KubeApplier, ManifestApplier};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let applier = KubeApplier::new(ApplierConfig::default()).await?;
//!
//! let manifest = "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: cattle-system\n";
//! applier.apply(manifest).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Testing
//!
//! For testing without a real Kubernetes cluster, enable the `test-utils` feature
//! and use the mock applier:
//!
//! ```ignore
//! use rancher_integrator_kube::{ManifestApplier, MockApplier, MockFailure};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let applier = MockApplier::new();
//! applier.fail_apply(Some(MockFailure::Forbidden));
//!
//! assert!(applier.apply("kind: Namespace").await.is_err());
//! assert_eq!(applier.apply_calls(), 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod k8s;
pub mod manifest;
pub mod types;

pub use error::{ApplyError, Result};
pub use k8s::{KubeApplier, ManifestApplier};
pub use manifest::{parse_manifest, ManifestObject};
pub use types::ApplierConfig;

#[cfg(any(test, feature = "test-utils"))]
pub use k8s::mock::{MockApplier, MockFailure};
