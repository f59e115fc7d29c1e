//! Core types and utilities for rancher-integrator.
//!
//! This crate provides the foundational types shared by the other crates:
//!
//! - **Names**: the validated [`ClusterName`] under which the cluster is registered
//! - **Configuration**: the declarative [`IntegratorConfig`] and the
//!   [`Credentials`] decoded from its bearer token
//! - **Commands**: the [`SidecarCommand`] verbs understood by the sidecar
//!
//! # Example
//!
//! ```
//! use rancher_integrator_core::{ClusterName, IntegratorConfig};
//!
//! let config = IntegratorConfig::default();
//! let credentials = config.credentials().unwrap();
//! assert_eq!(credentials.username, "change");
//!
//! let name = ClusterName::from_artifact_stem("mycluster").unwrap();
//! assert_eq!(name.as_str(), "mycluster");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod command;
pub mod config;
pub mod names;

pub use command::SidecarCommand;
pub use config::{Credentials, IntegratorConfig};
pub use names::{ClusterName, NameError};
