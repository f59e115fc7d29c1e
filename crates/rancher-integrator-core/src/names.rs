//! Cluster naming.
//!
//! A cluster is registered with the remote platform under a single name. The
//! name either comes from the `register` action or is read back from the import
//! manifest the sidecar writes (`import_<name>.yaml`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum accepted length of a cluster name.
pub const MAX_NAME_LEN: usize = 253;

/// The name under which the cluster is registered with the remote platform.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClusterName(String);

impl ClusterName {
    /// Validate and wrap a cluster name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, too long, contains whitespace or
    /// path separators.
    pub fn new(name: impl Into<String>) -> Result<Self, NameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(NameError::Empty);
        }
        if name.len() > MAX_NAME_LEN {
            return Err(NameError::TooLong {
                max: MAX_NAME_LEN,
                got: name.len(),
            });
        }
        if let Some(c) = name
            .chars()
            .find(|c| c.is_whitespace() || c.is_control() || *c == '/' || *c == '\\')
        {
            return Err(NameError::InvalidCharacter(c));
        }
        Ok(Self(name))
    }

    /// Build a cluster name from the stem of an artifact file name, i.e. what
    /// remains once the artifact prefix and extension are stripped.
    ///
    /// # Errors
    ///
    /// Returns an error if the stem is not a valid cluster name.
    pub fn from_artifact_stem(stem: &str) -> Result<Self, NameError> {
        Self::new(stem)
    }

    /// Return the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ClusterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClusterName({})", self.0)
    }
}

impl fmt::Display for ClusterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ClusterName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ClusterName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ClusterName> for String {
    fn from(name: ClusterName) -> Self {
        name.0
    }
}

impl AsRef<str> for ClusterName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur when validating a cluster name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    /// The name was empty.
    #[error("cluster name must not be empty")]
    Empty,

    /// The name exceeded the maximum length.
    #[error("cluster name too long: max {max} characters, got {got}")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length.
        got: usize,
    },

    /// The name contained a character that cannot appear in a cluster name.
    #[error("cluster name contains invalid character {0:?}")]
    InvalidCharacter(char),
}
