//! Declarative configuration supplied by the operator.
//!
//! The configuration surface has three keys: `url`, `bearer-token` and
//! `cert-verify`. It is read-only to the controller; every reconciliation takes
//! a fresh snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration of the remote platform connection.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IntegratorConfig {
    /// Base address of the remote platform.
    #[serde(default)]
    pub url: Option<String>,

    /// API credentials in `username:password` form.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Whether the sidecar verifies the remote platform's certificate
    /// (`"True"` / `"False"`). Passed to the sidecar verbatim.
    #[serde(default = "IntegratorConfig::default_cert_verify")]
    pub cert_verify: String,
}

impl IntegratorConfig {
    fn default_cert_verify() -> String {
        "True".to_string()
    }

    /// Decode the bearer token into credentials.
    ///
    /// Returns `None` when no token is configured or the token is malformed.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        self.bearer_token
            .as_deref()
            .and_then(Credentials::from_bearer_token)
    }
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            url: Some("changeme".to_string()),
            bearer_token: Some("change:me".to_string()),
            cert_verify: Self::default_cert_verify(),
        }
    }
}

impl fmt::Debug for IntegratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegratorConfig")
            .field("url", &self.url)
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "<redacted>"),
            )
            .field("cert_verify", &self.cert_verify)
            .finish()
    }
}

/// Username and password decoded from a bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// The part before the colon.
    pub username: String,
    /// The part after the colon.
    pub password: String,
}

impl Credentials {
    /// Split a `username:password` token.
    ///
    /// The token is only decomposed when it contains exactly one colon;
    /// anything else yields `None`.
    #[must_use]
    pub fn from_bearer_token(token: &str) -> Option<Self> {
        let mut parts = token.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(username), Some(password), None) => Some(Self {
                username: username.to_string(),
                password: password.to_string(),
            }),
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_charm_defaults() {
        let config = IntegratorConfig::default();
        assert_eq!(config.url.as_deref(), Some("changeme"));
        assert_eq!(config.bearer_token.as_deref(), Some("change:me"));
        assert_eq!(config.cert_verify, "True");
    }

    #[test]
    fn token_with_one_colon_splits() {
        let creds = Credentials::from_bearer_token("change:me").unwrap();
        assert_eq!(creds.username, "change");
        assert_eq!(creds.password, "me");
    }

    #[test]
    fn token_without_colon_is_rejected() {
        assert!(Credentials::from_bearer_token("nocolon").is_none());
    }

    #[test]
    fn token_with_two_colons_is_rejected() {
        assert!(Credentials::from_bearer_token("a:b:c").is_none());
    }

    #[test]
    fn deserializes_kebab_case_keys() {
        let json = r#"{"url": "https://rancher.example.com", "bearer-token": "token-abc:secret", "cert-verify": "False"}"#;
        let config: IntegratorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.url.as_deref(), Some("https://rancher.example.com"));
        assert_eq!(config.cert_verify, "False");
        assert_eq!(config.credentials().unwrap().username, "token-abc");
    }

    #[test]
    fn missing_keys_fall_back() {
        let config: IntegratorConfig = serde_json::from_str("{}").unwrap();
        assert!(config.url.is_none());
        assert!(config.credentials().is_none());
        assert_eq!(config.cert_verify, "True");
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = IntegratorConfig::default();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("change:me"));

        let creds = config.credentials().unwrap();
        assert!(!format!("{creds:?}").contains("\"me\""));
    }
}
