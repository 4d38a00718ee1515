//! Client configuration: where the backend lives, who to log in as, and how
//! much to trust its certificate.
//!
//! # Design
//! A `ClientConfig` is built once, from defaults, an optional TOML file and
//! `ALM_*` environment overrides, and then handed to `RequestExecutor`,
//! which never mutates it.
//!
//! ```toml
//! base_url = "https://alm.example.com:8443/helix-alm/api/v0/"
//! username = "administrator"
//! password = ""
//! project = "Traditional Template"
//! tls = "verify-none"
//! ```

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

pub const DEFAULT_BASE_URL: &str = "https://localhost:8443/helix-alm/api/v0/";
pub const DEFAULT_USERNAME: &str = "administrator";
pub const DEFAULT_PROJECT: &str = "Traditional Template";

/// Certificate policy for HTTPS connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TlsMode {
    /// Validate the server certificate chain and host name.
    #[default]
    VerifyFull,
    /// Accept any certificate. Only for self-signed test servers.
    VerifyNone,
}

impl FromStr for TlsMode {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verify-full" => Ok(TlsMode::VerifyFull),
            "verify-none" => Ok(TlsMode::VerifyNone),
            other => Err(ClientError::ConfigParse(format!(
                "unknown tls mode '{other}', expected verify-full or verify-none"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub project: String,
    pub tls: TlsMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            password: String::new(),
            project: DEFAULT_PROJECT.to_string(),
            tls: TlsMode::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ClientError> {
        toml::from_str(contents).map_err(|e| ClientError::ConfigParse(e.to_string()))
    }

    /// Read `path` (defaults when `None`), then apply `ALM_*` overrides from
    /// the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ClientError> {
        let mut config = match path {
            Some(path) => {
                let contents = fs::read_to_string(path).map_err(|source| ClientError::ConfigRead {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_toml_str(&contents)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    /// Blank values are ignored; an unparseable `ALM_TLS_MODE` is logged and
    /// ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("ALM_REST_URL") {
            self.base_url = url.trim().to_string();
        }
        if let Some(username) = get("ALM_USERNAME") {
            self.username = username;
        }
        // An empty password is legitimate, so this one is taken as-is.
        if let Some(password) = lookup("ALM_PASSWORD") {
            self.password = password;
        }
        if let Some(project) = get("ALM_PROJECT") {
            self.project = project;
        }
        if let Some(raw) = get("ALM_TLS_MODE") {
            match raw.parse() {
                Ok(mode) => self.tls = mode,
                Err(err) => tracing::warn!("invalid ALM_TLS_MODE, ignoring: {err}"),
            }
        }
    }

    /// The project name as a single URL path segment.
    pub fn project_path(&self) -> String {
        urlencoding::encode(&self.project).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.username, "administrator");
        assert!(config.password.is_empty());
        assert_eq!(config.tls, TlsMode::VerifyFull);
    }

    #[test]
    fn parses_partial_toml() {
        let config = ClientConfig::from_toml_str(
            r#"
            base_url = "http://alm:8080/api/v0"
            tls = "verify-none"
            "#,
        )
        .unwrap();
        assert_eq!(config.base_url, "http://alm:8080/api/v0");
        assert_eq!(config.tls, TlsMode::VerifyNone);
        assert_eq!(config.project, DEFAULT_PROJECT);
    }

    #[test]
    fn rejects_unknown_tls_mode() {
        let err = ClientConfig::from_toml_str(r#"tls = "sometimes""#).unwrap_err();
        assert!(matches!(err, ClientError::ConfigParse(_)));
    }

    #[test]
    fn env_overrides_win() {
        let mut config = ClientConfig::default();
        config.apply_overrides(env(&[
            ("ALM_REST_URL", " http://other/api/ "),
            ("ALM_USERNAME", "jsmith"),
            ("ALM_PASSWORD", "secret"),
            ("ALM_TLS_MODE", "VERIFY-NONE"),
        ]));
        assert_eq!(config.base_url, "http://other/api/");
        assert_eq!(config.username, "jsmith");
        assert_eq!(config.password, "secret");
        assert_eq!(config.tls, TlsMode::VerifyNone);
    }

    #[test]
    fn bad_tls_override_is_ignored() {
        let mut config = ClientConfig::default();
        config.apply_overrides(env(&[("ALM_TLS_MODE", "maybe"), ("ALM_USERNAME", "  ")]));
        assert_eq!(config.tls, TlsMode::VerifyFull);
        assert_eq!(config.username, DEFAULT_USERNAME);
    }

    #[test]
    fn project_is_url_encoded() {
        let config = ClientConfig::default();
        assert_eq!(config.project_path(), "Traditional%20Template");
    }
}
