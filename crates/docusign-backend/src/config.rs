//! DocuSign credentials and connection settings

use anysign_core::{BackendError, BackendSettings};
use std::time::Duration;

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// DocuSign demo environment, used when no root URL is configured
pub const DEFAULT_ROOT_URL: &str = "https://demo.docusign.net/restapi/v2";

#[derive(Clone, PartialEq, Eq)]
pub struct DocuSignConfig {
    pub root_url: String,
    pub username: String,
    pub password: String,
    pub integrator_key: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for DocuSignConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocuSignConfig")
            .field("root_url", &self.root_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("integrator_key", &self.integrator_key)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DocuSignConfig {
    /// Build from explicit settings, falling back to `DOCUSIGN_*` environment variables.
    pub fn from_settings(settings: &BackendSettings) -> Result<Self, BackendError> {
        Self::resolve(settings, |key| std::env::var(key).ok())
    }

    /// Same as [`DocuSignConfig::from_settings`] with an injectable environment lookup
    pub fn resolve<F>(settings: &BackendSettings, env: F) -> Result<Self, BackendError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| -> Option<String> {
            settings
                .get(key)
                .map(str::to_string)
                .or_else(|| env(&format!("DOCUSIGN_{}", key.to_uppercase())))
                .filter(|v| !v.trim().is_empty())
        };
        let required = |key: &str| -> Result<String, BackendError> {
            lookup(key).ok_or_else(|| {
                BackendError::Configuration(format!("missing DocuSign setting: {}", key))
            })
        };

        let timeout = match lookup("timeout") {
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|s| *s > 0.0)
                .and_then(|s| Duration::try_from_secs_f64(s).ok())
                .ok_or_else(|| {
                    BackendError::Configuration(format!("invalid DocuSign timeout: {}", raw))
                })?,
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            root_url: lookup("root_url")
                .unwrap_or_else(|| DEFAULT_ROOT_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            username: required("username")?,
            password: required("password")?,
            integrator_key: required("integrator_key")?,
            timeout,
        })
    }

    /// Value of the legacy `X-DocuSign-Authentication` header
    pub fn authentication_header(&self) -> String {
        serde_json::json!({
            "Username": self.username,
            "Password": self.password,
            "IntegratorKey": self.integrator_key,
        })
        .to_string()
    }
}
