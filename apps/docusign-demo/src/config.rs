//! Service configuration from the environment

use std::time::Duration;

use anysign_core::callback::DEFAULT_FETCH_TIMEOUT;

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_DATABASE_URL: &str = "sqlite:docusign-demo.db?mode=rwc";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Absolute base URL signers are sent back to
    pub public_url: String,
    /// Default status callback URL handed to the backend
    pub callback_url: String,
    /// Default template for `POST /signatures/template`
    pub template_id: Option<String>,
    pub fetch_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = var("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let public_url = var("PUBLIC_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();
        let callback_url =
            var("CALLBACK_URL").unwrap_or_else(|| format!("{}/callback", public_url));
        let fetch_timeout = var("DOCUSIGN_FETCH_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_FETCH_TIMEOUT);

        Self {
            port,
            database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            public_url,
            callback_url,
            template_id: var("DOCUSIGN_TEST_TEMPLATE_ID"),
            fetch_timeout,
        }
    }

    pub fn absolute_url(&self, path: &str) -> String {
        format!("{}{}", self.public_url, path)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 3001);
        assert_eq!(config.public_url, "http://localhost:3001");
        assert_eq!(config.callback_url, "http://localhost:3001/callback");
        assert_eq!(config.template_id, None);
        assert_eq!(config.fetch_timeout, DEFAULT_FETCH_TIMEOUT);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("PORT", "8080"),
            ("PUBLIC_URL", "https://sign.example.com/"),
            ("DOCUSIGN_TEST_TEMPLATE_ID", "tmpl-1"),
            ("DOCUSIGN_FETCH_TIMEOUT_SECS", "5"),
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.callback_url, "https://sign.example.com/callback");
        assert_eq!(
            config.absolute_url("/signers/3/return"),
            "https://sign.example.com/signers/3/return"
        );
        assert_eq!(config.template_id.as_deref(), Some("tmpl-1"));
        assert_eq!(config.fetch_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_garbage_falls_back() {
        let config = config(&[("PORT", "http"), ("DOCUSIGN_FETCH_TIMEOUT_SECS", "0")]);
        assert_eq!(config.port, 3001);
        assert_eq!(config.fetch_timeout, DEFAULT_FETCH_TIMEOUT);
    }
}
