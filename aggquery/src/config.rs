//! Executor configuration.
//!
//! [`ApiConfig`] is built once at the program boundary and handed to
//! [`crate::client::HttpExecutor`]. Nothing below the CLI reads the
//! environment.

use std::env;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

/// Path of the aggregate query endpoint, relative to the host.
pub const AGGREGATE_PATH: &str = "/v1/data/query/aggregate";

/// Cookie carrying a pre-obtained session token.
pub const SESSION_COOKIE: &str = "VisierASIDToken";

/// Default HTTP timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

const VAR_HOST: &str = "AGGQUERY_HOST";
const VAR_APIKEY: &str = "AGGQUERY_APIKEY";
const VAR_VANITY: &str = "AGGQUERY_VANITY";
const VAR_SESSION_TOKEN: &str = "AGGQUERY_SESSION_TOKEN";
const VAR_TARGET_TENANT: &str = "AGGQUERY_TARGET_TENANT_ID";
const VAR_ACCEPT: &str = "AGGQUERY_ACCEPT";
const VAR_TIMEOUT: &str = "AGGQUERY_TIMEOUT_SECS";

/// Response representation requested through the `Accept` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcceptFormat {
    /// A JSON cell set; the only format the flattener reads.
    #[default]
    Json,
    JsonLines,
    Csv,
}

impl AcceptFormat {
    /// Parse the short names accepted in configuration.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "json" | "application/json" => Some(Self::Json),
            "jsonlines" | "application/jsonlines" => Some(Self::JsonLines),
            "csv" | "text/csv" => Some(Self::Csv),
            _ => None,
        }
    }

    /// Header value.
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::JsonLines => "application/jsonlines",
            Self::Csv => "text/csv",
        }
    }
}

/// Connection settings for the aggregate endpoint.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL, without trailing slash.
    pub host: String,
    /// Value of the `apikey` header.
    pub apikey: String,
    /// Optional `vanity` query parameter.
    pub vanity: Option<String>,
    /// Optional session token sent as [`SESSION_COOKIE`].
    pub session_token: Option<String>,
    /// Optional `TargetTenantID` header.
    pub target_tenant_id: Option<String>,
    pub accept: AcceptFormat,
    pub timeout: Duration,
}

impl ApiConfig {
    /// Create a config with the two required settings.
    pub fn new(host: impl Into<String>, apikey: impl Into<String>) -> Self {
        Self {
            host: host.into().trim_end_matches('/').to_string(),
            apikey: apikey.into(),
            vanity: None,
            session_token: None,
            target_tenant_id: None,
            accept: AcceptFormat::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> ConfigResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable lookup. All missing required variables are
    /// reported together.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host = get(VAR_HOST);
        let apikey = get(VAR_APIKEY);
        let missing: Vec<String> = [(VAR_HOST, &host), (VAR_APIKEY, &apikey)]
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name.to_string())
            .collect();

        let (Some(host), Some(apikey)) = (host, apikey) else {
            return Err(ConfigError::MissingVars(missing));
        };

        let mut config = Self::new(host, apikey);
        config.vanity = get(VAR_VANITY);
        config.session_token = get(VAR_SESSION_TOKEN);
        config.target_tenant_id = get(VAR_TARGET_TENANT);

        if let Some(accept) = get(VAR_ACCEPT) {
            config.accept = AcceptFormat::parse(&accept).ok_or_else(|| ConfigError::InvalidValue {
                var: VAR_ACCEPT.to_string(),
                message: format!("'{}' is not one of json, jsonlines, csv", accept),
            })?;
        }

        if let Some(timeout) = get(VAR_TIMEOUT) {
            let secs: u64 = timeout.trim().parse().map_err(|_| ConfigError::InvalidValue {
                var: VAR_TIMEOUT.to_string(),
                message: format!("'{}' is not a whole number of seconds", timeout),
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn with_target_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.target_tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_accept(mut self, accept: AcceptFormat) -> Self {
        self.accept = accept;
        self
    }

    /// Full URL of the aggregate endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.host, AGGREGATE_PATH)
    }

    /// API key with all but the last four characters masked, for display.
    pub fn masked_apikey(&self) -> String {
        let visible: String = self
            .apikey
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("***{}", visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_minimal_config() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("AGGQUERY_HOST", "https://tenant.example.com/"),
            ("AGGQUERY_APIKEY", "secret-key-1234"),
        ]))
        .unwrap();

        assert_eq!(config.endpoint(), "https://tenant.example.com/v1/data/query/aggregate");
        assert_eq!(config.accept, AcceptFormat::Json);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert!(config.target_tenant_id.is_none());
    }

    #[test]
    fn test_missing_vars_reported_together() {
        let err = ApiConfig::from_lookup(lookup(&[("AGGQUERY_VANITY", "acme")])).unwrap_err();
        match err {
            ConfigError::MissingVars(vars) => {
                assert_eq!(vars, vec!["AGGQUERY_HOST", "AGGQUERY_APIKEY"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let err = ApiConfig::from_lookup(lookup(&[
            ("AGGQUERY_HOST", "https://h"),
            ("AGGQUERY_APIKEY", "   "),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("AGGQUERY_APIKEY"));
    }

    #[test]
    fn test_optional_settings() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("AGGQUERY_HOST", "https://h"),
            ("AGGQUERY_APIKEY", "k"),
            ("AGGQUERY_TARGET_TENANT_ID", "tenant-123"),
            ("AGGQUERY_ACCEPT", "csv"),
            ("AGGQUERY_TIMEOUT_SECS", "30"),
        ]))
        .unwrap();
        assert_eq!(config.target_tenant_id.as_deref(), Some("tenant-123"));
        assert_eq!(config.accept.mime(), "text/csv");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_accept() {
        let err = ApiConfig::from_lookup(lookup(&[
            ("AGGQUERY_HOST", "https://h"),
            ("AGGQUERY_APIKEY", "k"),
            ("AGGQUERY_ACCEPT", "xml"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_masked_apikey() {
        let config = ApiConfig::new("https://h", "abcdef123456");
        assert_eq!(config.masked_apikey(), "***3456");
    }
}
