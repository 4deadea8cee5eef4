//! Build-time configuration for the API endpoint and the persistence secret with
//! runtime overrides. Overrides come from the CLI (flags or environment) so a
//! deployment can point at another API without rebuilding. The persistence secret
//! has an insecure fallback for development only; production builds must set
//! `CREDVAULT_PERSIST_SECRET`.

use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Fallback persistence secret. Anyone holding the binary can derive the key.
pub const INSECURE_DEFAULT_SECRET: &str = "credvault-insecure-dev-secret-change-me";
/// Storage key holding the sealed auth snapshot.
pub const DEFAULT_STORAGE_KEY: &str = "credvault:auth";
/// Route an unauthenticated user lands on.
pub const DEFAULT_LOGIN_ROUTE: &str = "/login";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 60;
const DEFAULT_ACCESS_TTL_SECS: u64 = 15 * 60;
const DEFAULT_REFRESH_MARGIN_SECS: u64 = 2 * 60;

/// Timing knobs for the session lifecycle monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonitorConfig {
    /// How often the monitor wakes up.
    pub interval: Duration,
    /// Expected lifetime of the access cookie issued by the API.
    pub access_ttl: Duration,
    /// How long before expiry a proactive refresh is attempted.
    pub refresh_margin: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_MONITOR_INTERVAL_SECS),
            access_ttl: Duration::from_secs(DEFAULT_ACCESS_TTL_SECS),
            refresh_margin: Duration::from_secs(DEFAULT_REFRESH_MARGIN_SECS),
        }
    }
}

/// Client configuration derived from build-time environment variables.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub persist_secret: SecretString,
    pub storage_key: String,
    pub login_route: String,
    pub request_timeout: Duration,
    pub monitor: MonitorConfig,
}

impl ClientConfig {
    /// Loads config from build-time environment variables.
    #[must_use]
    pub fn load() -> Self {
        let api_base_url = option_env!("CREDVAULT_API_BASE_URL").unwrap_or("");
        let persist_secret =
            option_env!("CREDVAULT_PERSIST_SECRET").unwrap_or(INSECURE_DEFAULT_SECRET);

        Self {
            api_base_url: api_base_url.to_string(),
            persist_secret: SecretString::from(persist_secret.to_string()),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            login_route: DEFAULT_LOGIN_ROUTE.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            monitor: MonitorConfig::default(),
        }
    }

    /// Loads build-time config and applies the provided overrides.
    #[must_use]
    pub fn with_overrides(overrides: RuntimeConfig) -> Self {
        let mut config = Self::load();
        apply_runtime_overrides(&mut config, overrides);
        config
    }

    #[must_use]
    pub fn uses_insecure_secret(&self) -> bool {
        self.persist_secret.expose_secret() == INSECURE_DEFAULT_SECRET
    }

    /// Login route with the forced-logout indicator appended.
    #[must_use]
    pub fn expired_route(&self) -> String {
        expired_route(&self.login_route)
    }
}

/// Values supplied at runtime; `None` keeps the build-time value.
#[derive(Debug, Default)]
pub struct RuntimeConfig {
    pub api_base_url: Option<String>,
    pub persist_secret: Option<SecretString>,
    pub storage_key: Option<String>,
    pub login_route: Option<String>,
    pub monitor_interval: Option<Duration>,
    pub access_ttl: Option<Duration>,
    pub refresh_margin: Option<Duration>,
}

fn apply_runtime_overrides(config: &mut ClientConfig, runtime: RuntimeConfig) {
    if let Some(value) = runtime.api_base_url.as_deref().and_then(normalize_runtime_value) {
        config.api_base_url = value;
    }
    if let Some(value) = runtime.persist_secret {
        if !value.expose_secret().trim().is_empty() {
            config.persist_secret = value;
        }
    }
    if let Some(value) = runtime.storage_key.as_deref().and_then(normalize_runtime_value) {
        config.storage_key = value;
    }
    if let Some(value) = runtime.login_route.as_deref().and_then(normalize_runtime_value) {
        config.login_route = value;
    }
    if let Some(value) = runtime.monitor_interval.filter(|value| !value.is_zero()) {
        config.monitor.interval = value;
    }
    if let Some(value) = runtime.access_ttl.filter(|value| !value.is_zero()) {
        config.monitor.access_ttl = value;
    }
    if let Some(value) = runtime.refresh_margin {
        config.monitor.refresh_margin = value;
    }
}

fn normalize_runtime_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub(crate) fn expired_route(login_route: &str) -> String {
    let separator = if login_route.contains('?') { '&' } else { '?' };
    format!("{login_route}{separator}expired=1")
}

#[cfg(test)]
mod tests {
    use super::{
        apply_runtime_overrides, expired_route, normalize_runtime_value, ClientConfig,
        RuntimeConfig, INSECURE_DEFAULT_SECRET,
    };
    use secrecy::{ExposeSecret, SecretString};
    use std::time::Duration;

    fn base() -> ClientConfig {
        let mut config = ClientConfig::load();
        config.api_base_url = "https://api.default".to_string();
        config
    }

    #[test]
    fn normalize_runtime_value_trims_and_rejects_empty() {
        assert_eq!(normalize_runtime_value(""), None);
        assert_eq!(normalize_runtime_value("   "), None);
        assert_eq!(
            normalize_runtime_value("  https://api.credvault.dev "),
            Some("https://api.credvault.dev".to_string())
        );
    }

    #[test]
    fn apply_runtime_overrides_ignores_empty_values() {
        let mut config = base();
        let before_secret = config.persist_secret.expose_secret().to_string();
        let runtime = RuntimeConfig {
            api_base_url: Some("  ".to_string()),
            persist_secret: Some(SecretString::from(" ".to_string())),
            storage_key: Some(String::new()),
            login_route: None,
            monitor_interval: Some(Duration::ZERO),
            access_ttl: Some(Duration::ZERO),
            refresh_margin: None,
        };

        apply_runtime_overrides(&mut config, runtime);

        assert_eq!(config.api_base_url, "https://api.default");
        assert_eq!(config.persist_secret.expose_secret(), before_secret);
        assert_eq!(config.storage_key, "credvault:auth");
        assert_eq!(config.login_route, "/login");
        assert_eq!(config.monitor.interval, Duration::from_secs(60));
        assert_eq!(config.monitor.access_ttl, Duration::from_secs(900));
    }

    #[test]
    fn apply_runtime_overrides_overwrites_when_present() {
        let mut config = base();
        let runtime = RuntimeConfig {
            api_base_url: Some("https://api.override".to_string()),
            persist_secret: Some(SecretString::from("s3cret".to_string())),
            storage_key: Some("tenant:auth".to_string()),
            login_route: Some("/signin".to_string()),
            monitor_interval: Some(Duration::from_secs(5)),
            access_ttl: Some(Duration::from_secs(120)),
            refresh_margin: Some(Duration::from_secs(30)),
        };

        apply_runtime_overrides(&mut config, runtime);

        assert_eq!(config.api_base_url, "https://api.override");
        assert_eq!(config.persist_secret.expose_secret(), "s3cret");
        assert!(!config.uses_insecure_secret());
        assert_eq!(config.storage_key, "tenant:auth");
        assert_eq!(config.login_route, "/signin");
        assert_eq!(config.monitor.interval, Duration::from_secs(5));
        assert_eq!(config.monitor.access_ttl, Duration::from_secs(120));
        assert_eq!(config.monitor.refresh_margin, Duration::from_secs(30));
        assert_eq!(config.expired_route(), "/signin?expired=1");
    }

    #[test]
    fn insecure_secret_is_detected() {
        let mut config = base();
        config.persist_secret = SecretString::from(INSECURE_DEFAULT_SECRET.to_string());
        assert!(config.uses_insecure_secret());
    }

    #[test]
    fn expired_route_respects_existing_query() {
        assert_eq!(expired_route("/login"), "/login?expired=1");
        assert_eq!(expired_route("/login?next=/vault"), "/login?next=/vault&expired=1");
    }
}
