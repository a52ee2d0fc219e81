use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";

// ---------------------------------------------------------------------------
// Gateway configuration
// ---------------------------------------------------------------------------

/// Service endpoints and timeouts, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// Base URL of the classification API, e.g. `http://host:8000/api`.
    pub base_url: String,
    /// Bound for short metadata calls (model list, health, upload).
    pub metadata_timeout: Duration,
    /// Hard bound for a classification call.
    pub classify_timeout: Duration,
    /// Simulated latency of the target catalog.
    pub catalog_latency: Duration,
    /// Use the local mock classifier instead of the service.
    pub offline: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            metadata_timeout: Duration::from_secs(10),
            classify_timeout: Duration::from_secs(300),
            catalog_latency: Duration::from_millis(1500),
            offline: false,
        }
    }
}

impl GatewayConfig {
    /// Build from `EXOSCOPE_*` variables, keeping defaults for anything unset
    /// or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let duration = |key: &str, default: Duration, unit: fn(u64) -> Duration| {
            match lookup(key) {
                None => default,
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(v) => unit(v),
                    Err(_) => {
                        log::warn!("ignoring {key}={raw:?}: not a whole number");
                        default
                    }
                },
            }
        };

        Self {
            base_url: lookup("EXOSCOPE_API_URL")
                .map(|url| url.trim().trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty())
                .unwrap_or(defaults.base_url),
            metadata_timeout: duration(
                "EXOSCOPE_METADATA_TIMEOUT_SECS",
                defaults.metadata_timeout,
                Duration::from_secs,
            ),
            classify_timeout: duration(
                "EXOSCOPE_CLASSIFY_TIMEOUT_SECS",
                defaults.classify_timeout,
                Duration::from_secs,
            ),
            catalog_latency: duration(
                "EXOSCOPE_CATALOG_LATENCY_MS",
                defaults.catalog_latency,
                Duration::from_millis,
            ),
            offline: lookup("EXOSCOPE_OFFLINE")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}
