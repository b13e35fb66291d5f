use std::str::FromStr;

use crate::error::{AppError, Result};

/// Fixed key of the single counter row.
pub const COUNTER_ROW_ID: i64 = 1;

/// Baseline start rate used when no `start_date` is given or its lookup fails.
pub const DEFAULT_START_RATE: f64 = 42.51;

/// Start rate reported in the fallback bundle when the rate backend is down.
pub const FALLBACK_START_RATE: f64 = 32.0;

/// Maximum age of a cached rate bundle (seconds).
pub const RATE_CACHE_TTL_SECS: u64 = 60 * 60;

/// Database URL variables, in lookup order. Netlify DB deployments set the first.
pub const DATABASE_URL_VARS: &[&str] = &["NETLIFY_DATABASE_URL", "DATABASE_URL"];

/// Outbound request timeout for rate providers (seconds).
pub const UPSTREAM_TIMEOUT_SECS: u64 = 10;

pub const EXCHANGERATE_API_URL: &str = "https://v6.exchangerate-api.com/v6";
pub const EXCHANGERATE_HOST_URL: &str = "https://api.exchangerate.host";
pub const FRANKFURTER_URL: &str = "https://api.frankfurter.app";

/// Placeholder counter values served by some deployments when the database is missing.
pub mod placeholder_counters {
    pub const WINS: i64 = 20;
    pub const PRAYERS: i64 = 1337;
    pub const HAGELS: i64 = 69;
}

/// What the HTTP boundary does with a failed backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Serve the fallback bundle with status 200.
    Mask,
    /// Serve status 500 with a diagnostic body.
    Surface,
}

impl FromStr for FailurePolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mask" => Ok(Self::Mask),
            "surface" => Ok(Self::Surface),
            other => Err(AppError::Config(format!(
                "FAILURE_POLICY must be 'mask' or 'surface', got '{other}'"
            ))),
        }
    }
}

/// Counter values served when the database is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterFallback {
    Zeros,
    Placeholder,
}

impl FromStr for CounterFallback {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zeros" | "zero" => Ok(Self::Zeros),
            "placeholder" => Ok(Self::Placeholder),
            other => Err(AppError::Config(format!(
                "COUNTER_FALLBACK must be 'zeros' or 'placeholder', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    ExchangeRateApi,
    ExchangeRateHost,
    Frankfurter,
}

impl FromStr for ProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exchangerate-api" => Ok(Self::ExchangeRateApi),
            "exchangerate-host" => Ok(Self::ExchangeRateHost),
            "frankfurter" => Ok(Self::Frankfurter),
            other => Err(AppError::Config(format!("unknown RATE_PROVIDER '{other}'"))),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderKind::ExchangeRateApi => "exchangerate-api",
            ProviderKind::ExchangeRateHost => "exchangerate-host",
            ProviderKind::Frankfurter => "frankfurter",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub api_port: u16,
    /// sqlx SQLite URL (NETLIFY_DATABASE_URL, then DATABASE_URL).
    /// None runs the counters in fallback mode.
    pub database_url: Option<String>,
    pub counter_fallback: CounterFallback,
    pub failure_policy: FailurePolicy,
    pub rate_provider: ProviderKind,
    /// Credential for exchangerate-api.com (ERATE_API_KEY)
    pub erate_api_key: Option<String>,
    pub default_start_rate: f64,
    pub fallback_start_rate: f64,
    pub rate_cache_ttl_secs: u64,
    pub upstream_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8888".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            database_url: first_non_empty_var(DATABASE_URL_VARS),
            counter_fallback: std::env::var("COUNTER_FALLBACK")
                .unwrap_or_else(|_| "zeros".to_string())
                .parse()?,
            failure_policy: std::env::var("FAILURE_POLICY")
                .unwrap_or_else(|_| "mask".to_string())
                .parse()?,
            rate_provider: std::env::var("RATE_PROVIDER")
                .unwrap_or_else(|_| "exchangerate-api".to_string())
                .parse()?,
            erate_api_key: non_empty_var("ERATE_API_KEY"),
            default_start_rate: std::env::var("DEFAULT_START_RATE")
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(DEFAULT_START_RATE),
            fallback_start_rate: std::env::var("FALLBACK_START_RATE")
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(FALLBACK_START_RATE),
            rate_cache_ttl_secs: std::env::var("RATE_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(RATE_CACHE_TTL_SECS),
            upstream_timeout_secs: std::env::var("UPSTREAM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(UPSTREAM_TIMEOUT_SECS),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            api_port: 8888,
            database_url: None,
            counter_fallback: CounterFallback::Zeros,
            failure_policy: FailurePolicy::Mask,
            rate_provider: ProviderKind::ExchangeRateApi,
            erate_api_key: None,
            default_start_rate: DEFAULT_START_RATE,
            fallback_start_rate: FALLBACK_START_RATE,
            rate_cache_ttl_secs: RATE_CACHE_TTL_SECS,
            upstream_timeout_secs: UPSTREAM_TIMEOUT_SECS,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// First of `keys` that is set to a non-blank value.
fn first_non_empty_var(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| non_empty_var(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("MASK".parse::<FailurePolicy>().unwrap(), FailurePolicy::Mask);
        assert_eq!(" surface ".parse::<FailurePolicy>().unwrap(), FailurePolicy::Surface);
        assert!("explode".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn counter_fallback_accepts_both_variants() {
        assert_eq!("zeros".parse::<CounterFallback>().unwrap(), CounterFallback::Zeros);
        assert_eq!("placeholder".parse::<CounterFallback>().unwrap(), CounterFallback::Placeholder);
        assert!("random".parse::<CounterFallback>().is_err());
    }

    #[test]
    fn provider_kind_display_round_trips() {
        for kind in [
            ProviderKind::ExchangeRateApi,
            ProviderKind::ExchangeRateHost,
            ProviderKind::Frankfurter,
        ] {
            assert_eq!(kind.to_string().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn database_url_prefers_first_set_variable() {
        // Test-only names so parallel tests never see each other's values.
        let keys = ["TALLY_FX_TEST_PRIMARY_DB", "TALLY_FX_TEST_SECONDARY_DB"];
        std::env::remove_var(keys[0]);
        std::env::set_var(keys[1], "sqlite:counters.db");
        assert_eq!(first_non_empty_var(&keys).as_deref(), Some("sqlite:counters.db"));

        std::env::set_var(keys[0], "   ");
        assert_eq!(
            first_non_empty_var(&keys).as_deref(),
            Some("sqlite:counters.db"),
            "blank values are skipped"
        );

        std::env::set_var(keys[0], "sqlite:netlify.db");
        assert_eq!(first_non_empty_var(&keys).as_deref(), Some("sqlite:netlify.db"));

        std::env::remove_var(keys[0]);
        std::env::remove_var(keys[1]);
        assert_eq!(first_non_empty_var(&keys), None);
    }

    #[test]
    fn netlify_variable_is_looked_up_first() {
        assert_eq!(DATABASE_URL_VARS, &["NETLIFY_DATABASE_URL", "DATABASE_URL"]);
    }

    #[test]
    fn defaults_match_documented_constants() {
        let cfg = Config::default();
        assert!((cfg.default_start_rate - 42.51).abs() < 1e-9);
        assert_eq!(cfg.rate_cache_ttl_secs, 3600);
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.failure_policy, FailurePolicy::Mask);
    }
}
