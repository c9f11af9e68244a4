use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SENTIMENT_TIMEOUT_SECS: u64 = 10;

/// Runtime settings, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    /// Base URL of the classification service. `None` selects the built-in lexicon.
    pub sentiment_api_url: Option<String>,
    pub sentiment_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            sentiment_api_url: None,
            sentiment_timeout: Duration::from_secs(DEFAULT_SENTIMENT_TIMEOUT_SECS),
        }
    }
}

/// Parses `name` through `lookup`, warning and falling back to `default` on bad input.
fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match lookup(name) {
        Some(raw) => match T::from_str(raw.trim()) {
            Ok(value) => {
                info!("Using {} from environment variable {}.", value, name);
                value
            }
            Err(_) => {
                warn!(
                    "Invalid {} value '{}' in environment variable. Using default {}.",
                    name, raw, default
                );
                default
            }
        },
        None => {
            info!("{} environment variable not set. Using default {}.", name, default);
            default
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = parse_or(&lookup, "PORT", DEFAULT_PORT);
        let timeout_secs = parse_or(
            &lookup,
            "SENTIMENT_TIMEOUT_SECS",
            DEFAULT_SENTIMENT_TIMEOUT_SECS,
        );
        let sentiment_api_url = lookup("SENTIMENT_API_URL")
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        Self {
            port,
            sentiment_api_url,
            sentiment_timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(config_from(&[]), AppConfig::default());
    }

    #[test]
    fn reads_all_variables() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("SENTIMENT_API_URL", " http://ml:5001 "),
            ("SENTIMENT_TIMEOUT_SECS", "3"),
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.sentiment_api_url.as_deref(), Some("http://ml:5001"));
        assert_eq!(config.sentiment_timeout, Duration::from_secs(3));
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = config_from(&[
            ("PORT", "eighty"),
            ("SENTIMENT_API_URL", "   "),
            ("SENTIMENT_TIMEOUT_SECS", "0"),
        ]);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.sentiment_api_url, None);
        assert_eq!(config.sentiment_timeout, Duration::from_secs(1));
    }
}
