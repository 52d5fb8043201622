use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::push::dispatcher::DEFAULT_TTL_SECONDS;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:3000";
pub const DEFAULT_DATABASE: &str = "herald.db";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub listen: SocketAddr,
    pub database: PathBuf,
    pub vapid_private_key: Option<String>,
    pub vapid_public_key: Option<String>,
    pub vapid_subject: Option<String>,
    pub ttl_seconds: u32,
    pub request_timeout: Duration,
    /// Bearer token required by the subscription and notify routes.
    pub api_token: Option<String>,
    /// Permits plain `http` and private-network push endpoints.
    pub allow_insecure_endpoints: bool,
}

#[cfg(test)]
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 0)),
            database: ":memory:".into(),
            vapid_private_key: None,
            vapid_public_key: None,
            vapid_subject: None,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            api_token: None,
            allow_insecure_endpoints: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid listen address '{0}'")]
    InvalidListen(String),
    #[error("invalid duration '{0}'; expected <number>[s|m|h|d]")]
    InvalidDuration(String),
    #[error("{0} must be greater than 0")]
    NotPositive(&'static str),
}

/// One source of settings. Flags, environment and the config file each
/// produce a layer; earlier layers win when merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub listen: Option<String>,
    pub database: Option<PathBuf>,
    pub vapid_private_key: Option<String>,
    pub vapid_public_key: Option<String>,
    pub vapid_subject: Option<String>,
    pub ttl: Option<u32>,
    pub request_timeout: Option<String>,
    pub api_token: Option<String>,
    pub allow_insecure_endpoints: Option<bool>,
}

impl ConfigLayer {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn or(self, fallback: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            listen: self.listen.or(fallback.listen),
            database: self.database.or(fallback.database),
            vapid_private_key: self.vapid_private_key.or(fallback.vapid_private_key),
            vapid_public_key: self.vapid_public_key.or(fallback.vapid_public_key),
            vapid_subject: self.vapid_subject.or(fallback.vapid_subject),
            ttl: self.ttl.or(fallback.ttl),
            request_timeout: self.request_timeout.or(fallback.request_timeout),
            api_token: self.api_token.or(fallback.api_token),
            allow_insecure_endpoints: self
                .allow_insecure_endpoints
                .or(fallback.allow_insecure_endpoints),
        }
    }

    /// Fills whatever is still unset with defaults and validates the result.
    pub fn resolve(self) -> Result<AppConfig, ConfigError> {
        let listen = self.listen.as_deref().unwrap_or(DEFAULT_LISTEN).trim();
        let listen = listen
            .parse()
            .map_err(|_| ConfigError::InvalidListen(listen.to_string()))?;

        let ttl_seconds = self.ttl.unwrap_or(DEFAULT_TTL_SECONDS);
        if ttl_seconds == 0 {
            return Err(ConfigError::NotPositive("ttl"));
        }
        let request_timeout = match self.request_timeout.as_deref() {
            Some(raw) => parse_duration(raw)?,
            None => DEFAULT_REQUEST_TIMEOUT,
        };

        Ok(AppConfig {
            listen,
            database: self
                .database
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE)),
            vapid_private_key: non_empty(self.vapid_private_key),
            vapid_public_key: non_empty(self.vapid_public_key),
            vapid_subject: non_empty(self.vapid_subject),
            ttl_seconds,
            request_timeout,
            api_token: non_empty(self.api_token),
            allow_insecure_endpoints: self.allow_insecure_endpoints.unwrap_or(false),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Parses `<number>[s|m|h|d]`; a bare number is seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ConfigError::InvalidDuration(value.to_string()));
    }

    let (amount, unit) = match value.chars().last() {
        Some(ch) if ch.is_ascii_alphabetic() => {
            (&value[..value.len() - 1], ch.to_ascii_lowercase())
        }
        _ => (value, 's'),
    };

    let amount: u64 = amount
        .parse()
        .map_err(|_| ConfigError::InvalidDuration(value.to_string()))?;
    if amount == 0 {
        return Err(ConfigError::NotPositive("duration"));
    }

    let multiplier: u64 = match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 60 * 60 * 24,
        _ => return Err(ConfigError::InvalidDuration(value.to_string())),
    };
    let seconds = amount
        .checked_mul(multiplier)
        .ok_or_else(|| ConfigError::InvalidDuration(value.to_string()))?;
    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_duration__should_parse_seconds_when_unit_missing() {
        // When
        let duration = parse_duration("30").expect("parse duration");

        // Then
        assert_eq!(duration, Duration::from_secs(30));
    }

    #[test]
    fn parse_duration__should_parse_units() {
        // Then
        assert_eq!(parse_duration("15m").expect("minutes"), Duration::from_secs(900));
        assert_eq!(parse_duration("2H").expect("hours"), Duration::from_secs(7200));
        assert_eq!(parse_duration("1d").expect("days"), Duration::from_secs(86_400));
    }

    #[test]
    fn parse_duration__should_reject_invalid_values() {
        // Then
        assert!(parse_duration("").is_err());
        assert!(parse_duration("0").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10w").is_err());
    }

    #[test]
    fn parse_duration__should_reject_overflowing_values() {
        // When
        let result = parse_duration("999999999999999999d");

        // Then
        assert!(matches!(result, Err(ConfigError::InvalidDuration(_))));
    }

    #[test]
    fn resolve__should_apply_defaults_to_empty_layer() {
        // When
        let config = ConfigLayer::default().resolve().expect("resolve");

        // Then
        assert_eq!(config.listen, SocketAddr::from(([127, 0, 0, 1], 3000)));
        assert_eq!(config.database, PathBuf::from("herald.db"));
        assert_eq!(config.ttl_seconds, 86_400);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert!(config.vapid_private_key.is_none());
        assert!(config.api_token.is_none());
        assert!(!config.allow_insecure_endpoints);
    }

    #[test]
    fn or__should_prefer_earlier_layer() {
        // Given
        let flags = ConfigLayer {
            ttl: Some(60),
            vapid_subject: Some("mailto:flags@example.com".to_string()),
            ..ConfigLayer::default()
        };
        let file = ConfigLayer {
            ttl: Some(3600),
            database: Some(PathBuf::from("/var/lib/herald.db")),
            vapid_subject: Some("mailto:file@example.com".to_string()),
            ..ConfigLayer::default()
        };

        // When
        let config = flags.or(file).resolve().expect("resolve");

        // Then
        assert_eq!(config.ttl_seconds, 60);
        assert_eq!(config.database, PathBuf::from("/var/lib/herald.db"));
        assert_eq!(config.vapid_subject.as_deref(), Some("mailto:flags@example.com"));
    }

    #[test]
    fn resolve__should_reject_bad_values() {
        // Then
        let bad_listen = ConfigLayer {
            listen: Some("not-an-address".to_string()),
            ..ConfigLayer::default()
        };
        assert!(matches!(bad_listen.resolve(), Err(ConfigError::InvalidListen(_))));
        let zero_ttl = ConfigLayer {
            ttl: Some(0),
            ..ConfigLayer::default()
        };
        assert!(matches!(zero_ttl.resolve(), Err(ConfigError::NotPositive("ttl"))));
    }

    #[test]
    fn resolve__should_treat_blank_vapid_values_as_unset() {
        // Given
        let layer = ConfigLayer {
            vapid_private_key: Some("  ".to_string()),
            ..ConfigLayer::default()
        };

        // When
        let config = layer.resolve().expect("resolve");

        // Then
        assert!(config.vapid_private_key.is_none());
    }

    #[test]
    fn from_file__should_read_toml_settings() {
        // Given
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "listen = \"0.0.0.0:8080\"\nttl = 120\nrequest_timeout = \"30s\"\nvapid_subject = \"mailto:ops@example.com\""
        )
        .expect("write config");

        // When
        let config = ConfigLayer::from_file(file.path())
            .expect("load")
            .resolve()
            .expect("resolve");

        // Then
        assert_eq!(config.listen, SocketAddr::from(([0, 0, 0, 0], 8080)));
        assert_eq!(config.ttl_seconds, 120);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.vapid_subject.as_deref(), Some("mailto:ops@example.com"));
    }

    #[test]
    fn from_file__should_reject_unknown_keys() {
        // Given
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "colour = \"blue\"").expect("write config");

        // When
        let result = ConfigLayer::from_file(file.path());

        // Then
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
