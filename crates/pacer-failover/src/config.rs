// Failover configuration: the ordered set of control endpoints and the
// delay applied before a failover is triggered. Immutable once built;
// the builder validates before construction.
use serde::Deserialize;
use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

pub const ENDPOINTS_ENV: &str = "PACER_FAILOVER_ENDPOINTS";
pub const DELAY_ENV: &str = "PACER_FAILOVER_DELAY";
pub const CONFIG_PATH_ENV: &str = "PACER_FAILOVER_CONFIG";

const DEFAULT_FAILOVER_DELAY: Duration = Duration::from_secs(30);

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failover delay must be set")]
    DelayNotSet,
    #[error("at least one control endpoint is required")]
    NoEndpoints,
    #[error("PACER_FAILOVER_ENDPOINTS must be set")]
    EndpointsNotSet,
    #[error("endpoint must be in <hostname>:<port> format: {0}")]
    MalformedEndpoint(String),
    #[error("endpoint did not resolve: {0}")]
    UnresolvableEndpoint(String),
    #[error("invalid duration literal: {0}")]
    MalformedDelay(String),
    #[error("read config override")]
    Io(#[from] std::io::Error),
    #[error("parse config override")]
    Yaml(#[from] serde_yaml::Error),
}

/// Validated failover configuration for one control-client session.
///
/// ```
/// use pacer_failover::FailoverConfig;
/// use std::time::Duration;
///
/// let config = FailoverConfig::builder()
///     .control_endpoints(vec!["127.0.0.1:9010".parse().expect("addr")])
///     .failover_delay(Duration::from_secs(5))
///     .build()
///     .expect("build");
/// assert_eq!(config.control_endpoints().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct FailoverConfig {
    control_endpoints: Vec<SocketAddr>,
    failover_delay: Duration,
}

impl FailoverConfig {
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Endpoints in the order the client will broadcast to them.
    pub fn control_endpoints(&self) -> &[SocketAddr] {
        &self.control_endpoints
    }

    pub fn failover_delay(&self) -> Duration {
        self.failover_delay
    }

    /// Convenience loader from `PACER_FAILOVER_ENDPOINTS` and
    /// `PACER_FAILOVER_DELAY`. The delay defaults to 30 seconds when
    /// unset; the endpoints are required.
    pub fn from_env() -> Result<Self> {
        let endpoints = std::env::var(ENDPOINTS_ENV).ok();
        let delay = std::env::var(DELAY_ENV).ok();
        Self::from_strings(endpoints.as_deref(), delay.as_deref())
    }

    /// Environment first, then an optional YAML override applied on
    /// top. The override path falls back to `PACER_FAILOVER_CONFIG`
    /// when the argument is absent.
    pub fn from_env_or_yaml(config_path: Option<&str>) -> Result<Self> {
        let override_path = config_path
            .map(str::to_string)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok());
        Self::overlay(
            std::env::var(ENDPOINTS_ENV).ok(),
            std::env::var(DELAY_ENV).ok(),
            override_path.as_deref(),
        )
    }

    fn overlay(
        mut endpoints: Option<String>,
        mut delay: Option<String>,
        override_path: Option<&str>,
    ) -> Result<Self> {
        if let Some(path) = override_path {
            let contents = fs::read_to_string(path)?;
            let override_cfg: ConfigOverride = serde_yaml::from_str(&contents)?;
            if let Some(value) = override_cfg.control_endpoints {
                endpoints = Some(value);
            }
            if let Some(value) = override_cfg.failover_delay {
                delay = Some(value);
            }
        }
        Self::from_strings(endpoints.as_deref(), delay.as_deref())
    }

    /// Parse the raw property strings: a comma-separated `host:port`
    /// list and an optional duration literal.
    pub fn from_strings(endpoints: Option<&str>, delay: Option<&str>) -> Result<Self> {
        let endpoints = endpoints
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::EndpointsNotSet)?;
        let delay = match delay.filter(|value| !value.is_empty()) {
            Some(value) => parse_duration(value)?,
            None => DEFAULT_FAILOVER_DELAY,
        };
        Self::builder()
            .control_endpoints(parse_endpoints(endpoints)?)
            .failover_delay(delay)
            .build()
    }
}

#[derive(Debug, Default)]
pub struct Builder {
    control_endpoints: Vec<SocketAddr>,
    failover_delay: Option<Duration>,
}

impl Builder {
    pub fn control_endpoints(mut self, endpoints: Vec<SocketAddr>) -> Self {
        self.control_endpoints = endpoints;
        self
    }

    pub fn failover_delay(mut self, delay: Duration) -> Self {
        self.failover_delay = Some(delay);
        self
    }

    pub fn build(self) -> Result<FailoverConfig> {
        let failover_delay = self.failover_delay.ok_or(ConfigError::DelayNotSet)?;
        if self.control_endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        Ok(FailoverConfig {
            control_endpoints: self.control_endpoints,
            failover_delay,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
struct ConfigOverride {
    control_endpoints: Option<String>,
    failover_delay: Option<String>,
}

fn parse_endpoints(input: &str) -> Result<Vec<SocketAddr>> {
    input.split(',').map(parse_endpoint).collect()
}

fn parse_endpoint(entry: &str) -> Result<SocketAddr> {
    let entry = entry.trim();
    // Split on the last colon so IPv6 literals keep their colons.
    let (host, port) = entry
        .rsplit_once(':')
        .ok_or_else(|| ConfigError::MalformedEndpoint(entry.to_string()))?;
    let port: u16 = port
        .parse()
        .map_err(|_| ConfigError::MalformedEndpoint(entry.to_string()))?;
    // Resolve at configuration time so a bad hostname fails fast,
    // before any socket is opened.
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|_| ConfigError::UnresolvableEndpoint(entry.to_string()))?;
    addrs
        .next()
        .ok_or_else(|| ConfigError::UnresolvableEndpoint(entry.to_string()))
}

/// Duration literal: bare integer nanoseconds, or an integer with an
/// `ns`, `us`, `ms` or `s` suffix.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(split);
    if digits.is_empty() {
        return Err(ConfigError::MalformedDelay(input.to_string()));
    }
    let value: u64 = digits
        .parse()
        .map_err(|_| ConfigError::MalformedDelay(input.to_string()))?;
    let scale = match suffix {
        "" | "ns" => 1,
        "us" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        _ => return Err(ConfigError::MalformedDelay(input.to_string())),
    };
    let nanos = value
        .checked_mul(scale)
        .ok_or_else(|| ConfigError::MalformedDelay(input.to_string()))?;
    Ok(Duration::from_nanos(nanos))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_requires_delay() {
        let err = FailoverConfig::builder()
            .control_endpoints(vec!["127.0.0.1:9010".parse().expect("addr")])
            .build()
            .expect_err("delay unset");
        assert!(matches!(err, ConfigError::DelayNotSet));
    }

    #[test]
    fn build_requires_endpoints() {
        let err = FailoverConfig::builder()
            .failover_delay(Duration::from_secs(1))
            .build()
            .expect_err("no endpoints");
        assert!(matches!(err, ConfigError::NoEndpoints));
    }

    #[test]
    fn endpoint_order_is_preserved() {
        let endpoints: Vec<SocketAddr> = vec![
            "127.0.0.1:9002".parse().expect("addr"),
            "127.0.0.1:9001".parse().expect("addr"),
            "127.0.0.1:9003".parse().expect("addr"),
        ];
        let config = FailoverConfig::builder()
            .control_endpoints(endpoints.clone())
            .failover_delay(Duration::from_secs(1))
            .build()
            .expect("build");
        assert_eq!(config.control_endpoints(), endpoints.as_slice());
    }

    #[test]
    fn from_strings_applies_default_delay() {
        let config = FailoverConfig::from_strings(Some("localhost:9001,localhost:9002"), None)
            .expect("parse");
        assert_eq!(config.control_endpoints().len(), 2);
        assert_eq!(config.control_endpoints()[0].port(), 9001);
        assert_eq!(config.control_endpoints()[1].port(), 9002);
        assert_eq!(config.failover_delay(), Duration::from_secs(30));
    }

    #[test]
    fn from_strings_requires_endpoints() {
        let err = FailoverConfig::from_strings(None, None).expect_err("missing");
        assert!(matches!(err, ConfigError::EndpointsNotSet));
        let err = FailoverConfig::from_strings(Some(""), None).expect_err("empty");
        assert!(matches!(err, ConfigError::EndpointsNotSet));
    }

    #[test]
    fn from_strings_rejects_missing_port_separator() {
        let err = FailoverConfig::from_strings(Some("localhost"), None).expect_err("malformed");
        assert!(matches!(err, ConfigError::MalformedEndpoint(e) if e == "localhost"));
    }

    #[test]
    fn from_strings_rejects_bad_port() {
        let err =
            FailoverConfig::from_strings(Some("localhost:notaport"), None).expect_err("malformed");
        assert!(matches!(err, ConfigError::MalformedEndpoint(_)));
    }

    #[test]
    fn from_strings_parses_explicit_delay() {
        let config =
            FailoverConfig::from_strings(Some("127.0.0.1:9001"), Some("5s")).expect("parse");
        assert_eq!(config.failover_delay(), Duration::from_secs(5));
    }

    #[test]
    fn duration_literals() {
        assert_eq!(parse_duration("42").expect("ns"), Duration::from_nanos(42));
        assert_eq!(
            parse_duration("42ns").expect("ns"),
            Duration::from_nanos(42)
        );
        assert_eq!(
            parse_duration("7us").expect("us"),
            Duration::from_micros(7)
        );
        assert_eq!(
            parse_duration("250ms").expect("ms"),
            Duration::from_millis(250)
        );
        assert_eq!(parse_duration("30s").expect("s"), Duration::from_secs(30));
    }

    #[test]
    fn duration_literal_rejects_garbage() {
        for input in ["", "s", "10m", "10 s", "-5s", "abc"] {
            let err = parse_duration(input).expect_err(input);
            assert!(matches!(err, ConfigError::MalformedDelay(_)), "{input}");
        }
    }

    #[test]
    fn duration_literal_rejects_overflow() {
        let err = parse_duration("99999999999999999999s").expect_err("overflow");
        assert!(matches!(err, ConfigError::MalformedDelay(_)));
    }

    fn write_override(tag: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "pacer-failover-{tag}-{}.yaml",
            std::process::id()
        ));
        fs::write(&path, contents).expect("write override");
        path
    }

    #[test]
    fn yaml_override_wins_over_env_values() {
        let path = write_override(
            "full",
            "control_endpoints: \"127.0.0.1:9005\"\nfailover_delay: \"2s\"\n",
        );
        let config = FailoverConfig::overlay(
            Some("127.0.0.1:9001".to_string()),
            Some("15s".to_string()),
            path.to_str(),
        )
        .expect("load");
        fs::remove_file(&path).ok();
        assert_eq!(config.control_endpoints()[0].port(), 9005);
        assert_eq!(config.failover_delay(), Duration::from_secs(2));
    }

    #[test]
    fn partial_yaml_override_keeps_remaining_env_values() {
        let path = write_override("partial", "failover_delay: \"2s\"\n");
        let config = FailoverConfig::overlay(
            Some("127.0.0.1:9001".to_string()),
            Some("15s".to_string()),
            path.to_str(),
        )
        .expect("load");
        fs::remove_file(&path).ok();
        assert_eq!(config.control_endpoints()[0].port(), 9001);
        assert_eq!(config.failover_delay(), Duration::from_secs(2));
    }

    #[test]
    fn from_env_reads_the_process_environment() {
        std::env::set_var(ENDPOINTS_ENV, "127.0.0.1:9001,127.0.0.1:9002");
        std::env::set_var(DELAY_ENV, "5s");
        let config = FailoverConfig::from_env().expect("load");
        std::env::remove_var(ENDPOINTS_ENV);
        std::env::remove_var(DELAY_ENV);
        assert_eq!(config.control_endpoints().len(), 2);
        assert_eq!(config.failover_delay(), Duration::from_secs(5));
    }

    #[test]
    fn yaml_override_missing_file_fails() {
        let err = FailoverConfig::from_env_or_yaml(Some("/nonexistent/pacer.yaml"))
            .expect_err("missing file");
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
