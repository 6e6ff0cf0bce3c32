//! Configuration management for Turnstile.

use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::{Result, TurnstileError};

/// Lowest port the service accepts.
const MIN_PORT: u16 = 1024;
/// Highest port the service accepts.
const MAX_PORT: u16 = 65353;

/// Floor for the default idle ttl when none is configured.
const MIN_DEFAULT_IDLE_TTL: Duration = Duration::from_secs(60);

/// Environment variables and the configuration keys they override.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("RL_PORT", "server.port"),
    ("RL_LIMIT", "rate_limiting.limit"),
    ("RL_WINDOW", "rate_limiting.window_secs"),
    ("RL_IDLE_TTL", "rate_limiting.idle_ttl_secs"),
    ("RL_SWEEP_INTERVAL", "rate_limiting.sweep_interval_secs"),
];

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Requests allowed per client within one window
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Sliding window length in seconds
    #[serde(default = "default_window")]
    pub window_secs: u64,

    /// How long an empty counter may sit untouched before eviction
    #[serde(default)]
    pub idle_ttl_secs: Option<u64>,

    /// Eviction sweep interval in seconds; 0 disables eviction
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_secs: default_window(),
            idle_ttl_secs: None,
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_limit() -> u64 {
    60
}

fn default_window() -> u64 {
    60
}

fn default_sweep_interval() -> u64 {
    30
}

impl RateLimitingConfig {
    /// The sliding window as a duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Idle ttl, defaulting to the larger of the window and one minute.
    pub fn idle_ttl(&self) -> Duration {
        match self.idle_ttl_secs {
            Some(secs) => Duration::from_secs(secs),
            None => self.window().max(MIN_DEFAULT_IDLE_TTL),
        }
    }

    /// Sweep interval, or `None` when eviction is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

impl TurnstileConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| TurnstileError::Config(e.to_string()))
    }

    /// Load configuration from defaults, an optional YAML file and the
    /// process environment, in increasing order of precedence.
    pub fn load(path: Option<&str>) -> Result<Self> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// Same as [`load`](Self::load) with a custom environment lookup.
    pub fn load_with<F>(path: Option<&str>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Yaml));
        }

        for (var, key) in ENV_OVERRIDES {
            builder = builder.set_override_option(*key, env(var))?;
        }

        let config: TurnstileConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate values that the type system cannot rule out.
    pub fn validate(&self) -> Result<()> {
        let port = self.server.port;
        if !(MIN_PORT..=MAX_PORT).contains(&port) {
            return Err(TurnstileError::InvalidPort(port));
        }
        Ok(())
    }

    /// Socket address the HTTP server binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = TurnstileConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.rate_limiting.limit, 60);
        assert_eq!(config.rate_limiting.window(), Duration::from_secs(60));
        assert_eq!(config.rate_limiting.sweep_interval(), Some(Duration::from_secs(30)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_port_out_of_range() {
        let mut config = TurnstileConfig::default();
        config.server.port = 80;
        assert!(matches!(config.validate(), Err(TurnstileError::InvalidPort(80))));

        config.server.port = 65400;
        assert!(matches!(config.validate(), Err(TurnstileError::InvalidPort(65400))));

        config.server.port = 1024;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_partial() {
        let yaml = r#"
rate_limiting:
  limit: 5
  window_secs: 10
"#;
        let config = TurnstileConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.rate_limiting.limit, 5);
        assert_eq!(config.rate_limiting.window_secs, 10);
        assert_eq!(config.server, ServerConfig::default());
    }

    #[test]
    fn test_negative_limit_rejected() {
        let yaml = r#"
rate_limiting:
  limit: -1
"#;
        assert!(matches!(
            TurnstileConfig::from_yaml(yaml),
            Err(TurnstileError::Config(_))
        ));
    }

    #[test]
    fn test_load_without_sources_gives_defaults() {
        let config = TurnstileConfig::load_with(None, env_from(&[])).unwrap();
        assert_eq!(config, TurnstileConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let env = env_from(&[
            ("RL_LIMIT", "3"),
            ("RL_WINDOW", "1"),
            ("RL_PORT", "9000"),
            ("RL_IDLE_TTL", "120"),
        ]);
        let config = TurnstileConfig::load_with(None, env).unwrap();

        assert_eq!(config.rate_limiting.limit, 3);
        assert_eq!(config.rate_limiting.window_secs, 1);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.rate_limiting.idle_ttl(), Duration::from_secs(120));
    }

    #[test]
    fn test_env_non_integer_rejected() {
        let env = env_from(&[("RL_LIMIT", "lots")]);
        assert!(matches!(
            TurnstileConfig::load_with(None, env),
            Err(TurnstileError::Config(_))
        ));
    }

    #[test]
    fn test_env_negative_window_rejected() {
        let env = env_from(&[("RL_WINDOW", "-1")]);
        assert!(TurnstileConfig::load_with(None, env).is_err());
    }

    #[test]
    fn test_file_then_env_precedence() {
        let path = std::env::temp_dir().join(format!("turnstile-config-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "server:\n  port: 9100\nrate_limiting:\n  limit: 7\n  window_secs: 30\n",
        )
        .unwrap();

        let env = env_from(&[("RL_LIMIT", "9")]);
        let config = TurnstileConfig::load_with(path.to_str(), env).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.rate_limiting.window_secs, 30);
        assert_eq!(config.rate_limiting.limit, 9);
    }

    #[test]
    fn test_idle_ttl_default_tracks_window() {
        let mut rate_limiting = RateLimitingConfig::default();
        rate_limiting.window_secs = 1;
        assert_eq!(rate_limiting.idle_ttl(), Duration::from_secs(60));

        rate_limiting.window_secs = 600;
        assert_eq!(rate_limiting.idle_ttl(), Duration::from_secs(600));
    }

    #[test]
    fn test_zero_sweep_interval_disables_eviction() {
        let mut rate_limiting = RateLimitingConfig::default();
        rate_limiting.sweep_interval_secs = 0;
        assert_eq!(rate_limiting.sweep_interval(), None);
    }

    #[test]
    fn test_listen_addr() {
        let config = TurnstileConfig::default();
        assert_eq!(config.listen_addr(), "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
    }
}
