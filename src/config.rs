use std::net::{AddrParseError, SocketAddr};

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

/// Sessions may last at most a year.
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 366;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Parse(#[from] toml::de::Error),
    #[error("auth.session_ttl_hours must be between 1 and {max}, got {0}", max = MAX_SESSION_TTL_HOURS)]
    SessionTtl(i64),
}

#[derive(Parser, Debug)]
#[command(name = "moneytrack", about = "MoneyTrack - personal finance tracking service")]
pub struct CliArgs {
    /// Path to config file
    #[arg(short, long, default_value = "moneytrack.toml")]
    pub config: String,

    /// Port to listen on (overrides config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log level (overrides config file)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// SQLite database path, or ":memory:" (overrides config file)
    #[arg(short, long)]
    pub database: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: Backend,

    #[serde(default = "default_database_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// How long a login session stays valid.
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,

    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
}

fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

fn default_logging() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        json: false,
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database_path() -> String {
    "moneytrack.db".to_string()
}

fn default_session_ttl_hours() -> i64 {
    24
}

fn default_min_password_length() -> usize {
    8
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            backend: Backend::default(),
            path: default_database_path(),
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&self.session_ttl_hours) {
            return Err(ConfigError::SessionTtl(self.session_ttl_hours));
        }
        Ok(())
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            session_ttl_hours: default_session_ttl_hours(),
            min_password_length: default_min_password_length(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: default_server(),
            logging: default_logging(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Config {
    pub fn load(cli: &CliArgs) -> Self {
        let mut config = match std::fs::read_to_string(&cli.config) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Config::default()
            }),
            Err(_) => Config::default(),
        };

        // CLI overrides
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(ref level) = cli.log_level {
            config.logging.level = level.clone();
        }
        if let Some(ref path) = cli.database {
            config.database.backend = Backend::Sqlite;
            config.database.path = path.clone();
        }

        config
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.auth.validate()?;
        Ok(config)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.backend, Backend::Sqlite);
        assert_eq!(config.database.path, "moneytrack.db");
        assert_eq!(config.auth.session_ttl_hours, 24);
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = Config::parse(
            r#"
            [server]
            port = 8080

            [logging]
            json = true

            [database]
            backend = "memory"

            [auth]
            min_password_length = 12
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.database.backend, Backend::Memory);
        assert_eq!(config.auth.min_password_length, 12);
        assert_eq!(config.listen_addr().unwrap().port(), 8080);
    }

    #[test]
    fn test_session_ttl_out_of_range_rejected() {
        for ttl in ["0", "-5", "9223372036854775807"] {
            let err = Config::parse(&format!("[auth]\nsession_ttl_hours = {}", ttl)).unwrap_err();
            assert!(matches!(err, ConfigError::SessionTtl(_)));
        }
        let config = Config::parse("[auth]\nsession_ttl_hours = 168").unwrap();
        assert_eq!(config.auth.session_ttl_hours, 168);
    }

    #[test]
    fn test_cli_overrides_file() {
        let cli = CliArgs {
            config: "does-not-exist.toml".to_string(),
            port: Some(9000),
            log_level: Some("debug".to_string()),
            database: Some(":memory:".to_string()),
        };
        let config = Config::load(&cli);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.database.path, ":memory:");
    }
}
