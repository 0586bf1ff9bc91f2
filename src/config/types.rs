//! The configuration structs used to build the AppConfig, and their impls.
use lazy_regex::regex_captures;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::{
    postgres::{PgConnectOptions, PgSslMode},
    ConnectOptions,
};
use strum_macros::AsRefStr;

use crate::config::{ConfigError, ConfigResult};

// ###################################
// ->   STRUCTS
// ###################################
#[derive(AsRefStr)]
pub enum Environment {
    Local,
    Production,
}

#[derive(Deserialize, Clone, Debug)]
pub struct AppConfig {
    pub net_config: NetConfig,
    pub store_config: StoreConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Deserialize, Clone, Debug)]
pub struct NetConfig {
    pub host: [u8; 4],
    pub app_port: u16,
}

/// Where subscribers live and the credential used to reach them.
/// `url` and `service_key` have no defaults: the app refuses to start without them.
#[derive(Deserialize, Clone, Debug)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    pub url: String,
    pub service_key: SecretString,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_timeout_millis")]
    pub timeout_millis: u64,
    #[serde(default)]
    pub migrate_on_start: bool,
}

#[derive(Deserialize, AsRefStr, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StoreBackend {
    /// The hosted database's PostgREST API.
    #[default]
    Rest,
    Postgres,
    Memory,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Let requests through when the attempt count can't be read.
    #[serde(default = "default_fail_open")]
    pub fail_open: bool,
}

#[derive(Clone, Debug)]
pub struct DbConfig {
    pub username: String,
    pub password: SecretString,
    pub port: u16,
    pub host: String,
    pub db_name: String,
    pub require_ssl: SslRequire,
}

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SslRequire {
    #[default]
    Prefer,
    Require,
    Disable,
}

// ###################################
// ->   DEFAULTS
// ###################################
fn default_table() -> String {
    "newsletter_subscribers".to_string()
}
fn default_timeout_millis() -> u64 {
    10_000
}
fn default_max_attempts() -> u32 {
    5
}
fn default_window_secs() -> u64 {
    60 * 60
}
fn default_fail_open() -> bool {
    true
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            max_attempts: default_max_attempts(),
            window_secs: default_window_secs(),
            fail_open: default_fail_open(),
        }
    }
}

// ###################################
// ->   IMPLs
// ###################################
impl StoreConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_millis)
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::seconds(self.window_secs as i64)
    }
}

impl DbConfig {
    /// Parses `store_config.url` as a connection string.
    /// The service key doubles as the password when the url carries none.
    pub fn from_store_config(config: &StoreConfig) -> ConfigResult<Self> {
        let mut db_config = DbConfig::try_from(config.url.as_str())?;
        if db_config.password.expose_secret().is_empty() {
            db_config.password = config.service_key.clone();
        }
        Ok(db_config)
    }

    pub fn connection_options(&self) -> PgConnectOptions {
        // Create new PgConnectOptions struct but don't try to use the '$HOME/.pgpass' file.
        PgConnectOptions::new_without_pgpass()
            .host(&self.host)
            .username(&self.username)
            .password(self.password.expose_secret())
            .port(self.port)
            .database(&self.db_name)
            .ssl_mode(self.require_ssl.into())
            .log_statements(tracing::log::LevelFilter::Trace)
    }
}

impl From<SslRequire> for PgSslMode {
    fn from(value: SslRequire) -> Self {
        match value {
            SslRequire::Require => PgSslMode::Require,
            SslRequire::Disable => PgSslMode::Disable,
            SslRequire::Prefer => PgSslMode::Prefer,
        }
    }
}

// ###################################
// ->   TRY FROMs
// ###################################

impl TryFrom<String> for Environment {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            _ => Err(Self::Error::StringToEnvironmentFail),
        }
    }
}

impl TryFrom<&str> for DbConfig {
    type Error = ConfigError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // postgres://{username}[:{password}]@{hostname}:{port}/{database}?{options}
        let (_whole, username, password, host, port, db_name, options) = regex_captures!(
            r#"^postgres(?:ql)?:\/\/([^:@\/]+)(?::([^@]+))?@([^:\/]+):(\d+)\/([^\s\/?]+)(\?[^\s]*)?$"#,
            value
        )
        .ok_or(Self::Error::StringToDbConfigFail)?;

        let (username, db_name, host) =
            (username.to_string(), db_name.to_string(), host.to_string());
        let password = SecretString::from(password.to_string());
        let port = port
            .parse()
            .map_err(|_| Self::Error::StringToDbConfigFail)?;

        let mut require_ssl = SslRequire::default();
        if let Some(options) = options.strip_prefix('?') {
            for option in options.split('&') {
                if let Some(("sslmode", val)) = option.split_once('=') {
                    match val {
                        "disable" => require_ssl = SslRequire::Disable,
                        "require" => require_ssl = SslRequire::Require,
                        _ => {}
                    }
                }
            }
        }

        Ok(DbConfig {
            username,
            password,
            port,
            host,
            db_name,
            require_ssl,
        })
    }
}

// ###################################
// ->   TESTS
// ###################################
