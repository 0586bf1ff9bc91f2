//! Builds the `AppConfig` once at startup from config files and the environment.
//!
//! Sources, later ones overriding earlier ones:
//! 1. `config/base.toml`
//! 2. `config/{environment}.toml` where the environment comes from `APP_ENVIRONMENT` (default `local`)
//! 3. `SUPABASE_URL` and `SUPABASE_SERVICE_ROLE_KEY`
//! 4. `APP_`-prefixed variables, nested with `__`, e.g. `APP_STORE_CONFIG__SERVICE_KEY`

mod error;
mod types;

use std::path::Path;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use tracing::info;

// Re-export config structs
pub use error::{ConfigError, ConfigResult};
pub use types::{
    AppConfig, DbConfig, Environment, NetConfig, RateLimitConfig, SslRequire, StoreBackend,
    StoreConfig,
};

impl AppConfig {
    /// Loads the configuration from `./config` and the process environment.
    /// Fails if a required field (such as `store_config.url` or `store_config.service_key`) is absent.
    pub fn load() -> ConfigResult<Self> {
        let config_dir = std::env::current_dir()?.join("config");
        let environment: Environment = std::env::var("APP_ENVIRONMENT")
            .unwrap_or_else(|_| "local".into())
            .try_into()?;

        info!(
            "{:<20} - {}",
            "Loading configuration:",
            environment.as_ref()
        );

        Self::load_from(&config_dir, &environment)
    }

    pub fn load_from(config_dir: &Path, environment: &Environment) -> ConfigResult<Self> {
        let config = Self::figment(config_dir, environment).extract()?;
        Ok(config)
    }

    fn figment(config_dir: &Path, environment: &Environment) -> Figment {
        let environment_filename = format!("{}.toml", environment.as_ref().to_lowercase());

        Figment::new()
            .merge(Toml::file(config_dir.join("base.toml")))
            .merge(Toml::file(config_dir.join(environment_filename)))
            .merge(
                Env::raw()
                    .only(&["SUPABASE_URL"])
                    .map(|_| "store_config.url".into()),
            )
            .merge(
                Env::raw()
                    .only(&["SUPABASE_SERVICE_ROLE_KEY"])
                    .map(|_| "store_config.service_key".into()),
            )
            .merge(Env::prefixed("APP_").split("__"))
    }
}
