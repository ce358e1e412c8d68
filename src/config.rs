use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub session_ttl_minutes: i64,
    /// Where the CLI keeps the current session token. Defaults to the user's
    /// config directory.
    pub session_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CatalogConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub filter: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub client: ClientConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder(Some("config/tatib"))?.build()?.try_deserialize()
    }

    fn builder(
        file: Option<&str>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let mut builder = Config::builder()
            .set_default("database.url", "")?
            .set_default("database.max_connections", 5)?
            .set_default("auth.session_ttl_minutes", 8 * 60)?
            .set_default("client.request_timeout_secs", 15)?
            .set_default("logging.filter", "info")?;
        if let Some(file) = file {
            builder = builder.add_source(File::with_name(file).required(false));
        }
        builder
            // Override from environment (e.g., TATIB__DATABASE__URL)
            .add_source(Environment::with_prefix("TATIB").separator("__"))
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.client.request_timeout_secs.max(1))
    }

    pub fn session_file(&self) -> PathBuf {
        self.auth.session_file.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tatib")
                .join("session.json")
        })
    }
}
