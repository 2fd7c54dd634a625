//! Application configuration
//!
//! Settings are layered: the embedded defaults, an optional
//! `config/<HEALTHID_ENV>.toml`, `HEALTHID__*` environment variables and
//! finally the deployment variables (`DATABASE_URL`, `JWT_SECRET`, ...).

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use url::Url;

const DEFAULTS: &str = include_str!("../config/default.toml");

pub const DEV_JWT_SECRET: &str = "development-only-jwt-secret-change-me";
pub const DEV_ENCRYPTION_KEY: &str = "development-only-encryption-key";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub environment: String,
    pub api_version: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub auth: AuthConfig,
    pub ledger: LedgerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub json_limit_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub url: String,
    pub max_connections: u32,
    pub connect_attempts: u32,
    pub retry_delay_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    /// Accept any `http://localhost:<port>` origin.
    pub allow_localhost: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    pub enabled: bool,
    pub network: String,
    pub operator_id: String,
    pub encryption_key: String,
    pub contracts: ContractIds,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractIds {
    pub patient_identity: String,
    pub access_control: String,
    pub medical_records: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Settings {
    /// The embedded defaults alone, without files or environment.
    pub fn defaults() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(DEFAULTS, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.backend == StoreBackend::Postgres && self.database.url.trim().is_empty() {
            return Err(ConfigError::Message(
                "database.url (or DATABASE_URL) is required for the postgres backend".into(),
            ));
        }
        for origin in &self.cors.allowed_origins {
            Url::parse(origin).map_err(|e| ConfigError::Message(format!("invalid CORS origin {}: {}", origin, e)))?;
        }
        if self.auth.token_ttl_minutes <= 0 {
            return Err(ConfigError::Message("auth.token_ttl_minutes must be positive".into()));
        }
        if self.is_production() {
            if self.auth.jwt_secret == DEV_JWT_SECRET {
                return Err(ConfigError::Message("JWT_SECRET must be set in production".into()));
            }
            if self.ledger.encryption_key == DEV_ENCRYPTION_KEY {
                return Err(ConfigError::Message("ENCRYPTION_KEY must be set in production".into()));
            }
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Load configuration from the embedded defaults, files and environment.
pub fn load_config() -> Result<Settings, ConfigError> {
    let env = env_var("HEALTHID_ENV")
        .or_else(|| env_var("NODE_ENV"))
        .unwrap_or_else(|| "development".into());

    let builder = Config::builder()
        .add_source(File::from_str(DEFAULTS, FileFormat::Toml))
        .add_source(File::with_name(&format!("config/{}", env)).required(false))
        .add_source(
            Environment::with_prefix("HEALTHID")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("cors.allowed_origins")
                .try_parsing(true),
        )
        .set_override("environment", env)?
        .set_override_option("database.url", env_var("DATABASE_URL"))?
        .set_override_option("auth.jwt_secret", env_var("JWT_SECRET"))?
        .set_override_option("ledger.encryption_key", env_var("ENCRYPTION_KEY"))?
        .set_override_option("ledger.network", env_var("HEDERA_NETWORK"))?
        .set_override_option("ledger.operator_id", env_var("OPERATOR_ID"))?
        .set_override_option("ledger.contracts.patient_identity", env_var("PATIENT_IDENTITY_CONTRACT_ID"))?
        .set_override_option("ledger.contracts.access_control", env_var("ACCESS_CONTROL_CONTRACT_ID"))?
        .set_override_option("ledger.contracts.medical_records", env_var("MEDICAL_RECORDS_CONTRACT_ID"))?;

    let mut settings: Settings = builder.build()?.try_deserialize()?;

    // CORS_ORIGIN adds to the allow-list rather than replacing it.
    if let Some(origin) = env_var("CORS_ORIGIN") {
        if !settings.cors.allowed_origins.contains(&origin) {
            settings.cors.allowed_origins.push(origin);
        }
    }

    settings.validate()?;
    Ok(settings)
}
