use std::{env, net::IpAddr, path::PathBuf, str::FromStr};

use dotenvy::dotenv;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

// Server-specific configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub workers: usize,
    /// Prefix for every short URL handed out, e.g. `http://localhost:8080`
    pub base_url: String,
}

// Application-specific configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub name: String,
    pub version: String,
    pub environment: Environment,
    pub log_level: String,
}

// Environment enum for different deployment environments
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Testing,
    Production,
}

// Implement FromStr trait for Environment enum to enable parsing from string
impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(format!(
                "Invalid environment: {}. Must be one of: development, testing, production",
                s
            )),
        }
    }
}

/// Storage backend chosen at startup
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageStrategy {
    Memory,
    File,
    Database,
}

impl FromStr for StorageStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Ok(StorageStrategy::Memory),
            "file" => Ok(StorageStrategy::File),
            "database" | "db" | "postgres" => Ok(StorageStrategy::Database),
            _ => Err(format!(
                "Invalid storage strategy: {}. Must be one of: memory, file, database",
                s
            )),
        }
    }
}

// Result type for configuration functions
type ConfigResult<T> = Result<T, ConfigError>;

// Database Config
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub use_migrations: bool,
    pub skip_db_exists_check: bool,
    pub connect_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
    pub max_lifetime_seconds: u64,
    pub create_database_if_missing: bool,
}

// Storage selection plus the settings of each backend
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub strategy: StorageStrategy,
    pub file_path: Option<PathBuf>,
    pub db: Option<DatabaseConfig>,
}

// Cookie JWT settings
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub secret_key: String,
    pub cookie_name: String,
    pub token_ttl_hours: i64,
}

// Config struct that matches our environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub app: AppConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
}

impl Config {
    // Load configuration from environment variables
    pub fn load() -> ConfigResult<Self> {
        // Load .env file if it exists
        match dotenv() {
            Ok(_) => debug!(".env file loaded successfully"),
            Err(e) => warn!("Could not load .env file: {}", e),
        }

        let port: u16 = get_env_or_default("SERVER_PORT", "8080")?;

        // Create the server config
        let server = ServerConfig {
            host: get_env_or_default("SERVER_HOST", "127.0.0.1")?,
            port,
            workers: get_env_or_default("SERVER_WORKERS", "4")?,
            base_url: get_env_or_default("BASE_URL", &format!("http://localhost:{}", port))?,
        };

        // Get version from Cargo.toml or environment
        let version = option_env!("CARGO_PKG_VERSION")
            .unwrap_or("0.1.0")
            .to_string();

        // Create the app config
        let app = AppConfig {
            name: get_env_or_default("APP_NAME", "shortener")?,
            version: env::var("APP_VERSION").unwrap_or(version),
            environment: get_env_or_default("APP_ENVIRONMENT", "development")?,
            log_level: get_env_or_default("RUST_LOG", "info")?,
        };

        let storage = load_storage_config()?;

        let auth = AuthConfig {
            secret_key: get_env_or_default("AUTH_SECRET_KEY", "")?,
            cookie_name: get_env_or_default("AUTH_COOKIE_NAME", "token")?,
            token_ttl_hours: get_env_or_default("AUTH_TOKEN_TTL_HOURS", "24")?,
        };

        let config = Config {
            server,
            app,
            storage,
            auth,
        };
        info!("Configuration loaded successfully");
        debug!("Loaded config: {:?}", config);

        Ok(config)
    }
}

fn load_storage_config() -> ConfigResult<StorageConfig> {
    let file_path = get_optional_env("FILE_STORAGE_PATH").map(PathBuf::from);

    let db = match get_optional_env("DATABASE_DSN") {
        Some(url) => Some(DatabaseConfig {
            url,
            max_connections: get_env_or_default("DATABASE_MAX_CONNECTIONS", "10")?,
            min_connections: get_env_or_default("DATABASE_MIN_CONNECTIONS", "1")?,
            connect_timeout_seconds: get_env_or_default("DATABASE_CONNECT_TIMEOUT_SECONDS", "5")?,
            idle_timeout_seconds: get_env_or_default("DATABASE_IDLE_TIMEOUT_SECONDS", "300")?,
            max_lifetime_seconds: get_env_or_default("DATABASE_MAX_LIFETIME_SECONDS", "1800")?,
            skip_db_exists_check: get_env_or_default("DATABASE_SKIP_DB_EXISTS_CHECK", "false")?,
            use_migrations: get_env_or_default("DATABASE_USE_MIGRATIONS", "true")?,
            create_database_if_missing: get_env_or_default(
                "DATABASE_CREATE_DATABASE_IF_MISSING",
                "false",
            )?,
        }),
        None => None,
    };

    let explicit = match get_optional_env("STORAGE_STRATEGY") {
        Some(value) => Some(value.parse::<StorageStrategy>().map_err(|e| {
            ConfigError::ParseError(format!("Could not parse STORAGE_STRATEGY: {}", e))
        })?),
        None => None,
    };

    let strategy = resolve_strategy(explicit, file_path.is_some(), db.is_some())?;
    info!("Using {:?} storage", strategy);

    Ok(StorageConfig {
        strategy,
        file_path,
        db,
    })
}

/// Picks the storage backend.
///
/// An explicit strategy must have its settings present. Otherwise a database
/// DSN wins over a file path, and memory is the fallback.
pub fn resolve_strategy(
    explicit: Option<StorageStrategy>,
    has_file_path: bool,
    has_database: bool,
) -> ConfigResult<StorageStrategy> {
    match explicit {
        Some(StorageStrategy::File) if !has_file_path => Err(ConfigError::Invalid(
            "file storage requires FILE_STORAGE_PATH".to_string(),
        )),
        Some(StorageStrategy::Database) if !has_database => Err(ConfigError::Invalid(
            "database storage requires DATABASE_DSN".to_string(),
        )),
        Some(strategy) => Ok(strategy),
        None if has_database => Ok(StorageStrategy::Database),
        None if has_file_path => Ok(StorageStrategy::File),
        None => Ok(StorageStrategy::Memory),
    }
}

/// Reads an env variable, treating unset and empty values alike
fn get_optional_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Helper function to get an env variable with a default value
fn get_env_or_default<T: std::str::FromStr>(key: &str, default: &str) -> ConfigResult<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| ConfigError::ParseError(format!("Could not parse {}: {}", key, e))),
        Err(env::VarError::NotPresent) => {
            debug!("{} not set, using default: {}", key, default);
            default.parse::<T>().map_err(|e| {
                ConfigError::ParseError(format!("Could not parse default for {}: {}", key, e))
            })
        }
        Err(e) => Err(ConfigError::EnvVarError(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("memory".parse::<StorageStrategy>(), Ok(StorageStrategy::Memory));
        assert_eq!("FILE".parse::<StorageStrategy>(), Ok(StorageStrategy::File));
        assert_eq!("postgres".parse::<StorageStrategy>(), Ok(StorageStrategy::Database));
        assert!("redis".parse::<StorageStrategy>().is_err());
    }

    #[test]
    fn test_strategy_derived_from_settings() {
        assert_eq!(
            resolve_strategy(None, false, false).unwrap(),
            StorageStrategy::Memory
        );
        assert_eq!(
            resolve_strategy(None, true, false).unwrap(),
            StorageStrategy::File
        );
        assert_eq!(
            resolve_strategy(None, true, true).unwrap(),
            StorageStrategy::Database
        );
    }

    #[test]
    fn test_explicit_strategy_needs_settings() {
        assert!(resolve_strategy(Some(StorageStrategy::File), false, true).is_err());
        assert!(resolve_strategy(Some(StorageStrategy::Database), true, false).is_err());
        assert_eq!(
            resolve_strategy(Some(StorageStrategy::Memory), true, true).unwrap(),
            StorageStrategy::Memory
        );
    }

    #[test]
    fn test_environment_from_str() {
        assert_eq!("prod".parse::<Environment>(), Ok(Environment::Production));
        assert!("staging".parse::<Environment>().is_err());
    }
}
