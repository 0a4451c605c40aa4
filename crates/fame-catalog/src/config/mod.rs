use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::workflows::catalog::UserId;

const DEFAULT_DATABASE_URL: &str = "sqlite://fame_catalog.db";
pub const DEFAULT_CATALOG_BASE_URL: &str = "https://bksaa01.github.io/fame-tg/";
const DEFAULT_PENDING_PAGE_SIZE: usize = 5;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
    pub moderation: ModerationConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        let avatar_dir = PathBuf::from(env::var("AVATAR_DIR").unwrap_or_else(|_| "avatars".into()));

        let admin_ids = parse_admin_ids(&env::var("ADMIN_IDS").unwrap_or_default())?;
        let catalog_base_url =
            env::var("CATALOG_BASE_URL").unwrap_or_else(|_| DEFAULT_CATALOG_BASE_URL.to_string());
        let pending_page_size = match env::var("PENDING_PAGE_SIZE") {
            Ok(raw) => match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => return Err(ConfigError::InvalidPageSize(raw)),
            },
            Err(_) => DEFAULT_PENDING_PAGE_SIZE,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            storage: StorageConfig {
                database_url,
                avatar_dir,
            },
            moderation: ModerationConfig {
                admin_ids,
                catalog_base_url,
                pending_page_size,
            },
        })
    }
}

/// Parses the comma separated admin allow-list, ignoring blank entries.
pub fn parse_admin_ids(raw: &str) -> Result<Vec<UserId>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<i64>()
                .map(UserId)
                .map_err(|_| ConfigError::InvalidAdminId(entry.to_string()))
        })
        .collect()
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Where applications, cards, and avatars are kept.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub database_url: String,
    pub avatar_dir: PathBuf,
}

/// Admin allow-list and moderation presentation settings.
#[derive(Debug, Clone)]
pub struct ModerationConfig {
    pub admin_ids: Vec<UserId>,
    pub catalog_base_url: String,
    pub pending_page_size: usize,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidAdminId(String),
    InvalidPageSize(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidAdminId(value) => {
                write!(f, "ADMIN_IDS entry '{value}' is not a numeric user id")
            }
            ConfigError::InvalidPageSize(value) => {
                write!(f, "PENDING_PAGE_SIZE must be a positive integer, found '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidAdminId(_)
            | ConfigError::InvalidPageSize(_) => None,
        }
    }
}
