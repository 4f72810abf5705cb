use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::forms::submission::ResubmissionPolicy;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

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
    pub forms: FormsConfig,
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

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            forms: FormsConfig::from_env()?,
        })
    }
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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Where form definitions come from and how submissions are accepted.
#[derive(Debug, Clone)]
pub struct FormsConfig {
    /// Optional JSON file with additional form definitions.
    pub seed_path: Option<PathBuf>,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub resubmission: ResubmissionPolicy,
}

impl FormsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let seed_path = env::var("APP_FORMS_SEED")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        let upload_dir = env::var("APP_UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("storage/admission_uploads"));

        let max_upload_bytes = match env::var("APP_MAX_UPLOAD_BYTES") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|limit| *limit > 0)
                .ok_or(ConfigError::InvalidUploadLimit)?,
            Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let resubmission = match env::var("APP_RESUBMISSION_POLICY") {
            Ok(raw) => ResubmissionPolicy::parse(&raw)
                .ok_or(ConfigError::InvalidResubmissionPolicy { value: raw })?,
            Err(_) => ResubmissionPolicy::CreateNew,
        };

        Ok(Self {
            seed_path,
            upload_dir,
            max_upload_bytes,
            resubmission,
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidUploadLimit,
    InvalidResubmissionPolicy { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidUploadLimit => {
                write!(f, "APP_MAX_UPLOAD_BYTES must be a positive byte count")
            }
            ConfigError::InvalidResubmissionPolicy { value } => write!(
                f,
                "APP_RESUBMISSION_POLICY '{}' must be one of create, reject, update_pending",
                value
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidUploadLimit
            | ConfigError::InvalidResubmissionPolicy { .. } => None,
        }
    }
}
