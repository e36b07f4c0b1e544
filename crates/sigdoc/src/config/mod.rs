use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::workflows::esign::EsignSettings;

const DEFAULT_AUTH_SERVER: &str = "account-d.docusign.com";
const DEFAULT_BASE_PATH: &str = "https://demo.docusign.net/restapi";

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
    pub telemetry: TelemetryConfig,
    pub documents: DocumentsConfig,
    pub esign: EsignConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let format = match env::var("APP_LOG_FORMAT") {
            Ok(raw) => LogFormat::parse(&raw)?,
            Err(_) => LogFormat::Compact,
        };

        let documents = DocumentsConfig {
            header_pdf: path_var("SIGDOC_HEADER_PDF", "public/header-template.pdf"),
            uploads_dir: path_var("SIGDOC_UPLOADS_DIR", "uploads"),
            token_store: path_var("SIGDOC_TOKEN_STORE", ".sigdoc/connections.json"),
        };

        let esign = EsignConfig {
            integration_key: optional_var("DOCUSIGN_INTEGRATION_KEY"),
            secret_key: optional_var("DOCUSIGN_SECRET_KEY"),
            redirect_uri: optional_var("DOCUSIGN_REDIRECT_URI"),
            auth_server: env::var("DOCUSIGN_AUTH_SERVER")
                .unwrap_or_else(|_| DEFAULT_AUTH_SERVER.to_string()),
            base_path: env::var("DOCUSIGN_BASE_PATH")
                .unwrap_or_else(|_| DEFAULT_BASE_PATH.to_string()),
        };

        Ok(Self {
            environment,
            telemetry: TelemetryConfig { log_level, format },
            documents,
            esign,
        })
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn path_var(key: &str, default: &str) -> PathBuf {
    optional_var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::InvalidLogFormat(raw.to_string())),
        }
    }
}

/// Where documents live on disk.
#[derive(Debug, Clone)]
pub struct DocumentsConfig {
    pub header_pdf: PathBuf,
    pub uploads_dir: PathBuf,
    pub token_store: PathBuf,
}

/// E-signature platform coordinates. Credentials stay optional until a
/// command actually talks to the platform.
#[derive(Debug, Clone)]
pub struct EsignConfig {
    pub integration_key: Option<String>,
    pub secret_key: Option<String>,
    pub redirect_uri: Option<String>,
    pub auth_server: String,
    pub base_path: String,
}

impl EsignConfig {
    pub fn settings(&self) -> Result<EsignSettings, ConfigError> {
        let integration_key = self
            .integration_key
            .clone()
            .ok_or(ConfigError::Missing("DOCUSIGN_INTEGRATION_KEY"))?;
        let redirect_uri = self
            .redirect_uri
            .clone()
            .ok_or(ConfigError::Missing("DOCUSIGN_REDIRECT_URI"))?;

        Ok(EsignSettings {
            integration_key,
            secret_key: self.secret_key.clone(),
            redirect_uri,
            auth_server: self.auth_server.clone(),
            base_path: self.base_path.clone(),
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    InvalidLogFormat(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{key} must be set"),
            ConfigError::InvalidLogFormat(value) => {
                write!(f, "APP_LOG_FORMAT must be 'compact' or 'json', got '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
