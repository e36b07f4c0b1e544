use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::documents::{PdfError, TemplateError};
use crate::workflows::esign::EsignError;
use crate::workflows::requests::RequestServiceError;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Json(serde_json::Error),
    Template(TemplateError),
    Pdf(PdfError),
    Esign(EsignError),
    Request(RequestServiceError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Json(err) => write!(f, "invalid JSON: {}", err),
            AppError::Template(err) => write!(f, "template error: {}", err),
            AppError::Pdf(err) => write!(f, "pdf error: {}", err),
            AppError::Esign(err) => write!(f, "e-signature error: {}", err),
            AppError::Request(err) => write!(f, "signing request error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Json(err) => Some(err),
            AppError::Template(err) => Some(err),
            AppError::Pdf(err) => Some(err),
            AppError::Esign(err) => Some(err),
            AppError::Request(err) => Some(err),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<TemplateError> for AppError {
    fn from(value: TemplateError) -> Self {
        Self::Template(value)
    }
}

impl From<PdfError> for AppError {
    fn from(value: PdfError) -> Self {
        Self::Pdf(value)
    }
}

impl From<EsignError> for AppError {
    fn from(value: EsignError) -> Self {
        Self::Esign(value)
    }
}

impl From<RequestServiceError> for AppError {
    fn from(value: RequestServiceError) -> Self {
        Self::Request(value)
    }
}
