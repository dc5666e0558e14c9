use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::submissions::{
    ArchiveLoadError, EvaluationError, ProcessError, QueueError,
};
use std::fmt;

/// Top-level failure surfaced by the worker entry points.
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Http(reqwest::Error),
    Queue(QueueError),
    Archive(ArchiveLoadError),
    Evaluation(EvaluationError),
    Process(ProcessError),
    Fixture(serde_json::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Http(err) => write!(f, "http client error: {}", err),
            AppError::Queue(err) => write!(f, "queue error: {}", err),
            AppError::Archive(err) => write!(f, "archive error: {}", err),
            AppError::Evaluation(err) => write!(f, "evaluation error: {}", err),
            AppError::Process(err) => write!(f, "processing error: {}", err),
            AppError::Fixture(err) => write!(f, "invalid fixture data: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Http(err) => Some(err),
            AppError::Queue(err) => Some(err),
            AppError::Archive(err) => Some(err),
            AppError::Evaluation(err) => Some(err),
            AppError::Process(err) => Some(err),
            AppError::Fixture(err) => Some(err),
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

impl From<reqwest::Error> for AppError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

impl From<QueueError> for AppError {
    fn from(value: QueueError) -> Self {
        Self::Queue(value)
    }
}

impl From<ArchiveLoadError> for AppError {
    fn from(value: ArchiveLoadError) -> Self {
        Self::Archive(value)
    }
}

impl From<EvaluationError> for AppError {
    fn from(value: EvaluationError) -> Self {
        Self::Evaluation(value)
    }
}

impl From<ProcessError> for AppError {
    fn from(value: ProcessError) -> Self {
        Self::Process(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Fixture(value)
    }
}
