use thiserror::Error;

#[derive(Error, Debug)]
pub enum DancemetricsError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration for '{key}': {details}")]
    InvalidConfiguration { key: String, details: String },

    #[error(
        "Detection rate too low: {observed:.2} of frames had no detection \
         (allowed failure fraction: {threshold:.2})"
    )]
    LowDetectionRate { threshold: f64, observed: f64 },

    #[error("Session misuse: {details}")]
    SessionMisuse { details: String },

    #[error("Render error: {details}")]
    Render { details: String },

    #[error("System error: {message}")]
    System { message: String },
}

impl DancemetricsError {
    pub fn invalid_configuration<S: Into<String>>(key: S, details: S) -> Self {
        Self::InvalidConfiguration {
            key: key.into(),
            details: details.into(),
        }
    }

    pub fn session_misuse<S: Into<String>>(details: S) -> Self {
        Self::SessionMisuse {
            details: details.into(),
        }
    }

    pub fn render<S: Into<String>>(details: S) -> Self {
        Self::Render {
            details: details.into(),
        }
    }

    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DancemetricsError>;
