use thiserror::Error;

/// Errors raised across the sentry.
///
/// Only [`SentryError::Configuration`] is fatal; every other variant is
/// recovered where it occurs and logged.
#[derive(Error, Debug)]
pub enum SentryError {
    /// Missing or unreadable startup resource (detection model, config file).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Camera or recorder could not be started or stopped.
    #[error("Device error: {0}")]
    Device(String),

    /// Detection, drawing or frame submission failed for a single frame.
    #[error("Frame error: {0}")]
    Frame(String),

    /// Audio line could not be opened or read.
    #[error("Audio error: {0}")]
    Audio(String),

    /// Remote endpoint or mail delivery failed.
    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("lock poisoned: {0}")]
    Poisoned(&'static str),
}

impl SentryError {
    /// Whether the error must abort initialization.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SentryError::Configuration(_))
    }
}

impl From<reqwest::Error> for SentryError {
    fn from(e: reqwest::Error) -> Self {
        SentryError::Notification(e.to_string())
    }
}

impl From<image::ImageError> for SentryError {
    fn from(e: image::ImageError) -> Self {
        SentryError::Frame(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SentryError>;
