//!
//! src/errors.rs  Andrew Belles  Sept 13th, 2025
//!
//! Defines enums and methods of error conversion
//! for errors the collector propagates to the top level
//!
//!

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("config error: {0}")]
    Config(String),
    #[error("auth error: {0}")]
    Auth(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("api error: status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("download rejected: {0}")]
    Rejected(String),
    #[error("persist error: {0}")]
    Persist(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error)
}

impl CollectorError {
    /// Errors that end the run before any archive is produced
    pub fn is_session(&self) -> bool {
        matches!(self, CollectorError::Auth(_) | CollectorError::Config(_))
    }
}

impl From<reqwest::Error> for CollectorError {
    fn from(e: reqwest::Error) -> Self { CollectorError::Http(e.to_string()) }
}

impl From<serde_json::Error> for CollectorError {
    fn from(e: serde_json::Error) -> Self { CollectorError::Parse(e.to_string()) }
}

impl From<url::ParseError> for CollectorError {
    fn from(e: url::ParseError) -> Self { CollectorError::Config(e.to_string()) }
}

impl From<tempfile::PersistError> for CollectorError {
    fn from(e: tempfile::PersistError) -> Self {
        CollectorError::Persist(e.error.to_string())
    }
}
