use thiserror::Error;

use crate::fragment::FragmentKind;

#[derive(Error, Debug)]
pub enum DynaqueryError {
    #[error("{kind} fragment not found: {name}")]
    FragmentNotFound { kind: FragmentKind, name: String },
    #[error("Invalid format for parameter '{name}': {value}")]
    InvalidParameterFormat { name: String, value: String },
    #[error("Query execution failed: {0}")]
    QueryExecutionFailed(String),
    #[error("{what} not found with id {id}")]
    NotFound { what: &'static str, id: String },
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

impl DynaqueryError {
    /// Failures caused by the request itself (unknown names, bad parameters, rejected text)
    /// rather than by the running system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::FragmentNotFound { .. }
                | Self::InvalidParameterFormat { .. }
                | Self::QueryExecutionFailed(_)
                | Self::NotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DynaqueryError>;

// Helper conversions
impl From<rusqlite::Error> for DynaqueryError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<config::ConfigError> for DynaqueryError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for DynaqueryError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Lock(e.to_string())
    }
}
