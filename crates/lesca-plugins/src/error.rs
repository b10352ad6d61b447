//! Plugin-hook error (spec.md §4.K, §7 "plugin-hook exceptions are
//! caught and logged").

use thiserror::Error;

#[derive(Debug, Error, Clone)]
#[error("{message}")]
pub struct PluginError {
    pub message: String,
}

impl PluginError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn kind(&self) -> lesca_types::ErrorKind {
        lesca_types::ErrorKind::Fatal
    }
}
