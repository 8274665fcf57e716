//! Application-level error type.
//!
//! The quantification engine itself never fails hard: insufficient data and
//! numerical trouble surface as `None`. `AppError` covers the shell around it
//! (files, arguments, "nothing to quantify") and carries the process exit code.

use thiserror::Error;

#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
