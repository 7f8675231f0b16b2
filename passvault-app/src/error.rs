//! Error types for vault operations.
//!
//! Every fallible operation degrades at its own boundary: loads fall back to
//! an empty collection, rejected mutations leave state untouched, and the
//! caller receives one of these variants for user-facing feedback.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PassVaultError {
    /// Required input was empty or not a positive number of days.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A document could not be parsed as JSON of the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),

    /// An imported document contained a record that is not a valid entry.
    #[error("Invalid record at index {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    /// The supplied PIN does not match the stored PIN.
    #[error("Invalid PIN")]
    InvalidPin,

    /// New PIN and its confirmation differ.
    #[error("New PIN and confirmation do not match")]
    PinMismatch,

    #[error("PIN cannot be empty")]
    EmptyPin,

    /// The session has not passed the PIN gate yet.
    #[error("Vault is locked")]
    Locked,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PassVaultError {
    /// Stable error code for programmatic handling by front-ends.
    pub fn code(&self) -> &'static str {
        match self {
            PassVaultError::Validation(_) => "VALIDATION_ERROR",
            PassVaultError::Parse(_) => "PARSE_ERROR",
            PassVaultError::InvalidRecord { .. } => "INVALID_RECORD",
            PassVaultError::InvalidPin => "INVALID_PIN",
            PassVaultError::PinMismatch => "PIN_MISMATCH",
            PassVaultError::EmptyPin => "EMPTY_PIN",
            PassVaultError::Locked => "LOCKED",
            PassVaultError::Storage(_) => "STORAGE_ERROR",
            PassVaultError::Config(_) => "CONFIG_ERROR",
            PassVaultError::KeyDerivation(_) => "KEY_DERIVATION_ERROR",
            PassVaultError::Serialization(_) => "SERIALIZATION_ERROR",
            PassVaultError::Io(_) => "IO_ERROR",
        }
    }
}

impl serde::Serialize for PassVaultError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("PassVaultError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

pub type Result<T> = std::result::Result<T, PassVaultError>;
