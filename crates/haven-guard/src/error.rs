//! Error types for the haven-guard crate.
//!
//! A denied decision is not an error: denial is a normal outcome and is
//! expressed as a result value by the facade. These variants cover
//! malformed input, missing or conflicting records, crypto failures,
//! and external store failures.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Access grant already exists for this (home, user, device)")]
    DuplicateGrant,

    #[error("Token value collision")]
    TokenCollision,

    /// Deliberately uniform: the message never reveals whether the key,
    /// the ciphertext, or the stored envelope was at fault.
    #[error("decryption failed")]
    Crypto,

    #[error("Store error: {source}")]
    Store {
        #[source]
        source: anyhow::Error,
    },
}

pub type Result<T> = std::result::Result<T, GuardError>;
