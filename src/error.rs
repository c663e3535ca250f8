use crate::models::kind::CredentialKind;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },

    #[error("account '{name}' not found for {kind}")]
    NotFound { kind: CredentialKind, name: String },

    #[error("account '{name}' already exists for {kind}")]
    AlreadyExists { kind: CredentialKind, name: String },

    #[error("anchor '{anchor}' not found in config (required to add {kind} accounts)")]
    AnchorNotFound {
        kind: CredentialKind,
        anchor: &'static str,
    },

    #[error("config not found: {}", .0.display())]
    ConfigMissing(PathBuf),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },

    #[error("profile '{0}' not found")]
    NotFound(String),

    #[error("profile '{0}' already exists")]
    AlreadyExists(String),

    #[error("invalid date '{value}' (expected YYYY-MM-DD)")]
    InvalidDate { value: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
