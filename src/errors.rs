//! Unified error types for the reminder engine.
//!
//! Every fallible operation in the crate returns [`Result`]. Validation failures
//! carry one [`FieldError`] per offending field so callers can surface them
//! next to the input that caused them.

use std::fmt;
use thiserror::Error;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Name of the offending field (e.g. `message_template`)
    pub field: String,
    /// Human-readable description of the problem
    pub message: String,
}

impl FieldError {
    /// Creates a new field error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    /// A rule failed structural checks on create/update
    #[error("Validation failed: {}", join_field_errors(.errors))]
    Validation {
        /// All field errors found, in field order
        errors: Vec<FieldError>,
    },

    /// The rule does not exist or is not visible in the caller's scope
    #[error("Reminder rule {id} not found")]
    RuleNotFound {
        /// Rule id that was requested
        id: i64,
    },

    /// The caller's scope does not permit the operation
    #[error("Not permitted: {action}")]
    Forbidden {
        /// The action that was refused
        action: String,
    },

    /// The entity store could not be queried for one entity type
    #[error("Scan failed for {entity_type}: {message}")]
    Scan {
        /// Entity type being scanned
        entity_type: String,
        /// Underlying failure
        message: String,
    },

    /// Notification delivery to one recipient failed
    #[error("Dispatch to {recipient} failed: {message}")]
    Dispatch {
        /// Recipient id
        recipient: String,
        /// Underlying failure
        message: String,
    },

    /// Follow-up task creation failed
    #[error("Task spawn failed: {message}")]
    Spawn {
        /// Underlying failure
        message: String,
    },

    /// Database error from `SeaORM`
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment variable error
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// String formatting error
    #[error("Formatting error: {0}")]
    Fmt(#[from] std::fmt::Error),

    /// Serenity/Poise framework error
    #[error("Serenity/Poise framework error: {0}")]
    Framework(Box<poise::serenity_prelude::Error>),
}

impl From<poise::serenity_prelude::Error> for Error {
    fn from(value: poise::serenity_prelude::Error) -> Self {
        Self::Framework(Box::new(value))
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
