//! Error types for AnaTools

use thiserror::Error;

/// AnaTools error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialisation error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration error
    #[error("YAML error: {0}")]
    Yaml(String),

    /// Range constructed or mutated with `lower > upper`
    #[error("invalid range: lower limit {lower} exceeds upper limit {upper}")]
    InvalidRange {
        /// Requested lower limit.
        lower: f64,
        /// Requested upper limit.
        upper: f64,
    },

    /// Mutation attempted on a frozen object
    #[error("'{owner}' is locked: cannot {action}")]
    Locked {
        /// Name of the locked object.
        owner: String,
        /// Attempted action.
        action: String,
    },

    /// Name registered twice where names must be unique
    #[error("duplicate {kind} '{name}'")]
    Duplicate {
        /// What kind of name (category, info, collection, ...).
        kind: &'static str,
        /// The offending name.
        name: String,
    },

    /// Lookup of a name that was never registered
    #[error("no {kind} named '{name}'")]
    Missing {
        /// What kind of name (category, info, collection, ...).
        kind: &'static str,
        /// The requested name.
        name: String,
    },

    /// Caller-code configuration defect
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Expression parsing/evaluation error
    #[error("expression error: {0}")]
    Expression(String),

    /// Validation error
    #[error("validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Shorthand for [`Error::Missing`].
    pub fn missing(kind: &'static str, name: impl Into<String>) -> Self {
        Error::Missing { kind, name: name.into() }
    }

    /// Shorthand for [`Error::Duplicate`].
    pub fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        Error::Duplicate { kind, name: name.into() }
    }

    /// Shorthand for [`Error::Locked`].
    pub fn locked(owner: impl Into<String>, action: impl Into<String>) -> Self {
        Error::Locked { owner: owner.into(), action: action.into() }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
