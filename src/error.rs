//! Custom error types for the application.
//!
//! This module defines the primary error type, `HalError`, for the entire crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the kinds of errors that can occur while modules exchange messages and parameter
//! sets, from protocol violations to file and configuration problems.
//!
//! ## Error Hierarchy
//!
//! `HalError` is an enum that consolidates various error sources:
//!
//! - **`LockedOut`**: A parameter change was attempted while another change is still
//!   being dispatched. This is a protocol violation and no broadcast is performed.
//! - **`ParametersNotFound`** / **`ParameterNotFound`**: Lookups of a named or indexed
//!   parameter set, or of a key inside one, that do not exist.
//! - **`ParameterReadOnly`**, **`ParameterInvalidChoice`**, **`ParameterOutOfRange`**,
//!   **`ParameterType`**: Validation failures when writing into a parameter set.
//! - **`ParametersFileUnavailable`**: A parameters file was offered while editing or
//!   filming. Reported as a non-fatal error and the request is skipped.
//! - **`Module`**: A module rejected a message. The hub records these as message
//!   errors instead of propagating them.
//! - **`Config`**, **`Configuration`**, **`Io`**, **`TomlDe`**, **`TomlSer`**: Wrapped
//!   errors from figment, semantic config validation, file I/O and TOML handling.
//!
//! By using `#[from]`, `HalError` can be seamlessly created from underlying error types,
//! simplifying error handling throughout the crate with the `?` operator.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, HalError>;

/// Every error the library reports.
#[derive(Error, Debug)]
pub enum HalError {
    /// Figment could not load or extract the configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// The configuration loaded but is not usable.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// File system error outside of a missing parameters file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A parameters file is not valid TOML.
    #[error("Invalid parameters file: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// A parameter set could not be rendered as TOML.
    #[error("Failed to serialize parameters: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// A change was requested while another one is in flight. Names the request.
    #[error("Parameter change attempted while locked out: {0}")]
    LockedOut(String),

    /// No library set matches the selector.
    #[error("No parameters named '{0}'")]
    ParametersNotFound(String),

    /// Parameter files are refused while the UI is disabled.
    #[error("Parameters files cannot be added during editing / filming")]
    ParametersFileUnavailable,

    /// The parameters file does not exist.
    #[error("Parameters file not found: {0}")]
    ParametersFileNotFound(String),

    /// No entry with that key.
    #[error("Unknown parameter '{0}'")]
    ParameterNotFound(String),

    /// The entry is immutable.
    #[error("Parameter '{0}' is read-only")]
    ParameterReadOnly(String),

    /// Text value outside the entry's choices.
    #[error("Invalid choice '{value}' for parameter '{name}'")]
    ParameterInvalidChoice {
        /// Entry key
        name: String,
        /// Rejected value
        value: String,
    },

    /// Numeric value outside, or NaN against, the entry's range.
    #[error("Value {value} for parameter '{name}' is outside [{min}, {max}]")]
    ParameterOutOfRange {
        /// Entry key
        name: String,
        /// Rejected value
        value: f64,
        /// Lower bound
        min: f64,
        /// Upper bound
        max: f64,
    },

    /// Value of the wrong type for the entry.
    #[error("Parameter '{name}' expects {expected}, got {found}")]
    ParameterType {
        /// Entry key
        name: String,
        /// Type the entry holds
        expected: &'static str,
        /// Type that was offered
        found: &'static str,
    },

    /// A module rejected a message.
    #[error("{module}: {message}")]
    Module {
        /// Rejecting module
        module: String,
        /// Reason given
        message: String,
    },

    /// No registered module has that name.
    #[error("Unknown module '{0}'")]
    UnknownModule(String),

    /// A module with that name is already registered.
    #[error("Module '{0}' is already registered")]
    DuplicateModule(String),

    /// The registry has no factory for that type.
    #[error("Unknown module type '{0}'")]
    UnknownModuleType(String),

    /// The module does not handle that UI action.
    #[error("Module '{module}' does not support UI action '{action}'")]
    UnsupportedAction {
        /// Addressed module
        module: String,
        /// Action name
        action: String,
    },

    /// The hub actor has stopped.
    #[error("Hub is not running")]
    HubClosed,
}

impl From<figment::Error> for HalError {
    fn from(value: figment::Error) -> Self {
        HalError::Config(Box::new(value))
    }
}

impl HalError {
    /// Shorthand for a module-level rejection.
    pub fn module(module: impl Into<String>, message: impl Into<String>) -> Self {
        HalError::Module {
            module: module.into(),
            message: message.into(),
        }
    }
}
