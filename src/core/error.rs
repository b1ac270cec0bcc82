//! Typed error handling for the action API
//!
//! Every failure aborts the whole action. Errors that concern a particular
//! field reference carry the offending path so callers can report it.
//!
//! # Error Categories
//!
//! - [`ValidationError`]: malformed paths, operators, operands and values
//! - [`NotFoundError`]: unknown entities, custom groups, fields or records
//! - [`ApiError::Unsupported`]: attribute not valid for the field
//! - [`ApiError::PermissionDenied`]: caller lacks access (only when checked)
//! - [`StorageError`]: failures at the storage boundary
//! - [`ConfigError`]: configuration parsing and validation
//!
//! # Example
//!
//! ```rust,ignore
//! match Contact::get(&api).add_select("Extra.Missing").execute().await {
//!     Err(ApiError::NotFound(NotFoundError::Field { path, .. })) => {
//!         println!("no such field: {}", path);
//!     }
//!     Err(e) => eprintln!("{} ({})", e, e.error_code()),
//!     Ok(result) => println!("{} rows", result.len()),
//! }
//! ```

use serde::Serialize;
use thiserror::Error;

/// The main error type for the action API
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed input
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Unknown entity, group, field or record
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// Attribute requested on a field that cannot provide it
    #[error("'{attribute}' is not supported on '{path}': {reason}")]
    Unsupported {
        path: String,
        attribute: String,
        reason: String,
    },

    /// Caller lacks access to the requested operation
    #[error("Permission denied: {action} on {entity}")]
    PermissionDenied { entity: String, action: String },

    /// A prepare stage refused the action
    #[error("Action rejected by '{stage}': {message}")]
    Rejected { stage: String, message: String },

    /// Storage backend errors
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response structure for reporting to callers
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Field path that caused the error, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ApiError {
    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Validation(e) => e.error_code(),
            ApiError::NotFound(e) => e.error_code(),
            ApiError::Unsupported { .. } => "UNSUPPORTED",
            ApiError::PermissionDenied { .. } => "PERMISSION_DENIED",
            ApiError::Rejected { .. } => "ACTION_REJECTED",
            ApiError::Storage(_) => "STORAGE_ERROR",
            ApiError::Config(_) => "CONFIG_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// The field path this error is about, if it concerns one
    pub fn field_path(&self) -> Option<&str> {
        match self {
            ApiError::Validation(e) => e.field_path(),
            ApiError::NotFound(e) => e.field_path(),
            ApiError::Unsupported { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            field: self.field_path().map(str::to_string),
        }
    }

    /// Shorthand for a prepare stage refusing an action
    pub fn rejected(stage: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Rejected {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Shorthand for an unsupported attribute
    pub fn unsupported(
        path: impl Into<String>,
        attribute: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ApiError::Unsupported {
            path: path.into(),
            attribute: attribute.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors related to input validation
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Field path does not follow `column` or `Group.Field[.attribute]`
    #[error("Malformed field path '{path}': {message}")]
    MalformedPath { path: String, message: String },

    /// Operator is not one of the supported comparison operators
    #[error("Unknown operator '{operator}' for '{path}'")]
    UnknownOperator { path: String, operator: String },

    /// Operand shape does not match the operator
    #[error("Invalid operand for '{path}' {operator}: {message}")]
    InvalidOperand {
        path: String,
        operator: String,
        message: String,
    },

    /// Value cannot be stored in the field
    #[error("Invalid value for '{path}': {message}")]
    InvalidValue { path: String, message: String },

    /// Value is not one of the field's options
    #[error("'{value}' is not a valid option for '{path}'")]
    InvalidOption { path: String, value: String },

    /// Required field missing on create
    #[error("Missing required field '{path}'")]
    MissingRequired { path: String },

    /// Attempt to write a read-only field
    #[error("Field '{path}' is read-only")]
    ReadOnly { path: String },

    /// Action is missing a clause it cannot run without
    #[error("{action} on {entity} requires {clause}")]
    MissingClause {
        entity: String,
        action: String,
        clause: String,
    },
}

impl ValidationError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ValidationError::MalformedPath { .. } => "MALFORMED_PATH",
            ValidationError::UnknownOperator { .. } => "UNKNOWN_OPERATOR",
            ValidationError::InvalidOperand { .. } => "INVALID_OPERAND",
            ValidationError::InvalidValue { .. } => "INVALID_VALUE",
            ValidationError::InvalidOption { .. } => "INVALID_OPTION",
            ValidationError::MissingRequired { .. } => "MISSING_REQUIRED",
            ValidationError::ReadOnly { .. } => "READ_ONLY",
            ValidationError::MissingClause { .. } => "MISSING_CLAUSE",
        }
    }

    pub fn field_path(&self) -> Option<&str> {
        match self {
            ValidationError::MalformedPath { path, .. }
            | ValidationError::UnknownOperator { path, .. }
            | ValidationError::InvalidOperand { path, .. }
            | ValidationError::InvalidValue { path, .. }
            | ValidationError::InvalidOption { path, .. }
            | ValidationError::MissingRequired { path }
            | ValidationError::ReadOnly { path } => Some(path),
            ValidationError::MissingClause { .. } => None,
        }
    }
}

// =============================================================================
// NotFound Errors
// =============================================================================

/// Errors for references that do not resolve
#[derive(Debug, Error)]
pub enum NotFoundError {
    /// Entity type is not registered
    #[error("Unknown entity type: {entity}")]
    Entity { entity: String },

    /// No active custom group of that name extends the entity
    #[error("Custom group '{group}' not found for {entity} (in '{path}')")]
    Group {
        path: String,
        entity: String,
        group: String,
    },

    /// Custom group exists but has no such field
    #[error("Custom field '{field}' not found in group '{group}' (in '{path}')")]
    Field {
        path: String,
        group: String,
        field: String,
    },

    /// Entity has no such column
    #[error("{entity} has no field '{path}'")]
    Column { path: String, entity: String },

    /// Referenced record does not exist
    #[error("{entity} with id '{id}' not found")]
    Record { entity: String, id: i64 },
}

impl NotFoundError {
    pub fn error_code(&self) -> &'static str {
        match self {
            NotFoundError::Entity { .. } => "UNKNOWN_ENTITY_TYPE",
            NotFoundError::Group { .. } => "CUSTOM_GROUP_NOT_FOUND",
            NotFoundError::Field { .. } => "CUSTOM_FIELD_NOT_FOUND",
            NotFoundError::Column { .. } => "FIELD_NOT_FOUND",
            NotFoundError::Record { .. } => "RECORD_NOT_FOUND",
        }
    }

    pub fn field_path(&self) -> Option<&str> {
        match self {
            NotFoundError::Group { path, .. }
            | NotFoundError::Field { path, .. }
            | NotFoundError::Column { path, .. } => Some(path),
            NotFoundError::Entity { .. } | NotFoundError::Record { .. } => None,
        }
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors related to the storage boundary
#[derive(Debug, Error)]
pub enum StorageError {
    /// Query execution error
    #[error("{backend} query error: {message}")]
    QueryError { backend: String, message: String },

    /// Transaction error
    #[error("Transaction error: {message}")]
    TransactionError { message: String },

    /// Backend returned an output the caller did not expect
    #[error("Unexpected query output: expected {expected}")]
    UnexpectedOutput { expected: String },
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to parse configuration
    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    /// Invalid value in configuration
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// IO error while reading configuration
    #[error("IO error: {message}")]
    IoError { message: String },
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<serde_yaml::Error> for ApiError {
    fn from(err: serde_yaml::Error) -> Self {
        ApiError::Config(ConfigError::ParseError {
            message: err.to_string(),
        })
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Config(ConfigError::IoError {
            message: err.to_string(),
        })
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::Config(ConfigError::InvalidValue {
            field: err
                .field_errors()
                .keys()
                .next()
                .map(|k| k.to_string())
                .unwrap_or_default(),
            message: err.to_string(),
        })
    }
}

/// A specialized Result type for action API operations
pub type ApiResult<T> = Result<T, ApiError>;
