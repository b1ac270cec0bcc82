//! Core module containing the fundamental types of the action API

pub mod action;
pub mod auth;
pub mod error;
pub mod events;
pub mod field;
pub mod path;
pub mod schema;

pub use action::{ActionDescription, Operand, Operation, Operator, OrderDirection};
pub use auth::{AuthContext, AuthPolicy, EntityPermissions};
pub use error::{ApiError, ApiResult, NotFoundError, StorageError, ValidationError};
pub use events::{ApiEvent, EventBus, EventEnvelope};
pub use field::{DataType, FieldValue};
pub use path::FieldPath;
pub use schema::{
    ColumnDef, CustomField, CustomGroup, EntityDefinition, HtmlType, OptionAttribute,
    OptionValue, SchemaSnapshot,
};
