//! # this-crm
//!
//! An entity action API for a CRM with dynamically defined custom fields.
//!
//! ## Features
//!
//! - **Fluent Actions**: `create`, `get` and `update` builders per entity
//! - **Custom Fields**: administrator-defined groups of fields extending an
//!   entity, addressed as `Group.Field` or `Group.Field.label`
//! - **Bounded Queries**: query count scales with the custom groups an
//!   action touches, never with the number of fields
//! - **Prepare Pipeline**: ordered stages that can extend or reject
//!   an action before it runs
//! - **Query Counting**: wrap any storage in [`storage::CountingStorage`]
//! - **Events**: create and update notifications on a broadcast bus
//! - **Configuration-Based**: extra entities declared in YAML
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use crm::prelude::*;
//!
//! let api = ApiBuilder::new()
//!     .with_storage(InMemoryStorage::new())
//!     .with_auth(AuthContext::Admin)
//!     .build()
//!     .await?;
//!
//! CustomGroup::create(&api)
//!     .add_value("name", "MyContactFields")
//!     .add_value("extends", "Contact")
//!     .execute()
//!     .await?;
//! // ... create fields, then:
//! let contact = Contact::create(&api)
//!     .add_value("contact_type", "Individual")
//!     .add_value("first_name", "Red")
//!     .add_value("MyContactFields.FavColor", "r")
//!     .execute()
//!     .await?;
//!
//! let found = Contact::get(&api)
//!     .add_select("MyContactFields.FavColor.label")
//!     .add_where("MyContactFields.FavColor", "=", "r")
//!     .execute()
//!     .await?;
//! ```

pub mod api;
pub mod config;
pub mod core;
pub mod entities;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        action::{ActionDescription, Operand, Operation, Operator, OrderDirection},
        auth::{AuthContext, AuthPolicy, EntityPermissions, permissions},
        error::{ApiError, ApiResult, NotFoundError, StorageError, ValidationError},
        events::{ApiEvent, EventBus, EventEnvelope},
        field::{DataType, FieldValue},
        path::FieldPath,
        schema::{ColumnDef, EntityDefinition, HtmlType, OptionAttribute, SchemaSnapshot},
    };

    // === Api ===
    pub use crate::api::{
        ActionBuilder, Api, ApiBuilder, PrepareContext, PrepareStage, PreparedAction, Record,
        ResultSet, stage_fn,
    };

    // === Entities ===
    pub use crate::entities::{
        Contact, CustomField, CustomGroup, EntityBehavior, EntityRegistry, GenericEntity,
        OptionGroup, OptionValue,
    };

    // === Macros ===
    pub use crate::api_entity;

    // === Storage ===
    pub use crate::storage::{CountingStorage, InMemoryStorage, QueryCounter, Storage};

    // === Config ===
    pub use crate::config::ApiConfig;

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
    pub use serde::{Deserialize, Serialize};
}
