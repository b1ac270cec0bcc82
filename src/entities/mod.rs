//! Entity types and their lifecycle hooks
//!
//! Every entity the API can act on is an [`EntityBehavior`]: a static
//! [`EntityDefinition`] plus hooks the executor calls around writes. The
//! built-in entities are [`contact::ContactEntity`],
//! [`custom_group::CustomGroupEntity`], [`custom_field::CustomFieldEntity`]
//! and the option tables in [`options`]; plain entities declared in YAML are
//! served by [`GenericEntity`].

pub mod contact;
pub mod custom_field;
pub mod custom_group;
pub mod macros;
pub mod options;

use crate::api::Record;
use crate::core::error::{ApiResult, NotFoundError};
use crate::core::field::FieldValue;
use crate::core::schema::EntityDefinition;
use crate::storage::{Row, Storage};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;

/// Definition and write hooks of one entity type
///
/// Hooks run inside the write transaction: an error from any of them rolls
/// the whole action back.
#[async_trait]
pub trait EntityBehavior: Send + Sync {
    fn definition(&self) -> &EntityDefinition;

    /// Adjust the base-table values of a new record before insert
    fn before_create(&self, _registry: &EntityRegistry, _values: &mut Row) -> ApiResult<()> {
        Ok(())
    }

    /// Adjust the base-table values of an update
    fn before_update(&self, _registry: &EntityRegistry, _values: &mut Row) -> ApiResult<()> {
        Ok(())
    }

    /// Runs after the base row is inserted
    ///
    /// `inputs` holds the values of input-only columns, which are never
    /// stored in the entity table.
    async fn after_create(
        &self,
        _storage: &dyn Storage,
        _record: &mut Record,
        _inputs: &Row,
    ) -> ApiResult<()> {
        Ok(())
    }
}

/// Entity without hooks, e.g. declared in configuration
pub struct GenericEntity {
    definition: EntityDefinition,
}

impl GenericEntity {
    pub fn new(definition: EntityDefinition) -> Self {
        Self { definition }
    }
}

impl EntityBehavior for GenericEntity {
    fn definition(&self) -> &EntityDefinition {
        &self.definition
    }
}

/// Registry of all entity types the API knows, by name
#[derive(Clone, Default)]
pub struct EntityRegistry {
    entities: IndexMap<String, Arc<dyn EntityBehavior>>,
}

impl EntityRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in entities
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(contact::ContactEntity::new()));
        registry.register(Arc::new(custom_group::CustomGroupEntity::new()));
        registry.register(Arc::new(custom_field::CustomFieldEntity::new()));
        registry.register(Arc::new(options::OptionGroupEntity::new()));
        registry.register(Arc::new(options::OptionValueEntity::new()));
        registry
    }

    /// Register an entity, replacing any previous one of the same name
    pub fn register(&mut self, entity: Arc<dyn EntityBehavior>) {
        let name = entity.definition().name.clone();
        self.entities.insert(name, entity);
    }

    pub fn get(&self, name: &str) -> ApiResult<&Arc<dyn EntityBehavior>> {
        self.entities.get(name).ok_or_else(|| {
            NotFoundError::Entity {
                entity: name.to_string(),
            }
            .into()
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    /// Get all registered entity types
    pub fn entity_types(&self) -> Vec<&str> {
        self.entities.keys().map(String::as_str).collect()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &EntityDefinition> {
        self.entities.values().map(|e| e.definition())
    }
}

/// Non-empty text value of a column
pub(crate) fn text_value<'a>(values: &'a Row, column: &str) -> Option<&'a str> {
    values
        .get(column)
        .and_then(FieldValue::as_string)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

crate::api_entity!(
    /// Individuals, organizations and households
    Contact,
    contact::ENTITY
);

crate::api_entity!(
    /// Sets of custom fields extending an entity
    CustomGroup,
    custom_group::ENTITY
);

crate::api_entity!(
    /// Fields of a custom group
    CustomField,
    custom_field::ENTITY
);

crate::api_entity!(OptionGroup, options::OPTION_GROUP_ENTITY);

crate::api_entity!(OptionValue, options::OPTION_VALUE_ENTITY);
