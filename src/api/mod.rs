//! The action API
//!
//! ```text
//! ActionBuilder::execute()
//!   ├─ syntax check            no query
//!   ├─ resolver snapshot       ≤ 3 metadata queries
//!   ├─ prepare pipeline        no query
//!   ├─ executor                queries per distinct custom group
//!   └─ EventBus::publish()     after commit
//! ```

pub mod builder;
pub mod executor;
pub mod pipeline;
pub mod resolver;
pub mod result;

pub use builder::ActionBuilder;
pub use executor::Executor;
pub use pipeline::{
    Assignment, Filter, Pipeline, PrepareContext, PrepareStage, PreparedAction, Sort, stage_fn,
};
pub use resolver::{CustomTarget, Resolved, Target, ValueTransform};
pub use result::{Record, ResultSet};

use crate::config::ApiConfig;
use crate::core::action::{ActionDescription, Operation};
use crate::core::auth::AuthContext;
use crate::core::error::{ApiError, ApiResult, ConfigError};
use crate::core::events::{ApiEvent, EventBus};
use crate::entities::{EntityBehavior, EntityRegistry, GenericEntity};
use crate::storage::{Query, Storage, TableDef};
use std::sync::Arc;

struct ApiInner {
    storage: Arc<dyn Storage>,
    registry: EntityRegistry,
    pipeline: Pipeline,
    events: EventBus,
    config: ApiConfig,
}

/// Entry point of the action API
///
/// Cheap to clone. Every clone shares storage, entities, stages and the
/// event bus; [`as_user`](Self::as_user) gives a handle acting for another
/// caller.
///
/// Actions on one storage must be awaited sequentially: writes open a
/// storage transaction, and a second write started before the first
/// finishes fails with a transaction error.
#[derive(Clone)]
pub struct Api {
    inner: Arc<ApiInner>,
    auth: AuthContext,
}

impl Api {
    pub fn builder() -> ApiBuilder {
        ApiBuilder::new()
    }

    /// Start an action on an entity
    pub fn action(&self, entity: &str, operation: Operation) -> ActionBuilder {
        let description = ActionDescription::new(entity, operation)
            .with_check_permissions(self.inner.config.check_permissions);
        ActionBuilder::new(self.clone(), description)
    }

    pub fn create(&self, entity: &str) -> ActionBuilder {
        self.action(entity, Operation::Create)
    }

    pub fn get(&self, entity: &str) -> ActionBuilder {
        self.action(entity, Operation::Get)
    }

    pub fn update(&self, entity: &str) -> ActionBuilder {
        self.action(entity, Operation::Update)
    }

    /// Handle acting for another caller
    pub fn as_user(&self, auth: AuthContext) -> Api {
        Api {
            inner: self.inner.clone(),
            auth,
        }
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    /// Event bus receiving create and update notifications
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.inner.registry
    }

    pub fn storage(&self) -> &dyn Storage {
        self.inner.storage.as_ref()
    }

    /// Prepare and run an action description
    pub async fn execute(&self, description: ActionDescription) -> ApiResult<ResultSet> {
        description.check_syntax()?;
        let inner = &self.inner;
        let entity = inner.registry.get(&description.entity)?;
        let definition = entity.definition();

        let schema = resolver::load_snapshot(inner.storage.as_ref(), definition).await?;
        let ctx = PrepareContext {
            auth: &self.auth,
            definition,
            schema: &schema,
        };
        let prepared = inner.pipeline.run(description, &ctx)?;

        let executor = Executor::new(inner.storage.as_ref(), &inner.registry, entity.as_ref());
        let operation = prepared.operation();
        let records = match operation {
            Operation::Create => executor.create(&prepared).await?,
            Operation::Get => executor.get(&prepared).await?,
            Operation::Update => executor.update(&prepared).await?,
        };

        self.publish(&definition.name, operation, &records);
        tracing::debug!(
            entity = %definition.name,
            action = operation.as_str(),
            count = records.len(),
            "action complete"
        );
        Ok(ResultSet::new(&definition.name, operation, records))
    }

    fn publish(&self, entity: &str, operation: Operation, records: &[Record]) {
        let event = match operation {
            Operation::Get => return,
            Operation::Update if records.is_empty() => return,
            Operation::Create => match records.first() {
                Some(record) => ApiEvent::Created {
                    entity: entity.to_string(),
                    id: record.id().unwrap_or_default(),
                    values: serde_json::to_value(record).unwrap_or_default(),
                },
                None => return,
            },
            Operation::Update => ApiEvent::Updated {
                entity: entity.to_string(),
                ids: records.iter().filter_map(Record::id).collect(),
                values: serde_json::to_value(records).unwrap_or_default(),
            },
        };
        self.inner.events.publish(event);
    }
}

/// Builder for [`Api`]
///
/// # Example
///
/// ```rust,ignore
/// let api = ApiBuilder::new()
///     .with_storage(InMemoryStorage::new())
///     .with_stage(stage_fn("audit", |action, _| Ok(action)))
///     .build()
///     .await?;
/// ```
pub struct ApiBuilder {
    storage: Option<Arc<dyn Storage>>,
    config: Option<ApiConfig>,
    auth: AuthContext,
    stages: Vec<Arc<dyn PrepareStage>>,
    entities: Vec<Arc<dyn EntityBehavior>>,
    event_bus: Option<EventBus>,
}

impl ApiBuilder {
    pub fn new() -> Self {
        Self {
            storage: None,
            config: None,
            auth: AuthContext::default(),
            stages: Vec::new(),
            entities: Vec::new(),
            event_bus: None,
        }
    }

    /// Set the storage backend (required)
    pub fn with_storage(self, storage: impl Storage + 'static) -> Self {
        self.with_shared_storage(Arc::new(storage))
    }

    pub fn with_shared_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_config(mut self, config: ApiConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Caller the API acts for
    pub fn with_auth(mut self, auth: AuthContext) -> Self {
        self.auth = auth;
        self
    }

    /// Register a prepare stage; stages run in registration order after
    /// the built-in ones
    pub fn with_stage(mut self, stage: impl PrepareStage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Register an additional entity
    pub fn with_entity(mut self, entity: impl EntityBehavior + 'static) -> Self {
        self.entities.push(Arc::new(entity));
        self
    }

    /// Use an existing event bus instead of creating one
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Build the API and create the tables of every registered entity
    pub async fn build(self) -> ApiResult<Api> {
        let storage = self.storage.ok_or_else(|| {
            ApiError::Config(ConfigError::InvalidValue {
                field: "storage".to_string(),
                message: "a storage backend is required".to_string(),
            })
        })?;
        let config = self.config.unwrap_or_default();

        let mut registry = EntityRegistry::with_builtins();
        for definition in config.entity_definitions()? {
            registry.register(Arc::new(GenericEntity::new(definition)));
        }
        for entity in self.entities {
            registry.register(entity);
        }

        let mut pipeline = Pipeline::new();
        for stage in self.stages {
            pipeline.register(stage);
        }

        for definition in registry.definitions() {
            storage
                .execute(Query::CreateTable(TableDef {
                    name: definition.table.clone(),
                    columns: definition
                        .stored_columns()
                        .map(|c| c.name.clone())
                        .collect(),
                }))
                .await?;
        }

        let events = self
            .event_bus
            .unwrap_or_else(|| EventBus::new(config.event_capacity));
        tracing::info!(
            entities = ?registry.entity_types(),
            stages = ?pipeline.stage_names(),
            "action API ready"
        );

        Ok(Api {
            inner: Arc::new(ApiInner {
                storage,
                registry,
                pipeline,
                events,
                config,
            }),
            auth: self.auth,
        })
    }
}

impl Default for ApiBuilder {
    fn default() -> Self {
        Self::new()
    }
}
