//! CustomGroup entity
//!
//! Creating a custom group also creates its extension table
//! `civicrm_value_<name>_<id>`, keyed by `entity_id`.

use super::{EntityBehavior, EntityRegistry, text_value};
use crate::api::Record;
use crate::core::auth::EntityPermissions;
use crate::core::error::{ApiError, ApiResult, ValidationError};
use crate::core::field::{DataType, FieldValue};
use crate::core::path::munge_name;
use crate::core::schema::{ColumnDef, ENTITY_ID_COLUMN, EntityDefinition, ID_COLUMN};
use crate::storage::{Query, Row, Storage, TableDef};
use async_trait::async_trait;

pub const ENTITY: &str = "CustomGroup";
pub const TABLE: &str = "civicrm_custom_group";

/// Name of the extension table of a group
pub fn table_name(name: &str, id: i64) -> String {
    format!("civicrm_value_{}_{}", name.to_lowercase(), id)
}

pub struct CustomGroupEntity {
    definition: EntityDefinition,
}

impl CustomGroupEntity {
    pub fn new() -> Self {
        Self {
            definition: EntityDefinition {
                name: ENTITY.to_string(),
                table: TABLE.to_string(),
                columns: vec![
                    ColumnDef::id(),
                    ColumnDef::new("name", DataType::String),
                    ColumnDef::new("title", DataType::String),
                    ColumnDef::new("extends", DataType::String).required(),
                    ColumnDef::new("table_name", DataType::String).readonly(),
                    ColumnDef::new("is_active", DataType::Boolean).with_default(true),
                ],
                extendable: false,
                permissions: EntityPermissions::default(),
            },
        }
    }
}

impl Default for CustomGroupEntity {
    fn default() -> Self {
        Self::new()
    }
}

fn check_extends(registry: &EntityRegistry, values: &Row) -> ApiResult<()> {
    let Some(extends) = text_value(values, "extends") else {
        return Ok(());
    };
    let extendable = registry
        .get(extends)
        .map(|e| e.definition().extendable)
        .unwrap_or(false);
    if !extendable {
        return Err(ValidationError::InvalidValue {
            path: "extends".to_string(),
            message: format!("'{}' cannot be extended by custom groups", extends),
        }
        .into());
    }
    Ok(())
}

#[async_trait]
impl EntityBehavior for CustomGroupEntity {
    fn definition(&self) -> &EntityDefinition {
        &self.definition
    }

    fn before_create(&self, registry: &EntityRegistry, values: &mut Row) -> ApiResult<()> {
        check_extends(registry, values)?;
        let name = text_value(values, "name").map(str::to_string);
        let title = text_value(values, "title").map(str::to_string);
        let (name, title) = match (name, title) {
            (Some(name), Some(title)) => (munge_name(&name), title),
            (Some(name), None) => (munge_name(&name), name),
            (None, Some(title)) => (munge_name(&title), title),
            (None, None) => {
                return Err(ValidationError::MissingRequired {
                    path: "name".to_string(),
                }
                .into());
            }
        };
        values.insert("name".to_string(), name.into());
        values.insert("title".to_string(), title.into());
        Ok(())
    }

    fn before_update(&self, registry: &EntityRegistry, values: &mut Row) -> ApiResult<()> {
        if values.contains_key("name") {
            return Err(ValidationError::ReadOnly {
                path: "name".to_string(),
            }
            .into());
        }
        check_extends(registry, values)
    }

    async fn after_create(
        &self,
        storage: &dyn Storage,
        record: &mut Record,
        _inputs: &Row,
    ) -> ApiResult<()> {
        let id = record
            .id()
            .ok_or_else(|| ApiError::Internal("custom group without id".to_string()))?;
        let name = record
            .get("name")
            .and_then(FieldValue::as_string)
            .ok_or_else(|| ApiError::Internal("custom group without name".to_string()))?;
        let table = table_name(name, id);

        storage
            .execute(Query::CreateTable(TableDef {
                name: table.clone(),
                columns: vec![ID_COLUMN.to_string(), ENTITY_ID_COLUMN.to_string()],
            }))
            .await?;

        let mut values = Row::new();
        values.insert("table_name".to_string(), table.as_str().into());
        storage
            .execute(Query::Update {
                table: TABLE.to_string(),
                values,
                ids: vec![id],
            })
            .await?;

        tracing::info!(group = %table, "created custom group table");
        record.insert("table_name", table.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_table_name() {
        assert_eq!(
            table_name("MyContactFields", 3),
            "civicrm_value_mycontactfields_3"
        );
    }

    #[test]
    fn test_name_and_title_default_to_each_other() {
        let registry = EntityRegistry::with_builtins();
        let entity = CustomGroupEntity::new();

        let mut values = row(&[("name", "MyContactFields"), ("extends", "Contact")]);
        entity.before_create(&registry, &mut values).unwrap();
        assert_eq!(values["title"], FieldValue::from("MyContactFields"));

        let mut values = row(&[("title", "More Info"), ("extends", "Contact")]);
        entity.before_create(&registry, &mut values).unwrap();
        assert_eq!(values["name"], FieldValue::from("More_Info"));

        let mut values = row(&[("extends", "Contact")]);
        let err = entity.before_create(&registry, &mut values).unwrap_err();
        assert_eq!(err.error_code(), "MISSING_REQUIRED");
    }

    #[test]
    fn test_extends_must_be_extendable() {
        let registry = EntityRegistry::with_builtins();
        let entity = CustomGroupEntity::new();

        let mut values = row(&[("name", "G"), ("extends", "CustomField")]);
        assert!(entity.before_create(&registry, &mut values).is_err());

        let mut values = row(&[("name", "G"), ("extends", "Spaceship")]);
        let err = entity.before_create(&registry, &mut values).unwrap_err();
        assert_eq!(err.field_path(), Some("extends"));
    }

    #[test]
    fn test_name_cannot_change() {
        let registry = EntityRegistry::with_builtins();
        let mut values = row(&[("name", "Other")]);
        let err = CustomGroupEntity::new()
            .before_update(&registry, &mut values)
            .unwrap_err();
        assert_eq!(err.error_code(), "READ_ONLY");
    }
}
