//! CustomField entity
//!
//! Creating a field adds its column to the group's extension table and, when
//! an `options` map is given, stores the option list backing it.

use super::{EntityBehavior, EntityRegistry, custom_group, options, text_value};
use crate::api::Record;
use crate::core::auth::EntityPermissions;
use crate::core::error::{ApiError, ApiResult, NotFoundError, ValidationError};
use crate::core::field::{DataType, FieldValue};
use crate::core::path::munge_name;
use crate::core::schema::{ColumnDef, EntityDefinition, HtmlType};
use crate::storage::{Query, Row, SelectQuery, Storage};
use async_trait::async_trait;

pub const ENTITY: &str = "CustomField";
pub const TABLE: &str = "civicrm_custom_field";

/// Name of the extension table column holding a field
pub fn column_name(name: &str, id: i64) -> String {
    format!("{}_{}", name.to_lowercase(), id)
}

pub struct CustomFieldEntity {
    definition: EntityDefinition,
}

impl CustomFieldEntity {
    pub fn new() -> Self {
        Self {
            definition: EntityDefinition {
                name: ENTITY.to_string(),
                table: TABLE.to_string(),
                columns: vec![
                    ColumnDef::id(),
                    ColumnDef::new("custom_group_id", DataType::Int).required(),
                    ColumnDef::new("name", DataType::String),
                    ColumnDef::new("label", DataType::String).required(),
                    ColumnDef::new("html_type", DataType::String).with_default("Text"),
                    ColumnDef::new("data_type", DataType::String).with_default("String"),
                    ColumnDef::new("column_name", DataType::String).readonly(),
                    ColumnDef::new("option_group_id", DataType::Int).readonly(),
                    ColumnDef::new("is_required", DataType::Boolean).with_default(false),
                    ColumnDef::new("is_active", DataType::Boolean).with_default(true),
                    ColumnDef::new("options", DataType::String).input_only(),
                ],
                extendable: false,
                permissions: EntityPermissions::default(),
            },
        }
    }
}

impl Default for CustomFieldEntity {
    fn default() -> Self {
        Self::new()
    }
}

fn check_types(values: &Row) -> ApiResult<()> {
    if let Some(html_type) = text_value(values, "html_type")
        && HtmlType::parse(html_type).is_none()
    {
        return Err(ValidationError::InvalidValue {
            path: "html_type".to_string(),
            message: format!("unknown widget '{}'", html_type),
        }
        .into());
    }
    if let Some(data_type) = text_value(values, "data_type")
        && DataType::parse(data_type).is_none()
    {
        return Err(ValidationError::InvalidValue {
            path: "data_type".to_string(),
            message: format!("unknown data type '{}'", data_type),
        }
        .into());
    }
    Ok(())
}

#[async_trait]
impl EntityBehavior for CustomFieldEntity {
    fn definition(&self) -> &EntityDefinition {
        &self.definition
    }

    fn before_create(&self, _registry: &EntityRegistry, values: &mut Row) -> ApiResult<()> {
        check_types(values)?;
        let name = match text_value(values, "name") {
            Some(name) => munge_name(name),
            None => munge_name(text_value(values, "label").unwrap_or_default()),
        };
        values.insert("name".to_string(), name.into());
        Ok(())
    }

    fn before_update(&self, _registry: &EntityRegistry, values: &mut Row) -> ApiResult<()> {
        for frozen in ["name", "custom_group_id", "data_type"] {
            if values.contains_key(frozen) {
                return Err(ValidationError::ReadOnly {
                    path: frozen.to_string(),
                }
                .into());
            }
        }
        check_types(values)
    }

    async fn after_create(
        &self,
        storage: &dyn Storage,
        record: &mut Record,
        inputs: &Row,
    ) -> ApiResult<()> {
        let id = record
            .id()
            .ok_or_else(|| ApiError::Internal("custom field without id".to_string()))?;
        let group_id = record
            .get("custom_group_id")
            .and_then(FieldValue::as_integer)
            .ok_or_else(|| ApiError::Internal("custom field without group".to_string()))?;
        let name = record
            .get("name")
            .and_then(FieldValue::as_string)
            .unwrap_or_default()
            .to_string();
        let label = record
            .get("label")
            .and_then(FieldValue::as_string)
            .unwrap_or_default()
            .to_string();

        let group = storage
            .select(SelectQuery::where_in(
                custom_group::TABLE,
                "id",
                vec![FieldValue::Integer(group_id)],
            ))
            .await?
            .into_iter()
            .next()
            .ok_or(NotFoundError::Record {
                entity: custom_group::ENTITY.to_string(),
                id: group_id,
            })?;
        let group_table = group
            .get("t.table_name")
            .and_then(FieldValue::as_string)
            .ok_or_else(|| ApiError::Internal(format!("custom group {} has no table", group_id)))?
            .to_string();
        let group_name = group
            .get("t.name")
            .and_then(FieldValue::as_string)
            .unwrap_or_default()
            .to_string();

        let column = column_name(&name, id);
        storage
            .execute(Query::AddColumn {
                table: group_table,
                column: column.clone(),
            })
            .await?;

        let mut values = Row::new();
        values.insert("column_name".to_string(), column.as_str().into());
        match inputs.get("options") {
            None | Some(FieldValue::Null) => {}
            Some(FieldValue::Map(list)) if !list.is_empty() => {
                let option_group = options::create_option_list(
                    storage,
                    &format!("{}_{}", group_name, name),
                    &label,
                    list,
                    "options",
                )
                .await?;
                values.insert("option_group_id".to_string(), option_group.into());
            }
            Some(_) => {
                return Err(ValidationError::InvalidValue {
                    path: "options".to_string(),
                    message: "expected a non-empty map of value to label".to_string(),
                }
                .into());
            }
        }

        storage
            .execute(Query::Update {
                table: TABLE.to_string(),
                values: values.clone(),
                ids: vec![id],
            })
            .await?;

        tracing::debug!(field = %name, column = %column, "created custom field");
        for (key, value) in values {
            record.insert(key, value);
        }
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
    fn test_column_name() {
        assert_eq!(column_name("FavColor", 12), "favcolor_12");
    }

    #[test]
    fn test_name_defaults_to_munged_label() {
        let mut values = row(&[("label", "Favorite Food")]);
        CustomFieldEntity::new()
            .before_create(&EntityRegistry::new(), &mut values)
            .unwrap();
        assert_eq!(values["name"], FieldValue::from("Favorite_Food"));
    }

    #[test]
    fn test_rejects_unknown_types() {
        let entity = CustomFieldEntity::new();
        let registry = EntityRegistry::new();

        let mut values = row(&[("label", "X"), ("html_type", "Slider")]);
        let err = entity.before_create(&registry, &mut values).unwrap_err();
        assert_eq!(err.field_path(), Some("html_type"));

        let mut values = row(&[("label", "X"), ("data_type", "Blob")]);
        let err = entity.before_create(&registry, &mut values).unwrap_err();
        assert_eq!(err.field_path(), Some("data_type"));
    }

    #[test]
    fn test_structural_columns_are_frozen() {
        let mut values = row(&[("data_type", "Int")]);
        let err = CustomFieldEntity::new()
            .before_update(&EntityRegistry::new(), &mut values)
            .unwrap_err();
        assert_eq!(err.error_code(), "READ_ONLY");
    }

    #[test]
    fn test_options_are_input_only() {
        let entity = CustomFieldEntity::new();
        let options = entity.definition().column("options").unwrap();
        assert!(!options.stored);
        assert!(entity.definition().stored_columns().all(|c| c.name != "options"));
    }
}
