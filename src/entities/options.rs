//! Option groups and option values backing choice fields

use super::{EntityBehavior, EntityRegistry, text_value};
use crate::core::auth::EntityPermissions;
use crate::core::error::{ApiResult, ValidationError};
use crate::core::field::{DataType, FieldValue};
use crate::core::schema::{ColumnDef, EntityDefinition};
use crate::storage::{Row, Storage};
use indexmap::IndexMap;

pub const OPTION_GROUP_ENTITY: &str = "OptionGroup";
pub const OPTION_GROUP_TABLE: &str = "civicrm_option_group";
pub const OPTION_VALUE_ENTITY: &str = "OptionValue";
pub const OPTION_VALUE_TABLE: &str = "civicrm_option_value";

pub struct OptionGroupEntity {
    definition: EntityDefinition,
}

impl OptionGroupEntity {
    pub fn new() -> Self {
        Self {
            definition: EntityDefinition {
                name: OPTION_GROUP_ENTITY.to_string(),
                table: OPTION_GROUP_TABLE.to_string(),
                columns: vec![
                    ColumnDef::id(),
                    ColumnDef::new("name", DataType::String).required(),
                    ColumnDef::new("title", DataType::String),
                    ColumnDef::new("is_active", DataType::Boolean).with_default(true),
                ],
                extendable: false,
                permissions: EntityPermissions::default(),
            },
        }
    }
}

impl Default for OptionGroupEntity {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityBehavior for OptionGroupEntity {
    fn definition(&self) -> &EntityDefinition {
        &self.definition
    }

    fn before_create(&self, _registry: &EntityRegistry, values: &mut Row) -> ApiResult<()> {
        if text_value(values, "title").is_none() {
            let name = values.get("name").cloned().unwrap_or(FieldValue::Null);
            values.insert("title".to_string(), name);
        }
        Ok(())
    }
}

pub struct OptionValueEntity {
    definition: EntityDefinition,
}

impl OptionValueEntity {
    pub fn new() -> Self {
        Self {
            definition: EntityDefinition {
                name: OPTION_VALUE_ENTITY.to_string(),
                table: OPTION_VALUE_TABLE.to_string(),
                columns: vec![
                    ColumnDef::id(),
                    ColumnDef::new("option_group_id", DataType::Int).required(),
                    ColumnDef::new("value", DataType::String).required(),
                    ColumnDef::new("label", DataType::String).required(),
                    ColumnDef::new("name", DataType::String),
                    ColumnDef::new("weight", DataType::Int).with_default(0i64),
                    ColumnDef::new("is_default", DataType::Boolean).with_default(false),
                    ColumnDef::new("description", DataType::Memo),
                    ColumnDef::new("is_active", DataType::Boolean).with_default(true),
                ],
                extendable: false,
                permissions: EntityPermissions::default(),
            },
        }
    }
}

impl Default for OptionValueEntity {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityBehavior for OptionValueEntity {
    fn definition(&self) -> &EntityDefinition {
        &self.definition
    }

    fn before_create(&self, _registry: &EntityRegistry, values: &mut Row) -> ApiResult<()> {
        if text_value(values, "name").is_none() {
            let label = values.get("label").cloned().unwrap_or(FieldValue::Null);
            values.insert("name".to_string(), label);
        }
        Ok(())
    }
}

/// Store an option list given as `value => label`, weighted in order
///
/// Returns the id of the new option group. Issues one insert for the group
/// and one per option.
pub async fn create_option_list(
    storage: &dyn Storage,
    name: &str,
    title: &str,
    options: &IndexMap<String, FieldValue>,
    path: &str,
) -> ApiResult<i64> {
    let mut group = Row::new();
    group.insert("name".to_string(), name.into());
    group.insert("title".to_string(), title.into());
    group.insert("is_active".to_string(), true.into());
    let group_id = storage.insert(OPTION_GROUP_TABLE, group).await?;

    for (weight, (value, label)) in options.iter().enumerate() {
        let label = label.to_text().ok_or_else(|| ValidationError::InvalidValue {
            path: path.to_string(),
            message: format!("option '{}' needs a text label", value),
        })?;
        let mut option = Row::new();
        option.insert("option_group_id".to_string(), group_id.into());
        option.insert("value".to_string(), value.as_str().into());
        option.insert("label".to_string(), label.as_str().into());
        option.insert("name".to_string(), label.into());
        option.insert("weight".to_string(), (weight as i64 + 1).into());
        option.insert("is_default".to_string(), false.into());
        option.insert("is_active".to_string(), true.into());
        storage.insert(OPTION_VALUE_TABLE, option).await?;
    }

    tracing::debug!(group = name, options = options.len(), "created option list");
    Ok(group_id)
}
