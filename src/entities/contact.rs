//! Contact entity

use super::{EntityBehavior, EntityRegistry, text_value};
use crate::core::auth::{AuthPolicy, EntityPermissions, permissions};
use crate::core::error::{ApiResult, ValidationError};
use crate::core::field::{DataType, FieldValue};
use crate::core::schema::{ColumnDef, EntityDefinition};
use crate::storage::Row;
use chrono::Utc;

pub const ENTITY: &str = "Contact";
pub const TABLE: &str = "civicrm_contact";

/// Allowed values of `contact_type`
pub const CONTACT_TYPES: [&str; 3] = ["Individual", "Organization", "Household"];

/// Individuals, organizations and households
///
/// `display_name` is derived from the name columns on create; the dates are
/// maintained by the hooks.
pub struct ContactEntity {
    definition: EntityDefinition,
}

impl ContactEntity {
    pub fn new() -> Self {
        Self {
            definition: EntityDefinition {
                name: ENTITY.to_string(),
                table: TABLE.to_string(),
                columns: vec![
                    ColumnDef::id(),
                    ColumnDef::new("contact_type", DataType::String).required(),
                    ColumnDef::new("first_name", DataType::String),
                    ColumnDef::new("last_name", DataType::String),
                    ColumnDef::new("organization_name", DataType::String),
                    ColumnDef::new("display_name", DataType::String).readonly(),
                    ColumnDef::new("is_deleted", DataType::Boolean).with_default(false),
                    ColumnDef::new("created_date", DataType::Date).readonly(),
                    ColumnDef::new("modified_date", DataType::Date).readonly(),
                ],
                extendable: true,
                permissions: EntityPermissions {
                    get: AuthPolicy::permission(permissions::VIEW_CONTACTS),
                    create: AuthPolicy::permission(permissions::ADD_CONTACTS),
                    update: AuthPolicy::permission(permissions::EDIT_CONTACTS),
                },
            },
        }
    }
}

impl Default for ContactEntity {
    fn default() -> Self {
        Self::new()
    }
}

fn check_contact_type(values: &Row) -> ApiResult<()> {
    match values.get("contact_type") {
        Some(FieldValue::String(t)) if !CONTACT_TYPES.contains(&t.as_str()) => {
            Err(ValidationError::InvalidValue {
                path: "contact_type".to_string(),
                message: format!("'{}' is not one of {}", t, CONTACT_TYPES.join(", ")),
            }
            .into())
        }
        _ => Ok(()),
    }
}

/// Name shown for a contact
fn display_name(values: &Row) -> Option<String> {
    match text_value(values, "contact_type") {
        Some("Individual") => {
            let parts: Vec<&str> = ["first_name", "last_name"]
                .iter()
                .filter_map(|c| text_value(values, c))
                .collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        }
        _ => text_value(values, "organization_name").map(str::to_string),
    }
}

impl EntityBehavior for ContactEntity {
    fn definition(&self) -> &EntityDefinition {
        &self.definition
    }

    fn before_create(&self, _registry: &EntityRegistry, values: &mut Row) -> ApiResult<()> {
        check_contact_type(values)?;
        let now = FieldValue::DateTime(Utc::now());
        values.insert("display_name".to_string(), display_name(values).into());
        values.insert("created_date".to_string(), now.clone());
        values.insert("modified_date".to_string(), now);
        Ok(())
    }

    fn before_update(&self, _registry: &EntityRegistry, values: &mut Row) -> ApiResult<()> {
        check_contact_type(values)?;
        values.insert("modified_date".to_string(), FieldValue::DateTime(Utc::now()));
        Ok(())
    }
}
