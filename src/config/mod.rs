//! Configuration loading and management

use crate::core::auth::{AuthPolicy, EntityPermissions};
use crate::core::error::{ApiResult, ConfigError};
use crate::core::field::{DataType, FieldValue};
use crate::core::path::FieldPath;
use crate::core::schema::{ColumnDef, EntityDefinition, ID_COLUMN};
use serde::{Deserialize, Serialize};
use validator::Validate;

fn default_true() -> bool {
    true
}

fn default_event_capacity() -> usize {
    1024
}

/// A column of a configured entity
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ColumnConfig {
    #[validate(length(min = 1))]
    pub name: String,

    #[serde(default)]
    pub data_type: DataType,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub readonly: bool,

    /// Value used on create when none is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<FieldValue>,
}

/// Policies of a configured entity, in `AuthPolicy::parse_policy` syntax
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<String>,
}

/// Configuration for an additional entity type
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EntityConfig {
    /// Entity type name (e.g., "Membership")
    #[validate(length(min = 1))]
    pub name: String,

    /// Table name, `civicrm_<name>` when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Whether custom groups may extend it
    #[serde(default)]
    pub extendable: bool,

    #[serde(default)]
    pub permissions: PermissionsConfig,

    #[validate(nested)]
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
}

impl EntityConfig {
    /// Build the entity definition; the `id` column is always added
    pub fn to_definition(&self) -> ApiResult<EntityDefinition> {
        let invalid = |field: String, message: String| ConfigError::InvalidValue { field, message };

        let mut columns = vec![ColumnDef::id()];
        for column in &self.columns {
            let field = format!("{}.{}", self.name, column.name);
            if !matches!(FieldPath::parse(&column.name), Ok(FieldPath::Column(_))) {
                return Err(invalid(field, "not a valid column name".to_string()).into());
            }
            if column.name == ID_COLUMN || columns.iter().any(|c| c.name == column.name) {
                return Err(invalid(field, "duplicate column".to_string()).into());
            }
            let mut def = ColumnDef::new(&column.name, column.data_type);
            def.required = column.required;
            def.readonly = column.readonly;
            if let Some(default) = &column.default {
                let value = column
                    .data_type
                    .coerce(default.clone())
                    .map_err(|message| invalid(field.clone(), message))?;
                def = def.with_default(value);
            }
            columns.push(def);
        }

        let defaults = EntityPermissions::default();
        let policy = |configured: &Option<String>, fallback: AuthPolicy| {
            configured
                .as_deref()
                .map(AuthPolicy::parse_policy)
                .unwrap_or(fallback)
        };

        Ok(EntityDefinition {
            name: self.name.clone(),
            table: self
                .table
                .clone()
                .unwrap_or_else(|| format!("civicrm_{}", self.name.to_lowercase())),
            columns,
            extendable: self.extendable,
            permissions: EntityPermissions {
                get: policy(&self.permissions.get, defaults.get),
                create: policy(&self.permissions.create, defaults.create),
                update: policy(&self.permissions.update, defaults.update),
            },
        })
    }
}

/// Complete configuration of the action API
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApiConfig {
    /// Default of `check_permissions` for new actions
    #[serde(default = "default_true")]
    pub check_permissions: bool,

    /// Buffer size of the event bus
    #[validate(range(min = 1))]
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Entities beyond the built-in ones
    #[validate(nested)]
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
}

impl ApiConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<std::path::Path>) -> ApiResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> ApiResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Definitions of the configured entities
    pub fn entity_definitions(&self) -> ApiResult<Vec<EntityDefinition>> {
        self.entities.iter().map(EntityConfig::to_definition).collect()
    }

    /// Configuration with no extra entities and permission checks on
    pub fn default_config() -> Self {
        Self {
            check_permissions: true,
            event_capacity: default_event_capacity(),
            entities: Vec::new(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r#"
check_permissions: false
entities:
  - name: Membership
    extendable: true
    permissions:
      get: public
      create: "permission:edit memberships|administer CiviCRM"
    columns:
      - name: status
        data_type: String
        required: true
      - name: fee
        data_type: Money
        default: 10
"#;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default_config();
        assert!(config.check_permissions);
        assert_eq!(config.event_capacity, 1024);
        assert!(config.entities.is_empty());
    }

    #[test]
    fn test_entities_from_yaml() {
        let config = ApiConfig::from_yaml_str(YAML).unwrap();
        assert!(!config.check_permissions);
        assert_eq!(config.event_capacity, 1024);

        let defs = config.entity_definitions().unwrap();
        let membership = &defs[0];
        assert_eq!(membership.table, "civicrm_membership");
        assert!(membership.extendable);
        assert_eq!(membership.columns.len(), 3);
        assert!(membership.column("status").unwrap().required);
        assert_eq!(
            membership.column("fee").unwrap().default,
            Some(FieldValue::Float(10.0))
        );
        assert!(matches!(membership.permissions.get, AuthPolicy::Public));
        assert!(matches!(
            membership.permissions.create,
            AuthPolicy::HasPermission(ref p) if p.len() == 2
        ));
    }

    #[test]
    fn test_yaml_serialization() {
        let config = ApiConfig::from_yaml_str(YAML).unwrap();
        let yaml = serde_yaml::to_string(&config).unwrap();

        let parsed = ApiConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed.entities.len(), 1);
        assert_eq!(parsed.entities[0].columns.len(), 2);
    }

    #[test]
    fn test_invalid_capacity_is_rejected() {
        let err = ApiConfig::from_yaml_str("event_capacity: 0").unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_bad_column_name_is_rejected() {
        let config = ApiConfig::from_yaml_str(
            "entities:\n  - name: Thing\n    columns:\n      - name: \"a.b\"\n",
        )
        .unwrap();
        assert!(config.entity_definitions().is_err());

        let config = ApiConfig::from_yaml_str(
            "entities:\n  - name: Thing\n    columns:\n      - name: id\n",
        )
        .unwrap();
        assert!(config.entity_definitions().is_err());
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();
        let config = ApiConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.entities[0].name, "Membership");

        let err = ApiConfig::from_yaml_file("/nonexistent/crm.yaml").unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }
}
