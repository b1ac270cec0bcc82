//! Entity and custom-field schema
//!
//! Base entities have a fixed set of columns. Extendable entities can also
//! carry custom groups, each stored in its own extension table keyed by
//! `entity_id`. A [`SchemaSnapshot`] is the custom-field metadata of one
//! entity, loaded once per action.

use crate::core::auth::EntityPermissions;
use crate::core::field::{DataType, FieldValue};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Column holding the row identity in every table
pub const ID_COLUMN: &str = "id";

/// Column of an extension table referencing the base entity row
pub const ENTITY_ID_COLUMN: &str = "entity_id";

/// A column of a base entity
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    /// Must be provided on create
    pub required: bool,
    /// Cannot be written through the API
    pub readonly: bool,
    /// Persisted in the entity table; unstored columns are write-only inputs
    pub stored: bool,
    /// Value used on create when none is given
    pub default: Option<FieldValue>,
}

impl ColumnDef {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            required: false,
            readonly: false,
            stored: true,
            default: None,
        }
    }

    /// The `id` column every entity has
    pub fn id() -> Self {
        Self::new(ID_COLUMN, DataType::Int).readonly()
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn input_only(mut self) -> Self {
        self.stored = false;
        self
    }

    pub fn with_default(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Static definition of an entity type
#[derive(Debug, Clone)]
pub struct EntityDefinition {
    pub name: String,
    pub table: String,
    pub columns: Vec<ColumnDef>,
    /// Whether custom groups may extend this entity
    pub extendable: bool,
    pub permissions: EntityPermissions,
}

impl EntityDefinition {
    /// Find a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns persisted in the entity table
    pub fn stored_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.stored)
    }
}

/// Widget used to edit a custom field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum HtmlType {
    #[default]
    Text,
    TextArea,
    Select,
    Radio,
    CheckBox,
    SelectDate,
}

impl HtmlType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Text" => Some(HtmlType::Text),
            "TextArea" => Some(HtmlType::TextArea),
            "Select" => Some(HtmlType::Select),
            "Radio" => Some(HtmlType::Radio),
            "CheckBox" => Some(HtmlType::CheckBox),
            "Select Date" | "SelectDate" => Some(HtmlType::SelectDate),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HtmlType::Text => "Text",
            HtmlType::TextArea => "TextArea",
            HtmlType::Select => "Select",
            HtmlType::Radio => "Radio",
            HtmlType::CheckBox => "CheckBox",
            HtmlType::SelectDate => "Select Date",
        }
    }

    /// Whether values of this widget come from an option list
    pub fn uses_options(&self) -> bool {
        matches!(self, HtmlType::Select | HtmlType::Radio | HtmlType::CheckBox)
    }
}

/// A custom group extending a base entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomGroup {
    pub id: i64,
    pub name: String,
    pub title: String,
    pub extends: String,
    pub table_name: String,
    pub is_active: bool,
}

/// A field of a custom group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomField {
    pub id: i64,
    pub custom_group_id: i64,
    pub name: String,
    pub label: String,
    pub html_type: HtmlType,
    pub data_type: DataType,
    pub column_name: String,
    pub option_group_id: Option<i64>,
    pub is_required: bool,
    pub is_active: bool,
}

/// One option of an option-backed field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionValue {
    pub id: i64,
    pub option_group_id: i64,
    pub value: String,
    pub label: String,
    pub name: String,
    pub weight: i64,
    pub is_default: bool,
    pub description: Option<String>,
}

/// Derived attribute of an option-backed field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionAttribute {
    Label,
    Name,
    Weight,
    IsDefault,
    Description,
}

impl OptionAttribute {
    /// Read this attribute from an option
    pub fn extract(&self, option: &OptionValue) -> FieldValue {
        match self {
            OptionAttribute::Label => FieldValue::String(option.label.clone()),
            OptionAttribute::Name => FieldValue::String(option.name.clone()),
            OptionAttribute::Weight => FieldValue::Integer(option.weight),
            OptionAttribute::IsDefault => FieldValue::Boolean(option.is_default),
            OptionAttribute::Description => option.description.clone().into(),
        }
    }

    /// Data type of the attribute's values
    pub fn data_type(&self) -> DataType {
        match self {
            OptionAttribute::Weight => DataType::Int,
            OptionAttribute::IsDefault => DataType::Boolean,
            _ => DataType::String,
        }
    }
}

impl FromStr for OptionAttribute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "label" => Ok(OptionAttribute::Label),
            "name" => Ok(OptionAttribute::Name),
            "weight" => Ok(OptionAttribute::Weight),
            "is_default" => Ok(OptionAttribute::IsDefault),
            "description" => Ok(OptionAttribute::Description),
            _ => Err(s.to_string()),
        }
    }
}

/// A custom field with its options
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub field: CustomField,
    pub options: Vec<OptionValue>,
}

impl FieldSchema {
    /// Find the option stored under a raw value
    pub fn option(&self, value: &FieldValue) -> Option<&OptionValue> {
        let key = value.to_text()?;
        self.options.iter().find(|o| o.value == key)
    }

    /// Whether the field has an option list to draw attributes from
    pub fn has_options(&self) -> bool {
        self.field.option_group_id.is_some()
    }
}

/// A custom group with its active fields
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSchema {
    pub group: CustomGroup,
    pub fields: Vec<FieldSchema>,
}

impl GroupSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.field.name == name)
    }
}

/// Custom-field metadata of one entity, captured for the lifetime of an action
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaSnapshot {
    pub entity: String,
    pub groups: Vec<GroupSchema>,
}

impl SchemaSnapshot {
    /// Snapshot of an entity without custom groups
    pub fn empty(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            groups: Vec::new(),
        }
    }

    pub fn group(&self, name: &str) -> Option<&GroupSchema> {
        self.groups.iter().find(|g| g.group.name == name)
    }

    pub fn group_by_id(&self, id: i64) -> Option<&GroupSchema> {
        self.groups.iter().find(|g| g.group.id == id)
    }

    /// Total number of custom fields across all groups
    pub fn field_count(&self) -> usize {
        self.groups.iter().map(|g| g.fields.len()).sum()
    }
}
