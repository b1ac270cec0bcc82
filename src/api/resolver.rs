//! Custom-field resolution
//!
//! Before an action is prepared, the custom-field metadata of its entity is
//! captured in a [`SchemaSnapshot`]. Loading is batched per metadata table,
//! not per group or field:
//!
//! ```text
//! 1. SELECT civicrm_custom_group  WHERE extends = <entity>
//! 2. SELECT civicrm_custom_field  WHERE custom_group_id IN (<groups>)
//! 3. SELECT civicrm_option_value  WHERE option_group_id IN (<option groups>)
//! ```
//!
//! Later steps are skipped when the previous one found nothing, so an action
//! costs at most three metadata queries whatever the number of fields it
//! references. Paths are then resolved against the snapshot without any
//! further query.

use crate::core::error::{ApiError, ApiResult, NotFoundError, StorageError, ValidationError};
use crate::core::field::{DataType, FieldValue};
use crate::core::path::FieldPath;
use crate::core::schema::{
    ColumnDef, CustomField, CustomGroup, EntityDefinition, FieldSchema, GroupSchema, HtmlType,
    OptionAttribute, OptionValue, SchemaSnapshot,
};
use crate::core::{Operator, OrderDirection};
use crate::entities::{custom_field, custom_group, options};
use crate::storage::{ColumnRef, Condition, Row, SelectQuery, Storage};
use std::collections::HashMap;

/// How a stored custom value is presented
#[derive(Debug, Clone, PartialEq)]
pub enum ValueTransform {
    /// The stored value itself
    Raw,
    /// An attribute of the option the stored value points at
    Attribute(OptionAttribute),
}

/// Physical location of a custom field
#[derive(Debug, Clone, PartialEq)]
pub struct CustomTarget {
    pub group_id: i64,
    pub group_table: String,
    pub column: String,
    pub data_type: DataType,
    pub html_type: HtmlType,
    pub transform: ValueTransform,
    /// Option list of option-backed fields, by weight
    pub options: Vec<OptionValue>,
}

impl CustomTarget {
    /// Option stored under a raw value
    pub fn option(&self, value: &FieldValue) -> Option<&OptionValue> {
        let key = value.to_text()?;
        self.options.iter().find(|o| o.value == key)
    }

    /// Apply the transform to a raw stored value
    pub fn present(&self, raw: FieldValue) -> FieldValue {
        match &self.transform {
            ValueTransform::Raw => raw,
            ValueTransform::Attribute(attribute) => self
                .option(&raw)
                .map(|o| attribute.extract(o))
                .unwrap_or(FieldValue::Null),
        }
    }
}

/// What a path resolved to
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Column(ColumnDef),
    Custom(CustomTarget),
}

impl Target {
    pub fn data_type(&self) -> DataType {
        match self {
            Target::Column(column) => column.data_type,
            Target::Custom(custom) => match &custom.transform {
                ValueTransform::Raw => custom.data_type,
                ValueTransform::Attribute(attribute) => attribute.data_type(),
            },
        }
    }

    pub fn group_id(&self) -> Option<i64> {
        match self {
            Target::Custom(custom) => Some(custom.group_id),
            Target::Column(_) => None,
        }
    }
}

/// A path together with its resolved target
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// Key under which the value is reported
    pub key: String,
    pub target: Target,
}

/// Resolve a path against an entity and its snapshot
///
/// Wildcards expand to one entry per column or field.
pub fn resolve(
    path: &str,
    definition: &EntityDefinition,
    schema: &SchemaSnapshot,
) -> ApiResult<Vec<Resolved>> {
    match FieldPath::parse(path)? {
        FieldPath::AllColumns => Ok(definition
            .stored_columns()
            .map(|column| Resolved {
                key: column.name.clone(),
                target: Target::Column(column.clone()),
            })
            .collect()),
        FieldPath::Column(name) => {
            let column = definition
                .column(&name)
                .ok_or_else(|| NotFoundError::Column {
                    path: path.to_string(),
                    entity: definition.name.clone(),
                })?;
            Ok(vec![Resolved {
                key: name,
                target: Target::Column(column.clone()),
            }])
        }
        FieldPath::AllCustom { group } => {
            let group = find_group(path, &group, definition, schema)?;
            Ok(group
                .fields
                .iter()
                .map(|field| Resolved {
                    key: format!("{}.{}", group.group.name, field.field.name),
                    target: Target::Custom(custom_target(group, field, ValueTransform::Raw)),
                })
                .collect())
        }
        FieldPath::Custom {
            group,
            field,
            attribute,
        } => {
            let group = find_group(path, &group, definition, schema)?;
            let field_schema = group.field(&field).ok_or_else(|| NotFoundError::Field {
                path: path.to_string(),
                group: group.group.name.clone(),
                field: field.clone(),
            })?;
            let transform = match attribute {
                None => ValueTransform::Raw,
                Some(attribute) => {
                    let parsed: OptionAttribute = attribute.parse().map_err(|_| {
                        ApiError::unsupported(path, &attribute, "unknown field attribute")
                    })?;
                    if !field_schema.has_options() {
                        return Err(ApiError::unsupported(
                            path,
                            &attribute,
                            format!(
                                "field '{}' ({} {}) has no option values",
                                field,
                                field_schema.field.data_type.as_str(),
                                field_schema.field.html_type.as_str()
                            ),
                        ));
                    }
                    ValueTransform::Attribute(parsed)
                }
            };
            Ok(vec![Resolved {
                key: path.to_string(),
                target: Target::Custom(custom_target(group, field_schema, transform)),
            }])
        }
    }
}

/// Resolve a path that must name exactly one target
pub fn resolve_one(
    path: &str,
    definition: &EntityDefinition,
    schema: &SchemaSnapshot,
) -> ApiResult<Resolved> {
    if matches!(
        FieldPath::parse(path)?,
        FieldPath::AllColumns | FieldPath::AllCustom { .. }
    ) {
        return Err(ValidationError::MalformedPath {
            path: path.to_string(),
            message: "wildcards are only allowed in selects".to_string(),
        }
        .into());
    }
    resolve(path, definition, schema)?
        .pop()
        .ok_or_else(|| ApiError::Internal(format!("'{}' resolved to nothing", path)))
}

fn find_group<'a>(
    path: &str,
    group: &str,
    definition: &EntityDefinition,
    schema: &'a SchemaSnapshot,
) -> ApiResult<&'a GroupSchema> {
    schema.group(group).ok_or_else(|| {
        NotFoundError::Group {
            path: path.to_string(),
            entity: definition.name.clone(),
            group: group.to_string(),
        }
        .into()
    })
}

fn custom_target(
    group: &GroupSchema,
    field: &FieldSchema,
    transform: ValueTransform,
) -> CustomTarget {
    CustomTarget {
        group_id: group.group.id,
        group_table: group.group.table_name.clone(),
        column: field.field.column_name.clone(),
        data_type: field.field.data_type,
        html_type: field.field.html_type,
        transform,
        options: field.options.clone(),
    }
}

/// Load the custom-field metadata of an entity
pub async fn load_snapshot(
    storage: &dyn Storage,
    definition: &EntityDefinition,
) -> ApiResult<SchemaSnapshot> {
    let mut snapshot = SchemaSnapshot::empty(&definition.name);
    if !definition.extendable {
        return Ok(snapshot);
    }

    let mut query = active(SelectQuery::new(custom_group::TABLE, "t"));
    query.conditions.push(Condition::new(
        ColumnRef::new("t", "extends"),
        Operator::Eq,
        definition.name.as_str(),
    ));
    let groups = storage
        .select(query)
        .await?
        .iter()
        .map(parse_group)
        .collect::<ApiResult<Vec<_>>>()?;
    if groups.is_empty() {
        tracing::debug!(entity = %definition.name, "no custom groups");
        return Ok(snapshot);
    }

    let group_ids = groups.iter().map(|g| FieldValue::Integer(g.id)).collect();
    let fields = storage
        .select(active(SelectQuery::where_in(
            custom_field::TABLE,
            "custom_group_id",
            group_ids,
        )))
        .await?
        .iter()
        .map(parse_field)
        .collect::<ApiResult<Vec<_>>>()?;

    let mut option_group_ids: Vec<i64> = fields.iter().filter_map(|f| f.option_group_id).collect();
    option_group_ids.sort_unstable();
    option_group_ids.dedup();
    let mut options_by_group: HashMap<i64, Vec<OptionValue>> = HashMap::new();
    if !option_group_ids.is_empty() {
        let mut query = active(SelectQuery::where_in(
            options::OPTION_VALUE_TABLE,
            "option_group_id",
            option_group_ids.into_iter().map(FieldValue::Integer).collect(),
        ));
        query.order_by.push((ColumnRef::new("t", "weight"), OrderDirection::Asc));
        for row in storage.select(query).await? {
            let option = parse_option(&row)?;
            options_by_group
                .entry(option.option_group_id)
                .or_default()
                .push(option);
        }
    }

    snapshot.groups = groups
        .into_iter()
        .map(|group| GroupSchema {
            fields: fields
                .iter()
                .filter(|f| f.custom_group_id == group.id)
                .map(|f| FieldSchema {
                    options: f
                        .option_group_id
                        .and_then(|id| options_by_group.get(&id).cloned())
                        .unwrap_or_default(),
                    field: f.clone(),
                })
                .collect(),
            group,
        })
        .collect();

    tracing::debug!(
        entity = %definition.name,
        groups = snapshot.groups.len(),
        fields = snapshot.field_count(),
        "loaded custom field snapshot"
    );
    Ok(snapshot)
}

fn active(mut query: SelectQuery) -> SelectQuery {
    query
        .conditions
        .push(Condition::new(ColumnRef::new("t", "is_active"), Operator::Eq, true));
    query
}

/// Typed access to a metadata row selected under alias `t`
struct RowReader<'a> {
    row: &'a Row,
}

impl<'a> RowReader<'a> {
    fn value(&self, column: &str) -> &'a FieldValue {
        self.row
            .get(&format!("t.{}", column))
            .unwrap_or(&FieldValue::Null)
    }

    fn int(&self, column: &str) -> ApiResult<i64> {
        self.value(column)
            .as_integer()
            .ok_or_else(|| malformed(column, "an integer"))
    }

    fn opt_int(&self, column: &str) -> Option<i64> {
        self.value(column).as_integer()
    }

    fn text(&self, column: &str) -> ApiResult<String> {
        self.value(column)
            .to_text()
            .ok_or_else(|| malformed(column, "text"))
    }

    fn opt_text(&self, column: &str) -> Option<String> {
        self.value(column).to_text()
    }

    fn flag(&self, column: &str) -> bool {
        self.value(column).as_bool().unwrap_or(false)
    }
}

fn malformed(column: &str, expected: &str) -> ApiError {
    StorageError::UnexpectedOutput {
        expected: format!("{} in column '{}'", expected, column),
    }
    .into()
}

fn parse_group(row: &Row) -> ApiResult<CustomGroup> {
    let r = RowReader { row };
    Ok(CustomGroup {
        id: r.int("id")?,
        name: r.text("name")?,
        title: r.text("title")?,
        extends: r.text("extends")?,
        table_name: r.text("table_name")?,
        is_active: r.flag("is_active"),
    })
}

fn parse_field(row: &Row) -> ApiResult<CustomField> {
    let r = RowReader { row };
    let html_type = r.text("html_type")?;
    let data_type = r.text("data_type")?;
    Ok(CustomField {
        id: r.int("id")?,
        custom_group_id: r.int("custom_group_id")?,
        name: r.text("name")?,
        label: r.text("label")?,
        html_type: HtmlType::parse(&html_type).ok_or_else(|| malformed("html_type", "a widget"))?,
        data_type: DataType::parse(&data_type)
            .ok_or_else(|| malformed("data_type", "a data type"))?,
        column_name: r.text("column_name")?,
        option_group_id: r.opt_int("option_group_id"),
        is_required: r.flag("is_required"),
        is_active: r.flag("is_active"),
    })
}

fn parse_option(row: &Row) -> ApiResult<OptionValue> {
    let r = RowReader { row };
    Ok(OptionValue {
        id: r.int("id")?,
        option_group_id: r.int("option_group_id")?,
        value: r.text("value")?,
        label: r.text("label")?,
        name: r.text("name")?,
        weight: r.opt_int("weight").unwrap_or_default(),
        is_default: r.flag("is_default"),
        description: r.opt_text("description"),
    })
}
