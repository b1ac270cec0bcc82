//! Action execution
//!
//! Turns a prepared action into storage queries. Custom values are batched
//! per group, so the number of queries depends on the distinct groups an
//! action touches, never on the number of fields:
//!
//! | action | queries                                                    |
//! |--------|------------------------------------------------------------|
//! | create | BEGIN, base INSERT, one INSERT per group, hooks, COMMIT    |
//! | get    | one SELECT with a LEFT JOIN per group                      |
//! | update | SELECT ids, BEGIN, base UPDATE, one UPSERT per group, COMMIT |

use crate::api::pipeline::{Assignment, Filter, PreparedAction};
use crate::api::resolver::{Target, ValueTransform};
use crate::api::result::Record;
use crate::core::action::{Operand, Operator};
use crate::core::error::{ApiResult, ValidationError};
use crate::core::field::FieldValue;
use crate::core::schema::{ENTITY_ID_COLUMN, ID_COLUMN, OptionValue};
use crate::entities::{EntityBehavior, EntityRegistry};
use crate::storage::{ColumnRef, Condition, Join, Query, Row, SelectQuery, Storage};
use indexmap::IndexMap;

/// Alias of the base table in selects
const BASE: &str = "a";

fn group_alias(group_id: i64) -> String {
    format!("g{}", group_id)
}

fn column_ref(target: &Target) -> ColumnRef {
    match target {
        Target::Column(column) => ColumnRef::new(BASE, &column.name),
        Target::Custom(custom) => ColumnRef::new(group_alias(custom.group_id), &custom.column),
    }
}

/// Custom values of one group, written with a single statement
struct GroupWrite {
    table: String,
    row: Row,
    /// Values keyed by their requested path, for the returned record
    reported: Vec<(String, FieldValue)>,
}

/// Values of an action split by destination
struct Writes {
    base: Row,
    inputs: Row,
    groups: IndexMap<i64, GroupWrite>,
}

impl Writes {
    fn split(values: &[Assignment]) -> Self {
        let mut writes = Writes {
            base: Row::new(),
            inputs: Row::new(),
            groups: IndexMap::new(),
        };
        for assignment in values {
            match &assignment.target {
                Target::Column(column) if column.stored => {
                    writes
                        .base
                        .insert(column.name.clone(), assignment.value.clone());
                }
                Target::Column(column) => {
                    writes
                        .inputs
                        .insert(column.name.clone(), assignment.value.clone());
                }
                Target::Custom(custom) => {
                    let group = writes
                        .groups
                        .entry(custom.group_id)
                        .or_insert_with(|| GroupWrite {
                            table: custom.group_table.clone(),
                            row: Row::new(),
                            reported: Vec::new(),
                        });
                    group
                        .row
                        .insert(custom.column.clone(), assignment.value.clone());
                    group
                        .reported
                        .push((assignment.key.clone(), assignment.value.clone()));
                }
            }
        }
        writes
    }
}

/// Runs prepared actions against a storage backend
pub struct Executor<'a> {
    storage: &'a dyn Storage,
    registry: &'a EntityRegistry,
    entity: &'a dyn EntityBehavior,
}

impl<'a> Executor<'a> {
    pub fn new(
        storage: &'a dyn Storage,
        registry: &'a EntityRegistry,
        entity: &'a dyn EntityBehavior,
    ) -> Self {
        Self {
            storage,
            registry,
            entity,
        }
    }

    /// Insert one record with its custom values
    pub async fn create(&self, action: &PreparedAction) -> ApiResult<Vec<Record>> {
        let Writes {
            mut base,
            inputs,
            groups,
        } = Writes::split(action.values());
        self.entity.before_create(self.registry, &mut base)?;

        tracing::debug!(
            entity = action.entity(),
            groups = groups.len(),
            "executing create"
        );
        self.storage.execute(Query::Begin).await?;
        let written = self.insert_record(base, &inputs, groups).await;
        let record = self.finish(written).await?;
        Ok(vec![record])
    }

    async fn insert_record(
        &self,
        base: Row,
        inputs: &Row,
        groups: IndexMap<i64, GroupWrite>,
    ) -> ApiResult<Record> {
        let table = &self.entity.definition().table;
        let id = self.storage.insert(table, base.clone()).await?;

        let mut record = Record::with_id(id);
        for (column, value) in base {
            record.insert(column, value);
        }
        for group in groups.into_values() {
            let mut row = group.row;
            row.insert(ENTITY_ID_COLUMN.to_string(), FieldValue::Integer(id));
            self.storage.insert(&group.table, row).await?;
            for (key, value) in group.reported {
                record.insert(key, value);
            }
        }

        self.entity
            .after_create(self.storage, &mut record, inputs)
            .await?;
        Ok(record)
    }

    /// Fetch records with a single select
    pub async fn get(&self, action: &PreparedAction) -> ApiResult<Vec<Record>> {
        let mut query = self.select_query(action);
        let id = ColumnRef::new(BASE, ID_COLUMN);
        query.columns.push(id.clone());
        for select in action.selects() {
            let column = column_ref(&select.target);
            if !query.columns.contains(&column) {
                query.columns.push(column);
            }
        }

        tracing::debug!(
            entity = action.entity(),
            joins = query.joins.len(),
            "executing get"
        );
        let rows = self.storage.select(query).await?;

        let id_key = id.key();
        Ok(rows
            .into_iter()
            .map(|row| {
                let mut record = Record::new();
                record.insert(
                    ID_COLUMN,
                    row.get(&id_key).cloned().unwrap_or(FieldValue::Null),
                );
                for select in action.selects() {
                    let key = column_ref(&select.target).key();
                    let raw = row.get(&key).cloned().unwrap_or(FieldValue::Null);
                    let value = match &select.target {
                        Target::Column(_) => raw,
                        Target::Custom(custom) => custom.present(raw),
                    };
                    record.insert(select.key.clone(), value);
                }
                record
            })
            .collect())
    }

    /// Write values to every record matching the filters
    pub async fn update(&self, action: &PreparedAction) -> ApiResult<Vec<Record>> {
        let Writes {
            mut base,
            inputs,
            groups,
        } = Writes::split(action.values());
        if let Some(input) = inputs.keys().next() {
            return Err(ValidationError::InvalidValue {
                path: input.clone(),
                message: "can only be given on create".to_string(),
            }
            .into());
        }

        let mut query = self.select_query(action);
        let id = ColumnRef::new(BASE, ID_COLUMN);
        query.columns = vec![id.clone()];
        let id_key = id.key();
        let ids: Vec<i64> = self
            .storage
            .select(query)
            .await?
            .iter()
            .filter_map(|row| row.get(&id_key).and_then(FieldValue::as_integer))
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        self.entity.before_update(self.registry, &mut base)?;
        let mut records: Vec<Record> = ids.iter().map(|id| Record::with_id(*id)).collect();
        for record in &mut records {
            for (column, value) in &base {
                record.insert(column.clone(), value.clone());
            }
            for group in groups.values() {
                for (key, value) in &group.reported {
                    record.insert(key.clone(), value.clone());
                }
            }
        }
        if base.is_empty() && groups.is_empty() {
            return Ok(records);
        }

        tracing::debug!(
            entity = action.entity(),
            records = ids.len(),
            groups = groups.len(),
            "executing update"
        );
        self.storage.execute(Query::Begin).await?;
        let written = self.update_records(base, groups, ids).await;
        self.finish(written).await?;
        Ok(records)
    }

    async fn update_records(
        &self,
        base: Row,
        groups: IndexMap<i64, GroupWrite>,
        ids: Vec<i64>,
    ) -> ApiResult<()> {
        if !base.is_empty() {
            self.storage
                .execute(Query::Update {
                    table: self.entity.definition().table.clone(),
                    values: base,
                    ids: ids.clone(),
                })
                .await?;
        }
        for group in groups.into_values() {
            self.storage
                .execute(Query::Upsert {
                    table: group.table,
                    key_column: ENTITY_ID_COLUMN.to_string(),
                    keys: ids.clone(),
                    values: group.row,
                })
                .await?;
        }
        Ok(())
    }

    /// Commit a transaction's work, or roll it back if anything failed
    async fn finish<T>(&self, written: ApiResult<T>) -> ApiResult<T> {
        let result = match written {
            Ok(value) => self.storage.execute(Query::Commit).await.map(|_| value),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            tracing::warn!(entity = %self.entity.definition().name, error = %e, "rolling back");
            if let Err(rollback) = self.storage.execute(Query::Rollback).await {
                tracing::warn!(error = %rollback, "rollback failed");
            }
        }
        result
    }

    /// Base select with the joins, filters and paging of an action
    fn select_query(&self, action: &PreparedAction) -> SelectQuery {
        let mut query = SelectQuery::new(&self.entity.definition().table, BASE);

        let targets = action
            .selects()
            .iter()
            .map(|s| &s.target)
            .chain(action.wheres().iter().map(|w| &w.target))
            .chain(action.order_by().iter().map(|o| &o.target));
        for target in targets {
            if let Target::Custom(custom) = target {
                let alias = group_alias(custom.group_id);
                if !query.joins.iter().any(|j| j.alias == alias) {
                    query.joins.push(Join {
                        table: custom.group_table.clone(),
                        alias,
                        column: ENTITY_ID_COLUMN.to_string(),
                        parent: ColumnRef::new(BASE, ID_COLUMN),
                    });
                }
            }
        }

        query.conditions = action.wheres().iter().map(condition).collect();
        query.order_by = action
            .order_by()
            .iter()
            .map(|o| (column_ref(&o.target), o.direction))
            .collect();
        query.limit = action.limit();
        query.offset = action.offset();
        query
    }
}

/// Physical condition of a filter
///
/// Attribute filters are evaluated against the option list. Rows whose raw
/// value has no option read the attribute as NULL, so when the filter
/// accepts NULL they must match too: the condition becomes
/// `raw IS NULL OR raw NOT IN (rejected options)`. Otherwise it is
/// `raw IN (accepted options)`.
fn condition(filter: &Filter) -> Condition {
    let column = column_ref(&filter.target);
    let plain = || Condition::new(column.clone(), filter.operator, filter.operand.clone());
    let Target::Custom(custom) = &filter.target else {
        return plain();
    };
    let ValueTransform::Attribute(attribute) = &custom.transform else {
        return plain();
    };

    let probe = plain();
    let raw = |option: &OptionValue| {
        let raw = FieldValue::String(option.value.clone());
        custom.data_type.coerce(raw.clone()).unwrap_or(raw)
    };
    let (accepted, rejected): (Vec<&OptionValue>, Vec<&OptionValue>) = custom
        .options
        .iter()
        .partition(|option| probe.matches(&attribute.extract(option)));

    if probe.matches(&FieldValue::Null) {
        let rejected = rejected.into_iter().map(raw).collect();
        Condition::new(column, Operator::NotIn, Operand::List(rejected)).or_null()
    } else {
        let accepted = accepted.into_iter().map(raw).collect();
        Condition::new(column, Operator::In, Operand::List(accepted))
    }
}
