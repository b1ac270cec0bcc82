//! In-memory implementation of Storage for testing and development

use crate::core::action::OrderDirection;
use crate::core::error::{ApiError, ApiResult, StorageError};
use crate::core::field::FieldValue;
use crate::core::schema::ID_COLUMN;
use crate::storage::Storage;
use crate::storage::query::{Query, QueryOutput, Row, SelectQuery, TableDef};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

const BACKEND: &str = "in-memory";

#[derive(Debug, Clone, Default)]
struct Table {
    columns: Vec<String>,
    rows: BTreeMap<i64, Row>,
    next_id: i64,
}

impl Table {
    fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn check_columns<'a>(
        &self,
        table: &str,
        names: impl Iterator<Item = &'a String>,
    ) -> ApiResult<()> {
        for name in names {
            if !self.columns.contains(name) {
                return Err(query_error(format!("unknown column {}.{}", table, name)));
            }
        }
        Ok(())
    }

    /// Row with every column present, missing ones as NULL
    fn full_row(&self, id: i64, values: &Row) -> Row {
        self.columns
            .iter()
            .map(|c| {
                let value = if c == ID_COLUMN {
                    FieldValue::Integer(id)
                } else {
                    values.get(c).cloned().unwrap_or(FieldValue::Null)
                };
                (c.clone(), value)
            })
            .collect()
    }

    fn insert(&mut self, table: &str, values: Row) -> ApiResult<i64> {
        self.check_columns(table, values.keys())?;
        let id = match values.get(ID_COLUMN) {
            Some(FieldValue::Integer(id)) => *id,
            Some(other) => return Err(query_error(format!("invalid id {}", other))),
            None => self.next_id,
        };
        if self.rows.contains_key(&id) {
            return Err(query_error(format!("duplicate id {} in {}", id, table)));
        }
        self.next_id = self.next_id.max(id + 1);
        let row = self.full_row(id, &values);
        self.rows.insert(id, row);
        Ok(id)
    }
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, Table>,
    /// Tables as they were at BEGIN
    snapshot: Option<HashMap<String, Table>>,
}

impl State {
    fn table(&self, name: &str) -> ApiResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| query_error(format!("no such table {}", name)))
    }

    fn table_mut(&mut self, name: &str) -> ApiResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| query_error(format!("no such table {}", name)))
    }
}

/// In-memory relational storage
///
/// Useful for testing and development. Uses RwLock for thread-safe access.
/// Transactions snapshot every table at BEGIN and restore it on ROLLBACK.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    state: Arc<RwLock<State>>,
}

impl InMemoryStorage {
    /// Create a new empty in-memory storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently stored in a table
    pub fn row_count(&self, table: &str) -> ApiResult<usize> {
        let state = self.read()?;
        Ok(state.table(table)?.rows.len())
    }

    /// Whether a table exists
    pub fn has_table(&self, table: &str) -> bool {
        self.read()
            .map(|state| state.tables.contains_key(table))
            .unwrap_or(false)
    }

    fn read(&self) -> ApiResult<std::sync::RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|e| query_error(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> ApiResult<std::sync::RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|e| query_error(format!("Failed to acquire write lock: {}", e)))
    }

    fn run(&self, query: Query) -> ApiResult<QueryOutput> {
        if let Query::Select(select) = &query {
            let state = self.read()?;
            return select_rows(&state, select).map(QueryOutput::Rows);
        }

        let mut state = self.write()?;
        match query {
            Query::Select(select) => select_rows(&state, &select).map(QueryOutput::Rows),
            Query::CreateTable(TableDef { name, mut columns }) => {
                if state.tables.contains_key(&name) {
                    return Err(query_error(format!("table {} already exists", name)));
                }
                if !columns.iter().any(|c| c == ID_COLUMN) {
                    columns.insert(0, ID_COLUMN.to_string());
                }
                state.tables.insert(name, Table::new(columns));
                Ok(QueryOutput::Done)
            }
            Query::AddColumn { table, column } => {
                let t = state.table_mut(&table)?;
                if t.columns.contains(&column) {
                    return Err(query_error(format!("column {}.{} exists", table, column)));
                }
                for row in t.rows.values_mut() {
                    row.insert(column.clone(), FieldValue::Null);
                }
                t.columns.push(column);
                Ok(QueryOutput::Done)
            }
            Query::Insert { table, values } => {
                let id = state.table_mut(&table)?.insert(&table, values)?;
                Ok(QueryOutput::Inserted(id))
            }
            Query::Update { table, values, ids } => {
                let t = state.table_mut(&table)?;
                t.check_columns(&table, values.keys())?;
                let mut affected = 0;
                for id in ids {
                    if let Some(row) = t.rows.get_mut(&id) {
                        for (k, v) in &values {
                            row.insert(k.clone(), v.clone());
                        }
                        affected += 1;
                    }
                }
                Ok(QueryOutput::Affected(affected))
            }
            Query::Upsert {
                table,
                key_column,
                keys,
                values,
            } => {
                let t = state.table_mut(&table)?;
                t.check_columns(&table, values.keys().chain(std::iter::once(&key_column)))?;
                for key in &keys {
                    let key_value = FieldValue::Integer(*key);
                    let existing = t
                        .rows
                        .iter()
                        .find(|(_, row)| row.get(&key_column) == Some(&key_value))
                        .map(|(id, _)| *id);
                    match existing {
                        Some(id) => {
                            if let Some(row) = t.rows.get_mut(&id) {
                                for (k, v) in &values {
                                    row.insert(k.clone(), v.clone());
                                }
                            }
                        }
                        None => {
                            let mut row = values.clone();
                            row.insert(key_column.clone(), key_value);
                            t.insert(&table, row)?;
                        }
                    }
                }
                Ok(QueryOutput::Affected(keys.len()))
            }
            Query::Begin => {
                if state.snapshot.is_some() {
                    return Err(transaction_error("transaction already open"));
                }
                state.snapshot = Some(state.tables.clone());
                Ok(QueryOutput::Done)
            }
            Query::Commit => {
                state
                    .snapshot
                    .take()
                    .ok_or_else(|| transaction_error("no open transaction"))?;
                Ok(QueryOutput::Done)
            }
            Query::Rollback => {
                let snapshot = state
                    .snapshot
                    .take()
                    .ok_or_else(|| transaction_error("no open transaction"))?;
                state.tables = snapshot;
                Ok(QueryOutput::Done)
            }
        }
    }
}

fn select_rows(state: &State, query: &SelectQuery) -> ApiResult<Vec<Row>> {
    let base = state.table(&query.table)?;
    let mut tables: HashMap<&str, &Table> = HashMap::new();
    tables.insert(query.alias.as_str(), base);
    for join in &query.joins {
        tables.insert(join.alias.as_str(), state.table(&join.table)?);
    }

    let known = |alias: &str, column: &str| -> ApiResult<()> {
        let table = tables
            .get(alias)
            .ok_or_else(|| query_error(format!("unknown table alias {}", alias)))?;
        if table.columns.iter().any(|c| c == column) {
            Ok(())
        } else {
            Err(query_error(format!("unknown column {}.{}", alias, column)))
        }
    };
    for column in query
        .columns
        .iter()
        .chain(query.conditions.iter().map(|c| &c.column))
        .chain(query.order_by.iter().map(|(c, _)| c))
        .chain(query.joins.iter().map(|j| &j.parent))
    {
        known(&column.alias, &column.column)?;
    }
    for join in &query.joins {
        known(&join.alias, &join.column)?;
    }

    let mut rows = Vec::new();
    for base_row in base.rows.values() {
        let mut row: Row = base_row
            .iter()
            .map(|(c, v)| (format!("{}.{}", query.alias, c), v.clone()))
            .collect();
        for join in &query.joins {
            let joined = tables[join.alias.as_str()];
            let parent = row.get(&join.parent.key()).cloned().unwrap_or(FieldValue::Null);
            let matched = joined
                .rows
                .values()
                .find(|r| !parent.is_null() && r.get(&join.column) == Some(&parent));
            for column in &joined.columns {
                let value = matched
                    .and_then(|r| r.get(column).cloned())
                    .unwrap_or(FieldValue::Null);
                row.insert(format!("{}.{}", join.alias, column), value);
            }
        }
        let keep = query.conditions.iter().all(|c| {
            let value = row.get(&c.column.key()).unwrap_or(&FieldValue::Null);
            c.matches(value)
        });
        if keep {
            rows.push(row);
        }
    }

    if !query.order_by.is_empty() {
        rows.sort_by(|a, b| {
            for (column, direction) in &query.order_by {
                let key = column.key();
                let ordering = compare_nullable(a.get(&key), b.get(&key));
                let ordering = match direction {
                    OrderDirection::Asc => ordering,
                    OrderDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    let rows = rows
        .into_iter()
        .skip(query.offset)
        .take(query.limit.unwrap_or(usize::MAX));

    if query.columns.is_empty() {
        return Ok(rows.collect());
    }
    Ok(rows
        .map(|row| {
            query
                .columns
                .iter()
                .map(|c| {
                    let key = c.key();
                    let value = row.get(&key).cloned().unwrap_or(FieldValue::Null);
                    (key, value)
                })
                .collect()
        })
        .collect())
}

/// NULLs sort first, incomparable values keep their order
fn compare_nullable(a: Option<&FieldValue>, b: Option<&FieldValue>) -> Ordering {
    let a = a.unwrap_or(&FieldValue::Null);
    let b = b.unwrap_or(&FieldValue::Null);
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

fn query_error(message: String) -> ApiError {
    StorageError::QueryError {
        backend: BACKEND.to_string(),
        message,
    }
    .into()
}

fn transaction_error(message: &str) -> ApiError {
    StorageError::TransactionError {
        message: message.to_string(),
    }
    .into()
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn execute(&self, query: Query) -> ApiResult<QueryOutput> {
        tracing::trace!(backend = BACKEND, sql = %query, "executing query");
        self.run(query)
    }
}
