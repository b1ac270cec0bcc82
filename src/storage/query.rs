//! Physical query model
//!
//! A [`Query`] is one statement issued across the storage boundary. The
//! executor builds them; backends run them. `Display` renders SQL-like text
//! for logging.

use crate::core::action::{Operand, Operator, OrderDirection};
use crate::core::field::FieldValue;
use indexmap::IndexMap;
use regex::RegexBuilder;
use std::cmp::Ordering;
use std::fmt;

/// A result row, keyed by `alias.column` for selects
pub type Row = IndexMap<String, FieldValue>;

/// Reference to a column of an aliased table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub alias: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            column: column.into(),
        }
    }

    /// Key under which this column appears in a result row
    pub fn key(&self) -> String {
        format!("{}.{}", self.alias, self.column)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.alias, self.column)
    }
}

/// Filter on a single column
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: ColumnRef,
    pub operator: Operator,
    pub operand: Operand,
    /// Also match NULL: `(column IS NULL OR column <op> <operand>)`
    pub or_null: bool,
}

impl Condition {
    pub fn new(column: ColumnRef, operator: Operator, operand: impl Into<Operand>) -> Self {
        Self {
            column,
            operator,
            operand: operand.into(),
            or_null: false,
        }
    }

    /// Widen the condition to NULL values
    pub fn or_null(mut self) -> Self {
        self.or_null = true;
        self
    }

    /// Evaluate against a value. Comparisons involving NULL are false
    /// unless the condition is widened with [`or_null`](Self::or_null).
    pub fn matches(&self, value: &FieldValue) -> bool {
        if self.or_null && value.is_null() {
            return true;
        }
        match (&self.operator, &self.operand) {
            (Operator::IsNull, _) => value.is_null(),
            (Operator::IsNotNull, _) => !value.is_null(),
            (Operator::In, Operand::List(items)) => items.iter().any(|i| is_equal(value, i)),
            (Operator::NotIn, Operand::List(items)) => {
                !value.is_null() && !items.iter().any(|i| is_equal(value, i))
            }
            (Operator::Like, Operand::Single(pattern)) => like(value, pattern),
            (Operator::NotLike, Operand::Single(pattern)) => {
                !value.is_null() && !like(value, pattern)
            }
            (op, Operand::Single(other)) => match value.compare(other) {
                Some(ordering) => match op {
                    Operator::Eq => ordering == Ordering::Equal,
                    Operator::NotEq => ordering != Ordering::Equal,
                    Operator::Gt => ordering == Ordering::Greater,
                    Operator::Gte => ordering != Ordering::Less,
                    Operator::Lt => ordering == Ordering::Less,
                    Operator::Lte => ordering != Ordering::Greater,
                    _ => false,
                },
                None => false,
            },
            _ => false,
        }
    }
}

fn is_equal(a: &FieldValue, b: &FieldValue) -> bool {
    a.compare(b) == Some(Ordering::Equal)
}

/// SQL LIKE: `%` any run, `_` any single character, case-insensitive
fn like(value: &FieldValue, pattern: &FieldValue) -> bool {
    let (Some(text), Some(pattern)) = (value.to_text(), pattern.as_string()) else {
        return false;
    };
    let mut expr = String::from("^");
    for c in pattern.chars() {
        match c {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            c => expr.push_str(&regex::escape(&c.to_string())),
        }
    }
    expr.push('$');
    RegexBuilder::new(&expr)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map(|re| re.is_match(&text))
        .unwrap_or(false)
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.or_null {
            write!(f, "({} IS NULL OR ", self.column)?;
        }
        match self.operand {
            Operand::None => write!(f, "{} {}", self.column, self.operator)?,
            _ => write!(f, "{} {} {}", self.column, self.operator, self.operand)?,
        }
        if self.or_null {
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// LEFT JOIN of an extension table on the base row identity
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: String,
    pub alias: String,
    /// Column of the joined table matched against `parent`
    pub column: String,
    pub parent: ColumnRef,
}

/// SELECT over a base table and its joins
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub table: String,
    pub alias: String,
    pub joins: Vec<Join>,
    /// Projected columns; empty means every column of every table
    pub columns: Vec<ColumnRef>,
    pub conditions: Vec<Condition>,
    pub order_by: Vec<(ColumnRef, OrderDirection)>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl SelectQuery {
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
            joins: Vec::new(),
            columns: Vec::new(),
            conditions: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    /// Shorthand for `SELECT * FROM table WHERE column IN (values)`
    pub fn where_in(table: &str, column: &str, values: Vec<FieldValue>) -> Self {
        let mut query = Self::new(table, "t");
        query.conditions.push(Condition::new(
            ColumnRef::new("t", column),
            Operator::In,
            Operand::List(values),
        ));
        query
    }
}

/// Table creation
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<String>,
}

/// A single physical statement
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    CreateTable(TableDef),
    AddColumn {
        table: String,
        column: String,
    },
    Select(SelectQuery),
    /// Insert one row; an `id` is assigned unless provided
    Insert {
        table: String,
        values: Row,
    },
    /// Update rows by id
    Update {
        table: String,
        values: Row,
        ids: Vec<i64>,
    },
    /// Insert or update one row per key of `key_column`
    Upsert {
        table: String,
        key_column: String,
        keys: Vec<i64>,
        values: Row,
    },
    Begin,
    Commit,
    Rollback,
}

impl Query {
    /// Short statement kind for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Query::CreateTable(_) => "create_table",
            Query::AddColumn { .. } => "add_column",
            Query::Select(_) => "select",
            Query::Insert { .. } => "insert",
            Query::Update { .. } => "update",
            Query::Upsert { .. } => "upsert",
            Query::Begin => "begin",
            Query::Commit => "commit",
            Query::Rollback => "rollback",
        }
    }
}

fn assignments(values: &Row) -> String {
    values
        .iter()
        .map(|(k, v)| format!("{} = {}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

fn id_list(ids: &[i64]) -> String {
    ids.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::CreateTable(def) => {
                write!(f, "CREATE TABLE {} ({})", def.name, def.columns.join(", "))
            }
            Query::AddColumn { table, column } => {
                write!(f, "ALTER TABLE {} ADD COLUMN {}", table, column)
            }
            Query::Select(q) => {
                let columns = if q.columns.is_empty() {
                    "*".to_string()
                } else {
                    q.columns
                        .iter()
                        .map(|c| c.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                write!(f, "SELECT {} FROM {} {}", columns, q.table, q.alias)?;
                for join in &q.joins {
                    write!(
                        f,
                        " LEFT JOIN {} {} ON {}.{} = {}",
                        join.table, join.alias, join.alias, join.column, join.parent
                    )?;
                }
                if !q.conditions.is_empty() {
                    let conditions: Vec<String> =
                        q.conditions.iter().map(|c| c.to_string()).collect();
                    write!(f, " WHERE {}", conditions.join(" AND "))?;
                }
                if !q.order_by.is_empty() {
                    let order: Vec<String> = q
                        .order_by
                        .iter()
                        .map(|(c, d)| match d {
                            OrderDirection::Asc => format!("{} ASC", c),
                            OrderDirection::Desc => format!("{} DESC", c),
                        })
                        .collect();
                    write!(f, " ORDER BY {}", order.join(", "))?;
                }
                if let Some(limit) = q.limit {
                    write!(f, " LIMIT {}", limit)?;
                }
                if q.offset > 0 {
                    write!(f, " OFFSET {}", q.offset)?;
                }
                Ok(())
            }
            Query::Insert { table, values } => {
                write!(f, "INSERT INTO {} SET {}", table, assignments(values))
            }
            Query::Update { table, values, ids } => write!(
                f,
                "UPDATE {} SET {} WHERE id IN ({})",
                table,
                assignments(values),
                id_list(ids)
            ),
            Query::Upsert {
                table,
                key_column,
                keys,
                values,
            } => write!(
                f,
                "UPSERT INTO {} SET {} FOR {} IN ({})",
                table,
                assignments(values),
                key_column,
                id_list(keys)
            ),
            Query::Begin => write!(f, "BEGIN"),
            Query::Commit => write!(f, "COMMIT"),
            Query::Rollback => write!(f, "ROLLBACK"),
        }
    }
}

/// What a query produced
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    Rows(Vec<Row>),
    Inserted(i64),
    Affected(usize),
    Done,
}

impl QueryOutput {
    pub fn into_rows(self) -> Option<Vec<Row>> {
        match self {
            QueryOutput::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn inserted_id(&self) -> Option<i64> {
        match self {
            QueryOutput::Inserted(id) => Some(*id),
            _ => None,
        }
    }
}
