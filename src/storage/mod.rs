//! Storage boundary and its implementations
//!
//! Every physical query crosses [`Storage::execute`] exactly once, which is
//! what makes query counting possible: wrap any backend in a
//! [`CountingStorage`] and read the [`QueryCounter`].

pub mod counter;
pub mod in_memory;
pub mod query;

use crate::core::error::{ApiResult, StorageError};
use async_trait::async_trait;

pub use counter::{CountingStorage, QueryCounter};
pub use in_memory::InMemoryStorage;
pub use query::{ColumnRef, Condition, Join, Query, QueryOutput, Row, SelectQuery, TableDef};

/// Backend that runs physical queries
///
/// The API is agnostic to the underlying storage mechanism; backends only
/// need to understand the statements of [`Query`].
#[async_trait]
pub trait Storage: Send + Sync {
    /// Run one statement
    async fn execute(&self, query: Query) -> ApiResult<QueryOutput>;

    /// Run a select and return its rows
    async fn select(&self, query: SelectQuery) -> ApiResult<Vec<Row>> {
        self.execute(Query::Select(query))
            .await?
            .into_rows()
            .ok_or_else(|| unexpected("rows"))
    }

    /// Insert a row and return its id
    async fn insert(&self, table: &str, values: Row) -> ApiResult<i64> {
        self.execute(Query::Insert {
            table: table.to_string(),
            values,
        })
        .await?
        .inserted_id()
        .ok_or_else(|| unexpected("an inserted id"))
    }
}

fn unexpected(expected: &str) -> crate::core::error::ApiError {
    StorageError::UnexpectedOutput {
        expected: expected.to_string(),
    }
    .into()
}
