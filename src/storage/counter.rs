//! Query counting at the storage boundary

use crate::core::error::ApiResult;
use crate::storage::Storage;
use crate::storage::query::{Query, QueryOutput};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Handle on a shared query count
///
/// Clones share the same count. A measurement window starts with
/// [`begin_query_count`](Self::begin_query_count) and is read with
/// [`query_count`](Self::query_count); reading does not reset.
#[derive(Debug, Clone, Default)]
pub struct QueryCounter {
    count: Arc<AtomicUsize>,
}

impl QueryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the count to zero
    pub fn begin_query_count(&self) {
        self.count.store(0, Ordering::SeqCst);
    }

    /// Queries issued since the last reset
    pub fn query_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub(crate) fn record(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Storage wrapper that counts every query before delegating it
///
/// Failed queries are counted too: they still reached the backend.
pub struct CountingStorage<S> {
    inner: S,
    counter: QueryCounter,
}

impl<S: Storage> CountingStorage<S> {
    pub fn new(inner: S, counter: QueryCounter) -> Self {
        Self { inner, counter }
    }

    pub fn counter(&self) -> &QueryCounter {
        &self.counter
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: Storage> Storage for CountingStorage<S> {
    async fn execute(&self, query: Query) -> ApiResult<QueryOutput> {
        self.counter.record();
        tracing::trace!(
            kind = query.kind(),
            count = self.counter.query_count(),
            "counted query"
        );
        self.inner.execute(query).await
    }
}
