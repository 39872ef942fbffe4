//! The injected query seam.
//!
//! The analysis never opens connections itself; it receives a
//! [`QueryExecutor`] scoped to one request.

use std::time::Duration;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::StoreError;
use crate::query::QueryRequest;

#[derive(Debug, Error)]
pub enum QueryError {
    /// The service reported failure.
    #[error("query failed: {0}")]
    Failed(String),

    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Runs one SQL request against the external data service.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, request: &QueryRequest) -> Result<Vec<RecordBatch>, QueryError>;
}

/// Execute with a deadline. An elapsed deadline is a [`QueryError::Timeout`].
pub async fn execute_with_timeout(
    executor: &dyn QueryExecutor,
    request: &QueryRequest,
    timeout: Duration,
) -> Result<Vec<RecordBatch>, QueryError> {
    debug!(sql = %request.sql, row_limit = request.row_limit, "executing query");
    match tokio::time::timeout(timeout, executor.execute(request)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(?timeout, dataset = %request.dataset_id, "query timed out");
            Err(QueryError::Timeout(timeout))
        }
    }
}

/// Keep at most `limit` rows, slicing the last batch if needed.
pub fn limit_rows(batches: Vec<RecordBatch>, limit: usize) -> Vec<RecordBatch> {
    let mut remaining = limit;
    let mut out = Vec::with_capacity(batches.len());
    for batch in batches {
        if remaining == 0 {
            break;
        }
        if batch.num_rows() <= remaining {
            remaining -= batch.num_rows();
            out.push(batch);
        } else {
            out.push(batch.slice(0, remaining));
            remaining = 0;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Int64Array};

    use super::*;

    fn batch(n: i64) -> RecordBatch {
        RecordBatch::try_from_iter(vec![(
            "x",
            Arc::new(Int64Array::from_iter_values(0..n)) as ArrayRef,
        )])
        .unwrap()
    }

    fn rows(batches: &[RecordBatch]) -> usize {
        batches.iter().map(|b| b.num_rows()).sum()
    }

    #[test]
    fn limit_slices_across_batches() {
        let out = limit_rows(vec![batch(3), batch(4), batch(5)], 5);
        assert_eq!(out.len(), 2);
        assert_eq!(rows(&out), 5);

        assert_eq!(rows(&limit_rows(vec![batch(3)], 100)), 3);
        assert!(limit_rows(vec![batch(3)], 0).is_empty());
    }

    struct Slow;

    #[async_trait]
    impl QueryExecutor for Slow {
        async fn execute(&self, _: &QueryRequest) -> Result<Vec<RecordBatch>, QueryError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_a_query_error() {
        let req = QueryRequest {
            dataset_id: "d".into(),
            sql: "SELECT 1".into(),
            row_limit: 1,
        };
        let err = execute_with_timeout(&Slow, &req, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Timeout(_)));
    }
}
