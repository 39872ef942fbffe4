//! DuckDB backend for the transaction table and the rollup queries.

use std::path::Path;
use std::sync::{Arc, Mutex};

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use duckdb::{Connection, InterruptHandle};
use pricevar_core::filter::{quote_ident, quote_literal};
use tracing::{debug, info, warn};

use crate::StoreError;
use crate::executor::{QueryError, QueryExecutor, limit_rows};
use crate::query::QueryRequest;

/// DuckDB store holding one transaction table.
///
/// Supports both in-memory (ephemeral) and persistent (file-backed) modes.
/// Use [`open`](Self::open) for in-memory and [`open_persistent`](Self::open_persistent)
/// for file-backed storage that survives across process restarts.
pub struct DuckStore {
    conn: Connection,
    table: String,
}

impl DuckStore {
    /// Open an in-memory DuckDB database using the `transactions` table.
    pub fn open() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn,
            table: "transactions".into(),
        })
    }

    /// Open or create a persistent DuckDB database at the given path.
    ///
    /// If the file already exists the table is available immediately. Use
    /// [`has_transactions`](Self::has_transactions) to check whether a load is
    /// needed.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn,
            table: "transactions".into(),
        })
    }

    /// Use a different table name for loads and counts.
    pub fn with_table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Whether the transaction table exists.
    pub fn has_transactions(&self) -> bool {
        self.transaction_count().is_ok()
    }

    /// Load a `.csv` or `.parquet` file into the transaction table, replacing it.
    ///
    /// Returns the number of rows loaded.
    pub fn load_transactions(&self, path: &Path) -> Result<usize, StoreError> {
        if !path.exists() {
            return Err(StoreError::DataFileNotFound(path.to_path_buf()));
        }
        let reader = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => "read_csv_auto",
            Some(ext) if ext.eq_ignore_ascii_case("parquet") => "read_parquet",
            _ => return Err(StoreError::UnsupportedFormat(path.to_path_buf())),
        };
        let sql = format!(
            "CREATE OR REPLACE TABLE {} AS SELECT * FROM {reader}({})",
            quote_ident(&self.table),
            quote_literal(&path.display().to_string())
        );
        self.conn.execute_batch(&sql)?;
        let count = self.transaction_count()?;
        info!(count, table = %self.table, path = %path.display(), "loaded transactions");
        Ok(count)
    }

    /// Number of rows in the transaction table.
    pub fn transaction_count(&self) -> Result<usize, StoreError> {
        let sql = format!(
            "SELECT count(*)::BIGINT AS cnt FROM {}",
            quote_ident(&self.table)
        );
        let batches = self.query_arrow(&sql)?;
        let batch = batches.first().ok_or(StoreError::NoResults)?;
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<arrow::array::Int64Array>()
            .ok_or_else(|| StoreError::Other("count column not i64".into()))?;
        Ok(col.value(0) as usize)
    }

    /// Execute arbitrary SQL and return Arrow RecordBatches.
    pub fn query_arrow(&self, sql: &str) -> Result<Vec<RecordBatch>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        Ok(batches)
    }

    /// A connection scoped to one analysis. Dropping the session releases it.
    pub fn session(&self) -> Result<DuckSession, StoreError> {
        let conn = self.conn.try_clone()?;
        debug!("opened duckdb session");
        Ok(DuckSession {
            interrupt: conn.interrupt_handle(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

/// One request-scoped DuckDB connection implementing [`QueryExecutor`].
///
/// Statements run on the blocking pool. A statement whose caller stops
/// waiting (a timeout) is interrupted so the connection frees up for the
/// next query.
pub struct DuckSession {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
}

/// Interrupts the running statement unless disarmed first.
struct InterruptOnDrop {
    handle: Arc<InterruptHandle>,
    armed: bool,
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if self.armed {
            warn!("query abandoned, interrupting duckdb statement");
            self.handle.interrupt();
        }
    }
}

impl DuckSession {
    fn run(conn: &Mutex<Connection>, sql: &str) -> Result<Vec<RecordBatch>, QueryError> {
        let conn = conn
            .lock()
            .map_err(|_| QueryError::Failed("duckdb connection lock poisoned".into()))?;
        let mut stmt = conn.prepare(sql).map_err(StoreError::from)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([]).map_err(StoreError::from)?.collect();
        Ok(batches)
    }
}

#[async_trait]
impl QueryExecutor for DuckSession {
    async fn execute(&self, request: &QueryRequest) -> Result<Vec<RecordBatch>, QueryError> {
        let conn = Arc::clone(&self.conn);
        let sql = request.sql.clone();
        let mut guard = InterruptOnDrop {
            handle: Arc::clone(&self.interrupt),
            armed: true,
        };
        let joined = tokio::task::spawn_blocking(move || Self::run(&conn, &sql)).await;
        guard.armed = false;
        let batches =
            joined.map_err(|e| QueryError::Failed(format!("query task failed: {e}")))??;
        Ok(limit_rows(batches, request.row_limit))
    }
}

impl Drop for DuckSession {
    fn drop(&mut self) {
        debug!("released duckdb session");
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pricevar_core::filter::Predicate;
    use pricevar_core::{AnalysisConfig, PeriodToken, build_time_filter};
    use tempfile::{NamedTempFile, TempDir};

    use super::*;
    use crate::query::RollupQueries;
    use crate::rollup::{decode_contracts, decode_kpi, decode_suppliers};

    const HEADER: &str =
        "supplierName,contractName,invoicePrice,expectedPrice,catalogPrice,quantity,transactionDate";

    /// Acme: 10 rows, 3 compliant, variance 1+2+...+7 = 28.
    /// Globex: 2 rows underpaying by 5 each.
    fn fixture_csv() -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        for i in 0..10 {
            let invoice = if i < 3 { 100.0 } else { 100.0 + (i - 2) as f64 };
            let contract = if i % 2 == 0 { "MSA-1" } else { "MSA-2" };
            writeln!(file, "Acme,{contract},{invoice},100,110,2,2024-0{}-15", 1 + i % 9).unwrap();
        }
        writeln!(file, "Globex,G-1,95,100,105,1,2025-08-01").unwrap();
        writeln!(file, "Globex,G-1,95,100,105,1,2025-08-02").unwrap();
        file.flush().unwrap();
        file
    }

    fn loaded_store() -> (DuckStore, NamedTempFile) {
        let csv = fixture_csv();
        let store = DuckStore::open().unwrap();
        let count = store.load_transactions(csv.path()).unwrap();
        assert_eq!(count, 12);
        (store, csv)
    }

    #[test]
    fn open_in_memory() {
        let store = DuckStore::open().unwrap();
        let batches = store.query_arrow("SELECT 1 AS x").unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].num_rows(), 1);
        assert!(!store.has_transactions());
    }

    #[test]
    fn load_missing_file_errors() {
        let store = DuckStore::open().unwrap();
        let result = store.load_transactions(Path::new("/nonexistent/file.csv"));
        assert!(matches!(result, Err(StoreError::DataFileNotFound(_))));
    }

    #[test]
    fn load_unknown_extension_errors() {
        let file = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        let store = DuckStore::open().unwrap();
        let result = store.load_transactions(file.path());
        assert!(matches!(result, Err(StoreError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn supplier_rollup_against_duckdb() {
        let (store, _csv) = loaded_store();
        let config = AnalysisConfig::default();
        let session = store.session().unwrap();
        let req = RollupQueries::new(&config, &Predicate::True).supplier();
        let rows = decode_suppliers(&session.execute(&req).await.unwrap()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].supplier_name, "Acme");
        assert_eq!(rows[0].total_variance, 28.0);
        assert_eq!(rows[0].compliance_rate, Some(30.0));
        assert_eq!(rows[0].transaction_count, 10);
        assert_eq!(rows[0].total_quantity, Some(20.0));
        // Underpayment keeps its sign.
        assert_eq!(rows[1].supplier_name, "Globex");
        assert_eq!(rows[1].total_variance, -10.0);
    }

    #[tokio::test]
    async fn kpi_and_contract_rollups() {
        let (store, _csv) = loaded_store();
        let config = AnalysisConfig::default();
        let session = store.session().unwrap();
        let queries = RollupQueries::new(&config, &Predicate::True);

        let kpi = decode_kpi(&session.execute(&queries.kpi()).await.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(kpi.total_variance, Some(18.0));
        assert_eq!(kpi.total_suppliers, 2);
        assert_eq!(kpi.total_transactions, 12);
        assert_eq!(kpi.compliance_rate, Some(25.0));

        let contracts =
            decode_contracts(&session.execute(&queries.contract("Acme")).await.unwrap()).unwrap();
        assert_eq!(contracts.len(), 2);
        let total: f64 = contracts.iter().map(|c| c.variance_amount).sum();
        assert_eq!(total, 28.0);
        assert!(contracts[0].variance_amount >= contracts[1].variance_amount);
    }

    #[tokio::test]
    async fn period_predicate_filters_rows() {
        let (store, _csv) = loaded_store();
        let config = AnalysisConfig::default();
        let session = store.session().unwrap();

        let q3_2025 = build_time_filter(&[PeriodToken::from("q3 2025")], &config);
        let req = RollupQueries::new(&config, &q3_2025.predicate).supplier();
        let rows = decode_suppliers(&session.execute(&req).await.unwrap()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].supplier_name, "Globex");

        let all_time = build_time_filter(&[], &config);
        let req = RollupQueries::new(&config, &all_time.predicate).kpi();
        let kpi = decode_kpi(&session.execute(&req).await.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(kpi.total_transactions, 12);
    }

    #[tokio::test]
    async fn session_truncates_to_row_limit() {
        let (store, _csv) = loaded_store();
        let session = store.session().unwrap();
        let req = QueryRequest {
            dataset_id: "test".into(),
            sql: format!("SELECT * FROM {}", quote_ident(store.table())),
            row_limit: 4,
        };
        let batches = session.execute(&req).await.unwrap();
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 4);
    }

    #[tokio::test]
    async fn bad_sql_is_a_query_error() {
        let store = DuckStore::open().unwrap();
        let session = store.session().unwrap();
        let req = QueryRequest {
            dataset_id: "test".into(),
            sql: "SELECT * FROM missing_table".into(),
            row_limit: 10,
        };
        let err = session.execute(&req).await.unwrap_err();
        assert!(matches!(err, QueryError::Store(StoreError::DuckDb(_))));
    }

    #[tokio::test]
    async fn timed_out_query_frees_the_session() {
        use std::time::Duration;

        use crate::executor::execute_with_timeout;

        let store = DuckStore::open().unwrap();
        let session = store.session().unwrap();
        let slow = QueryRequest {
            dataset_id: "test".into(),
            sql: "SELECT sum(a.range * b.range) FROM range(1000000) a, range(1000000) b".into(),
            row_limit: 1,
        };
        let err = execute_with_timeout(&session, &slow, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Timeout(_)));

        let quick = QueryRequest {
            dataset_id: "test".into(),
            sql: "SELECT 1 AS x".into(),
            row_limit: 1,
        };
        let batches = execute_with_timeout(&session, &quick, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(batches[0].num_rows(), 1);
    }

    // ── Persistent storage ──

    #[test]
    fn persistent_load_and_reopen() {
        let csv = fixture_csv();
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("test.duckdb");

        let store = DuckStore::open_persistent(&db_path).unwrap();
        assert!(db_path.exists());
        assert!(!store.has_transactions());
        store.load_transactions(csv.path()).unwrap();
        drop(store);

        let store = DuckStore::open_persistent(&db_path).unwrap();
        assert!(store.has_transactions());
        assert_eq!(store.transaction_count().unwrap(), 12);
    }
}
