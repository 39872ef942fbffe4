//! Aggregate query layer: rollup SQL, the executor seam, result decoding,
//! and a DuckDB backend.

mod error;
pub use error::StoreError;

pub mod executor;
pub mod query;
pub mod rollup;

pub use executor::{QueryError, QueryExecutor, execute_with_timeout};
pub use query::{QueryRequest, RollupQueries};
pub use rollup::RollupError;

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::{DuckSession, DuckStore};

#[cfg(feature = "duckdb")]
mod export;
#[cfg(feature = "duckdb")]
pub use export::{read_parquet, write_parquet};
