pub mod config;
pub mod derive;
pub mod facts;
pub mod filter;
pub mod format;
pub mod model;
pub mod present;
pub mod schema;

pub use config::{AnalysisConfig, KpiFallback};
pub use derive::{Analysis, derive_metrics};
pub use facts::{Fact, FactContext, FactGroup, extract_facts};
pub use filter::{
    Column, EntityFilter, FilterExpr, FilterGrounding, GroundedFilter, OtherFilters, PeriodKind,
    PeriodToken, Predicate, TimeFilter, build_entity_filter, build_time_filter,
};
pub use format::{format_count, format_currency, format_pct, format_unit_price};
pub use model::{
    ContractAggregate, ContractRow, KpiRow, KpiSource, OverallKpi, SupplierAggregate,
    SupplierRow, TransactionRecord,
};
pub use present::{Chart, Page, ShapeError, Table, assemble_pages};
pub use schema::{cols, fact_table, ranked, rollup};
