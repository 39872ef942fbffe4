//! SQL text for the three rollups.
//!
//! Each builder takes the combined predicate from the filter builder and
//! produces one [`QueryRequest`]. Column names match [`pricevar_core::cols`]
//! exactly; the decoder in [`crate::rollup`] reads them back by name.

use pricevar_core::AnalysisConfig;
use pricevar_core::cols;
use pricevar_core::filter::{Column, Predicate, quote_ident};

/// One request to the external SQL service.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub dataset_id: String,
    pub sql: String,
    pub row_limit: usize,
}

/// Builds the rollup requests for one analysis.
#[derive(Debug, Clone)]
pub struct RollupQueries<'a> {
    config: &'a AnalysisConfig,
    predicate: &'a Predicate,
}

impl<'a> RollupQueries<'a> {
    pub fn new(config: &'a AnalysisConfig, predicate: &'a Predicate) -> Self {
        Self { config, predicate }
    }

    fn request(&self, sql: String, row_limit: usize) -> QueryRequest {
        QueryRequest {
            dataset_id: self.config.dataset_id.clone(),
            sql,
            row_limit,
        }
    }

    fn variance() -> String {
        format!(
            "({} - {})",
            quote_ident(cols::INVOICE_PRICE),
            quote_ident(cols::EXPECTED_PRICE)
        )
    }

    fn compliant_case(&self) -> String {
        format!(
            "CASE WHEN ABS{} <= {} THEN 1 ELSE 0 END",
            Self::variance(),
            self.config.compliance_epsilon
        )
    }

    /// Per-supplier rollup, ordered by total variance descending.
    pub fn supplier(&self) -> QueryRequest {
        let variance = Self::variance();
        let expected = quote_ident(cols::EXPECTED_PRICE);
        let supplier = quote_ident(cols::SUPPLIER_NAME);
        let limit = self.config.supplier_row_limit;
        let sql = format!(
            "SELECT
    {supplier},
    SUM{variance}::DOUBLE AS {total_variance},
    AVG({variance} / NULLIF({expected}, 0) * 100)::DOUBLE AS {variance_pct},
    AVG({invoice})::DOUBLE AS {avg_invoice},
    AVG({catalog})::DOUBLE AS {avg_catalog},
    AVG({expected})::DOUBLE AS {avg_expected},
    (SUM({compliant}) * 100.0 / COUNT(*))::DOUBLE AS {compliance},
    COUNT(*)::BIGINT AS {count},
    SUM({quantity})::DOUBLE AS {total_quantity}
FROM {table}
WHERE {predicate}
GROUP BY {supplier}
ORDER BY {total_variance} DESC
LIMIT {limit}",
            total_variance = cols::TOTAL_VARIANCE,
            variance_pct = cols::VARIANCE_PCT,
            invoice = quote_ident(cols::INVOICE_PRICE),
            catalog = quote_ident(cols::CATALOG_PRICE),
            avg_invoice = cols::AVG_INVOICE_PRICE,
            avg_catalog = cols::AVG_CATALOG_PRICE,
            avg_expected = cols::AVG_EXPECTED_PRICE,
            compliant = self.compliant_case(),
            compliance = cols::COMPLIANCE_RATE,
            count = cols::TRANSACTION_COUNT,
            quantity = quote_ident(cols::QUANTITY),
            total_quantity = cols::TOTAL_QUANTITY,
            table = quote_ident(&self.config.source_table),
            predicate = self.predicate.to_sql(),
        );
        self.request(sql, limit)
    }

    /// Whole-population KPIs in a single row.
    pub fn kpi(&self) -> QueryRequest {
        let variance = Self::variance();
        let expected = quote_ident(cols::EXPECTED_PRICE);
        let sql = format!(
            "SELECT
    SUM{variance}::DOUBLE AS {total_variance},
    SUM({invoice})::DOUBLE AS {total_invoice},
    AVG({variance} / NULLIF({expected}, 0) * 100)::DOUBLE AS {avg_rate},
    (SUM({compliant}) * 100.0 / NULLIF(COUNT(*), 0))::DOUBLE AS {compliance},
    COUNT(DISTINCT {supplier})::BIGINT AS {suppliers},
    COUNT(*)::BIGINT AS {transactions}
FROM {table}
WHERE {predicate}",
            total_variance = cols::TOTAL_VARIANCE,
            invoice = quote_ident(cols::INVOICE_PRICE),
            total_invoice = cols::TOTAL_INVOICE_VALUE,
            avg_rate = cols::AVG_VARIANCE_RATE,
            compliant = self.compliant_case(),
            compliance = cols::COMPLIANCE_RATE,
            supplier = quote_ident(cols::SUPPLIER_NAME),
            suppliers = cols::TOTAL_SUPPLIERS,
            transactions = cols::TOTAL_TRANSACTIONS,
            table = quote_ident(&self.config.source_table),
            predicate = self.predicate.to_sql(),
        );
        self.request(sql, self.config.kpi_row_limit)
    }

    /// Per-contract rollup scoped to one supplier.
    pub fn contract(&self, supplier: &str) -> QueryRequest {
        let predicate = Predicate::all([
            self.predicate.clone(),
            Predicate::Equals {
                column: Column::SupplierName,
                value: supplier.to_string(),
            },
        ]);
        let variance = Self::variance();
        let contract = quote_ident(cols::CONTRACT_NAME);
        let limit = self.config.contract_row_limit;
        let sql = format!(
            "SELECT
    {contract},
    SUM{variance}::DOUBLE AS {variance_amount},
    AVG({invoice})::DOUBLE AS {avg_invoice},
    AVG({catalog})::DOUBLE AS {avg_catalog},
    AVG({expected})::DOUBLE AS {avg_expected},
    AVG({compliant} * 100.0)::DOUBLE AS {compliance},
    SUM({quantity})::DOUBLE AS {total_quantity},
    COUNT(*)::BIGINT AS {count}
FROM {table}
WHERE {predicate}
GROUP BY {contract}
ORDER BY {variance_amount} DESC
LIMIT {limit}",
            variance_amount = cols::VARIANCE_AMOUNT,
            invoice = quote_ident(cols::INVOICE_PRICE),
            catalog = quote_ident(cols::CATALOG_PRICE),
            expected = quote_ident(cols::EXPECTED_PRICE),
            avg_invoice = cols::AVG_INVOICE_PRICE,
            avg_catalog = cols::AVG_CATALOG_PRICE,
            avg_expected = cols::AVG_EXPECTED_PRICE,
            compliant = self.compliant_case(),
            compliance = cols::COMPLIANCE_RATE,
            quantity = quote_ident(cols::QUANTITY),
            total_quantity = cols::TOTAL_QUANTITY,
            count = cols::TRANSACTION_COUNT,
            table = quote_ident(&self.config.source_table),
            predicate = predicate.to_sql(),
        );
        self.request(sql, limit)
    }
}
