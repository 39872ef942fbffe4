//! Typed records for transactions, raw rollup rows, and derived aggregates.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One procurement transaction as materialised by the external data source.
///
/// Never written by this workspace; used to evaluate predicates in memory and
/// to build fixtures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub supplier_name: String,
    pub contract_name: String,
    pub invoice_price: f64,
    pub expected_price: f64,
    pub catalog_price: f64,
    pub quantity: f64,
    pub transaction_date: NaiveDate,
}

impl TransactionRecord {
    /// Signed variance: positive means the invoice was above the contracted price.
    pub fn variance(&self) -> f64 {
        self.invoice_price - self.expected_price
    }

    /// Whether the invoice matches the expected price within `epsilon`.
    pub fn is_compliant(&self, epsilon: f64) -> bool {
        self.variance().abs() <= epsilon
    }
}

// ── Raw rollup rows (decoded straight from query results) ──

/// One row of the supplier rollup before ranking.
///
/// Averages and percentages are optional because SQL aggregates yield NULL
/// when every denominator is zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SupplierRow {
    pub supplier_name: String,
    pub total_variance: f64,
    pub variance_pct: Option<f64>,
    pub avg_invoice_price: Option<f64>,
    pub avg_catalog_price: Option<f64>,
    pub avg_expected_price: Option<f64>,
    pub compliance_rate: Option<f64>,
    pub transaction_count: u64,
    pub total_quantity: Option<f64>,
}

/// The single row of the overall KPI rollup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KpiRow {
    pub total_variance: Option<f64>,
    pub total_invoice_value: Option<f64>,
    pub avg_variance_rate: Option<f64>,
    pub compliance_rate: Option<f64>,
    pub total_suppliers: u64,
    pub total_transactions: u64,
}

/// One row of the contract rollup for the top supplier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContractRow {
    pub contract_name: String,
    pub variance_amount: f64,
    pub avg_invoice_price: Option<f64>,
    pub avg_catalog_price: Option<f64>,
    pub avg_expected_price: Option<f64>,
    pub compliance_rate: Option<f64>,
    pub total_quantity: Option<f64>,
    pub transaction_count: u64,
}

// ── Derived aggregates ──

/// A ranked supplier with every metric resolved to a finite number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplierAggregate {
    /// 1-based position by `total_variance` descending.
    pub rank: usize,
    pub supplier_name: String,
    pub total_variance: f64,
    pub variance_pct: f64,
    pub avg_invoice_price: f64,
    pub avg_catalog_price: f64,
    pub avg_expected_price: f64,
    pub compliance_rate_pct: f64,
    pub transaction_count: u64,
    pub total_quantity: f64,
}

/// A ranked contract of the top supplier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractAggregate {
    /// 1-based position by `variance_amount` descending.
    pub rank: usize,
    pub contract_name: String,
    pub variance_amount: f64,
    pub variance_pct: f64,
    pub avg_invoice_price: f64,
    pub avg_catalog_price: f64,
    pub avg_expected_price: f64,
    pub compliance_rate_pct: f64,
    pub transaction_count: u64,
    pub total_quantity: f64,
}

/// Where the overall KPI values came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiSource {
    /// The KPI rollup succeeded.
    Query,
    /// The KPI rollup failed or was empty; values approximate the supplier rollup.
    SupplierFallback,
}

/// Whole-population KPIs for one analysis request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallKpi {
    pub total_variance: f64,
    pub total_invoice_value: f64,
    pub avg_variance_rate_pct: f64,
    pub compliance_rate_pct: f64,
    pub total_suppliers: u64,
    pub total_transactions: u64,
    pub source: KpiSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(invoice: f64, expected: f64) -> TransactionRecord {
        TransactionRecord {
            supplier_name: "Acme".into(),
            contract_name: "MSA-1".into(),
            invoice_price: invoice,
            expected_price: expected,
            catalog_price: expected,
            quantity: 1.0,
            transaction_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        }
    }

    #[test]
    fn overpayment_is_positive_variance() {
        assert_eq!(record(110.0, 100.0).variance(), 10.0);
        assert_eq!(record(90.0, 100.0).variance(), -10.0);
    }

    #[test]
    fn compliance_uses_absolute_tolerance() {
        assert!(record(100.005, 100.0).is_compliant(0.01));
        assert!(record(99.995, 100.0).is_compliant(0.01));
        assert!(record(100.0, 100.0).is_compliant(0.01));
        assert!(!record(100.5, 100.0).is_compliant(0.01));
        assert!(!record(99.5, 100.0).is_compliant(0.01));
    }
}
