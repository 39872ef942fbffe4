//! Metric deriver: raw rollup rows → ranked aggregates and overall KPIs.
//!
//! Pure functions. Every non-finite input is resolved to `0.0` here so that
//! later stages never see NaN or infinity.

use tracing::warn;

use crate::config::KpiFallback;
use crate::model::{
    ContractAggregate, ContractRow, KpiRow, KpiSource, OverallKpi, SupplierAggregate,
    SupplierRow, TransactionRecord,
};

/// Everything derived for one analysis request.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    /// Full ranked supplier rollup, not truncated.
    pub suppliers: Vec<SupplierAggregate>,
    pub kpi: OverallKpi,
    /// Full ranked contract rollup of the top supplier; empty when unavailable.
    pub contracts: Vec<ContractAggregate>,
}

impl Analysis {
    pub fn top_supplier(&self) -> Option<&SupplierAggregate> {
        self.suppliers.first()
    }

    /// First `n` suppliers, for any display surface.
    pub fn top_suppliers(&self, n: usize) -> &[SupplierAggregate] {
        &self.suppliers[..n.min(self.suppliers.len())]
    }

    pub fn top_contracts(&self, n: usize) -> &[ContractAggregate] {
        &self.contracts[..n.min(self.contracts.len())]
    }

    /// Variance summed over every contract, not just the displayed ones.
    pub fn contract_total_variance(&self) -> f64 {
        self.contracts.iter().map(|c| c.variance_amount).sum()
    }

    /// Plain mean of the per-contract compliance rates.
    pub fn contract_avg_compliance(&self) -> f64 {
        if self.contracts.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.contracts.iter().map(|c| c.compliance_rate_pct).sum();
        finite(sum / self.contracts.len() as f64)
    }
}

/// Derive the full analysis from the three rollups.
///
/// `kpi` is `None` when the KPI rollup failed or returned no row.
pub fn derive_metrics(
    suppliers: Vec<SupplierRow>,
    kpi: Option<KpiRow>,
    contracts: Vec<ContractRow>,
    fallback: &KpiFallback,
) -> Analysis {
    let suppliers = rank_suppliers(suppliers);
    let kpi = overall_kpi(kpi, &suppliers, fallback);
    let contracts = rank_contracts(contracts);
    Analysis {
        suppliers,
        kpi,
        contracts,
    }
}

/// Rank suppliers by total variance, descending, 1-based. Ties keep input order.
pub fn rank_suppliers(rows: Vec<SupplierRow>) -> Vec<SupplierAggregate> {
    let mut rows = rows;
    for row in &mut rows {
        row.total_variance = finite(row.total_variance);
    }
    rows.sort_by(|a, b| b.total_variance.total_cmp(&a.total_variance));

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            let avg_invoice = finite_opt(row.avg_invoice_price);
            let avg_expected = finite_opt(row.avg_expected_price);
            SupplierAggregate {
                rank: i + 1,
                variance_pct: row
                    .variance_pct
                    .filter(|v| v.is_finite())
                    .unwrap_or_else(|| variance_pct(avg_invoice, avg_expected)),
                supplier_name: row.supplier_name,
                total_variance: row.total_variance,
                avg_invoice_price: avg_invoice,
                avg_catalog_price: finite_opt(row.avg_catalog_price),
                avg_expected_price: avg_expected,
                compliance_rate_pct: finite_opt(row.compliance_rate),
                transaction_count: row.transaction_count,
                total_quantity: finite_opt(row.total_quantity),
            }
        })
        .collect()
}

/// Rank contracts by variance amount, descending, 1-based. Ties keep input order.
pub fn rank_contracts(rows: Vec<ContractRow>) -> Vec<ContractAggregate> {
    let mut rows = rows;
    for row in &mut rows {
        row.variance_amount = finite(row.variance_amount);
    }
    rows.sort_by(|a, b| b.variance_amount.total_cmp(&a.variance_amount));

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            let avg_invoice = finite_opt(row.avg_invoice_price);
            let avg_expected = finite_opt(row.avg_expected_price);
            ContractAggregate {
                rank: i + 1,
                contract_name: row.contract_name,
                variance_amount: row.variance_amount,
                variance_pct: variance_pct(avg_invoice, avg_expected),
                avg_invoice_price: avg_invoice,
                avg_catalog_price: finite_opt(row.avg_catalog_price),
                avg_expected_price: avg_expected,
                compliance_rate_pct: finite_opt(row.compliance_rate),
                transaction_count: row.transaction_count,
                total_quantity: finite_opt(row.total_quantity),
            }
        })
        .collect()
}

/// Resolve overall KPIs from the KPI row, or approximate them from the suppliers.
pub fn overall_kpi(
    row: Option<KpiRow>,
    suppliers: &[SupplierAggregate],
    fallback: &KpiFallback,
) -> OverallKpi {
    if let Some(row) = row {
        return OverallKpi {
            total_variance: finite_opt(row.total_variance),
            total_invoice_value: finite_opt(row.total_invoice_value),
            avg_variance_rate_pct: finite_opt(row.avg_variance_rate),
            compliance_rate_pct: finite_opt(row.compliance_rate),
            total_suppliers: row.total_suppliers,
            total_transactions: row.total_transactions,
            source: KpiSource::Query,
        };
    }

    warn!(
        suppliers = suppliers.len(),
        "KPI rollup unavailable, approximating from supplier rollup"
    );
    let weighted = |f: fn(&SupplierAggregate) -> f64| {
        weighted_mean(suppliers.iter().map(|s| (f(s), s.transaction_count)))
    };
    OverallKpi {
        total_variance: suppliers.iter().map(|s| s.total_variance).sum(),
        total_invoice_value: fallback.total_invoice_value.unwrap_or_else(|| {
            suppliers
                .iter()
                .map(|s| s.avg_invoice_price * s.transaction_count as f64)
                .sum()
        }),
        avg_variance_rate_pct: fallback
            .avg_variance_rate_pct
            .unwrap_or_else(|| weighted(|s| s.variance_pct)),
        compliance_rate_pct: fallback
            .compliance_rate_pct
            .unwrap_or_else(|| weighted(|s| s.compliance_rate_pct)),
        total_suppliers: suppliers.len() as u64,
        total_transactions: suppliers.iter().map(|s| s.transaction_count).sum(),
        source: KpiSource::SupplierFallback,
    }
}

/// Percentage deviation of `invoice` from `expected`; `0.0` when `expected` is zero.
pub fn variance_pct(invoice: f64, expected: f64) -> f64 {
    if expected == 0.0 {
        return 0.0;
    }
    finite((invoice - expected) / expected * 100.0)
}

/// Share of records whose |variance| is within `epsilon`, as 0–100.
pub fn compliance_rate_pct(records: &[TransactionRecord], epsilon: f64) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let compliant = records.iter().filter(|r| r.is_compliant(epsilon)).count();
    compliant as f64 * 100.0 / records.len() as f64
}

fn weighted_mean(values: impl Iterator<Item = (f64, u64)>) -> f64 {
    let (sum, weight) = values.fold((0.0, 0u64), |(sum, weight), (v, w)| {
        (sum + v * w as f64, weight + w)
    });
    if weight == 0 {
        0.0
    } else {
        finite(sum / weight as f64)
    }
}

fn finite(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

fn finite_opt(v: Option<f64>) -> f64 {
    v.map_or(0.0, finite)
}
