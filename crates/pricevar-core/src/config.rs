//! Analysis configuration shared by every stage of the pipeline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Tunables for one analysis invocation.
///
/// Every field has a default, so a partial TOML table is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Dataset identifier forwarded to the query service.
    pub dataset_id: String,
    /// Table (or view) holding one row per transaction.
    pub source_table: String,

    /// Rows shown in every chart and table.
    pub display_top_n: usize,
    pub supplier_fact_limit: usize,
    pub contract_fact_limit: usize,
    /// Suppliers listed under "Top Opportunities" in the final output.
    pub opportunity_count: usize,

    pub supplier_row_limit: usize,
    pub kpi_row_limit: usize,
    pub contract_row_limit: usize,

    /// Largest |invoice - expected| still counted as compliant.
    pub compliance_epsilon: f64,

    /// Year used for quarter tokens that carry no 4-digit year.
    pub default_year: i32,
    /// Lower bound of the "recent data" predicate for unrecognised period tokens.
    pub recent_fallback_start: NaiveDate,

    pub query_timeout_secs: u64,
    pub narrative_timeout_secs: u64,

    pub kpi_fallback: KpiFallback,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            dataset_id: "procurement".to_string(),
            source_table: "transactions".to_string(),
            display_top_n: 5,
            supplier_fact_limit: 10,
            contract_fact_limit: 5,
            opportunity_count: 3,
            supplier_row_limit: 100,
            kpi_row_limit: 1,
            contract_row_limit: 100,
            compliance_epsilon: 0.01,
            default_year: 2024,
            recent_fallback_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            query_timeout_secs: 30,
            narrative_timeout_secs: 60,
            kpi_fallback: KpiFallback::default(),
        }
    }
}

/// Values used when the KPI rollup is unavailable.
///
/// `None` means "approximate from the supplier rollup"; `Some` pins a constant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KpiFallback {
    pub compliance_rate_pct: Option<f64>,
    pub avg_variance_rate_pct: Option<f64>,
    pub total_invoice_value: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = AnalysisConfig::default();
        assert_eq!(cfg.display_top_n, 5);
        assert_eq!(cfg.supplier_fact_limit, 10);
        assert_eq!(cfg.compliance_epsilon, 0.01);
        assert_eq!(
            cfg.recent_fallback_start,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
        assert!(cfg.kpi_fallback.compliance_rate_pct.is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: AnalysisConfig = serde_json::from_str(
            r#"{"source_table": "procurement_v8", "kpi_fallback": {"compliance_rate_pct": 60.0}}"#,
        )
        .unwrap();
        assert_eq!(cfg.source_table, "procurement_v8");
        assert_eq!(cfg.display_top_n, 5);
        assert_eq!(cfg.kpi_fallback.compliance_rate_pct, Some(60.0));
        assert!(cfg.kpi_fallback.total_invoice_value.is_none());
    }
}
