//! Fact extractor: derived metrics → titled groups of structured facts.
//!
//! Facts are the only context handed to narrative generation. Every money,
//! rate, and quantity value is pre-formatted here; counts and ranks stay
//! integers.

use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::derive::Analysis;
use crate::format::{format_count, format_currency, format_pct, format_unit_price};

/// One structured fact.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "fact_type", rename_all = "snake_case")]
pub enum Fact {
    /// Free-text metadata about the request. Not parsed downstream.
    Note { note: String },
    OverallMetrics {
        metric: String,
        value: String,
        context: String,
    },
    SupplierVariance {
        supplier: String,
        variance_amount: String,
        variance_pct: String,
        compliance_rate: String,
        transaction_count: u64,
        rank: usize,
    },
    ContractSummary {
        supplier: String,
        metric: String,
        value: String,
        context: String,
    },
    ContractDetail {
        supplier: String,
        contract: String,
        variance_amount: String,
        avg_invoice_price: String,
        avg_expected_price: String,
        compliance_rate: String,
        transaction_count: u64,
        total_quantity: String,
        rank: usize,
    },
}

impl Fact {
    pub fn fact_type(&self) -> &'static str {
        match self {
            Fact::Note { .. } => "note",
            Fact::OverallMetrics { .. } => "overall_metrics",
            Fact::SupplierVariance { .. } => "supplier_variance",
            Fact::ContractSummary { .. } => "contract_summary",
            Fact::ContractDetail { .. } => "contract_detail",
        }
    }
}

/// A titled block of facts; each group becomes one section of the prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactGroup {
    pub title: String,
    pub facts: Vec<Fact>,
}

/// Request metadata recorded in the notes group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactContext {
    /// Human-readable period, `None` for all time.
    pub period: Option<String>,
    /// Human-readable filters, `None` when unfiltered.
    pub filters: Option<String>,
}

/// Build fact groups in fixed order: notes, overall metrics, suppliers, contracts.
///
/// The contract group is omitted when there is no contract data.
pub fn extract_facts(
    analysis: &Analysis,
    context: &FactContext,
    config: &AnalysisConfig,
) -> Vec<FactGroup> {
    let mut groups = vec![
        FactGroup {
            title: "Notes".into(),
            facts: notes(context, config),
        },
        FactGroup {
            title: "Overall Metrics".into(),
            facts: overall_facts(analysis),
        },
        FactGroup {
            title: "Supplier Variance".into(),
            facts: supplier_facts(analysis, config.supplier_fact_limit),
        },
    ];
    if let Some(top) = analysis.top_supplier()
        && !analysis.contracts.is_empty()
    {
        groups.push(FactGroup {
            title: format!("Contract Analysis - {}", top.supplier_name),
            facts: contract_facts(analysis, &top.supplier_name, config.contract_fact_limit),
        });
    }
    groups
}

fn notes(context: &FactContext, config: &AnalysisConfig) -> Vec<Fact> {
    let note = |s: String| Fact::Note { note: s };
    vec![
        note(format!(
            "Analysis period: {}",
            context.period.as_deref().unwrap_or("All Time")
        )),
        note(format!(
            "Filters applied: {}",
            context.filters.as_deref().unwrap_or("None")
        )),
        note("Variance calculated as: invoicePrice - expectedPrice".into()),
        note(format!(
            "Compliance defined as: variance within {} of expected price",
            format_unit_price(config.compliance_epsilon)
        )),
    ]
}

fn overall_facts(analysis: &Analysis) -> Vec<Fact> {
    let kpi = &analysis.kpi;
    let fact = |metric: &str, value: String, context: String| Fact::OverallMetrics {
        metric: metric.into(),
        value,
        context,
    };
    vec![
        fact(
            "Total Variance Impact",
            format_currency(kpi.total_variance),
            format!("across {} suppliers", format_count(kpi.total_suppliers as f64)),
        ),
        fact(
            "Price Compliance Rate",
            format_pct(kpi.compliance_rate_pct),
            format!(
                "from {} transactions",
                format_count(kpi.total_transactions as f64)
            ),
        ),
        fact(
            "Average Variance Rate",
            format_pct(kpi.avg_variance_rate_pct),
            "deviation from contracted prices".into(),
        ),
        fact(
            "Total Invoice Value",
            format_currency(kpi.total_invoice_value),
            "total procurement spend analyzed".into(),
        ),
    ]
}

fn supplier_facts(analysis: &Analysis, limit: usize) -> Vec<Fact> {
    analysis
        .top_suppliers(limit)
        .iter()
        .map(|s| Fact::SupplierVariance {
            supplier: s.supplier_name.clone(),
            variance_amount: format_currency(s.total_variance),
            variance_pct: format_pct(s.variance_pct),
            compliance_rate: format_pct(s.compliance_rate_pct),
            transaction_count: s.transaction_count,
            rank: s.rank,
        })
        .collect()
}

fn contract_facts(analysis: &Analysis, supplier: &str, limit: usize) -> Vec<Fact> {
    let mut facts = vec![Fact::ContractSummary {
        supplier: supplier.into(),
        metric: "Contract Overview".into(),
        value: format!("{} contracts analyzed", analysis.contracts.len()),
        context: format!(
            "Total variance: {}, Avg compliance: {}",
            format_currency(analysis.contract_total_variance()),
            format_pct(analysis.contract_avg_compliance())
        ),
    }];
    facts.extend(
        analysis
            .top_contracts(limit)
            .iter()
            .map(|c| Fact::ContractDetail {
                supplier: supplier.into(),
                contract: c.contract_name.clone(),
                variance_amount: format_currency(c.variance_amount),
                avg_invoice_price: format_unit_price(c.avg_invoice_price),
                avg_expected_price: format_unit_price(c.avg_expected_price),
                compliance_rate: format_pct(c.compliance_rate_pct),
                transaction_count: c.transaction_count,
                total_quantity: format_count(c.total_quantity),
                rank: c.rank,
            }),
    );
    facts
}
