//! The result object returned to the host platform.

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use pricevar_core::{FactGroup, Page};
use pricevar_store::rollup::row_count;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::report::ParameterPill;

pub const SUPPLIER_EXPORT: &str = "Supplier Variance Analysis";
pub const KPI_EXPORT: &str = "Overall KPIs";
pub const CONTRACT_EXPORT: &str = "Contract Analysis";
pub const SUPPLIER_FACTS_EXPORT: &str = "Supplier Facts";
pub const KPI_FACTS_EXPORT: &str = "KPI Facts";
pub const CONTRACT_FACTS_EXPORT: &str = "Contract Facts";
pub const NOTES_EXPORT: &str = "Notes";

/// Fact exports in output order, with the fact types each one collects.
pub const FACT_EXPORTS: &[(&str, &[&str])] = &[
    (SUPPLIER_FACTS_EXPORT, &["supplier_variance"]),
    (KPI_FACTS_EXPORT, &["overall_metrics"]),
    (CONTRACT_FACTS_EXPORT, &["contract_summary", "contract_detail"]),
    (NOTES_EXPORT, &["note"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Complete,
    /// KPI or contract data was unavailable; fallbacks were used.
    Degraded,
    /// The supplier rollup failed or was empty. Nothing was rendered.
    NoData,
}

/// A named tabular export.
#[derive(Debug, Clone)]
pub struct ExportTable {
    pub name: String,
    pub batches: Vec<RecordBatch>,
}

impl ExportTable {
    pub fn new(name: &str, batches: Vec<RecordBatch>) -> Self {
        Self {
            name: name.to_string(),
            batches,
        }
    }

    pub fn num_rows(&self) -> usize {
        row_count(&self.batches)
    }

    pub fn schema(&self) -> Option<SchemaRef> {
        self.batches.first().map(RecordBatch::schema)
    }
}

impl Serialize for ExportTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ExportTable", 2)?;
        s.serialize_field("name", &self.name)?;
        s.serialize_field("rows", &self.num_rows())?;
        s.end()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkillOutput {
    pub status: AnalysisStatus,
    pub final_prompt: String,
    pub narrative: Option<String>,
    pub visualizations: Vec<Page>,
    pub parameter_pills: Vec<ParameterPill>,
    pub fact_groups: Vec<FactGroup>,
    pub insight_prompt: String,
    pub max_response_prompt: String,
    pub exports: Vec<ExportTable>,
    pub warnings: Vec<String>,
}

impl SkillOutput {
    /// Result for an analysis that could not run.
    pub fn no_data(message: &str, warnings: Vec<String>) -> Self {
        Self {
            status: AnalysisStatus::NoData,
            final_prompt: format!("Analysis could not be completed: {message}"),
            narrative: None,
            visualizations: Vec::new(),
            parameter_pills: Vec::new(),
            fact_groups: Vec::new(),
            insight_prompt: String::new(),
            max_response_prompt: String::new(),
            exports: Vec::new(),
            warnings,
        }
    }

    pub fn export(&self, name: &str) -> Option<&ExportTable> {
        self.exports.iter().find(|e| e.name == name)
    }
}
