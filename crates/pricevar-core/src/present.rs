//! Presentation assembler: derived metrics → named slots for the layout engine.
//!
//! Two invariants hold for every page built here. Chart series carry plain
//! numbers, one per category. Table rows carry pre-formatted strings, one per
//! column definition. [`Chart`] and [`Table`] enforce both at insertion time.

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::config::AnalysisConfig;
use crate::derive::Analysis;
use crate::format::{format_count, format_currency, format_pct};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ShapeError {
    #[error("series '{series}' has {actual} points, expected {expected}")]
    SeriesLength {
        series: String,
        expected: usize,
        actual: usize,
    },
    #[error("table row {row} has {actual} cells, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub name: String,
    pub data: Vec<f64>,
}

/// A category chart whose series always match the category count.
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    title: String,
    categories: Vec<String>,
    series: Vec<ChartSeries>,
}

impl Chart {
    pub fn new(title: impl Into<String>, categories: Vec<String>) -> Self {
        Self {
            title: title.into(),
            categories,
            series: Vec::new(),
        }
    }

    /// Add a series. Non-finite points become `0.0`.
    pub fn add_series(&mut self, name: &str, data: Vec<f64>) -> Result<(), ShapeError> {
        if data.len() != self.categories.len() {
            return Err(ShapeError::SeriesLength {
                series: name.to_string(),
                expected: self.categories.len(),
                actual: data.len(),
            });
        }
        self.series.push(ChartSeries {
            name: name.to_string(),
            data: data
                .into_iter()
                .map(|v| if v.is_finite() { v } else { 0.0 })
                .collect(),
        });
        Ok(())
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn series(&self) -> &[ChartSeries] {
        &self.series
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDef {
    pub name: String,
}

/// A table of formatted cells whose rows always match the column count.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<ColumnDef>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|c| ColumnDef {
                    name: (*c).to_string(),
                })
                .collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) -> Result<(), ShapeError> {
        if row.len() != self.columns.len() {
            return Err(ShapeError::RowWidth {
                row: self.rows.len(),
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }
}

/// One rendered page: a title plus the slot map handed to the layout engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub title: String,
    pub variables: Map<String, Value>,
}

impl Page {
    fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            variables: Map::new(),
        }
    }

    fn set(&mut self, slot: &str, value: impl Into<Value>) {
        self.variables.insert(slot.to_string(), value.into());
    }

    fn set_chart(&mut self, chart: &Chart) {
        self.set("chart_title", chart.title());
        self.set("chart_categories", json!(chart.categories()));
        self.set("chart_data_series", json!(chart.series()));
    }

    fn set_table(&mut self, table: &Table) {
        self.set("col_defs", json!(table.columns()));
        self.set("data", json!(table.rows()));
    }

    pub fn get(&self, slot: &str) -> Option<&Value> {
        self.variables.get(slot)
    }
}

pub const SUPPLIER_COLUMNS: &[&str] = &[
    "Rank",
    "Supplier",
    "Variance $",
    "Variance %",
    "Catalog Price",
    "Invoice Price",
    "Expected Price",
    "Price Compliance Rate",
];

pub const CONTRACT_COLUMNS: &[&str] = &[
    "Contract Name",
    "Variance Amount",
    "Invoice Price",
    "Catalog Price",
    "Price Compliance Rate",
    "Quantity",
];

const NO_SUMMARY: &str = "No insights generated.";

/// Build both pages. The contract page is always present, empty when there
/// is no contract data.
pub fn assemble_pages(
    analysis: &Analysis,
    exec_summary: Option<&str>,
    config: &AnalysisConfig,
) -> Result<Vec<Page>, ShapeError> {
    let summary = exec_summary
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(NO_SUMMARY);
    Ok(vec![
        supplier_overview_page(analysis, summary, config)?,
        contract_deep_dive_page(analysis, summary, config)?,
    ])
}

pub fn supplier_overview_page(
    analysis: &Analysis,
    exec_summary: &str,
    config: &AnalysisConfig,
) -> Result<Page, ShapeError> {
    let kpi = &analysis.kpi;
    let top = analysis.top_suppliers(config.display_top_n);

    let mut chart = Chart::new(
        format!("Top {} Suppliers by Variance", config.display_top_n),
        top.iter().map(|s| s.supplier_name.clone()).collect(),
    );
    chart.add_series(
        "Price Variance",
        top.iter().map(|s| s.total_variance.round()).collect(),
    )?;

    let mut table = Table::new(SUPPLIER_COLUMNS);
    for s in top {
        table.push_row(vec![
            s.rank.to_string(),
            s.supplier_name.clone(),
            format_currency(s.total_variance),
            format_pct(s.variance_pct),
            format_currency(s.avg_catalog_price),
            format_currency(s.avg_invoice_price),
            format_currency(s.avg_expected_price),
            format_pct(s.compliance_rate_pct),
        ])?;
    }

    let mut page = Page::new("Supplier Variance Overview");
    page.set("headline", "Price Variance Deep Dive");
    page.set(
        "sub_headline",
        format!(
            "{} Total Variance | {} Suppliers",
            format_currency(kpi.total_variance),
            format_count(kpi.total_suppliers as f64)
        ),
    );
    page.set("kpi1_value", format_currency(kpi.total_variance));
    page.set("kpi2_value", format_pct(kpi.compliance_rate_pct));
    page.set("kpi3_value", format_count(kpi.total_suppliers as f64));
    page.set("kpi4_value", format_pct(kpi.avg_variance_rate_pct));
    page.set("kpi5_value", format_currency(kpi.total_invoice_value));
    page.set_chart(&chart);
    page.set_table(&table);
    page.set("exec_summary", exec_summary);
    Ok(page)
}

pub fn contract_deep_dive_page(
    analysis: &Analysis,
    exec_summary: &str,
    config: &AnalysisConfig,
) -> Result<Page, ShapeError> {
    let top_supplier = analysis
        .top_supplier()
        .map(|s| s.supplier_name.as_str())
        .unwrap_or_default();
    let top = analysis.top_contracts(config.display_top_n);

    let mut chart = Chart::new(
        format!(
            "Top {} Contracts by Variance - {top_supplier}",
            config.display_top_n
        ),
        top.iter().map(|c| c.contract_name.clone()).collect(),
    );
    chart.add_series(
        "Contract Variance",
        top.iter().map(|c| c.variance_amount.round()).collect(),
    )?;

    let mut table = Table::new(CONTRACT_COLUMNS);
    for c in top {
        table.push_row(vec![
            c.contract_name.clone(),
            format_currency(c.variance_amount),
            format_currency(c.avg_invoice_price),
            format_currency(c.avg_catalog_price),
            format_pct(c.compliance_rate_pct),
            format_count(c.total_quantity),
        ])?;
    }

    let mut page = Page::new("Contract Deep Dive");
    page.set("headline", "Contract Deep Dive");
    page.set(
        "sub_headline",
        if analysis.contracts.is_empty() {
            format!("No contract data available for {top_supplier}")
        } else {
            format!("Contract-level variance analysis for {top_supplier}")
        },
    );
    page.set(
        "kpi1_value",
        format_currency(analysis.contract_total_variance()),
    );
    page.set(
        "kpi2_value",
        format_count(analysis.contracts.len() as f64),
    );
    page.set(
        "kpi3_value",
        format_currency(analysis.contracts.first().map(|c| c.variance_amount)),
    );
    page.set_chart(&chart);
    page.set_table(&table);
    page.set("exec_summary", exec_summary);
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KpiFallback;
    use crate::derive::derive_metrics;
    use crate::model::{ContractRow, SupplierRow};

    fn supplier(name: &str, variance: f64) -> SupplierRow {
        SupplierRow {
            supplier_name: name.into(),
            total_variance: variance,
            variance_pct: Some(2.5),
            avg_invoice_price: Some(102.5),
            avg_catalog_price: Some(110.0),
            avg_expected_price: Some(100.0),
            compliance_rate: Some(30.0),
            transaction_count: 10,
            total_quantity: Some(80.0),
        }
    }

    fn contract(name: &str, variance: f64) -> ContractRow {
        ContractRow {
            contract_name: name.into(),
            variance_amount: variance,
            avg_invoice_price: Some(10.5),
            avg_catalog_price: Some(11.0),
            avg_expected_price: Some(10.0),
            compliance_rate: Some(50.0),
            total_quantity: Some(1_500.0),
            transaction_count: 3,
        }
    }

    fn analysis(suppliers: usize, contracts: usize) -> Analysis {
        derive_metrics(
            (0..suppliers)
                .map(|i| supplier(&format!("S{i}"), 100.0 * (i + 1) as f64))
                .collect(),
            None,
            (0..contracts)
                .map(|i| contract(&format!("C{i}"), 10.0 * (i + 1) as f64))
                .collect(),
            &KpiFallback::default(),
        )
    }

    fn assert_shapes(page: &Page) {
        let categories = page.get("chart_categories").unwrap().as_array().unwrap();
        for series in page.get("chart_data_series").unwrap().as_array().unwrap() {
            let data = series["data"].as_array().unwrap();
            assert_eq!(data.len(), categories.len(), "series length on {}", page.title);
            assert!(data.iter().all(Value::is_number), "non-numeric chart point");
        }
        let width = page.get("col_defs").unwrap().as_array().unwrap().len();
        for row in page.get("data").unwrap().as_array().unwrap() {
            let row = row.as_array().unwrap();
            assert_eq!(row.len(), width, "row width on {}", page.title);
            assert!(row.iter().all(Value::is_string), "unformatted table cell");
        }
    }

    #[test]
    fn chart_rejects_mismatched_series() {
        let mut chart = Chart::new("t", vec!["a".into(), "b".into()]);
        let err = chart.add_series("s", vec![1.0]).unwrap_err();
        assert_eq!(
            err,
            ShapeError::SeriesLength {
                series: "s".into(),
                expected: 2,
                actual: 1
            }
        );
        chart.add_series("s", vec![1.0, f64::NAN]).unwrap();
        assert_eq!(chart.series()[0].data, vec![1.0, 0.0]);
    }

    #[test]
    fn table_rejects_wrong_width() {
        let mut table = Table::new(&["a", "b"]);
        assert!(table.push_row(vec!["1".into()]).is_err());
        table.push_row(vec!["1".into(), "2".into()]).unwrap();
        assert_eq!(table.rows().len(), 1);
    }

    #[test]
    fn supplier_page_top_five_of_eight() {
        let a = analysis(8, 0);
        let pages = assemble_pages(&a, Some("Summary."), &AnalysisConfig::default()).unwrap();
        let page = &pages[0];
        assert_shapes(page);
        assert_eq!(page.get("data").unwrap().as_array().unwrap().len(), 5);
        assert_eq!(page.get("col_defs").unwrap().as_array().unwrap().len(), 8);
        // Totals cover all eight suppliers: 100 + 200 + ... + 800.
        assert_eq!(page.get("kpi1_value").unwrap(), "$4K");
        assert_eq!(page.get("sub_headline").unwrap(), "$4K Total Variance | 8 Suppliers");
        assert_eq!(page.get("chart_categories").unwrap()[0], "S7");
        assert_eq!(page.get("chart_data_series").unwrap()[0]["name"], "Price Variance");
        assert_eq!(page.get("exec_summary").unwrap(), "Summary.");
    }

    #[test]
    fn table_cells_are_formatted() {
        let a = analysis(1, 0);
        let page = supplier_overview_page(&a, "x", &AnalysisConfig::default()).unwrap();
        let row = &page.get("data").unwrap()[0];
        assert_eq!(row[0], "1");
        assert_eq!(row[2], "$100");
        assert_eq!(row[3], "2.5%");
        assert_eq!(row[4], "$110");
        assert_eq!(row[7], "30.0%");
    }

    #[test]
    fn contract_page_with_data() {
        let a = analysis(2, 7);
        let page = contract_deep_dive_page(&a, "x", &AnalysisConfig::default()).unwrap();
        assert_shapes(&page);
        assert_eq!(page.get("data").unwrap().as_array().unwrap().len(), 5);
        assert_eq!(page.get("kpi1_value").unwrap(), "$280");
        assert_eq!(page.get("kpi2_value").unwrap(), "7");
        assert_eq!(page.get("kpi3_value").unwrap(), "$70");
        assert_eq!(
            page.get("chart_title").unwrap(),
            "Top 5 Contracts by Variance - S1"
        );
        assert_eq!(page.get("data").unwrap()[0][5], "1,500");
    }

    #[test]
    fn contract_page_empty_without_contracts() {
        let a = analysis(3, 0);
        let pages = assemble_pages(&a, None, &AnalysisConfig::default()).unwrap();
        let page = &pages[1];
        assert_shapes(page);
        assert!(page.get("data").unwrap().as_array().unwrap().is_empty());
        assert!(page.get("chart_categories").unwrap().as_array().unwrap().is_empty());
        assert_eq!(page.get("kpi1_value").unwrap(), "$0");
        assert_eq!(page.get("exec_summary").unwrap(), NO_SUMMARY);
    }
}
