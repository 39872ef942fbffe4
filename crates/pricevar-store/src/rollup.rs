//! Decode rollup query results into typed rows.
//!
//! Required columns must be present; a missing column or an unreadable type is
//! a [`RollupError`]. Individual NULL cells are tolerated and left as `None`
//! for the metric deriver to resolve.

use arrow::array::{
    Array, Decimal128Array, Float32Array, Float64Array, Int32Array, Int64Array,
    LargeStringArray, StringArray, StringViewArray, UInt32Array, UInt64Array,
};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use pricevar_core::format::coerce_number;
use pricevar_core::{ContractRow, KpiRow, SupplierRow, cols};
use thiserror::Error;

/// Display name for rows whose grouping key is NULL.
pub const UNKNOWN_NAME: &str = "Unknown";

#[derive(Debug, Error, PartialEq)]
pub enum RollupError {
    #[error("missing column '{0}'")]
    MissingColumn(String),

    #[error("column '{column}' has unsupported type {data_type}")]
    UnsupportedType { column: String, data_type: DataType },
}

/// Decode the supplier rollup. Row order is preserved.
pub fn decode_suppliers(batches: &[RecordBatch]) -> Result<Vec<SupplierRow>, RollupError> {
    let mut rows = Vec::new();
    for batch in batches {
        let name = column(batch, cols::SUPPLIER_NAME)?;
        let total_variance = column(batch, cols::TOTAL_VARIANCE)?;
        let variance_pct = column(batch, cols::VARIANCE_PCT)?;
        let avg_invoice = column(batch, cols::AVG_INVOICE_PRICE)?;
        let avg_catalog = column(batch, cols::AVG_CATALOG_PRICE)?;
        let avg_expected = column(batch, cols::AVG_EXPECTED_PRICE)?;
        let compliance = column(batch, cols::COMPLIANCE_RATE)?;
        let count = column(batch, cols::TRANSACTION_COUNT)?;
        let quantity = column(batch, cols::TOTAL_QUANTITY)?;

        for row in 0..batch.num_rows() {
            rows.push(SupplierRow {
                supplier_name: get_name(name, row)?,
                total_variance: get_f64(total_variance, row)?.unwrap_or(0.0),
                variance_pct: get_f64(variance_pct, row)?,
                avg_invoice_price: get_f64(avg_invoice, row)?,
                avg_catalog_price: get_f64(avg_catalog, row)?,
                avg_expected_price: get_f64(avg_expected, row)?,
                compliance_rate: get_f64(compliance, row)?,
                transaction_count: get_count(count, row)?,
                total_quantity: get_f64(quantity, row)?,
            });
        }
    }
    Ok(rows)
}

/// Decode the KPI rollup. `None` when the result has no rows.
pub fn decode_kpi(batches: &[RecordBatch]) -> Result<Option<KpiRow>, RollupError> {
    let Some(batch) = batches.iter().find(|b| b.num_rows() > 0) else {
        return Ok(None);
    };
    Ok(Some(KpiRow {
        total_variance: get_f64(column(batch, cols::TOTAL_VARIANCE)?, 0)?,
        total_invoice_value: get_f64(column(batch, cols::TOTAL_INVOICE_VALUE)?, 0)?,
        avg_variance_rate: get_f64(column(batch, cols::AVG_VARIANCE_RATE)?, 0)?,
        compliance_rate: get_f64(column(batch, cols::COMPLIANCE_RATE)?, 0)?,
        total_suppliers: get_count(column(batch, cols::TOTAL_SUPPLIERS)?, 0)?,
        total_transactions: get_count(column(batch, cols::TOTAL_TRANSACTIONS)?, 0)?,
    }))
}

/// Decode the contract rollup. Row order is preserved.
pub fn decode_contracts(batches: &[RecordBatch]) -> Result<Vec<ContractRow>, RollupError> {
    let mut rows = Vec::new();
    for batch in batches {
        let name = column(batch, cols::CONTRACT_NAME)?;
        let variance = column(batch, cols::VARIANCE_AMOUNT)?;
        let avg_invoice = column(batch, cols::AVG_INVOICE_PRICE)?;
        let avg_catalog = column(batch, cols::AVG_CATALOG_PRICE)?;
        let avg_expected = column(batch, cols::AVG_EXPECTED_PRICE)?;
        let compliance = column(batch, cols::COMPLIANCE_RATE)?;
        let quantity = column(batch, cols::TOTAL_QUANTITY)?;
        let count = column(batch, cols::TRANSACTION_COUNT)?;

        for row in 0..batch.num_rows() {
            rows.push(ContractRow {
                contract_name: get_name(name, row)?,
                variance_amount: get_f64(variance, row)?.unwrap_or(0.0),
                avg_invoice_price: get_f64(avg_invoice, row)?,
                avg_catalog_price: get_f64(avg_catalog, row)?,
                avg_expected_price: get_f64(avg_expected, row)?,
                compliance_rate: get_f64(compliance, row)?,
                total_quantity: get_f64(quantity, row)?,
                transaction_count: get_count(count, row)?,
            });
        }
    }
    Ok(rows)
}

/// Total row count across batches.
pub fn row_count(batches: &[RecordBatch]) -> usize {
    batches.iter().map(|b| b.num_rows()).sum()
}

/// A named column of one batch.
#[derive(Clone, Copy)]
struct Col<'a> {
    name: &'a str,
    array: &'a dyn Array,
}

fn column<'a>(batch: &'a RecordBatch, name: &'a str) -> Result<Col<'a>, RollupError> {
    batch
        .column_by_name(name)
        .map(|c| Col {
            name,
            array: c.as_ref(),
        })
        .ok_or_else(|| RollupError::MissingColumn(name.to_string()))
}

fn unsupported(col: Col<'_>) -> RollupError {
    RollupError::UnsupportedType {
        column: col.name.to_string(),
        data_type: col.array.data_type().clone(),
    }
}

fn get_name(col: Col<'_>, row: usize) -> Result<String, RollupError> {
    if col.array.is_null(row) {
        return Ok(UNKNOWN_NAME.to_string());
    }
    get_string(col.array, row).ok_or_else(|| unsupported(col))
}

fn get_string(array: &dyn Array, row: usize) -> Option<String> {
    let any = array.as_any();
    if let Some(arr) = any.downcast_ref::<StringArray>() {
        return Some(arr.value(row).to_string());
    }
    if let Some(arr) = any.downcast_ref::<LargeStringArray>() {
        return Some(arr.value(row).to_string());
    }
    any.downcast_ref::<StringViewArray>()
        .map(|arr| arr.value(row).to_string())
}

/// Read a numeric cell. Text cells are coerced; unparsable text reads as NULL.
fn get_f64(col: Col<'_>, row: usize) -> Result<Option<f64>, RollupError> {
    let array = col.array;
    if array.is_null(row) {
        return Ok(None);
    }
    let any = array.as_any();
    let v = match array.data_type() {
        DataType::Float64 => any.downcast_ref::<Float64Array>().map(|a| a.value(row)),
        DataType::Float32 => any
            .downcast_ref::<Float32Array>()
            .map(|a| a.value(row) as f64),
        DataType::Int64 => any.downcast_ref::<Int64Array>().map(|a| a.value(row) as f64),
        DataType::Int32 => any.downcast_ref::<Int32Array>().map(|a| a.value(row) as f64),
        DataType::UInt64 => any
            .downcast_ref::<UInt64Array>()
            .map(|a| a.value(row) as f64),
        DataType::UInt32 => any
            .downcast_ref::<UInt32Array>()
            .map(|a| a.value(row) as f64),
        DataType::Decimal128(_, scale) => any
            .downcast_ref::<Decimal128Array>()
            .map(|a| a.value(row) as f64 / 10f64.powi(*scale as i32)),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
            return Ok(get_string(array, row).and_then(|s| coerce_number(&s)));
        }
        _ => None,
    };
    v.map(Some).ok_or_else(|| unsupported(col))
}

fn get_count(col: Col<'_>, row: usize) -> Result<u64, RollupError> {
    Ok(get_f64(col, row)?
        .filter(|v| v.is_finite() && *v > 0.0)
        .map_or(0, |v| v.round() as u64))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::ArrayRef;
    use pricevar_core::rollup;

    use super::*;

    fn col(array: &ArrayRef) -> Col<'_> {
        Col {
            name: "value",
            array: array.as_ref(),
        }
    }

    fn supplier_batch(names: &[Option<&str>], variances: &[Option<f64>]) -> RecordBatch {
        let n = names.len();
        let f64s = |v: f64| -> ArrayRef { Arc::new(Float64Array::from(vec![v; n])) };
        RecordBatch::try_new(
            Arc::new(rollup::supplier_schema()),
            vec![
                Arc::new(StringArray::from(names.to_vec())),
                Arc::new(Float64Array::from(variances.to_vec())),
                Arc::new(Float64Array::from(vec![None::<f64>; n])),
                f64s(105.0),
                f64s(110.0),
                f64s(100.0),
                f64s(30.0),
                Arc::new(Int64Array::from(vec![10i64; n])),
                f64s(25.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn decodes_supplier_rows_in_order() {
        let batch = supplier_batch(&[Some("Acme"), Some("Globex")], &[Some(500.0), Some(300.0)]);
        let rows = decode_suppliers(&[batch]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].supplier_name, "Acme");
        assert_eq!(rows[0].total_variance, 500.0);
        assert_eq!(rows[0].variance_pct, None);
        assert_eq!(rows[1].transaction_count, 10);
        assert_eq!(rows[1].compliance_rate, Some(30.0));
    }

    #[test]
    fn null_names_and_variance_are_tolerated() {
        let batch = supplier_batch(&[Some("Acme")], &[None]);
        let rows = decode_suppliers(&[batch]).unwrap();
        assert_eq!(rows[0].total_variance, 0.0);

        // The schema marks names non-nullable; exercise the reader directly.
        let names: ArrayRef = Arc::new(StringArray::from(vec![None::<&str>]));
        assert_eq!(get_name(col(&names), 0).unwrap(), UNKNOWN_NAME);
    }

    #[test]
    fn missing_column_is_an_error() {
        let batch = RecordBatch::try_from_iter(vec![(
            cols::SUPPLIER_NAME,
            Arc::new(StringArray::from(vec!["Acme"])) as ArrayRef,
        )])
        .unwrap();
        assert_eq!(
            decode_suppliers(&[batch]).unwrap_err(),
            RollupError::MissingColumn(cols::TOTAL_VARIANCE.into())
        );
    }

    #[test]
    fn numeric_cells_accept_ints_decimals_and_text() {
        let ints: ArrayRef = Arc::new(Int32Array::from(vec![42]));
        assert_eq!(get_f64(col(&ints), 0).unwrap(), Some(42.0));

        let dec: ArrayRef = Arc::new(
            Decimal128Array::from(vec![12_345i128])
                .with_precision_and_scale(10, 2)
                .unwrap(),
        );
        assert_eq!(get_f64(col(&dec), 0).unwrap(), Some(123.45));

        let text: ArrayRef = Arc::new(StringArray::from(vec!["$1,234.50", "n/a"]));
        assert_eq!(get_f64(col(&text), 0).unwrap(), Some(1234.5));
        assert_eq!(get_f64(col(&text), 1).unwrap(), None);

        let bools: ArrayRef = Arc::new(arrow::array::BooleanArray::from(vec![true]));
        assert!(matches!(
            get_f64(col(&bools), 0),
            Err(RollupError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn kpi_empty_result_is_none() {
        assert_eq!(decode_kpi(&[]).unwrap(), None);
        let empty = RecordBatch::new_empty(Arc::new(rollup::kpi_schema()));
        assert_eq!(decode_kpi(&[empty]).unwrap(), None);
    }

    #[test]
    fn kpi_single_row() {
        let batch = RecordBatch::try_new(
            Arc::new(rollup::kpi_schema()),
            vec![
                Arc::new(Float64Array::from(vec![900.0])),
                Arc::new(Float64Array::from(vec![12_000.0])),
                Arc::new(Float64Array::from(vec![4.5])),
                Arc::new(Float64Array::from(vec![None::<f64>])),
                Arc::new(Int64Array::from(vec![3])),
                Arc::new(Int64Array::from(vec![30])),
            ],
        )
        .unwrap();
        let kpi = decode_kpi(&[batch]).unwrap().unwrap();
        assert_eq!(kpi.total_variance, Some(900.0));
        assert_eq!(kpi.compliance_rate, None);
        assert_eq!(kpi.total_suppliers, 3);
        assert_eq!(kpi.total_transactions, 30);
    }

    #[test]
    fn contracts_decode() {
        let batch = RecordBatch::try_new(
            Arc::new(rollup::contract_schema()),
            vec![
                Arc::new(StringArray::from(vec!["MSA-1", "MSA-2"])),
                Arc::new(Float64Array::from(vec![200.0, 100.0])),
                Arc::new(Float64Array::from(vec![11.0, 12.0])),
                Arc::new(Float64Array::from(vec![13.0, 13.0])),
                Arc::new(Float64Array::from(vec![10.0, 10.0])),
                Arc::new(Float64Array::from(vec![50.0, 25.0])),
                Arc::new(Float64Array::from(vec![7.0, 8.0])),
                Arc::new(Int64Array::from(vec![4, 4])),
            ],
        )
        .unwrap();
        let rows = decode_contracts(&[batch]).unwrap();
        assert_eq!(rows[1].contract_name, "MSA-2");
        assert_eq!(rows[0].variance_amount, 200.0);
        assert_eq!(row_count(&[]), 0);
    }
}
