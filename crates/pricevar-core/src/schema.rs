/// Column names shared by the SQL builders, the rollup decoder, and fixtures.
pub mod cols {
    pub const SUPPLIER_NAME: &str = "supplierName";
    pub const CONTRACT_NAME: &str = "contractName";
    pub const INVOICE_PRICE: &str = "invoicePrice";
    pub const EXPECTED_PRICE: &str = "expectedPrice";
    pub const CATALOG_PRICE: &str = "catalogPrice";
    pub const QUANTITY: &str = "quantity";
    pub const TRANSACTION_DATE: &str = "transactionDate";

    pub const TOTAL_VARIANCE: &str = "total_variance";
    pub const VARIANCE_PCT: &str = "variance_pct";
    pub const VARIANCE_AMOUNT: &str = "variance_amount";
    pub const AVG_INVOICE_PRICE: &str = "avg_invoice_price";
    pub const AVG_CATALOG_PRICE: &str = "avg_catalog_price";
    pub const AVG_EXPECTED_PRICE: &str = "avg_expected_price";
    pub const COMPLIANCE_RATE: &str = "compliance_rate";
    pub const TRANSACTION_COUNT: &str = "transaction_count";
    pub const TOTAL_QUANTITY: &str = "total_quantity";
    pub const TOTAL_INVOICE_VALUE: &str = "total_invoice_value";
    pub const AVG_VARIANCE_RATE: &str = "avg_variance_rate";
    pub const TOTAL_SUPPLIERS: &str = "total_suppliers";
    pub const TOTAL_TRANSACTIONS: &str = "total_transactions";
    pub const RANK: &str = "rank";
}

/// Arrow schemas for the source table and the three rollups.
pub mod rollup {
    use super::cols;
    use arrow::datatypes::{DataType, Field, Schema};

    /// One row per procurement transaction.
    pub fn transaction_schema() -> Schema {
        Schema::new(vec![
            Field::new(cols::SUPPLIER_NAME, DataType::Utf8, false),
            Field::new(cols::CONTRACT_NAME, DataType::Utf8, false),
            Field::new(cols::INVOICE_PRICE, DataType::Float64, false),
            Field::new(cols::EXPECTED_PRICE, DataType::Float64, false),
            Field::new(cols::CATALOG_PRICE, DataType::Float64, false),
            Field::new(cols::QUANTITY, DataType::Float64, false),
            Field::new(cols::TRANSACTION_DATE, DataType::Date32, false),
        ])
    }

    /// Supplier rollup as returned by the query service.
    pub fn supplier_schema() -> Schema {
        Schema::new(vec![
            Field::new(cols::SUPPLIER_NAME, DataType::Utf8, false),
            Field::new(cols::TOTAL_VARIANCE, DataType::Float64, true),
            Field::new(cols::VARIANCE_PCT, DataType::Float64, true),
            Field::new(cols::AVG_INVOICE_PRICE, DataType::Float64, true),
            Field::new(cols::AVG_CATALOG_PRICE, DataType::Float64, true),
            Field::new(cols::AVG_EXPECTED_PRICE, DataType::Float64, true),
            Field::new(cols::COMPLIANCE_RATE, DataType::Float64, true),
            Field::new(cols::TRANSACTION_COUNT, DataType::Int64, false),
            Field::new(cols::TOTAL_QUANTITY, DataType::Float64, true),
        ])
    }

    /// Single-row KPI rollup.
    pub fn kpi_schema() -> Schema {
        Schema::new(vec![
            Field::new(cols::TOTAL_VARIANCE, DataType::Float64, true),
            Field::new(cols::TOTAL_INVOICE_VALUE, DataType::Float64, true),
            Field::new(cols::AVG_VARIANCE_RATE, DataType::Float64, true),
            Field::new(cols::COMPLIANCE_RATE, DataType::Float64, true),
            Field::new(cols::TOTAL_SUPPLIERS, DataType::Int64, false),
            Field::new(cols::TOTAL_TRANSACTIONS, DataType::Int64, false),
        ])
    }

    /// Contract rollup for one supplier.
    pub fn contract_schema() -> Schema {
        Schema::new(vec![
            Field::new(cols::CONTRACT_NAME, DataType::Utf8, false),
            Field::new(cols::VARIANCE_AMOUNT, DataType::Float64, true),
            Field::new(cols::AVG_INVOICE_PRICE, DataType::Float64, true),
            Field::new(cols::AVG_CATALOG_PRICE, DataType::Float64, true),
            Field::new(cols::AVG_EXPECTED_PRICE, DataType::Float64, true),
            Field::new(cols::COMPLIANCE_RATE, DataType::Float64, true),
            Field::new(cols::TOTAL_QUANTITY, DataType::Float64, true),
            Field::new(cols::TRANSACTION_COUNT, DataType::Int64, false),
        ])
    }
}

/// Arrow encoding of the ranked aggregates, used for Parquet exports.
pub mod ranked {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Float64Array, StringArray, UInt32Array, UInt64Array};
    use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
    use arrow::error::ArrowError;
    use arrow::record_batch::RecordBatch;

    use super::cols;
    use crate::model::{ContractAggregate, SupplierAggregate};

    pub fn supplier_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new(cols::RANK, DataType::UInt32, false),
            Field::new(cols::SUPPLIER_NAME, DataType::Utf8, false),
            Field::new(cols::TOTAL_VARIANCE, DataType::Float64, false),
            Field::new(cols::VARIANCE_PCT, DataType::Float64, false),
            Field::new(cols::AVG_INVOICE_PRICE, DataType::Float64, false),
            Field::new(cols::AVG_CATALOG_PRICE, DataType::Float64, false),
            Field::new(cols::AVG_EXPECTED_PRICE, DataType::Float64, false),
            Field::new(cols::COMPLIANCE_RATE, DataType::Float64, false),
            Field::new(cols::TRANSACTION_COUNT, DataType::UInt64, false),
            Field::new(cols::TOTAL_QUANTITY, DataType::Float64, false),
        ]))
    }

    pub fn contract_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new(cols::RANK, DataType::UInt32, false),
            Field::new(cols::CONTRACT_NAME, DataType::Utf8, false),
            Field::new(cols::VARIANCE_AMOUNT, DataType::Float64, false),
            Field::new(cols::VARIANCE_PCT, DataType::Float64, false),
            Field::new(cols::AVG_INVOICE_PRICE, DataType::Float64, false),
            Field::new(cols::AVG_CATALOG_PRICE, DataType::Float64, false),
            Field::new(cols::AVG_EXPECTED_PRICE, DataType::Float64, false),
            Field::new(cols::COMPLIANCE_RATE, DataType::Float64, false),
            Field::new(cols::TRANSACTION_COUNT, DataType::UInt64, false),
            Field::new(cols::TOTAL_QUANTITY, DataType::Float64, false),
        ]))
    }

    fn f64_col<T>(rows: &[T], f: impl Fn(&T) -> f64) -> ArrayRef {
        Arc::new(Float64Array::from_iter_values(rows.iter().map(f)))
    }

    pub fn suppliers_to_batch(rows: &[SupplierAggregate]) -> Result<RecordBatch, ArrowError> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(UInt32Array::from_iter_values(
                rows.iter().map(|r| r.rank as u32),
            )),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.supplier_name.as_str()),
            )),
            f64_col(rows, |r| r.total_variance),
            f64_col(rows, |r| r.variance_pct),
            f64_col(rows, |r| r.avg_invoice_price),
            f64_col(rows, |r| r.avg_catalog_price),
            f64_col(rows, |r| r.avg_expected_price),
            f64_col(rows, |r| r.compliance_rate_pct),
            Arc::new(UInt64Array::from_iter_values(
                rows.iter().map(|r| r.transaction_count),
            )),
            f64_col(rows, |r| r.total_quantity),
        ];
        RecordBatch::try_new(supplier_schema(), columns)
    }

    pub fn contracts_to_batch(rows: &[ContractAggregate]) -> Result<RecordBatch, ArrowError> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(UInt32Array::from_iter_values(
                rows.iter().map(|r| r.rank as u32),
            )),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.contract_name.as_str()),
            )),
            f64_col(rows, |r| r.variance_amount),
            f64_col(rows, |r| r.variance_pct),
            f64_col(rows, |r| r.avg_invoice_price),
            f64_col(rows, |r| r.avg_catalog_price),
            f64_col(rows, |r| r.avg_expected_price),
            f64_col(rows, |r| r.compliance_rate_pct),
            Arc::new(UInt64Array::from_iter_values(
                rows.iter().map(|r| r.transaction_count),
            )),
            f64_col(rows, |r| r.total_quantity),
        ];
        RecordBatch::try_new(contract_schema(), columns)
    }
}

/// Facts flattened into one table per export, `fact_type` first.
///
/// Columns are the union of the facts' fields. Integer fields become
/// `UInt64`; everything else is text. Fields a fact lacks are null.
pub mod fact_table {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, StringArray, UInt64Array};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::error::ArrowError;
    use arrow::record_batch::RecordBatch;
    use serde_json::{Map, Value};

    use crate::facts::Fact;

    const TAG: &str = "fact_type";

    /// `None` when there are no facts to export.
    pub fn facts_to_batch<'a>(
        facts: impl IntoIterator<Item = &'a Fact>,
    ) -> Result<Option<RecordBatch>, ArrowError> {
        let rows: Vec<Map<String, Value>> = facts
            .into_iter()
            .map(|f| match serde_json::to_value(f) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(other) => Err(ArrowError::JsonError(format!(
                    "fact did not serialize to an object: {other}"
                ))),
                Err(e) => Err(ArrowError::JsonError(e.to_string())),
            })
            .collect::<Result<_, _>>()?;
        if rows.is_empty() {
            return Ok(None);
        }

        let mut names = vec![TAG.to_string()];
        for row in &rows {
            for key in row.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }

        let mut fields = Vec::with_capacity(names.len());
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(names.len());
        for name in &names {
            let values: Vec<Option<&Value>> = rows.iter().map(|r| r.get(name)).collect();
            let nullable = values.iter().any(Option::is_none);
            let integral = values.iter().flatten().all(|v| v.is_u64());
            if integral {
                fields.push(Field::new(name, DataType::UInt64, nullable));
                columns.push(Arc::new(UInt64Array::from(
                    values
                        .iter()
                        .map(|v| v.and_then(Value::as_u64))
                        .collect::<Vec<_>>(),
                )));
            } else {
                fields.push(Field::new(name, DataType::Utf8, nullable));
                columns.push(Arc::new(StringArray::from(
                    values.iter().map(|v| v.map(text)).collect::<Vec<_>>(),
                )));
            }
        }
        RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).map(Some)
    }

    fn text(v: &Value) -> String {
        match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use arrow::array::{Array, StringArray, UInt64Array};
    use arrow::datatypes::DataType;

    use super::{cols, fact_table, ranked, rollup};
    use crate::facts::Fact;
    use crate::model::SupplierAggregate;

    #[test]
    fn mixed_facts_share_one_table() {
        let facts = vec![
            Fact::ContractSummary {
                supplier: "TopCo".into(),
                metric: "Contracts".into(),
                value: "2".into(),
                context: "with variance".into(),
            },
            Fact::ContractDetail {
                supplier: "TopCo".into(),
                contract: "C-1".into(),
                variance_amount: "$200".into(),
                avg_invoice_price: "$11.00".into(),
                avg_expected_price: "$10.00".into(),
                compliance_rate: "40.0%".into(),
                transaction_count: 4,
                total_quantity: "5".into(),
                rank: 1,
            },
        ];
        let batch = fact_table::facts_to_batch(&facts).unwrap().unwrap();
        assert_eq!(batch.num_rows(), 2);
        let schema = batch.schema();
        assert_eq!(schema.field(0).name(), "fact_type");

        let tags = batch
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(tags.value(0), "contract_summary");
        assert_eq!(tags.value(1), "contract_detail");

        let (idx, field) = schema.column_with_name("transaction_count").unwrap();
        assert_eq!(field.data_type(), &DataType::UInt64);
        let counts = batch
            .column(idx)
            .as_any()
            .downcast_ref::<UInt64Array>()
            .unwrap();
        assert!(counts.is_null(0));
        assert_eq!(counts.value(1), 4);

        let (idx, _) = schema.column_with_name("metric").unwrap();
        assert!(batch.column(idx).is_null(1));
    }

    #[test]
    fn no_facts_no_table() {
        assert!(fact_table::facts_to_batch(Vec::<Fact>::new().iter()).unwrap().is_none());
    }

    #[test]
    fn rollup_schemas_have_expected_fields() {
        let schema = rollup::supplier_schema();
        assert_eq!(schema.fields().len(), 9);
        assert!(schema.field_with_name(cols::SUPPLIER_NAME).is_ok());
        assert!(schema.field_with_name(cols::COMPLIANCE_RATE).is_ok());

        assert_eq!(rollup::kpi_schema().fields().len(), 6);
        assert_eq!(rollup::contract_schema().fields().len(), 8);
        assert_eq!(rollup::transaction_schema().fields().len(), 7);
    }

    #[test]
    fn ranked_suppliers_encode() {
        let rows = vec![SupplierAggregate {
            rank: 1,
            supplier_name: "Acme".into(),
            total_variance: 500.0,
            variance_pct: 5.0,
            avg_invoice_price: 105.0,
            avg_catalog_price: 110.0,
            avg_expected_price: 100.0,
            compliance_rate_pct: 30.0,
            transaction_count: 10,
            total_quantity: 42.0,
        }];
        let batch = ranked::suppliers_to_batch(&rows).unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(batch.num_columns(), 10);
        assert_eq!(batch.schema().field(0).name(), cols::RANK);
    }

    #[test]
    fn empty_contracts_encode() {
        let batch = ranked::contracts_to_batch(&[]).unwrap();
        assert_eq!(batch.num_rows(), 0);
    }
}
