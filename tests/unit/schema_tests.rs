//! Schema reconciliation against live DuckDB schemas

use statdiff::report::TestStatus;
use statdiff::schema::{ColumnDescriptor, SchemaReconciler, SemanticType, TableSchema};
use statdiff::{DataConnector, Dialect, DuckDbConnector};

#[test]
fn test_classification_with_name_heuristics() {
    let schema = TableSchema::new(vec![
        ColumnDescriptor::new("int_col", "INTEGER", true),
        ColumnDescriptor::new("order_date", "VARCHAR", true),
        ColumnDescriptor::new("date_col", "DATE", true),
    ]);
    let classification = SchemaReconciler::classify_columns(&schema);
    assert_eq!(classification.numerical, vec!["int_col"]);
    assert_eq!(classification.temporal, vec!["order_date", "date_col"]);
    assert!(classification.categorical.is_empty());
    assert!(classification.other.is_empty());
}

#[test]
fn test_schema_from_duckdb() {
    let connector = DuckDbConnector::open_in_memory(Dialect::duckdb()).unwrap();
    connector
        .execute_batch(
            "CREATE TABLE t (id INTEGER NOT NULL, name VARCHAR, created_ts VARCHAR, \
             payload BLOB, flag BOOLEAN, amount DECIMAL(12,2))",
        )
        .unwrap();

    let schema = connector.get_table_schema("t").unwrap();
    assert_eq!(schema.len(), 6);
    assert_eq!(schema.get("ID").map(|c| c.semantic_type), Some(SemanticType::Numerical));
    assert_eq!(schema.get("created_ts").map(|c| c.semantic_type), Some(SemanticType::Temporal));
    assert_eq!(schema.get("payload").map(|c| c.semantic_type), Some(SemanticType::Binary));
    assert_eq!(schema.get("flag").map(|c| c.semantic_type), Some(SemanticType::Boolean));
    assert_eq!(schema.get("amount").map(|c| c.semantic_type), Some(SemanticType::Numerical));
}

#[test]
fn test_missing_column_fails_schema() {
    let source = TableSchema::new(vec![
        ColumnDescriptor::new("ID", "INTEGER", false),
        ColumnDescriptor::new("COL_X", "VARCHAR", true),
    ]);
    let dest = TableSchema::new(vec![ColumnDescriptor::new("id", "INTEGER", false)]);

    let result = SchemaReconciler::compare_schemas(&source, &dest);
    assert_eq!(result.status, TestStatus::Fail);
    assert_eq!(result.details["missing_in_dest"], serde_json::json!(["COL_X"]));
    assert_eq!(SchemaReconciler::get_common_columns(&source, &dest), vec!["ID"]);
}
