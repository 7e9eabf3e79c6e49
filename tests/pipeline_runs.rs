use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde_json::json;
use warehouse_etl::archive::{ArchiveError, ArchiveResult, ObjectStoreSink, RawArchiver, RawStore};
use warehouse_etl::classify::{Classification, ColumnClassifier, ColumnRole};
use warehouse_etl::ingestion::{
    ExtractContext, ExtractObserver, ExtractOptions, ExtractSeverity, ExtractStats, FileFormat,
};
use warehouse_etl::pipeline::{ArchiveOutcome, Pipeline};
use warehouse_etl::types::Value;
use warehouse_etl::warehouse::{CatalogColumn, MemoryWarehouse, Warehouse};
use warehouse_etl::{ExtractError, PipelineError};

fn tmp_file(name: &str, ext: &str, contents: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = std::env::temp_dir().join(format!("warehouse-etl-{name}-{nanos}.{ext}"));
    std::fs::write(&path, contents).unwrap();
    path
}

fn in_memory_pipeline() -> (Pipeline, Arc<MemoryWarehouse>, Arc<InMemory>) {
    let warehouse = Arc::new(MemoryWarehouse::new());
    let store = Arc::new(InMemory::new());
    let sink = ObjectStoreSink::new(store.clone(), "raw");
    let pipeline = Pipeline::new(warehouse.clone(), RawArchiver::new(Arc::new(sink)));
    (pipeline, warehouse, store)
}

async fn archived(store: &InMemory, key: &str) -> serde_json::Value {
    let bytes = store
        .get(&ObjectPath::from(key))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

struct FailingStore;

#[async_trait::async_trait]
impl RawStore for FailingStore {
    async fn put(&self, _key: &str, _body: Vec<u8>, _content_type: &str) -> ArchiveResult<()> {
        Err(ArchiveError::Rejected("bucket offline".to_string()))
    }
}

#[tokio::test]
async fn csv_file_end_to_end() {
    let (pipeline, warehouse, store) = in_memory_pipeline();

    let report = pipeline.run_file("tests/fixtures/customers.csv").await.unwrap();

    assert_eq!(report.records, 2);
    assert_eq!(report.format, Some(FileFormat::Csv));
    let load = report.load.as_ref().unwrap();
    assert_eq!((load.table.as_str(), load.inserted, load.failed), ("auto_table_2", 2, 0));
    assert_eq!(report.view.as_deref(), Some("auto_table_2_star_view"));

    let rows = warehouse.query("SELECT * FROM auto_table_2_star_view").await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["customer_id"], Value::Int64(1));
    assert_eq!(rows[0]["customer_name"], Value::text("John"));
    assert_eq!(rows[1]["id"], Value::Int64(2));

    assert_eq!(
        warehouse.columns("auto_table_2").await.unwrap(),
        vec![
            CatalogColumn::new("customer_id", "integer"),
            CatalogColumn::new("customer_name", "text"),
            CatalogColumn::new("id", "integer"),
        ]
    );

    match &report.archive {
        ArchiveOutcome::Written(receipt) => {
            assert_eq!(receipt.key, "raw/raw_customers.csv");
            assert_eq!(receipt.records, 2);
        }
        other => panic!("archive not written: {other:?}"),
    }
    assert_eq!(
        archived(&store, "raw/raw_customers.csv").await,
        json!([
            {"customer_id": "1", "customer_name": "John"},
            {"customer_id": "2", "customer_name": "Jane"},
        ])
    );
}

#[tokio::test]
async fn rerunning_reuses_table_and_view() {
    let (pipeline, warehouse, _store) = in_memory_pipeline();

    pipeline.run_file("tests/fixtures/customers.csv").await.unwrap();
    pipeline.run_file("tests/fixtures/customers.csv").await.unwrap();

    assert_eq!(warehouse.table_names().await, vec!["auto_table_2".to_string()]);
    assert_eq!(warehouse.view_names().await, vec!["auto_table_2_star_view".to_string()]);
    assert_eq!(warehouse.row_count("auto_table_2_star_view").await.unwrap(), 4);
}

#[tokio::test]
async fn json_file_is_typed_and_classified() {
    let (pipeline, warehouse, _store) = in_memory_pipeline();

    let report = pipeline.run_file("tests/fixtures/orders.json").await.unwrap();
    let classification = report.classification.unwrap();
    assert_eq!(
        classification.dimensions().collect::<Vec<_>>(),
        vec!["customer_name", "order_date"]
    );
    assert_eq!(
        classification.facts().collect::<Vec<_>>(),
        vec!["quantity", "total_amount"]
    );

    let types: Vec<(String, String)> = warehouse
        .columns("auto_table_3")
        .await
        .unwrap()
        .into_iter()
        .map(|c| (c.name, c.data_type))
        .collect();
    assert_eq!(
        types,
        vec![
            ("customer_name".to_string(), "text".to_string()),
            ("order_date".to_string(), "date".to_string()),
            ("order_id".to_string(), "integer".to_string()),
            ("quantity".to_string(), "integer".to_string()),
            ("total_amount".to_string(), "numeric".to_string()),
            ("id".to_string(), "integer".to_string()),
        ]
    );

    let rows = warehouse.select_all("auto_table_3").await.unwrap();
    assert_eq!(rows[1]["customer_name"], Value::text("Grace"));
    assert_eq!(rows[1]["total_amount"], Value::Float64(7.0));
    assert_eq!(rows[2]["quantity"], Value::Null);
}

#[tokio::test]
async fn archive_failure_does_not_block_loading() {
    let warehouse = Arc::new(MemoryWarehouse::new());
    let pipeline = Pipeline::new(warehouse.clone(), RawArchiver::new(Arc::new(FailingStore)));

    let report = pipeline.run_file("tests/fixtures/customers.csv").await.unwrap();

    match &report.archive {
        ArchiveOutcome::Failed { key, error } => {
            assert_eq!(key, "raw/raw_customers.csv");
            assert!(error.contains("bucket offline"));
        }
        other => panic!("expected archive failure, got {other:?}"),
    }
    assert_eq!(report.load.unwrap().inserted, 2);
    assert_eq!(warehouse.row_count("auto_table_2").await.unwrap(), 2);
}

#[tokio::test]
async fn table_failure_keeps_the_archive() {
    let (pipeline, warehouse, store) = in_memory_pipeline();
    // "id" collides with the surrogate key
    let path = tmp_file("ids", "csv", "id,name\n1,a\n");

    let err = pipeline.run_file(&path).await.unwrap_err();
    match err {
        PipelineError::Ddl { table, .. } => assert_eq!(table, "auto_table_1"),
        other => panic!("expected Ddl error, got {other:?}"),
    }
    assert!(warehouse.table_names().await.is_empty());

    let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
    let payload = archived(&store, &format!("raw/raw_{file_name}")).await;
    assert_eq!(payload, json!([{"id": "1", "name": "a"}]));

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn empty_batch_is_archived_but_not_loaded() {
    let (pipeline, warehouse, store) = in_memory_pipeline();

    let report = pipeline.run_file("tests/fixtures/backup.sql").await.unwrap();

    assert_eq!(report.records, 0);
    assert!(report.archive.is_written());
    assert!(report.load.is_none());
    assert!(report.view.is_none());
    assert!(warehouse.table_names().await.is_empty());
    assert_eq!(archived(&store, "raw/raw_backup.sql").await, json!([]));
}

#[tokio::test]
async fn bad_rows_are_skipped_and_the_rest_load() {
    let (pipeline, warehouse, _store) = in_memory_pipeline();
    let mut csv = String::from("n\n");
    for i in 1..=100 {
        csv.push_str(&format!("{i}\n"));
    }
    // past the inference sample, so the column is still INTEGER
    csv.push_str("oops\n");
    let path = tmp_file("bad-row", "csv", &csv);

    let report = pipeline.run_file(&path).await.unwrap();
    let load = report.load.unwrap();
    assert_eq!(load.table, "auto_table_101");
    assert_eq!((load.attempted, load.inserted, load.failed), (101, 100, 1));
    assert_eq!(warehouse.row_count("auto_table_101").await.unwrap(), 100);
    assert!(report.view.is_some());

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn loader_follows_the_first_record_keys() {
    let (pipeline, warehouse, _store) = in_memory_pipeline();
    let path = tmp_file("divergent", "json", r#"[{"a": 1, "b": 2}, {"a": 3, "c": 4}]"#);

    pipeline.run_file(&path).await.unwrap();

    let rows = warehouse.select_all("auto_table_2").await.unwrap();
    // schema is the union of keys; inserts use the first record's keys only
    assert_eq!(rows[0]["c"], Value::Null);
    assert_eq!(rows[1]["a"], Value::Int64(3));
    assert_eq!(rows[1]["b"], Value::Null);
    assert_eq!(rows[1]["c"], Value::Null);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn extraction_failures_abort_the_run() {
    let (pipeline, warehouse, _store) = in_memory_pipeline();

    let err = pipeline.run_file("backup.tar.gz").await.unwrap_err();
    assert!(matches!(err, PipelineError::Format(_)));

    let err = pipeline.run_file("tests/fixtures/missing.json").await.unwrap_err();
    assert!(matches!(err, PipelineError::Extract(_)));

    assert!(warehouse.table_names().await.is_empty());
}

#[tokio::test]
async fn query_source_flows_through_the_same_path() {
    let (pipeline, warehouse, store) = in_memory_pipeline();
    pipeline.run_file("tests/fixtures/customers.csv").await.unwrap();

    let sql = "SELECT * FROM auto_table_2_star_view";
    let report = pipeline.run_query(sql).await.unwrap();

    assert_eq!(report.records, 2);
    assert_eq!(report.format, None);
    let key = format!("raw/raw_sql_{sql}");
    let payload = archived(&store, &key).await;
    assert_eq!(payload.as_array().unwrap().len(), 2);

    // same record count -> same table; the explicit surrogate keys already exist
    let load = report.load.unwrap();
    assert_eq!((load.inserted, load.failed), (0, 2));
    assert_eq!(warehouse.row_count("auto_table_2").await.unwrap(), 2);

    let err = pipeline.run_query("SELECT count(*) FROM auto_table_2").await.unwrap_err();
    assert!(matches!(err, PipelineError::Source(_)));
}

struct EverythingIsAFact;

impl ColumnClassifier for EverythingIsAFact {
    fn classify(&self, table: &str, columns: &[CatalogColumn]) -> Classification {
        Classification {
            table: table.to_string(),
            columns: columns
                .iter()
                .map(|c| (c.name.clone(), ColumnRole::Fact))
                .collect(),
            relationships: Vec::new(),
        }
    }
}

#[tokio::test]
async fn classifier_is_pluggable() {
    let (pipeline, _warehouse, _store) = in_memory_pipeline();
    let pipeline = pipeline.with_classifier(Arc::new(EverythingIsAFact));

    let report = pipeline.run_file("tests/fixtures/customers.csv").await.unwrap();
    let facts: Vec<String> = report
        .classification
        .unwrap()
        .facts()
        .map(str::to_string)
        .collect();
    assert_eq!(facts, vec!["customer_id", "customer_name", "id"]);
    assert_eq!(report.view.as_deref(), Some("auto_table_2_star_view"));
}

#[derive(Default)]
struct ExtractLog(Mutex<Vec<String>>);

impl ExtractObserver for ExtractLog {
    fn on_success(&self, ctx: &ExtractContext, stats: ExtractStats) {
        self.0
            .lock()
            .unwrap()
            .push(format!("ok {} {}", ctx.format, stats.records));
    }

    fn on_failure(&self, ctx: &ExtractContext, severity: ExtractSeverity, _error: &ExtractError) {
        self.0
            .lock()
            .unwrap()
            .push(format!("fail {} {severity:?}", ctx.format));
    }
}

#[tokio::test]
async fn runs_report_extraction_through_the_observer() {
    let (pipeline, _warehouse, _store) = in_memory_pipeline();
    let log = Arc::new(ExtractLog::default());
    let pipeline = pipeline.with_extract_options(ExtractOptions {
        observer: Some(log.clone()),
        ..ExtractOptions::default()
    });

    pipeline.run_file("tests/fixtures/customers.csv").await.unwrap();
    let _ = pipeline.run_file("tests/fixtures/missing.json").await.unwrap_err();

    assert_eq!(
        *log.0.lock().unwrap(),
        vec!["ok csv 2".to_string(), "fail json Critical".to_string()]
    );
}
