// tests/rows/row_trace_test.rs
//
// End-to-end row traces against an in-memory SQLite warehouse.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use dbt_lineage::artifacts::{VersionedArtifactStore, MANIFEST};
use dbt_lineage::config::RowLineageSettings;
use dbt_lineage::rows::{
    synthetic_trace_id, MappingCache, MappingLocations, Row, RowLineageService, SqliteWarehouse,
    TRACE_COLUMN,
};
use serde_json::{json, Value};

fn row(value: Value) -> Row {
    value.as_object().unwrap().clone()
}

fn mapping(source: &str, target: &str, source_id: &str, target_id: &str) -> String {
    json!({
        "source_model": source,
        "target_model": target,
        "source_trace_id": source_id,
        "target_trace_id": target_id,
        "compiled_sql": format!("select * from {source}"),
        "executed_at": "2026-01-05T10:00:00Z"
    })
    .to_string()
}

/// model1 -> model2 -> model3, one row each, linked A -> B -> C.
fn warehouse() -> SqliteWarehouse {
    let wh = SqliteWarehouse::open_in_memory().unwrap();
    wh.execute_batch(
        "CREATE TABLE model1 (id INTEGER, name TEXT, _row_trace_id TEXT);
         CREATE TABLE model2 (id INTEGER, total REAL, _row_trace_id TEXT);
         CREATE TABLE model3 (id INTEGER, label TEXT, _row_trace_id TEXT);
         INSERT INTO model1 VALUES (1, 'alpha', 'A'), (9, 'other', 'Z');
         INSERT INTO model2 VALUES (2, 12.5, 'B');
         INSERT INTO model3 VALUES (3, 'gamma', 'C');",
    )
    .unwrap();
    wh
}

fn service(root: &Path, wh: SqliteWarehouse, lines: &[String]) -> RowLineageService {
    let log = root.join("lineage/lineage.jsonl");
    fs::create_dir_all(log.parent().unwrap()).unwrap();
    fs::write(&log, lines.join("\n")).unwrap();

    let store = VersionedArtifactStore::new();
    store.record(
        MANIFEST,
        json!({
            "metadata": {"project_name": "shop"},
            "nodes": {
                "model.shop.model1": {"resource_type": "model", "name": "model1", "schema": "main"},
                "model.shop.model2": {"resource_type": "model", "name": "model2", "schema": "main"},
                "model.shop.model3": {"resource_type": "model", "name": "model3", "schema": "main"}
            }
        }),
    );

    RowLineageService::new(
        RowLineageSettings::default(),
        MappingLocations {
            artifacts_dir: root.to_path_buf(),
            workspace_project: None,
            dbt_project: root.to_path_buf(),
        },
        Arc::new(store),
        Arc::new(wh),
        Arc::new(MappingCache::new()),
    )
}

fn chain() -> Vec<String> {
    vec![
        mapping("model1", "model2", "A", "B"),
        mapping("model2", "model3", "B", "C"),
    ]
}

#[test]
fn test_full_trace() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), warehouse(), &chain());

    let trace = svc.trace("model.shop.model3", "C", Some(2)).unwrap();
    assert!(!trace.truncated);
    assert!(trace.warnings.is_empty());

    let ids: Vec<_> = trace.graph.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["row:model1:A", "row:model2:B", "row:model3:C"]);
    let edges: Vec<_> = trace
        .graph
        .edges
        .iter()
        .map(|e| (e.source.as_str(), e.target.as_str()))
        .collect();
    assert_eq!(
        edges,
        vec![("row:model1:A", "row:model2:B"), ("row:model2:B", "row:model3:C")]
    );

    assert_eq!(trace.target.model_name, "model3");
    assert_eq!(trace.target.relation_name, "main.model3");
    assert_eq!(
        trace.target.row,
        Some(row(json!({"id": 3, "label": "gamma", "_row_trace_id": "C"})))
    );

    assert_eq!(trace.hops.len(), 2);
    let first = &trace.hops[0];
    assert_eq!((first.source_model.as_str(), first.target_model.as_str()), ("model2", "model3"));
    assert_eq!(first.compiled_sql, "select * from model2");
    assert_eq!(first.executed_at, "2026-01-05T10:00:00Z");
    assert_eq!(first.source_row.as_ref().unwrap()["total"], json!(12.5));

    let model1 = &trace.graph.nodes[0];
    assert_eq!(model1.node_type, "row");
    assert_eq!(model1.label, "model1\nA");
    assert_eq!(model1.model_unique_id.as_deref(), Some("model.shop.model1"));
    assert_eq!(model1.row.as_ref().unwrap()["name"], json!("alpha"));
}

#[test]
fn test_hop_bound_truncates() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), warehouse(), &chain());

    let trace = svc.trace("model.shop.model3", "C", Some(1)).unwrap();
    assert!(trace.truncated);
    assert_eq!(trace.graph.nodes.len(), 2);
    assert_eq!(trace.graph.edges.len(), 1);
    assert_eq!(trace.hops.len(), 1);

    let clamped = svc.trace("model.shop.model3", "C", Some(0)).unwrap();
    assert!(clamped.truncated);
    assert_eq!(clamped.graph.nodes.len(), 2);

    let unbounded = svc.trace("model.shop.model3", "C", None).unwrap();
    assert!(!unbounded.truncated);
    assert_eq!(unbounded.graph.nodes.len(), 3);
}

#[test]
fn test_fan_in_and_shared_parents() {
    let dir = tempfile::tempdir().unwrap();
    let wh = warehouse();
    wh.execute_batch("INSERT INTO model2 VALUES (4, 1.0, 'B2');").unwrap();
    let lines = vec![
        mapping("model1", "model2", "A", "B"),
        mapping("model1", "model2", "A", "B2"),
        mapping("model2", "model3", "B", "C"),
        mapping("model2", "model3", "B2", "C"),
    ];
    let svc = service(dir.path(), wh, &lines);

    let trace = svc.trace("model.shop.model3", "C", None).unwrap();
    assert_eq!(trace.graph.nodes.len(), 4);
    assert_eq!(trace.graph.edges.len(), 4);
    assert_eq!(trace.hops.len(), 4);
}

#[test]
fn test_start_row_without_mappings() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), warehouse(), &chain());

    let trace = svc.trace("model.shop.model1", "Z", None).unwrap();
    assert_eq!(trace.graph.nodes.len(), 1);
    assert_eq!(trace.graph.nodes[0].id, "row:model1:Z");
    assert_eq!(trace.graph.nodes[0].row.as_ref().unwrap()["id"], json!(9));
    assert!(trace.graph.edges.is_empty());
    assert!(trace.hops.is_empty());
    assert!(!trace.truncated);
}

#[test]
fn test_missing_model_and_missing_row() {
    let dir = tempfile::tempdir().unwrap();
    let lines = vec![
        mapping("ghost", "model3", "G1", "C"),
        mapping("model2", "model3", "B-missing", "C"),
    ];
    let svc = service(dir.path(), warehouse(), &lines);

    let trace = svc.trace("model.shop.model3", "C", None).unwrap();
    assert_eq!(trace.warnings, vec!["Model 'ghost' not found in manifest."]);

    let ghost = trace.graph.nodes.iter().find(|n| n.model_name == "ghost").unwrap();
    assert!(ghost.row.is_none());
    assert!(ghost.model_unique_id.is_none());
    assert!(ghost.relation_name.is_none());

    let missing = trace
        .graph
        .nodes
        .iter()
        .find(|n| n.id == "row:model2:B-missing")
        .unwrap();
    assert!(missing.row.is_none());
    assert_eq!(missing.relation_name.as_deref(), Some("main.model2"));
}

#[test]
fn test_tables_without_trace_column_use_synthetic_ids() {
    let dir = tempfile::tempdir().unwrap();
    let wh = SqliteWarehouse::open_in_memory().unwrap();
    wh.execute_batch(
        "CREATE TABLE model1 (id INTEGER, name TEXT);
         CREATE TABLE model2 (id INTEGER, _row_trace_id TEXT);
         INSERT INTO model1 VALUES (1, 'alpha'), (2, 'beta');
         INSERT INTO model2 VALUES (10, 'B');",
    )
    .unwrap();
    let beta_id = synthetic_trace_id(&row(json!({"id": 2, "name": "beta"})));
    let svc = service(dir.path(), wh, &[mapping("model1", "model2", &beta_id, "B")]);

    let trace = svc.trace("model.shop.model2", "B", None).unwrap();
    assert_eq!(
        trace.warnings,
        vec!["Some tables do not contain _row_trace_id; trace ids are computed heuristically for browsing."]
    );
    let source = trace.hops[0].source_row.as_ref().unwrap();
    assert_eq!(source["name"], json!("beta"));
    assert_eq!(source[TRACE_COLUMN], json!(beta_id));

    let node = trace.graph.nodes.iter().find(|n| n.model_name == "model1").unwrap();
    assert!(node.label.ends_with("..."));
}

#[test]
fn test_preview_with_trace_column() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), warehouse(), &chain());

    let preview = svc.preview_model("model.shop.model1", None).unwrap();
    assert!(preview.trace_column_present);
    assert_eq!(preview.trace_column, TRACE_COLUMN);
    assert_eq!(preview.columns, vec!["id", "name", "_row_trace_id"]);
    assert_eq!(preview.rows.len(), 2);
    assert_eq!(preview.rows[0][TRACE_COLUMN], json!("A"));
    assert!(preview.warnings.is_empty());
}

#[test]
fn test_unknown_start_model() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), warehouse(), &chain());
    let err = svc.trace("model.shop.missing", "C", None).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_preview_of_missing_table_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let wh = SqliteWarehouse::open_in_memory().unwrap();
    wh.execute_batch("CREATE TABLE model1 (id INTEGER, _row_trace_id TEXT);")
        .unwrap();
    let svc = service(dir.path(), wh, &chain());

    let preview = svc.preview_model("model.shop.model2", None).unwrap();
    assert!(preview.rows.is_empty());
    assert_eq!(preview.columns, vec![TRACE_COLUMN]);
    assert!(!preview.trace_column_present);
    assert_eq!(preview.warnings.len(), 1);
    assert!(preview.warnings[0].starts_with("Failed to fetch rows from 'main.model2': "));
    assert!(preview.warnings[0].contains("no such table"));

    let trace = svc.trace("model.shop.model2", "B", Some(1)).unwrap();
    assert!(trace
        .warnings
        .iter()
        .any(|w| w.starts_with("Failed to fetch rows from 'main.model2': ")));
}
