// tests/rows/mapping_index_test.rs
use std::fs;
use std::path::Path;
use std::sync::Arc;

use dbt_lineage::artifacts::{VersionedArtifactStore, MANIFEST};
use dbt_lineage::config::RowLineageSettings;
use dbt_lineage::rows::{
    resolve_mapping_path, MappingCache, MappingLocations, RowLineageService, SqliteWarehouse,
};
use serde_json::json;

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

fn write_log(path: &Path, lines: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, lines.join("\n") + "\n").unwrap();
}

fn locations(root: &Path) -> MappingLocations {
    MappingLocations {
        artifacts_dir: root.join("artifacts"),
        workspace_project: None,
        dbt_project: root.join("project"),
    }
}

fn service(root: &Path, cache: Arc<MappingCache>) -> RowLineageService {
    let store = VersionedArtifactStore::new();
    store.record(
        MANIFEST,
        json!({
            "metadata": {"project_name": "shop"},
            "nodes": {
                "model.shop.stg_orders": {"resource_type": "model", "name": "stg_orders", "schema": "main"},
                "model.shop.orders": {"resource_type": "model", "name": "orders", "schema": "main"},
                "seed.shop.orders": {"resource_type": "seed", "name": "orders", "schema": "main"}
            }
        }),
    );
    RowLineageService::new(
        RowLineageSettings::default(),
        locations(root),
        Arc::new(store),
        Arc::new(SqliteWarehouse::open_in_memory().unwrap()),
        cache,
    )
}

#[test]
fn test_status_counts_roots_and_models() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("artifacts/lineage/lineage.jsonl");
    write_log(
        &log,
        &[
            mapping("raw_orders", "stg_orders", "r1", "s1"),
            mapping("stg_orders", "orders", "s1", "o1"),
            mapping("stg_orders", "orders", "s2", "o1"),
            "{oops".to_string(),
        ],
    );

    let status = service(dir.path(), Arc::new(MappingCache::new())).status();
    assert!(status.available);
    assert_eq!(status.mapping_count, 3);
    assert_eq!(status.roots, vec!["orders"]);
    assert_eq!(status.models, vec!["orders", "raw_orders", "stg_orders"]);
    assert!(status.mapping_path.ends_with("artifacts/lineage/lineage.jsonl"));
    assert!(status.mapping_mtime.as_deref().unwrap().ends_with('Z'));
    assert_eq!(
        status.warnings,
        vec![
            "Invalid JSON in row lineage mapping at line 4.",
            "Multiple manifest nodes match model 'orders'. Using 'model.shop.orders'.",
            "Model 'raw_orders' not found in manifest.",
        ]
    );
}

#[test]
fn test_list_models_roots_first() {
    let dir = tempfile::tempdir().unwrap();
    write_log(
        &dir.path().join("artifacts/lineage/lineage.jsonl"),
        &[
            mapping("stg_orders", "orders", "s1", "o1"),
            mapping("stg_orders", "orders", "s2", "o2"),
        ],
    );

    let models = service(dir.path(), Arc::new(MappingCache::new())).list_models();
    assert_eq!(models.roots.len(), 1);
    assert_eq!(models.roots[0].model_name, "orders");
    assert_eq!(models.roots[0].mappings_as_target, 2);
    assert_eq!(models.roots[0].model_unique_id.as_deref(), Some("model.shop.orders"));
    assert_eq!(models.roots[0].relation_name.as_deref(), Some("main.orders"));

    let names: Vec<_> = models.models.iter().map(|m| (m.model_name.as_str(), m.is_root)).collect();
    assert_eq!(names, vec![("orders", true), ("stg_orders", false)]);
    assert_eq!(models.models[1].mappings_as_target, 0);
}

#[test]
fn test_cache_shared_across_services_and_invalidated() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("artifacts/lineage/lineage.jsonl");
    write_log(&log, &[mapping("a", "b", "1", "2")]);

    let cache = Arc::new(MappingCache::new());
    let first = service(dir.path(), Arc::clone(&cache));
    let second = service(dir.path(), Arc::clone(&cache));

    assert_eq!(first.status().mapping_count, 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(second.status().mapping_count, 1);
    assert_eq!(cache.len(), 1);

    second.invalidate_mappings();
    assert!(cache.is_empty());
    assert_eq!(first.status().mapping_count, 1);
}

#[test]
fn test_export_path_from_dbt_project() {
    let dir = tempfile::tempdir().unwrap();
    let locs = locations(dir.path());
    fs::create_dir_all(&locs.artifacts_dir).unwrap();
    fs::create_dir_all(&locs.dbt_project).unwrap();
    fs::write(
        locs.dbt_project.join("dbt_project.yml"),
        "name: shop\nvars:\n  rowlineage_export_path: exports/rows/lineage.jsonl\n",
    )
    .unwrap();
    write_log(
        &locs.dbt_project.join("exports/rows/lineage.jsonl"),
        &[mapping("a", "b", "1", "2")],
    );

    let resolved = resolve_mapping_path(&locs, "lineage/lineage.jsonl");
    assert!(resolved
        .path
        .unwrap()
        .ends_with("project/exports/rows/lineage.jsonl"));
    assert_eq!(resolved.warnings.len(), 1);
    assert!(resolved.warnings[0].contains("workspace_project"));
}

#[test]
fn test_export_path_escaping_project_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let locs = locations(dir.path());
    fs::create_dir_all(&locs.dbt_project).unwrap();
    fs::write(
        locs.dbt_project.join("dbt_project.yml"),
        "vars:\n  rowlineage_export_path: ../../elsewhere\n",
    )
    .unwrap();

    let resolved = resolve_mapping_path(&locs, "lineage/lineage.jsonl");
    assert!(resolved
        .warnings
        .contains(&"Row lineage export path escapes the project root; ignoring.".to_string()));
    assert!(resolved.display.ends_with("artifacts/lineage/lineage.jsonl"));
}

#[test]
fn test_parquet_export_is_reported_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let locs = locations(dir.path());
    fs::create_dir_all(&locs.dbt_project).unwrap();
    fs::write(
        locs.dbt_project.join("dbt_project.yml"),
        "vars:\n  rowlineage_export_path: exports\n  rowlineage_export_format: parquet\n",
    )
    .unwrap();
    fs::create_dir_all(locs.dbt_project.join("exports")).unwrap();
    fs::write(locs.dbt_project.join("exports/lineage.parquet"), b"PAR1").unwrap();

    let status = service(dir.path(), Arc::new(MappingCache::new())).status();
    assert!(!status.available);
    assert!(status.mapping_path.ends_with("exports/lineage.parquet"));
    assert!(status.warnings.iter().any(|w| w.contains("Parquet")));
}

#[test]
fn test_malformed_line_between_valid_records() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("lineage.jsonl");
    write_log(
        &log,
        &[
            mapping("stg_orders", "orders", "s1", "o1"),
            "{\"source_model\": ".to_string(),
            mapping("raw_orders", "stg_orders", "r1", "s1"),
            mapping("stg_orders", "orders", "s2", "o1"),
        ],
    );

    let index = MappingCache::new().load(&log, "lineage.jsonl");
    assert_eq!(index.count, 3);
    assert_eq!(index.warnings, vec!["Invalid JSON in row lineage mapping at line 2."]);

    let orders: Vec<_> = index
        .parents("orders", "o1")
        .iter()
        .map(|r| r.source_trace_id.as_str())
        .collect();
    assert_eq!(orders, vec!["s1", "s2"]);
    let staged = index.parents("stg_orders", "s1");
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].source_model, "raw_orders");
}
