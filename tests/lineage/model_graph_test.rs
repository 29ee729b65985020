// tests/lineage/model_graph_test.rs
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::sync::Arc;

use dbt_lineage::artifacts::{DirectoryArtifactStore, Manifest, ResourceType, MANIFEST};
use dbt_lineage::config::LineageSettings;
use dbt_lineage::lineage::{GroupKind, LineageGraph, LineageService, ModelGraphBuilder};
use serde_json::{json, Value};

/// raw source -> stg -> orders -> revenue, plus a seed feeding orders and a
/// test hanging off orders.
fn shop_manifest() -> Value {
    json!({
        "metadata": {"project_name": "shop", "adapter_type": "postgres"},
        "nodes": {
            "model.shop.stg_orders": {
                "resource_type": "model", "name": "stg_orders",
                "database": "wh", "schema": "staging", "tags": ["staging"],
                "depends_on": {"nodes": ["source.shop.raw.orders"]}
            },
            "seed.shop.currencies": {
                "resource_type": "seed", "name": "currencies",
                "database": "wh", "schema": "staging"
            },
            "model.shop.orders": {
                "resource_type": "model", "name": "orders",
                "database": "wh", "schema": "marts", "tags": ["finance", "daily"],
                "columns": {"order_id": {"description": "Primary key"}},
                "depends_on": {"nodes": ["model.shop.stg_orders", "seed.shop.currencies"]}
            },
            "model.shop.revenue": {
                "resource_type": "model", "name": "revenue", "alias": "rpt_revenue",
                "database": "wh", "schema": "marts", "tags": ["finance"],
                "depends_on": {"nodes": ["model.shop.orders"]}
            },
            "test.shop.not_null_orders_order_id": {
                "resource_type": "test", "name": "not_null_orders_order_id",
                "depends_on": {"nodes": ["model.shop.orders"]}
            }
        },
        "sources": {
            "source.shop.raw.orders": {
                "resource_type": "source", "name": "orders", "database": "wh", "schema": "raw"
            }
        }
    })
}

#[test]
fn test_nodes_exclude_tests_and_are_sorted() {
    let manifest = Manifest::from_value(&shop_manifest());
    let graph = ModelGraphBuilder::new(&manifest).build(None);

    let ids: Vec<_> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "model.shop.orders",
            "model.shop.revenue",
            "model.shop.stg_orders",
            "seed.shop.currencies",
            "source.shop.raw.orders",
        ]
    );

    let revenue = &graph.nodes[1];
    assert_eq!(revenue.label, "rpt_revenue");
    assert_eq!(revenue.resource_type, ResourceType::Model);
    assert!(graph.warnings.is_empty());
}

#[test]
fn test_edges_follow_dependencies() {
    let manifest = Manifest::from_value(&shop_manifest());
    let graph = ModelGraphBuilder::new(&manifest).build(None);

    let edges: Vec<_> = graph
        .edges
        .iter()
        .map(|e| (e.source.as_str(), e.target.as_str()))
        .collect();
    assert_eq!(
        edges,
        vec![
            ("model.shop.orders", "model.shop.revenue"),
            ("model.shop.stg_orders", "model.shop.orders"),
            ("seed.shop.currencies", "model.shop.orders"),
            ("source.shop.raw.orders", "model.shop.stg_orders"),
        ]
    );
}

#[test]
fn test_groups_by_schema_type_and_tag() {
    let manifest = Manifest::from_value(&shop_manifest());
    let graph = ModelGraphBuilder::new(&manifest).build(None);

    let ids: Vec<_> = graph.groups.iter().map(|g| g.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "schema:wh.marts",
            "schema:wh.raw",
            "schema:wh.staging",
            "resource:model",
            "resource:seed",
            "resource:source",
            "tag:daily",
            "tag:finance",
            "tag:staging",
        ]
    );

    let finance = graph.groups.iter().find(|g| g.id == "tag:finance").unwrap();
    assert_eq!(finance.kind, GroupKind::Tag);
    assert_eq!(finance.members, vec!["model.shop.orders", "model.shop.revenue"]);

    let staging = graph.groups.iter().find(|g| g.id == "schema:wh.staging").unwrap();
    assert_eq!(staging.members, vec!["model.shop.stg_orders", "seed.shop.currencies"]);
}

#[test]
fn test_depth_limit_keeps_groups_complete() {
    let manifest = Manifest::from_value(&shop_manifest());
    let graph = ModelGraphBuilder::new(&manifest).build(Some(1));

    let ids: Vec<_> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "model.shop.orders",
            "model.shop.stg_orders",
            "seed.shop.currencies",
            "source.shop.raw.orders",
        ]
    );
    assert_eq!(graph.edges.len(), 3);
    assert!(graph
        .edges
        .iter()
        .all(|e| e.target != "model.shop.revenue"));

    let models = graph.groups.iter().find(|g| g.id == "resource:model").unwrap();
    assert_eq!(models.members.len(), 3);
}

#[test]
fn test_cycle_is_reported_not_fatal() {
    let manifest = Manifest::from_value(&json!({
        "nodes": {
            "model.p.a": {"name": "a", "depends_on": {"nodes": ["model.p.b"]}},
            "model.p.b": {"name": "b", "depends_on": {"nodes": ["model.p.a"]}}
        }
    }));
    let graph = ModelGraphBuilder::new(&manifest).build(Some(1));
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(
        graph.warnings,
        vec!["Dependency cycle detected between: model.p.a, model.p.b."]
    );
}

#[test]
fn test_model_detail_through_directory_store() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(MANIFEST), shop_manifest().to_string()).unwrap();
    fs::write(
        dir.path().join("catalog.json"),
        json!({"nodes": {"model.shop.orders": {"columns": {
            "order_id": {"name": "order_id", "type": "integer"},
            "amount": {"name": "amount", "type": "numeric", "comment": "Gross amount"}
        }}}})
        .to_string(),
    )
    .unwrap();

    let store = Arc::new(DirectoryArtifactStore::new(dir.path()));
    let service = LineageService::new(store, LineageSettings::default());

    let detail = service.model_lineage("model.shop.orders").unwrap();
    assert_eq!(detail.parents, vec!["model.shop.stg_orders", "seed.shop.currencies"]);
    assert_eq!(detail.children, vec!["model.shop.revenue"]);
    assert_eq!(detail.tags, vec!["finance", "daily"]);

    let order_id = &detail.columns["order_id"];
    assert_eq!(order_id.description.as_deref(), Some("Primary key"));
    assert_eq!(order_id.data_type.as_deref(), Some("integer"));
    assert_eq!(detail.columns["amount"].description.as_deref(), Some("Gross amount"));

    assert!(service.model_lineage("model.shop.missing").unwrap_err().is_not_found());
    assert!(service
        .model_lineage("test.shop.not_null_orders_order_id")
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_malformed_node_becomes_warning() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join(MANIFEST),
        json!({"nodes": {
            "model.p.ok": {"name": "ok"},
            "model.p.bad": {"name": "bad", "tags": "not-a-list"}
        }})
        .to_string(),
    )
    .unwrap();

    let service = LineageService::new(
        Arc::new(DirectoryArtifactStore::new(dir.path())),
        LineageSettings::default(),
    );
    let graph = service.build_model_graph(None);
    assert_eq!(graph.nodes.len(), 1);
    assert_eq!(graph.warnings.len(), 1);
    assert!(graph.warnings[0].contains("model.p.bad"));
}

/// raw source -> a, b (diamond) -> d -> e -> f, plus an unconnected seed.
fn diamond_manifest() -> Manifest {
    fn model(name: &str, parents: &[&str]) -> Value {
        json!({"resource_type": "model", "name": name, "depends_on": {"nodes": parents}})
    }
    Manifest::from_value(&json!({
        "nodes": {
            "model.p.a": model("a", &["source.p.raw.s"]),
            "model.p.b": model("b", &["source.p.raw.s"]),
            "model.p.d": model("d", &["model.p.a", "model.p.b"]),
            "model.p.e": model("e", &["model.p.d"]),
            "model.p.f": model("f", &["model.p.e"]),
            "seed.p.z": {"resource_type": "seed", "name": "z"}
        },
        "sources": {
            "source.p.raw.s": {"resource_type": "source", "name": "s"}
        }
    }))
}

/// Shortest distance of every node from the nearest zero-indegree node.
fn distances_from_roots(graph: &LineageGraph) -> HashMap<String, usize> {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut indegree: HashMap<&str, usize> = graph.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    for edge in &graph.edges {
        children.entry(&edge.source).or_default().push(&edge.target);
        *indegree.entry(&edge.target).or_default() += 1;
    }

    let mut distance: HashMap<String, usize> = HashMap::new();
    let mut queue: VecDeque<(&str, usize)> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| (*id, 0))
        .collect();
    while let Some((id, depth)) = queue.pop_front() {
        if distance.contains_key(id) {
            continue;
        }
        distance.insert(id.to_string(), depth);
        for child in children.get(id).into_iter().flatten() {
            queue.push_back((*child, depth + 1));
        }
    }
    distance
}

#[test]
fn test_every_kept_node_is_within_depth_of_a_root() {
    let manifest = diamond_manifest();
    let builder = ModelGraphBuilder::new(&manifest);
    let full = builder.build(None);
    let distance = distances_from_roots(&full);
    assert_eq!(distance["model.p.d"], 2);
    assert_eq!(distance["model.p.f"], 4);

    for k in 1..=5 {
        let pruned = builder.build(Some(k));
        let kept: Vec<_> = pruned.nodes.iter().map(|n| n.id.as_str()).collect();
        let expected: Vec<_> = full
            .nodes
            .iter()
            .map(|n| n.id.as_str())
            .filter(|id| distance[*id] <= k)
            .collect();
        assert_eq!(kept, expected, "depth {k}");
        assert!(pruned
            .edges
            .iter()
            .all(|e| kept.contains(&e.source.as_str()) && kept.contains(&e.target.as_str())));
    }

    let at_bound = builder.build(Some(2));
    let ids: Vec<_> = at_bound.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["model.p.a", "model.p.b", "model.p.d", "seed.p.z", "source.p.raw.s"]
    );
    assert_eq!(at_bound.edges.len(), 4);
    assert_eq!(builder.build(Some(0)).nodes.len(), full.nodes.len());
}
