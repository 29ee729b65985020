// tests/lineage/column_graph_test.rs
use dbt_lineage::artifacts::Manifest;
use dbt_lineage::lineage::{ColumnGraphBuilder, ColumnLineageGraph, NameMatchStrategy};
use serde_json::{json, Value};

const ORDERS_SQL: &str = "select o.order_id, o.amount * c.rate as amount_usd \
                          from wh.staging.stg_orders o \
                          join wh.staging.currencies c on o.currency = c.code";

fn manifest(orders_sql: &str) -> Value {
    json!({
        "metadata": {"project_name": "shop", "adapter_type": "postgres"},
        "nodes": {
            "model.shop.stg_orders": {
                "resource_type": "model", "name": "stg_orders",
                "database": "wh", "schema": "staging",
                "columns": {"order_id": {}, "amount": {}, "currency": {}},
                "depends_on": {"nodes": ["source.shop.raw.orders"]}
            },
            "seed.shop.currencies": {
                "resource_type": "seed", "name": "currencies",
                "database": "wh", "schema": "staging",
                "columns": {"code": {}, "rate": {}}
            },
            "model.shop.orders": {
                "resource_type": "model", "name": "orders",
                "database": "wh", "schema": "marts",
                "columns": {"order_id": {}, "amount_usd": {}},
                "compiled_code": orders_sql,
                "depends_on": {"nodes": ["model.shop.stg_orders", "seed.shop.currencies"]}
            },
            "model.shop.revenue": {
                "resource_type": "model", "name": "revenue",
                "database": "wh", "schema": "marts",
                "columns": {"order_id": {}, "revenue": {}},
                "depends_on": {"nodes": ["model.shop.orders"]}
            }
        },
        "sources": {
            "source.shop.raw.orders": {
                "resource_type": "source", "name": "orders", "database": "wh", "schema": "raw",
                "columns": {"ORDER_ID": {}, "amount": {}, "currency": {}}
            }
        }
    })
}

fn edge_list(graph: &ColumnLineageGraph) -> Vec<(&str, &str)> {
    graph
        .edges
        .iter()
        .map(|e| (e.source.as_str(), e.target.as_str()))
        .collect()
}

#[test]
fn test_sql_edges_with_name_match_for_the_rest() {
    let manifest = Manifest::from_value(&manifest(ORDERS_SQL));
    let graph = ColumnGraphBuilder::new(true).build(&manifest, None);

    assert_eq!(
        edge_list(&graph),
        vec![
            ("model.shop.orders.order_id", "model.shop.revenue.order_id"),
            ("model.shop.stg_orders.amount", "model.shop.orders.amount_usd"),
            ("model.shop.stg_orders.order_id", "model.shop.orders.order_id"),
            ("seed.shop.currencies.rate", "model.shop.orders.amount_usd"),
            ("source.shop.raw.orders.ORDER_ID", "model.shop.stg_orders.order_id"),
            ("source.shop.raw.orders.amount", "model.shop.stg_orders.amount"),
            ("source.shop.raw.orders.currency", "model.shop.stg_orders.currency"),
        ]
    );

    let case_folded = graph
        .edges
        .iter()
        .find(|e| e.source_column == "ORDER_ID")
        .unwrap();
    assert_eq!(case_folded.target_column, "order_id");
}

#[test]
fn test_column_nodes_carry_model_metadata() {
    let manifest = Manifest::from_value(&manifest(ORDERS_SQL));
    let graph = ColumnGraphBuilder::new(true).build(&manifest, None);

    assert_eq!(graph.nodes.len(), 12);
    let node = graph
        .nodes
        .iter()
        .find(|n| n.id == "model.shop.orders.amount_usd")
        .unwrap();
    assert_eq!(node.model_id, "model.shop.orders");
    assert_eq!(node.column, "amount_usd");
    assert_eq!(node.label, "orders:amount_usd");
    assert_eq!(node.schema.as_deref(), Some("marts"));
}

#[test]
fn test_name_match_only_when_sql_disabled() {
    let manifest = Manifest::from_value(&manifest(ORDERS_SQL));
    let builder = ColumnGraphBuilder::new(false);
    assert_eq!(builder.strategy_name(), "name_match");

    let graph = builder.build(&manifest, None);
    assert_eq!(
        edge_list(&graph),
        vec![
            ("model.shop.orders.order_id", "model.shop.revenue.order_id"),
            ("model.shop.stg_orders.order_id", "model.shop.orders.order_id"),
            ("source.shop.raw.orders.ORDER_ID", "model.shop.stg_orders.order_id"),
            ("source.shop.raw.orders.amount", "model.shop.stg_orders.amount"),
            ("source.shop.raw.orders.currency", "model.shop.stg_orders.currency"),
        ]
    );
}

#[test]
fn test_unparseable_sql_falls_back_to_names() {
    let broken = Manifest::from_value(&manifest("selec order_id frm nowhere"));
    let sql_graph = ColumnGraphBuilder::new(true).build(&broken, None);
    let names_graph = ColumnGraphBuilder::with_strategy(Box::new(NameMatchStrategy)).build(&broken, None);
    assert_eq!(edge_list(&sql_graph), edge_list(&names_graph));
}

#[test]
fn test_catalog_columns_join_the_graph() {
    let mut raw = manifest(ORDERS_SQL);
    raw["nodes"]["model.shop.revenue"]["columns"] = json!({});
    let manifest = Manifest::from_value(&raw);
    let catalog = dbt_lineage::artifacts::Catalog::from_value(&json!({
        "nodes": {"model.shop.revenue": {"columns": {
            "order_id": {"name": "order_id", "type": "bigint"}
        }}}
    }));

    let graph = ColumnGraphBuilder::new(true).build(&manifest, Some(&catalog));
    let node = graph
        .nodes
        .iter()
        .find(|n| n.id == "model.shop.revenue.order_id")
        .unwrap();
    assert_eq!(node.data_type.as_deref(), Some("bigint"));
    assert!(edge_list(&graph).contains(&("model.shop.orders.order_id", "model.shop.revenue.order_id")));
}
