//! Row trace identifiers.

use std::collections::BTreeMap;

use uuid::Uuid;

use super::warehouse::Row;

/// Column carrying a row's trace id in tables built with row lineage.
pub const TRACE_COLUMN: &str = "_row_trace_id";

/// Namespace for synthetic trace ids.
const TRACE_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_9b3d_4c7a_8e21_5d0f_b7a9_c314);

/// Deterministic trace id for a row that has none.
///
/// UUIDv5 over the row's JSON with keys in sorted order, so equal rows
/// always get the same id. Only meaningful for browsing: such ids never
/// appear in the mapping log.
pub fn synthetic_trace_id(row: &Row) -> String {
    let sorted: BTreeMap<&String, &serde_json::Value> = row.iter().collect();
    let canonical = serde_json::to_string(&sorted).unwrap_or_default();
    Uuid::new_v5(&TRACE_NAMESPACE, canonical.as_bytes()).to_string()
}

/// The row's trace id, rendered as a string.
pub fn row_trace_id(row: &Row) -> Option<String> {
    match row.get(TRACE_COLUMN)? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Add a synthetic trace id when the row has no trace column.
pub fn ensure_trace_id(row: &mut Row) {
    if !row.contains_key(TRACE_COLUMN) {
        let id = synthetic_trace_id(row);
        row.insert(TRACE_COLUMN.to_string(), serde_json::Value::String(id));
    }
}
