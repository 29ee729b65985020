//! SQL parsing for column-level provenance.
//!
//! Compiled SQL is parsed with sqlparser; nothing here ever generates SQL.

pub mod dialect;
pub mod provenance;
pub mod relation;

pub use dialect::Dialect;
pub use provenance::{infer, ColumnFlow, Inference, KnownColumns};
pub use relation::{normalize_relation, RelationLookup};
