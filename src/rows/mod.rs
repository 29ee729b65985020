//! Row-level provenance.
//!
//! A row-lineage export writes a mapping log linking each output row's trace
//! id to the trace ids of the input rows it was computed from. This module
//! locates and indexes that log ([`paths`], [`mapping`], [`cache`]), maps
//! model names back to warehouse relations ([`resolve`]), fetches rows
//! ([`warehouse`]) and walks the mappings backwards ([`trace`]).
//! [`RowLineageService`] ties these together per request.

pub mod cache;
pub mod mapping;
pub mod paths;
pub mod resolve;
pub mod service;
pub mod trace;
pub mod trace_id;
pub mod warehouse;

pub use cache::MappingCache;
pub use mapping::{FileSignature, MappingIndex, MappingRecord};
pub use paths::{resolve_mapping_path, MappingLocations, ResolvedMappingPath, DEFAULT_MAPPING_PATH};
pub use resolve::{ManifestResolver, RelationInfo, WarningLog};
pub use service::{RowLineageModelInfo, RowLineageModels, RowLineagePreview, RowLineageService, RowLineageStatus};
pub use trace::{
    RowLineageEdge, RowLineageGraph, RowLineageHop, RowLineageNode, RowLineageTarget, RowTraceBuilder,
    RowTraceResponse,
};
pub use trace_id::{synthetic_trace_id, TRACE_COLUMN};
pub use warehouse::{Row, SqlExecutor, SqliteWarehouse, WarehouseError, WarehousePool, WarehouseResult};
